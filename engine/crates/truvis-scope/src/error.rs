use thiserror::Error;

/// 作用域分配相关的错误
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ArenaError {
    /// 对齐值必须是 2 的幂
    #[error("invalid alignment {align}: must be a power of two")]
    InvalidAlignment { align: usize },

    /// size 加上对齐填充之后溢出
    #[error("allocation of {size} bytes (align {align}) overflows the address space")]
    SizeOverflow { size: usize, align: usize },

    /// 字符串中间包含 NUL，无法作为 C 字符串存放
    #[error("string contains an interior NUL byte at position {position}")]
    InteriorNul { position: usize },
}
