//! 作用域内存（Scoped Arena）
//!
//! 提供栈式分配的内存区域：[`ArenaPool`] 负责复用底层的 chunk，[`Scope`] 是一段有明确
//! 生命周期的分配作用域，离开作用域时其中的所有分配一次性归还给 pool。
//!
//! 两种典型的作用域：
//! - 应用作用域：从启动到退出，持有窗口标题等长期数据
//! - 帧作用域：每一帧创建一次，持有 swapchain 的输出槽位、color target 描述等
//!
//! [`out_slot`] 在作用域之上提供零初始化的类型化输出槽位，供可失败的 backend 调用写入结果。

pub mod arena;
pub mod error;
pub mod out_slot;

pub use arena::{ArenaPool, ArenaStats, Region, Scope};
pub use error::ArenaError;
pub use out_slot::{OutSlot, out_pointer_slot, out_u32_slot, read_pointer, read_u32};
