//! 输出槽位
//!
//! 可失败的 backend 调用通过输出参数返回结果（句柄、宽高等）。这里在 [`Scope`] 中分配零初始化的槽位，
//! 调用方把槽位交给生产者写入，之后再读取。
//!
//! 读取时不会检查生产者是否真的写入过：未写入的槽位读出来就是 0，这是调用方的约定。

use std::marker::PhantomData;

use bytemuck::Pod;

use crate::arena::{Region, Scope};
use crate::error::ArenaError;

/// 类型化的输出槽位，生命周期和所在的 scope 绑定
pub struct OutSlot<'scope, T: Pod> {
    region: Region<'scope>,
    _ty: PhantomData<T>,
}
// new & init
impl<'scope, T: Pod> OutSlot<'scope, T> {
    pub fn new(scope: &'scope Scope<'_>) -> Result<Self, ArenaError> {
        Ok(Self {
            region: scope.allocate(size_of::<T>(), align_of::<T>())?,
            _ty: PhantomData,
        })
    }
}
// tools
impl<T: Pod> OutSlot<'_, T> {
    /// 生产者一侧：写入结果
    #[inline]
    pub fn write(&mut self, value: T) {
        self.region.as_bytes_mut().copy_from_slice(bytemuck::bytes_of(&value));
    }

    /// 消费者一侧：读取结果
    #[inline]
    pub fn read(&self) -> T {
        bytemuck::pod_read_unaligned(self.region.as_bytes())
    }

    /// 交给 C 风格的 `T*` 输出参数
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.region.as_mut_ptr().cast::<T>()
    }
}

impl<T: Pod + std::fmt::Debug> std::fmt::Debug for OutSlot<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("OutSlot").field(&self.read()).finish()
    }
}

/// 指针宽度的槽位，用于接收不透明句柄
#[inline]
pub fn out_pointer_slot<'scope>(scope: &'scope Scope<'_>) -> Result<OutSlot<'scope, usize>, ArenaError> {
    OutSlot::new(scope)
}

#[inline]
pub fn read_pointer(slot: &OutSlot<'_, usize>) -> usize {
    slot.read()
}

/// 32 位槽位，用于接收宽高等尺寸
#[inline]
pub fn out_u32_slot<'scope>(scope: &'scope Scope<'_>) -> Result<OutSlot<'scope, u32>, ArenaError> {
    OutSlot::new(scope)
}

#[inline]
pub fn read_u32(slot: &OutSlot<'_, u32>) -> u32 {
    slot.read()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaPool;

    #[test]
    fn fresh_slots_read_zero() {
        let pool = ArenaPool::new("test", 128);
        let frame = pool.acquire("frame");

        let handle = out_pointer_slot(&frame).unwrap();
        let width = out_u32_slot(&frame).unwrap();
        assert_eq!(read_pointer(&handle), 0);
        assert_eq!(read_u32(&width), 0);
    }

    #[test]
    fn slots_read_back_what_the_producer_wrote() {
        let pool = ArenaPool::new("test", 128);
        let frame = pool.acquire("frame");

        let mut handle = out_pointer_slot(&frame).unwrap();
        let mut width = out_u32_slot(&frame).unwrap();
        let mut height = out_u32_slot(&frame).unwrap();

        handle.write(0xDEAD_BEEF);
        width.write(1280);
        // C 风格的生产者通过裸指针写入
        unsafe { height.as_mut_ptr().write(780) };

        assert_eq!(read_pointer(&handle), 0xDEAD_BEEF);
        assert_eq!(read_u32(&width), 1280);
        assert_eq!(read_u32(&height), 780);
    }

    #[test]
    fn slots_are_aligned_for_their_type() {
        let pool = ArenaPool::new("test", 128);
        let frame = pool.acquire("frame");

        let _pad = frame.allocate(1, 1).unwrap();
        let mut handle = out_pointer_slot(&frame).unwrap();
        assert_eq!(handle.as_mut_ptr() as usize % align_of::<usize>(), 0);
        assert_eq!(frame.bytes_allocated(), 1 + size_of::<usize>());
    }
}
