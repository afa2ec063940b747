use std::cell::{Cell, RefCell};
use std::ffi::CStr;
use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::error::ArenaError;

/// pool 中最多缓存的空闲 chunk 数量，多出来的直接释放
const MAX_FREE_CHUNKS: usize = 16;

/// pool 的统计数据，主要用于测试和调试输出
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArenaStats {
    /// 累计创建的 scope 数量
    pub scopes_acquired: u64,
    /// 累计释放的 scope 数量
    pub scopes_released: u64,
    /// 当前存活的 scope 数量（也就是嵌套深度）
    pub live_scopes: usize,
    /// 所有存活 scope 已经分配出去的字节数
    pub bytes_in_use: usize,
    pub peak_bytes_in_use: usize,
    /// 没有按照栈顺序释放的次数，正常情况下应该一直是 0
    pub out_of_order_releases: u64,
}

struct PoolState {
    free_chunks: Vec<Box<[u8]>>,
    /// 存活的 scope id，栈顶是最内层的 scope
    scope_stack: Vec<u64>,
    next_scope_id: u64,
    stats: ArenaStats,
}

/// 作用域内存池
///
/// 本身不直接提供分配，而是通过 [`ArenaPool::acquire`] 创建 [`Scope`]，在 scope 中分配。
/// scope 释放时，其 chunk 会回到 pool 中，下一个 scope 可以直接复用，避免每帧都向系统申请内存。
///
/// scope 必须按照栈的顺序释放：内层的 scope 先于外层的 scope 释放。
///
/// # 使用示例
/// ```
/// use truvis_scope::ArenaPool;
///
/// let pool = ArenaPool::new("frame", 1024);
/// {
///     let frame = pool.acquire("frame");
///     let width = frame.alloc(1280_u32).unwrap();
///     *width += 1;
///     assert_eq!(*width, 1281);
/// } // frame 中的所有分配在这里一次性释放
/// assert_eq!(pool.stats().bytes_in_use, 0);
/// ```
pub struct ArenaPool {
    label: String,
    chunk_size: usize,
    state: RefCell<PoolState>,
}
// new & init
impl ArenaPool {
    pub const DEFAULT_CHUNK_SIZE: usize = 4096;
    const MIN_CHUNK_SIZE: usize = 64;

    pub fn new(label: impl Into<String>, chunk_size: usize) -> Self {
        Self {
            label: label.into(),
            chunk_size: chunk_size.max(Self::MIN_CHUNK_SIZE),
            state: RefCell::new(PoolState {
                free_chunks: Vec::new(),
                scope_stack: Vec::new(),
                next_scope_id: 1,
                stats: ArenaStats::default(),
            }),
        }
    }
}
// getters
impl ArenaPool {
    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[inline]
    pub fn stats(&self) -> ArenaStats {
        self.state.borrow().stats
    }

    #[inline]
    pub fn live_scopes(&self) -> usize {
        self.state.borrow().scope_stack.len()
    }

    /// 当前缓存的空闲 chunk 数量
    #[inline]
    pub fn free_chunk_count(&self) -> usize {
        self.state.borrow().free_chunks.len()
    }
}
// tools
impl ArenaPool {
    /// 创建一个新的 scope，新的 scope 位于栈顶
    pub fn acquire(&self, label: &'static str) -> Scope<'_> {
        let mut state = self.state.borrow_mut();
        let id = state.next_scope_id;
        state.next_scope_id += 1;
        state.scope_stack.push(id);
        state.stats.scopes_acquired += 1;
        state.stats.live_scopes = state.scope_stack.len();

        log::trace!(
            target: "arena",
            "[{}] acquire scope #{} ({}), depth {}",
            self.label,
            id,
            label,
            state.scope_stack.len()
        );

        Scope {
            pool: self,
            id,
            label,
            chunks: RefCell::new(Vec::new()),
            bytes_allocated: Cell::new(0),
        }
    }

    /// 取出一个至少有 min_len 字节的 chunk，优先复用空闲的 chunk
    fn take_chunk(&self, min_len: usize) -> Box<[u8]> {
        {
            let mut state = self.state.borrow_mut();
            if let Some(idx) = state.free_chunks.iter().position(|chunk| chunk.len() >= min_len) {
                return state.free_chunks.swap_remove(idx);
            }
        }
        vec![0_u8; min_len.max(self.chunk_size)].into_boxed_slice()
    }

    fn note_allocated(&self, size: usize) {
        let mut state = self.state.borrow_mut();
        state.stats.bytes_in_use += size;
        state.stats.peak_bytes_in_use = state.stats.peak_bytes_in_use.max(state.stats.bytes_in_use);
    }

    fn release_scope(&self, id: u64, label: &'static str, chunks: Vec<Box<[u8]>>, bytes: usize) {
        let mut state = self.state.borrow_mut();

        let depth = state.scope_stack.len();
        match state.scope_stack.iter().rposition(|&live| live == id) {
            Some(pos) if pos + 1 == depth => {
                state.scope_stack.pop();
            }
            Some(pos) => {
                log::error!(
                    target: "arena",
                    "[{}] scope #{} ({}) released while {} inner scope(s) are still alive",
                    self.label,
                    id,
                    label,
                    depth - pos - 1
                );
                state.scope_stack.remove(pos);
                state.stats.out_of_order_releases += 1;
            }
            None => {
                log::error!(target: "arena", "[{}] scope #{} ({}) is not tracked by this pool", self.label, id, label);
            }
        }

        state.stats.scopes_released += 1;
        state.stats.live_scopes = state.scope_stack.len();
        state.stats.bytes_in_use = state.stats.bytes_in_use.saturating_sub(bytes);

        let chunk_cnt = chunks.len();
        for chunk in chunks {
            if state.free_chunks.len() < MAX_FREE_CHUNKS {
                state.free_chunks.push(chunk);
            }
        }

        log::trace!(
            target: "arena",
            "[{}] release scope #{} ({}): {} bytes in {} chunk(s)",
            self.label,
            id,
            label,
            bytes,
            chunk_cnt
        );
    }
}

/// scope 持有的一块连续内存，bump 分配
///
/// 以裸指针的形式持有，这样已经分配出去的 [`Region`] 不会因为后续的分配而失效。
struct Chunk {
    storage: NonNull<[u8]>,
    cursor: usize,
}
impl Chunk {
    fn new(storage: Box<[u8]>) -> Self {
        Self {
            storage: NonNull::from(Box::leak(storage)),
            cursor: 0,
        }
    }

    fn bump(&mut self, size: usize, align: usize) -> Option<NonNull<u8>> {
        let base = self.storage.cast::<u8>();
        let addr = base.as_ptr() as usize;
        let start = addr.checked_add(self.cursor)?.checked_next_multiple_of(align)? - addr;
        let end = start.checked_add(size)?;
        if end > self.storage.len() {
            return None;
        }
        self.cursor = end;

        // SAFETY: start <= end <= capacity，结果仍然位于 chunk 内
        Some(unsafe { base.add(start) })
    }

    fn into_storage(self) -> Box<[u8]> {
        // SAFETY: storage 来自 Box::leak，并且只会被归还一次
        unsafe { Box::from_raw(self.storage.as_ptr()) }
    }
}

/// 一段分配作用域
///
/// 通过 [`ArenaPool::acquire`] 创建，drop 时将所有分配一次性归还给 pool。
/// 所有从 scope 中得到的 [`Region`] 和引用都借用了 scope，因此不可能在 scope 释放之后被读取：
///
/// ```compile_fail
/// use truvis_scope::ArenaPool;
///
/// let pool = ArenaPool::new("doc", 256);
/// let frame = pool.acquire("frame");
/// let slot = frame.alloc(7_u32).unwrap();
/// drop(frame);
/// *slot = 8; // slot 的生命周期不能超过 frame
/// ```
///
/// scope 不能跨线程共享。
pub struct Scope<'pool> {
    pool: &'pool ArenaPool,
    id: u64,
    label: &'static str,
    chunks: RefCell<Vec<Chunk>>,
    bytes_allocated: Cell<usize>,
}
// getters
impl Scope<'_> {
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// 当前 scope 已经分配出去的字节数（不含对齐填充）
    #[inline]
    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated.get()
    }

    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunks.borrow().len()
    }
}
// 分配
impl Scope<'_> {
    /// 分配 size 字节、按 align 对齐的零初始化内存
    ///
    /// 超过 pool chunk 大小的请求会得到一个独立的 chunk。
    pub fn allocate(&self, size: usize, align: usize) -> Result<Region<'_>, ArenaError> {
        if !align.is_power_of_two() {
            return Err(ArenaError::InvalidAlignment { align });
        }
        let padded = size.checked_add(align - 1).ok_or(ArenaError::SizeOverflow { size, align })?;
        // 单次分配不能超过 isize::MAX，否则无法申请到 chunk
        if padded > isize::MAX as usize {
            return Err(ArenaError::SizeOverflow { size, align });
        }

        let mut chunks = self.chunks.borrow_mut();
        let ptr = match chunks.last_mut().and_then(|chunk| chunk.bump(size, align)) {
            Some(ptr) => ptr,
            None => {
                chunks.push(Chunk::new(self.pool.take_chunk(padded)));
                chunks
                    .last_mut()
                    .and_then(|chunk| chunk.bump(size, align))
                    .ok_or(ArenaError::SizeOverflow { size, align })?
            }
        };

        // SAFETY: [ptr, ptr + size) 位于本 scope 独占的 chunk 内，且之前没有分配给别人
        unsafe { ptr.as_ptr().write_bytes(0, size) };

        self.bytes_allocated.set(self.bytes_allocated.get() + size);
        self.pool.note_allocated(size);

        Ok(Region {
            ptr,
            len: size,
            _scope: PhantomData,
        })
    }

    /// 在 scope 中放入一个值，返回其可变引用
    ///
    /// 要求 `T: Copy`，scope 释放时不会调用 drop。
    #[allow(clippy::mut_from_ref)]
    pub fn alloc<T: Copy>(&self, value: T) -> Result<&mut T, ArenaError> {
        let region = self.allocate(size_of::<T>(), align_of::<T>())?;
        let ptr = region.ptr.cast::<T>();
        // SAFETY: region 按 T 的 size/align 分配，并且生命周期和 &self 相同
        unsafe {
            ptr.as_ptr().write(value);
            Ok(&mut *ptr.as_ptr())
        }
    }

    /// 分配一个全零的 T
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_zeroed<T: bytemuck::Zeroable + Copy>(&self) -> Result<&mut T, ArenaError> {
        let region = self.allocate(size_of::<T>(), align_of::<T>())?;
        // SAFETY: region 已经清零，而全零对于 Zeroable 类型是合法的值
        unsafe { Ok(&mut *region.ptr.cast::<T>().as_ptr()) }
    }

    /// 将字符串连同结尾的 NUL 复制到 scope 中
    pub fn alloc_str(&self, s: &str) -> Result<&CStr, ArenaError> {
        if let Some(position) = s.bytes().position(|b| b == 0) {
            return Err(ArenaError::InteriorNul { position });
        }

        let mut region = self.allocate(s.len() + 1, 1)?;
        region.as_bytes_mut()[..s.len()].copy_from_slice(s.as_bytes());

        CStr::from_bytes_until_nul(region.into_bytes()).map_err(|_| ArenaError::InteriorNul { position: s.len() })
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        let chunks = std::mem::take(self.chunks.get_mut()).into_iter().map(Chunk::into_storage).collect();
        self.pool.release_scope(self.id, self.label, chunks, self.bytes_allocated.get());
    }
}

/// scope 中的一段零初始化内存
///
/// 生命周期和产生它的 [`Scope`] 绑定。
pub struct Region<'scope> {
    ptr: NonNull<u8>,
    len: usize,
    _scope: PhantomData<&'scope mut [u8]>,
}
impl<'scope> Region<'scope> {
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: ptr 指向 len 个已初始化的字节，在 'scope 内有效
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: 同上，且 Region 独占这段内存
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    #[inline]
    pub fn into_bytes(self) -> &'scope [u8] {
        // SAFETY: 同上
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl std::fmt::Debug for Region<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region").field("ptr", &self.ptr).field("len", &self.len).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_chunk_size_and_zeroed_values() {
        let pool = ArenaPool::new("test", ArenaPool::DEFAULT_CHUNK_SIZE);
        assert_eq!(pool.chunk_size(), ArenaPool::DEFAULT_CHUNK_SIZE);

        let scope = pool.acquire("app");
        let pair = scope.alloc_zeroed::<[u32; 2]>().unwrap();
        assert_eq!(*pair, [0, 0]);
        pair[1] = 7;
        assert_eq!(*pair, [0, 7]);
        assert_eq!(scope.bytes_allocated(), 8);
    }

    #[test]
    fn allocate_is_zeroed_and_aligned() {
        let pool = ArenaPool::new("test", 256);
        let scope = pool.acquire("frame");

        for align in [1, 2, 4, 8, 16, 64] {
            let region = scope.allocate(24, align).unwrap();
            assert_eq!(region.len(), 24);
            assert_eq!(region.as_ptr() as usize % align, 0);
            assert!(region.as_bytes().iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn invalid_alignment_is_rejected() {
        let pool = ArenaPool::new("test", 256);
        let scope = pool.acquire("frame");

        assert_eq!(scope.allocate(8, 3).unwrap_err(), ArenaError::InvalidAlignment { align: 3 });
        assert_eq!(scope.allocate(8, 0).unwrap_err(), ArenaError::InvalidAlignment { align: 0 });
    }

    #[test]
    fn release_returns_every_byte() {
        let pool = ArenaPool::new("test", 256);
        {
            let scope = pool.acquire("frame");
            scope.allocate(100, 8).unwrap();
            scope.alloc(3_u64).unwrap();
            assert_eq!(pool.stats().bytes_in_use, 108);
        }

        let stats = pool.stats();
        assert_eq!(stats.bytes_in_use, 0);
        assert_eq!(stats.peak_bytes_in_use, 108);
        assert_eq!(stats.scopes_acquired, 1);
        assert_eq!(stats.scopes_released, 1);
        assert_eq!(stats.live_scopes, 0);
    }

    #[test]
    fn chunks_are_reused_and_rezeroed() {
        let pool = ArenaPool::new("test", 256);

        let first_addr = {
            let scope = pool.acquire("frame-0");
            let mut region = scope.allocate(32, 8).unwrap();
            region.as_bytes_mut().fill(0xAB);
            region.as_ptr() as usize
        };
        assert_eq!(pool.free_chunk_count(), 1);

        let scope = pool.acquire("frame-1");
        let region = scope.allocate(32, 8).unwrap();
        assert_eq!(region.as_ptr() as usize, first_addr);
        assert!(region.as_bytes().iter().all(|&b| b == 0));
        assert_eq!(pool.free_chunk_count(), 0);
    }

    #[test]
    fn oversized_request_gets_its_own_chunk() {
        let pool = ArenaPool::new("test", 64);
        let scope = pool.acquire("frame");

        scope.allocate(16, 8).unwrap();
        let big = scope.allocate(1000, 16).unwrap();
        assert_eq!(big.len(), 1000);
        assert_eq!(scope.chunk_count(), 2);
    }

    #[test]
    fn earlier_regions_survive_new_chunks() {
        let pool = ArenaPool::new("test", 64);
        let scope = pool.acquire("frame");

        let a = scope.alloc(0x1122_3344_u32).unwrap();
        for _ in 0..32 {
            scope.allocate(48, 8).unwrap();
        }
        assert_eq!(*a, 0x1122_3344);
    }

    #[test]
    fn nested_scopes_release_in_stack_order() {
        let pool = ArenaPool::new("test", 128);
        let app = pool.acquire("application");
        app.alloc(1_u32).unwrap();

        for _ in 0..3 {
            let frame = pool.acquire("frame");
            frame.alloc(2_u32).unwrap();
            assert_eq!(pool.live_scopes(), 2);
        }

        assert_eq!(pool.live_scopes(), 1);
        assert_eq!(pool.stats().bytes_in_use, 4);
        assert_eq!(pool.stats().out_of_order_releases, 0);
        drop(app);
        assert_eq!(pool.live_scopes(), 0);
    }

    #[test]
    fn out_of_order_release_is_counted() {
        let pool = ArenaPool::new("test", 128);
        let outer = pool.acquire("outer");
        let inner = pool.acquire("inner");

        drop(outer);
        assert_eq!(pool.stats().out_of_order_releases, 1);
        drop(inner);
        assert_eq!(pool.live_scopes(), 0);
    }

    #[test]
    fn alloc_str_copies_with_terminator() {
        let pool = ArenaPool::new("test", 128);
        let app = pool.acquire("application");

        let title = app.alloc_str("Hello Truvis").unwrap();
        assert_eq!(title.to_str().unwrap(), "Hello Truvis");
        assert_eq!(title.to_bytes_with_nul().len(), 13);
        assert_eq!(app.alloc_str("bad\0title").unwrap_err(), ArenaError::InteriorNul { position: 3 });
    }

    #[test]
    fn huge_request_is_size_overflow() {
        let pool = ArenaPool::new("test", 128);
        let scope = pool.acquire("frame");

        let size = usize::MAX / 2 + 1;
        assert_eq!(scope.allocate(size, 1).unwrap_err(), ArenaError::SizeOverflow { size, align: 1 });
        assert_eq!(
            scope.allocate(isize::MAX as usize, 8).unwrap_err(),
            ArenaError::SizeOverflow {
                size: isize::MAX as usize,
                align: 8
            }
        );
        assert_eq!(scope.allocate(usize::MAX, 2).unwrap_err(), ArenaError::SizeOverflow { size: usize::MAX, align: 2 });

        // 失败的请求不占用任何内存，scope 仍然可用
        assert_eq!(scope.chunk_count(), 0);
        assert_eq!(*scope.alloc(5_u32).unwrap(), 5);
    }

    #[test]
    fn zero_sized_allocation_is_valid() {
        let pool = ArenaPool::new("test", 128);
        let scope = pool.acquire("frame");

        let region = scope.allocate(0, 8).unwrap();
        assert!(region.is_empty());
        assert_eq!(scope.bytes_allocated(), 0);
    }
}
