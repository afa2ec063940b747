use truvis_gfx::backend::{ColorTargetInfo, CommandBufferHandle, FColor, GpuBackend, WindowHandle};
use truvis_scope::ArenaPool;

use crate::error::FrameError;
use crate::event_source::EventSource;
use crate::render_target::make_color_target;
use crate::swapchain_acquire::acquire_swapchain_texture;

/// 默认清屏颜色，深蓝
pub const DEFAULT_CLEAR_COLOR: FColor = FColor::new(0.0, 0.2, 0.4, 1.0);

/// 单帧的结果，失败的情况通过 [`FrameError`] 返回
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// backend 暂时没有可用的命令缓冲，本帧什么都没做
    NoCommandBuffer,
    /// swapchain 纹理还没准备好，命令缓冲已取消
    SwapchainNotReady,
    /// 命令缓冲已提交；degraded 表示清屏 pass 没有录制成功
    Submitted { degraded: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    /// 调用事件来源的次数，包含最后一次返回 false 的调用
    pub polls: u64,
    pub submitted: u64,
    pub canceled: u64,
    pub skipped_no_command_buffer: u64,
    pub degraded_passes: u64,
}

/// 每帧的命令缓冲生命周期
///
/// ```text
/// Polling -> BufferAcquired -> SwapchainAcquired -> PassActive -> Submitted
///                  |                  |
///                  +-> Canceled <-----+
/// ```
///
/// 每个获取到的命令缓冲都恰好走到 Submitted 或 Canceled 之一；
/// 每帧的临时数据分配在一个帧作用域中，帧结束时一次性释放。
pub struct FrameDriver<'pool, B: GpuBackend> {
    backend: B,
    window: WindowHandle,
    arena_pool: &'pool ArenaPool,
    clear_color: FColor,

    stats: FrameStats,
}

// new & init
impl<'pool, B: GpuBackend> FrameDriver<'pool, B> {
    pub fn new(backend: B, window: WindowHandle, arena_pool: &'pool ArenaPool, clear_color: FColor) -> Self {
        Self {
            backend,
            window,
            arena_pool,
            clear_color,
            stats: FrameStats::default(),
        }
    }
}

// getters
impl<B: GpuBackend> FrameDriver<'_, B> {
    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    #[inline]
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    #[inline]
    pub fn window(&self) -> WindowHandle {
        self.window
    }

    #[inline]
    pub fn clear_color(&self) -> FColor {
        self.clear_color
    }

    /// 取回 backend，用于退出时销毁
    #[inline]
    pub fn into_backend(self) -> B {
        self.backend
    }
}

// tools
impl<B: GpuBackend> FrameDriver<'_, B> {
    /// 主循环：事件来源返回 false 时立即退出，不再渲染下一帧
    ///
    /// 遇到不可恢复的错误时返回 Err，此时最后一帧的命令缓冲已经处于终态。
    pub fn run(&mut self, events: &mut impl EventSource) -> Result<FrameStats, FrameError> {
        log::info!(target: "render", "frame loop started");
        loop {
            self.stats.polls += 1;
            if !events.poll_and_should_continue() {
                break;
            }
            self.run_frame()?;
        }

        log::info!(
            target: "render",
            "frame loop stopped: {} submitted, {} canceled, {} skipped",
            self.stats.submitted,
            self.stats.canceled,
            self.stats.skipped_no_command_buffer
        );
        Ok(self.stats)
    }

    /// 渲染一帧
    pub fn run_frame(&mut self) -> Result<FrameOutcome, FrameError> {
        let Some(cmd) = self.backend.acquire_command_buffer() else {
            // 没有命令缓冲时不创建帧作用域
            log::trace!(target: "render", "no command buffer available, skipping frame");
            self.stats.skipped_no_command_buffer += 1;
            return Ok(FrameOutcome::NoCommandBuffer);
        };

        let arena_pool = self.arena_pool;
        let frame_scope = arena_pool.acquire("frame");

        let swapchain_texture = match acquire_swapchain_texture(&mut self.backend, cmd, self.window, &frame_scope) {
            Ok(Some(swapchain_texture)) => swapchain_texture,
            Ok(None) => {
                self.stats.canceled += 1;
                return Ok(FrameOutcome::SwapchainNotReady);
            }
            Err(e) => {
                self.stats.canceled += 1;
                return Err(e);
            }
        };

        let FColor { r, g, b, a } = self.clear_color;
        let degraded = match make_color_target(&frame_scope, swapchain_texture.texture, r, g, b, a) {
            Ok(color_target) => !self.record_clear_pass(cmd, std::slice::from_ref(color_target)),
            Err(e) => {
                log::error!(target: "render", "failed to build color target: {}", e);
                true
            }
        };
        if degraded {
            self.stats.degraded_passes += 1;
        }

        // 即使 pass 失败也要提交，命令缓冲不能悬空
        if !self.backend.submit_command_buffer(cmd) {
            let backend_error = self.backend.last_error();
            log::error!(target: "render", "submit command buffer failed: {}", backend_error);
            return Err(FrameError::Submit { backend_error });
        }
        self.stats.submitted += 1;

        Ok(FrameOutcome::Submitted { degraded })
    }

    /// 录制一个只做清屏的 pass，返回是否成功
    fn record_clear_pass(&mut self, cmd: CommandBufferHandle, color_targets: &[ColorTargetInfo]) -> bool {
        match self.backend.begin_render_pass(cmd, color_targets) {
            Some(pass) => {
                self.backend.end_render_pass(pass);
                true
            }
            None => {
                log::error!(target: "render", "begin render pass failed: {}", self.backend.last_error());
                false
            }
        }
    }
}
