//! 测试工具
//!
//! - [`ScriptedBackend`]：按脚本返回结果的 [`GpuBackend`]，记录每一次调用
//! - [`ScriptedEvents`]：按脚本决定是否继续循环的 [`EventSource`]

use std::collections::{HashSet, VecDeque};

use truvis_frame::EventSource;
use truvis_gfx::backend::{
    ColorTargetInfo, CommandBufferHandle, GpuBackend, RenderPassHandle, TextureHandle, WindowHandle,
};
use truvis_scope::OutSlot;

/// 测试中打开日志，重复调用无副作用
pub fn init_test_log() {
    let _ = env_logger::builder().is_test(true).filter_level(log::LevelFilter::Trace).try_init();
}

/// wait_and_acquire_swapchain_texture 的脚本化结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireResponse {
    Texture { texture: usize, width: u32, height: u32 },
    /// 调用成功，但纹理为空（最小化）
    NotReady,
    /// 调用失败，附带 last_error
    Fail(String),
}

impl AcquireResponse {
    pub const DEFAULT_TEXTURE: usize = 0x10;

    pub fn texture(width: u32, height: u32) -> Self {
        AcquireResponse::Texture {
            texture: Self::DEFAULT_TEXTURE,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    AcquireCommandBuffer(Option<CommandBufferHandle>),
    WaitAndAcquire { cmd: CommandBufferHandle, window: WindowHandle },
    BeginRenderPass { cmd: CommandBufferHandle, color_targets: Vec<ColorTargetInfo> },
    EndRenderPass(RenderPassHandle),
    Submit(CommandBufferHandle),
    Cancel(CommandBufferHandle),
}

/// 脚本化的 backend
///
/// 每个脚本队列为空时使用默认行为：总能拿到命令缓冲、纹理为 800x600、pass 和提交都成功。
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    command_buffer_script: VecDeque<bool>,
    acquire_script: VecDeque<AcquireResponse>,
    begin_pass_failures: VecDeque<Option<String>>,
    submit_failures: VecDeque<Option<String>>,

    calls: Vec<BackendCall>,
    /// 已获取但尚未提交或取消的命令缓冲
    open_command_buffers: HashSet<CommandBufferHandle>,
    /// 对已经处于终态（或从未获取）的命令缓冲再次提交或取消
    lifecycle_violations: usize,

    next_handle: u64,
    last_error: String,
}

// new & init
impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 接下来 n 次 acquire_command_buffer 返回 None
    pub fn no_command_buffer_for(mut self, n: usize) -> Self {
        self.command_buffer_script.extend(std::iter::repeat_n(false, n));
        self
    }

    pub fn then_acquire(mut self, response: AcquireResponse) -> Self {
        self.acquire_script.push_back(response);
        self
    }

    /// 接下来 n 次获取纹理都是 NotReady
    pub fn not_ready_for(mut self, n: usize) -> Self {
        self.acquire_script.extend(std::iter::repeat_n(AcquireResponse::NotReady, n));
        self
    }

    /// 第 nth 次（从 0 开始）begin_render_pass 失败
    pub fn fail_begin_pass_at(mut self, nth: usize, error: impl Into<String>) -> Self {
        if self.begin_pass_failures.len() <= nth {
            self.begin_pass_failures.resize(nth + 1, None);
        }
        self.begin_pass_failures[nth] = Some(error.into());
        self
    }

    /// 第 nth 次（从 0 开始）submit 失败
    pub fn fail_submit_at(mut self, nth: usize, error: impl Into<String>) -> Self {
        if self.submit_failures.len() <= nth {
            self.submit_failures.resize(nth + 1, None);
        }
        self.submit_failures[nth] = Some(error.into());
        self
    }
}

// getters
impl ScriptedBackend {
    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    pub fn submitted(&self) -> Vec<CommandBufferHandle> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::Submit(cmd) => Some(*cmd),
                _ => None,
            })
            .collect()
    }

    pub fn canceled(&self) -> Vec<CommandBufferHandle> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::Cancel(cmd) => Some(*cmd),
                _ => None,
            })
            .collect()
    }

    /// 成功获取到的命令缓冲数量
    pub fn acquired_command_buffers(&self) -> usize {
        self.calls.iter().filter(|call| matches!(call, BackendCall::AcquireCommandBuffer(Some(_)))).count()
    }

    pub fn begin_pass_calls(&self) -> Vec<&[ColorTargetInfo]> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::BeginRenderPass { color_targets, .. } => Some(color_targets.as_slice()),
                _ => None,
            })
            .collect()
    }

    pub fn open_command_buffers(&self) -> usize {
        self.open_command_buffers.len()
    }

    pub fn lifecycle_violations(&self) -> usize {
        self.lifecycle_violations
    }
}

// tools
impl ScriptedBackend {
    fn next_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn terminate(&mut self, cmd: CommandBufferHandle) {
        if !self.open_command_buffers.remove(&cmd) {
            log::error!("command buffer {:?} terminated twice or never acquired", cmd);
            self.lifecycle_violations += 1;
        }
    }
}

impl GpuBackend for ScriptedBackend {
    fn acquire_command_buffer(&mut self) -> Option<CommandBufferHandle> {
        let available = self.command_buffer_script.pop_front().unwrap_or(true);
        let cmd = if available {
            let raw = self.next_handle();
            CommandBufferHandle::from_raw(raw)
        } else {
            self.last_error = "no command buffer available".to_string();
            None
        };
        if let Some(cmd) = cmd {
            self.open_command_buffers.insert(cmd);
        }
        self.calls.push(BackendCall::AcquireCommandBuffer(cmd));
        cmd
    }

    fn wait_and_acquire_swapchain_texture(
        &mut self,
        cmd: CommandBufferHandle,
        window: WindowHandle,
        texture_out: &mut OutSlot<'_, usize>,
        width_out: &mut OutSlot<'_, u32>,
        height_out: &mut OutSlot<'_, u32>,
    ) -> bool {
        self.calls.push(BackendCall::WaitAndAcquire { cmd, window });
        match self.acquire_script.pop_front().unwrap_or_else(|| AcquireResponse::texture(800, 600)) {
            AcquireResponse::Texture { texture, width, height } => {
                texture_out.write(texture);
                width_out.write(width);
                height_out.write(height);
                true
            }
            AcquireResponse::NotReady => {
                texture_out.write(TextureHandle::NULL.raw());
                true
            }
            AcquireResponse::Fail(error) => {
                self.last_error = error;
                false
            }
        }
    }

    fn begin_render_pass(
        &mut self,
        cmd: CommandBufferHandle,
        color_targets: &[ColorTargetInfo],
    ) -> Option<RenderPassHandle> {
        self.calls.push(BackendCall::BeginRenderPass {
            cmd,
            color_targets: color_targets.to_vec(),
        });
        if let Some(error) = self.begin_pass_failures.pop_front().flatten() {
            self.last_error = error;
            return None;
        }
        let raw = self.next_handle();
        RenderPassHandle::from_raw(raw)
    }

    fn end_render_pass(&mut self, pass: RenderPassHandle) {
        self.calls.push(BackendCall::EndRenderPass(pass));
    }

    fn submit_command_buffer(&mut self, cmd: CommandBufferHandle) -> bool {
        self.calls.push(BackendCall::Submit(cmd));
        self.terminate(cmd);
        if let Some(error) = self.submit_failures.pop_front().flatten() {
            self.last_error = error;
            return false;
        }
        true
    }

    fn cancel_command_buffer(&mut self, cmd: CommandBufferHandle) -> bool {
        self.calls.push(BackendCall::Cancel(cmd));
        self.terminate(cmd);
        true
    }

    fn last_error(&self) -> String {
        self.last_error.clone()
    }
}

/// 前 n 次返回 true，之后一直返回 false
#[derive(Debug, Clone)]
pub struct ScriptedEvents {
    remaining: usize,
    polls: usize,
}

impl ScriptedEvents {
    pub fn continue_for(frames: usize) -> Self {
        Self {
            remaining: frames,
            polls: 0,
        }
    }

    pub fn polls(&self) -> usize {
        self.polls
    }
}

impl EventSource for ScriptedEvents {
    fn poll_and_should_continue(&mut self) -> bool {
        self.polls += 1;
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}
