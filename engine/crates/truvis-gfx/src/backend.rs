use std::num::NonZeroU64;

use truvis_scope::OutSlot;

/// 命令缓冲句柄
///
/// 由 [`GpuBackend::acquire_command_buffer`] 返回，每一帧最多只有一个存活。
/// 最终必须进入 submitted 或 canceled 中的一个终止状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandBufferHandle(NonZeroU64);
impl CommandBufferHandle {
    /// raw 为 0 时表示空句柄
    #[inline]
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderPassHandle(NonZeroU64);
impl RenderPassHandle {
    #[inline]
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0.get()
    }
}

/// 被 GPU device 认领的窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub u32);

/// 不透明的纹理句柄，指针宽度
///
/// 0 是空句柄：swapchain 尚未就绪（窗口最小化或被遮挡）时 backend 会写出空句柄。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextureHandle(usize);
impl TextureHandle {
    pub const NULL: Self = Self(0);

    #[inline]
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> usize {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// render pass 开始时如何处理 target 原有的内容
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadOp {
    #[default]
    Load,
    Clear,
    DontCare,
}

/// render pass 结束时是否写回 target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreOp {
    #[default]
    Store,
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}
impl FColor {
    #[inline]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    #[inline]
    pub const fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}
impl From<[f32; 4]> for FColor {
    fn from(value: [f32; 4]) -> Self {
        Self::new(value[0], value[1], value[2], value[3])
    }
}

/// 一个 color target 的描述：绘制到哪张纹理，以及 load/store 策略和 clear 颜色
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ColorTargetInfo {
    pub texture: TextureHandle,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear_color: FColor,
}

/// 帧循环所依赖的 GPU backend 契约
///
/// 所有可失败的操作都以 `bool` / `Option` 表示成败，失败原因通过 [`GpuBackend::last_error`] 读取。
/// 句柄和尺寸通过调用方提供的 [`OutSlot`] 返回。
///
/// 所有操作都在同一个线程上同步执行。
pub trait GpuBackend {
    /// 获取本帧的命令缓冲
    ///
    /// backend 内部资源紧张时返回 `None`，这不是错误，调用方跳过这一帧即可。
    fn acquire_command_buffer(&mut self) -> Option<CommandBufferHandle>;

    /// 阻塞等待，直到 swapchain 中有可用的图像
    ///
    /// - 返回 `false`：硬错误（设备丢失或者使用错误）
    /// - 返回 `true` 且 `texture_out` 为空句柄：窗口最小化或 swapchain 尚未就绪
    /// - 返回 `true` 且 `texture_out` 非空：纹理句柄以及宽高已经写入槽位
    ///
    /// 纹理只在 `cmd` 进入终止状态之前有效。
    fn wait_and_acquire_swapchain_texture(
        &mut self,
        cmd: CommandBufferHandle,
        window: WindowHandle,
        texture_out: &mut OutSlot<'_, usize>,
        width_out: &mut OutSlot<'_, u32>,
        height_out: &mut OutSlot<'_, u32>,
    ) -> bool;

    /// 开始一个 render pass，失败时返回 `None`
    fn begin_render_pass(
        &mut self,
        cmd: CommandBufferHandle,
        color_targets: &[ColorTargetInfo],
    ) -> Option<RenderPassHandle>;

    fn end_render_pass(&mut self, pass: RenderPassHandle);

    /// 提交命令缓冲，并将获取到的 swapchain 图像送去显示
    fn submit_command_buffer(&mut self, cmd: CommandBufferHandle) -> bool;

    /// 取消命令缓冲，其中录制的命令全部丢弃
    fn cancel_command_buffer(&mut self, cmd: CommandBufferHandle) -> bool;

    /// 最近一次失败的描述
    fn last_error(&self) -> String;
}
