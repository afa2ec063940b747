//! 基于 ash 的 [`GpuBackend`] 实现
//!
//! - 每个 in-flight 帧一个 [`FrameSlot`]：command pool、command buffer、fence 以及 image-available semaphore
//! - 同一时刻最多只有一个正在录制的命令缓冲
//! - 只支持一个窗口
//! - 纹理句柄编码了 swapchain 的 generation 和图像下标，swapchain 重建后旧句柄失效

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};

use truvis_scope::OutSlot;

use crate::backend::{
    ColorTargetInfo, CommandBufferHandle, GpuBackend, LoadOp, RenderPassHandle, StoreOp, TextureHandle, WindowHandle,
};
use crate::basic::color::LabelColor;
use crate::commands::{
    barrier::GfxImageBarrier, command_buffer::GfxCommandBuffer, command_pool::GfxCommandPool, fence::GfxFence,
    semaphore::GfxSemaphore, submit_info::GfxSubmitInfo,
};
use crate::error::{GfxError, GfxResult, VkResultExt};
use crate::gfx_core::GfxCore;
use crate::settings::GfxSettings;
use crate::swapchain::render_swapchain::{GfxRenderSwapchain, GfxSwapchainAcquire};
use crate::swapchain::surface::GfxSurface;

/// 一个 in-flight 帧所需的资源
struct FrameSlot {
    command_pool: GfxCommandPool,
    command_buffer: GfxCommandBuffer,
    /// submit 完成后 signal，初始为 signaled
    in_flight_fence: GfxFence,
    image_available: GfxSemaphore,
}
impl FrameSlot {
    fn new(gfx_core: &GfxCore, idx: usize) -> GfxResult<Self> {
        let gfx_device = gfx_core.gfx_device();
        let command_pool = GfxCommandPool::new(
            gfx_device,
            gfx_core.physical_device().gfx_queue_family(),
            vk::CommandPoolCreateFlags::TRANSIENT,
            &format!("frame-{}", idx),
        )?;

        let others = (|| -> GfxResult<(GfxCommandBuffer, GfxFence, GfxSemaphore)> {
            let command_buffer = GfxCommandBuffer::new(gfx_device, &command_pool, &format!("frame-{}", idx))?;
            let in_flight_fence = GfxFence::new(gfx_device, true, &format!("frame-{}-in-flight", idx))?;
            let image_available = match GfxSemaphore::new(gfx_device, &format!("frame-{}-image-available", idx)) {
                Ok(semaphore) => semaphore,
                Err(e) => {
                    in_flight_fence.destroy(gfx_device);
                    return Err(e);
                }
            };
            Ok((command_buffer, in_flight_fence, image_available))
        })();

        match others {
            Ok((command_buffer, in_flight_fence, image_available)) => Ok(Self {
                command_pool,
                command_buffer,
                in_flight_fence,
                image_available,
            }),
            Err(e) => {
                command_pool.destroy(gfx_device);
                Err(e)
            }
        }
    }

    fn destroy(self, gfx_core: &GfxCore) {
        let gfx_device = gfx_core.gfx_device();
        self.image_available.destroy(gfx_device);
        self.in_flight_fence.destroy(gfx_device);
        // command buffer 随 pool 一起释放
        self.command_pool.destroy(gfx_device);
    }
}

struct ClaimedWindow {
    handle: WindowHandle,
    swapchain: GfxRenderSwapchain,
    /// 仅在 surface 不报告 current_extent 时（如 Wayland）作为 swapchain 尺寸
    physical_extent: vk::Extent2D,
    need_rebuild: bool,
}

/// 本帧获取到的 swapchain 图像
#[derive(Debug, Clone, Copy)]
struct AcquiredImage {
    texture: TextureHandle,
    image_index: u32,
    layout: vk::ImageLayout,
}

/// 正在录制的命令缓冲
struct ActiveCommand {
    handle: CommandBufferHandle,
    slot: usize,
    acquired: Option<AcquiredImage>,
    active_pass: Option<RenderPassHandle>,
}

pub struct VulkanBackend {
    gfx_core: GfxCore,
    present_mode: vk::PresentModeKHR,

    frames: Vec<FrameSlot>,
    frame_index: usize,

    window: Option<ClaimedWindow>,
    active: Option<ActiveCommand>,

    next_command_serial: u64,
    next_pass_serial: u64,

    last_error: String,
}

// new & init
impl VulkanBackend {
    pub fn new(settings: &GfxSettings, display_handle: RawDisplayHandle) -> GfxResult<Self> {
        let _span = tracy_client::span!("VulkanBackend::new");

        let surface_exts = ash_window::enumerate_required_extensions(display_handle)
            .op("vkEnumerateRequiredSurfaceExtensions")?;
        let gfx_core = GfxCore::new(&settings.app_name, surface_exts, settings.validation)?;

        let frames_in_flight = settings.clamped_frames_in_flight();
        let mut frames = Vec::with_capacity(frames_in_flight);
        for idx in 0..frames_in_flight {
            match FrameSlot::new(&gfx_core, idx) {
                Ok(frame) => frames.push(frame),
                Err(e) => {
                    frames.into_iter().for_each(|frame| frame.destroy(&gfx_core));
                    gfx_core.destroy();
                    return Err(e);
                }
            }
        }
        log::info!(target: "gpu", "vulkan backend created, frames in flight: {}", frames_in_flight);

        Ok(Self {
            gfx_core,
            present_mode: settings.present_mode.vk_present_mode(),
            frames,
            frame_index: 0,
            window: None,
            active: None,
            next_command_serial: 0,
            next_pass_serial: 0,
            last_error: String::new(),
        })
    }

    /// 让 GPU device 认领窗口，创建 surface 以及 swapchain
    ///
    /// # param
    /// * physical_size - 窗口的物理像素尺寸
    pub fn claim_window<W>(&mut self, window: &W, physical_size: [u32; 2]) -> GfxResult<WindowHandle>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        if self.window.is_some() {
            return Err(GfxError::WindowAlreadyClaimed);
        }

        let surface =
            GfxSurface::new(&self.gfx_core, window.display_handle()?.as_raw(), window.window_handle()?.as_raw())?;

        let queue_family_index = self.gfx_core.gfx_queue().queue_family().queue_family_index;
        match surface.present_supported(queue_family_index) {
            Ok(true) => {}
            Ok(false) => {
                surface.destroy();
                return Err(GfxError::PresentNotSupported);
            }
            Err(e) => {
                surface.destroy();
                return Err(e);
            }
        }

        let physical_extent = vk::Extent2D {
            width: physical_size[0],
            height: physical_size[1],
        };
        let swapchain =
            GfxRenderSwapchain::new(self.gfx_core.gfx_device().clone(), surface, self.present_mode, physical_extent)?;

        let handle = WindowHandle(1);
        log::info!(
            target: "gpu",
            "claimed window {:?}: {} swapchain images, extent {}x{}",
            handle,
            swapchain.image_count(),
            swapchain.extent().width,
            swapchain.extent().height
        );
        self.window = Some(ClaimedWindow {
            handle,
            swapchain,
            physical_extent,
            need_rebuild: false,
        });
        Ok(handle)
    }
}

// tools
impl VulkanBackend {
    #[inline]
    fn fail(&mut self, msg: impl Into<String>) {
        self.last_error = msg.into();
        log::debug!(target: "gpu", "backend call failed: {}", self.last_error);
    }

    /// 校验 cmd 是否是当前正在录制的命令缓冲
    fn check_active(&mut self, cmd: CommandBufferHandle) -> bool {
        match &self.active {
            Some(active) if active.handle == cmd => true,
            Some(active) => {
                let msg = format!("command buffer {:?} is not the recording one ({:?})", cmd, active.handle);
                self.fail(msg);
                false
            }
            None => {
                self.fail(format!("command buffer {:?} is not recording", cmd));
                false
            }
        }
    }

    /// 结束仍处于开启状态的 render pass
    fn close_open_pass(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if let Some(pass) = active.active_pass.take() {
            log::warn!(target: "gpu", "render pass {:?} is still open, ending it", pass);
            let frame = &self.frames[active.slot];
            let gfx_device = self.gfx_core.gfx_device();
            frame.command_buffer.cmd_end_rendering(gfx_device);
            frame.command_buffer.end_label(gfx_device);
        }
    }

    fn acquire_command_buffer_impl(&mut self) -> GfxResult<Option<CommandBufferHandle>> {
        if self.active.is_some() {
            self.fail("the previous command buffer is neither submitted nor canceled");
            return Ok(None);
        }

        let gfx_device = self.gfx_core.gfx_device();
        let frame = &self.frames[self.frame_index];
        frame.in_flight_fence.wait(gfx_device)?;
        frame.command_pool.reset_all_buffers(gfx_device)?;
        frame.command_buffer.begin(gfx_device, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, "frame")?;

        self.next_command_serial += 1;
        let Some(handle) = CommandBufferHandle::from_raw(self.next_command_serial) else {
            return Ok(None);
        };
        self.active = Some(ActiveCommand {
            handle,
            slot: self.frame_index,
            acquired: None,
            active_pass: None,
        });
        Ok(Some(handle))
    }

    /// return: 获取到的图像，None 表示 swapchain 尚未就绪
    fn acquire_swapchain_image_impl(&mut self, window: WindowHandle) -> Result<Option<AcquiredImage>, String> {
        let slot = match &self.active {
            Some(active) if active.acquired.is_some() => {
                return Err("a swapchain texture was already acquired by this command buffer".to_string());
            }
            Some(active) => active.slot,
            None => return Err("no command buffer is recording".to_string()),
        };

        let Some(claimed) = self.window.as_mut().filter(|claimed| claimed.handle == window) else {
            return Err(format!("window {:?} is not claimed by this backend", window));
        };

        if claimed.need_rebuild || !claimed.swapchain.is_ready() {
            // 旧图像可能仍在被 GPU 使用，只有一个 queue，等它空闲即可
            self.gfx_core.gfx_queue().wait_idle().map_err(|e| e.to_string())?;
            let ready = claimed.swapchain.rebuild(claimed.physical_extent).map_err(|e| e.to_string())?;
            claimed.need_rebuild = false;
            if !ready {
                return Ok(None);
            }
        }

        let image_available = &self.frames[slot].image_available;
        match claimed.swapchain.acquire_next_image(image_available, u64::MAX).map_err(|e| e.to_string())? {
            GfxSwapchainAcquire::OutOfDate => {
                claimed.need_rebuild = true;
                Ok(None)
            }
            GfxSwapchainAcquire::Acquired {
                image_index,
                suboptimal,
            } => {
                // 本帧仍然可以使用，下一帧再重建
                claimed.need_rebuild |= suboptimal;
                Ok(Some(AcquiredImage {
                    texture: encode_texture(claimed.swapchain.generation(), image_index),
                    image_index,
                    layout: vk::ImageLayout::UNDEFINED,
                }))
            }
        }
    }

    fn begin_render_pass_impl(&mut self, color_targets: &[ColorTargetInfo]) -> Result<RenderPassHandle, String> {
        let Some(active) = self.active.as_ref() else {
            return Err("no command buffer is recording".to_string());
        };
        if let Some(pass) = active.active_pass {
            return Err(format!("render pass {:?} is still open", pass));
        }
        let [target] = color_targets else {
            return Err(format!("expected exactly one color target, got {}", color_targets.len()));
        };
        let Some(acquired) = active.acquired.filter(|acquired| acquired.texture == target.texture) else {
            return Err(format!("texture {:#x} is not the swapchain texture of this frame", target.texture.raw()));
        };
        let Some(claimed) = self.window.as_ref() else {
            return Err("no window is claimed".to_string());
        };
        if decode_texture(target.texture).map(|(generation, _)| generation)
            != Some(claimed.swapchain.generation() & TEXTURE_GENERATION_MASK)
        {
            return Err("the swapchain was rebuilt after the texture was acquired".to_string());
        }

        let gfx_device = self.gfx_core.gfx_device();
        let command_buffer = &self.frames[active.slot].command_buffer;
        let image = claimed.swapchain.image(acquired.image_index);
        let extent = claimed.swapchain.extent();

        if acquired.layout != vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL {
            command_buffer.image_memory_barrier(
                gfx_device,
                vk::DependencyFlags::empty(),
                &[GfxImageBarrier::present_to_color_attachment(image)],
            );
        }

        let color_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(claimed.swapchain.image_view(acquired.image_index))
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk_load_op(target.load_op))
            .store_op(vk_store_op(target.store_op))
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: target.clear_color.to_array(),
                },
            });
        let rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent,
            })
            .layer_count(1)
            .color_attachments(std::slice::from_ref(&color_attachment));

        command_buffer.begin_label(gfx_device, "render-pass", LabelColor::COLOR_PASS);
        command_buffer.cmd_begin_rendering(gfx_device, &rendering_info);

        self.next_pass_serial += 1;
        let pass = RenderPassHandle::from_raw(self.next_pass_serial).ok_or("render pass serial overflow")?;
        if let Some(active) = self.active.as_mut() {
            active.active_pass = Some(pass);
            if let Some(acquired) = active.acquired.as_mut() {
                acquired.layout = vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL;
            }
        }
        Ok(pass)
    }

    fn submit_impl(&mut self, active: ActiveCommand) -> GfxResult<()> {
        let gfx_device = self.gfx_core.gfx_device();
        let frame = &self.frames[active.slot];
        let command_buffer = &frame.command_buffer;

        let mut submit_info = GfxSubmitInfo::new(std::slice::from_ref(command_buffer));
        let mut present = None;
        if let (Some(acquired), Some(claimed)) = (active.acquired, self.window.as_ref()) {
            let image = claimed.swapchain.image(acquired.image_index);
            command_buffer.image_memory_barrier(
                gfx_device,
                vk::DependencyFlags::empty(),
                &[GfxImageBarrier::to_present(image, acquired.layout)],
            );
            submit_info = submit_info
                .wait(&frame.image_available, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
                .signal(
                    claimed.swapchain.render_complete_semaphore(acquired.image_index),
                    vk::PipelineStageFlags2::ALL_COMMANDS,
                );
            present = Some(acquired.image_index);
        }

        command_buffer.end(gfx_device)?;
        frame.in_flight_fence.reset(gfx_device)?;
        self.gfx_core.gfx_queue().submit(std::slice::from_ref(&submit_info), Some(&frame.in_flight_fence))?;

        if let (Some(image_index), Some(claimed)) = (present, self.window.as_mut()) {
            // out of date 不是错误，下一帧重建即可
            let need_rebuild = claimed.swapchain.present_image(self.gfx_core.gfx_queue(), image_index)?;
            claimed.need_rebuild |= need_rebuild;
        }

        if let Some(client) = tracy_client::Client::running() {
            client.frame_mark();
        }
        Ok(())
    }
}

impl GpuBackend for VulkanBackend {
    fn acquire_command_buffer(&mut self) -> Option<CommandBufferHandle> {
        match self.acquire_command_buffer_impl() {
            Ok(cmd) => cmd,
            Err(e) => {
                // 返回 None 时上层只会静默跳过这一帧，错误需要在这里报告
                let msg = acquire_failure_message(&e);
                log::error!(target: "gpu", "{}", msg);
                self.last_error = msg;
                None
            }
        }
    }

    fn wait_and_acquire_swapchain_texture(
        &mut self,
        cmd: CommandBufferHandle,
        window: WindowHandle,
        texture_out: &mut OutSlot<'_, usize>,
        width_out: &mut OutSlot<'_, u32>,
        height_out: &mut OutSlot<'_, u32>,
    ) -> bool {
        if !self.check_active(cmd) {
            return false;
        }

        match self.acquire_swapchain_image_impl(window) {
            Ok(None) => {
                texture_out.write(TextureHandle::NULL.raw());
                true
            }
            Ok(Some(acquired)) => {
                let extent = self.window.as_ref().map(|claimed| claimed.swapchain.extent()).unwrap_or_default();
                texture_out.write(acquired.texture.raw());
                width_out.write(extent.width);
                height_out.write(extent.height);
                if let Some(active) = self.active.as_mut() {
                    active.acquired = Some(acquired);
                }
                true
            }
            Err(msg) => {
                self.fail(msg);
                false
            }
        }
    }

    fn begin_render_pass(
        &mut self,
        cmd: CommandBufferHandle,
        color_targets: &[ColorTargetInfo],
    ) -> Option<RenderPassHandle> {
        if !self.check_active(cmd) {
            return None;
        }
        match self.begin_render_pass_impl(color_targets) {
            Ok(pass) => Some(pass),
            Err(msg) => {
                self.fail(msg);
                None
            }
        }
    }

    fn end_render_pass(&mut self, pass: RenderPassHandle) {
        let Some(active) = self.active.as_mut() else {
            self.fail(format!("render pass {:?} ended without a recording command buffer", pass));
            return;
        };
        if active.active_pass != Some(pass) {
            let msg = format!("render pass {:?} is not open", pass);
            self.fail(msg);
            return;
        }

        active.active_pass = None;
        let frame = &self.frames[active.slot];
        let gfx_device = self.gfx_core.gfx_device();
        frame.command_buffer.cmd_end_rendering(gfx_device);
        frame.command_buffer.end_label(gfx_device);
    }

    fn submit_command_buffer(&mut self, cmd: CommandBufferHandle) -> bool {
        if !self.check_active(cmd) {
            return false;
        }
        self.close_open_pass();

        // 无论成功与否，命令缓冲都进入终止状态
        let Some(active) = self.active.take() else {
            return false;
        };
        let slot = active.slot;
        match self.submit_impl(active) {
            Ok(()) => {
                self.frame_index = (slot + 1) % self.frames.len();
                true
            }
            Err(e) => {
                self.fail(e.to_string());
                false
            }
        }
    }

    fn cancel_command_buffer(&mut self, cmd: CommandBufferHandle) -> bool {
        if !self.check_active(cmd) {
            return false;
        }
        if self.active.as_ref().is_some_and(|active| active.acquired.is_some()) {
            self.fail("cannot cancel a command buffer after a swapchain texture was acquired");
            return false;
        }
        self.close_open_pass();

        let Some(active) = self.active.take() else {
            return false;
        };
        // 录制的命令直接丢弃，下一次 acquire 时 reset pool
        let frame = &self.frames[active.slot];
        if let Err(e) = frame.command_buffer.end(self.gfx_core.gfx_device()) {
            self.fail(e.to_string());
            return false;
        }
        true
    }

    fn last_error(&self) -> String {
        self.last_error.clone()
    }
}

// destroy
impl VulkanBackend {
    pub fn destroy(self) {
        let _span = tracy_client::span!("VulkanBackend::destroy");

        if let Err(e) = self.gfx_core.gfx_device().wait_idle() {
            log::error!(target: "gpu", "failed to wait device idle before destroy: {}", e);
        }

        let Self {
            gfx_core,
            frames,
            window,
            ..
        } = self;

        if let Some(claimed) = window {
            claimed.swapchain.destroy();
        }
        frames.into_iter().for_each(|frame| frame.destroy(&gfx_core));
        gfx_core.destroy();
        log::info!(target: "gpu", "vulkan backend destroyed");
    }
}

/// 纹理句柄中 generation 所占的位
const TEXTURE_GENERATION_MASK: u32 = 0x00FF_FFFF;

/// 纹理句柄：高位为 swapchain generation，低 8 位为图像下标 + 1，保证非 0
#[inline]
fn encode_texture(generation: u32, image_index: u32) -> TextureHandle {
    debug_assert!(image_index < 0xFF);
    TextureHandle::from_raw((((generation & TEXTURE_GENERATION_MASK) as usize) << 8) | (image_index as usize + 1))
}

/// return: (generation, image index)
#[inline]
fn decode_texture(texture: TextureHandle) -> Option<(u32, u32)> {
    let raw = texture.raw();
    let index_plus_one = (raw & 0xFF) as u32;
    if index_plus_one == 0 {
        return None;
    }
    Some(((raw >> 8) as u32 & TEXTURE_GENERATION_MASK, index_plus_one - 1))
}

fn acquire_failure_message(e: &GfxError) -> String {
    if e.is_device_lost() {
        format!("device lost while acquiring a command buffer, every later frame will be skipped: {}", e)
    } else {
        format!("acquire command buffer failed: {}", e)
    }
}

#[inline]
fn vk_load_op(load_op: LoadOp) -> vk::AttachmentLoadOp {
    match load_op {
        LoadOp::Load => vk::AttachmentLoadOp::LOAD,
        LoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
        LoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
    }
}

#[inline]
fn vk_store_op(store_op: StoreOp) -> vk::AttachmentStoreOp {
    match store_op {
        StoreOp::Store => vk::AttachmentStoreOp::STORE,
        StoreOp::DontCare => vk::AttachmentStoreOp::DONT_CARE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_handles_are_never_null() {
        assert!(!encode_texture(0, 0).is_null());
        assert_eq!(decode_texture(encode_texture(7, 2)), Some((7, 2)));
        assert_eq!(decode_texture(TextureHandle::NULL), None);
    }

    #[test]
    fn rebuilt_swapchain_changes_the_texture_handle() {
        assert_ne!(encode_texture(1, 0), encode_texture(2, 0));
        // generation 回绕后仍可解码
        let wrapped = encode_texture(TEXTURE_GENERATION_MASK + 2, 1);
        assert_eq!(decode_texture(wrapped), Some((1, 1)));
    }

    #[test]
    fn acquire_failure_names_device_loss() {
        let lost = GfxError::Vulkan {
            op: "vkWaitForFences",
            result: vk::Result::ERROR_DEVICE_LOST,
        };
        let msg = acquire_failure_message(&lost);
        assert!(msg.starts_with("device lost while acquiring a command buffer"));
        assert!(msg.ends_with("vkWaitForFences failed: ERROR_DEVICE_LOST"));

        let oom = GfxError::Vulkan {
            op: "vkResetCommandPool",
            result: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
        };
        assert_eq!(
            acquire_failure_message(&oom),
            "acquire command buffer failed: vkResetCommandPool failed: ERROR_OUT_OF_DEVICE_MEMORY"
        );
    }

    #[test]
    fn attachment_ops_map_to_vulkan() {
        assert_eq!(vk_load_op(LoadOp::Clear), vk::AttachmentLoadOp::CLEAR);
        assert_eq!(vk_load_op(LoadOp::Load), vk::AttachmentLoadOp::LOAD);
        assert_eq!(vk_load_op(LoadOp::DontCare), vk::AttachmentLoadOp::DONT_CARE);
        assert_eq!(vk_store_op(StoreOp::Store), vk::AttachmentStoreOp::STORE);
        assert_eq!(vk_store_op(StoreOp::DontCare), vk::AttachmentStoreOp::DONT_CARE);
    }
}
