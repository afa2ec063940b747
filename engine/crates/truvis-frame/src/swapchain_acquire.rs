use truvis_gfx::backend::{CommandBufferHandle, GpuBackend, TextureHandle, WindowHandle};
use truvis_scope::{Scope, out_pointer_slot, out_u32_slot, read_pointer, read_u32};

use crate::error::FrameError;

/// 本帧可以渲染的 swapchain 纹理，texture 一定非空
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainTexture {
    pub texture: TextureHandle,
    pub width: u32,
    pub height: u32,
}

/// 阻塞等待并获取窗口的 swapchain 纹理
///
/// 三种结果：
/// - `Ok(Some(_))`：拿到纹理，cmd 仍在录制，由调用者继续提交
/// - `Ok(None)`：窗口最小化或被遮挡，cmd 已被取消，本帧跳过
/// - `Err(SwapchainAcquire)`：backend 调用失败，cmd 已被取消，错误不可恢复
///
/// 输出槽位都分配在 frame_scope 中，随帧作用域一起释放。
pub fn acquire_swapchain_texture<B: GpuBackend + ?Sized>(
    backend: &mut B,
    cmd: CommandBufferHandle,
    window: WindowHandle,
    frame_scope: &Scope<'_>,
) -> Result<Option<SwapchainTexture>, FrameError> {
    let slots = out_pointer_slot(frame_scope)
        .and_then(|texture| Ok((texture, out_u32_slot(frame_scope)?, out_u32_slot(frame_scope)?)));
    let (mut texture_out, mut width_out, mut height_out) = match slots {
        Ok(slots) => slots,
        Err(e) => {
            cancel(backend, cmd);
            return Err(e.into());
        }
    };

    if !backend.wait_and_acquire_swapchain_texture(cmd, window, &mut texture_out, &mut width_out, &mut height_out) {
        let backend_error = backend.last_error();
        log::error!(target: "render", "wait and acquire swapchain texture failed: {}", backend_error);
        cancel(backend, cmd);
        return Err(FrameError::SwapchainAcquire { backend_error });
    }

    let texture = TextureHandle::from_raw(read_pointer(&texture_out));
    if texture.is_null() {
        log::trace!(target: "render", "swapchain texture not ready (window minimized or occluded), skipping frame");
        cancel(backend, cmd);
        return Ok(None);
    }

    let (width, height) = (read_u32(&width_out), read_u32(&height_out));
    log::debug!(target: "render", "acquired swapchain texture {}x{}", width, height);

    Ok(Some(SwapchainTexture { texture, width, height }))
}

fn cancel<B: GpuBackend + ?Sized>(backend: &mut B, cmd: CommandBufferHandle) {
    if !backend.cancel_command_buffer(cmd) {
        log::warn!(target: "render", "cancel command buffer {:?} failed: {}", cmd, backend.last_error());
    }
}
