use ash::vk;

use crate::error::{GfxResult, VkResultExt};
use crate::foundation::{debug_messenger::DebugType, device::GfxDevice};

/// # Destroy
/// 不应该实现 Drop，因为可以 Clone，需要手动 destroy
#[derive(Clone)]
pub struct GfxFence {
    fence: vk::Fence,
}

impl DebugType for GfxFence {
    fn debug_type_name() -> &'static str {
        "GfxFence"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.fence
    }
}

// new & init
impl GfxFence {
    /// # param
    /// * signaled - 是否创建时就 signaled
    pub fn new(gfx_device: &GfxDevice, signaled: bool, debug_name: &str) -> GfxResult<Self> {
        let fence_flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let fence = unsafe { gfx_device.create_fence(&vk::FenceCreateInfo::default().flags(fence_flags), None) }
            .op("vkCreateFence")?;

        let fence = Self { fence };
        gfx_device.set_debug_name(&fence, debug_name);
        Ok(fence)
    }
}

// getters
impl GfxFence {
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

// tools
impl GfxFence {
    /// 阻塞等待 fence
    #[inline]
    pub fn wait(&self, gfx_device: &GfxDevice) -> GfxResult<()> {
        unsafe { gfx_device.wait_for_fences(std::slice::from_ref(&self.fence), true, u64::MAX) }.op("vkWaitForFences")
    }

    #[inline]
    pub fn reset(&self, gfx_device: &GfxDevice) -> GfxResult<()> {
        unsafe { gfx_device.reset_fences(std::slice::from_ref(&self.fence)) }.op("vkResetFences")
    }
}

// destroy
impl GfxFence {
    #[inline]
    pub fn destroy(self, gfx_device: &GfxDevice) {
        unsafe {
            gfx_device.destroy_fence(self.fence, None);
        }
    }
}
