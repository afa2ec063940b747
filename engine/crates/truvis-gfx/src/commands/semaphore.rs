use ash::vk;

use crate::error::{GfxResult, VkResultExt};
use crate::foundation::{debug_messenger::DebugType, device::GfxDevice};

/// binary semaphore，用于 acquire / submit / present 之间的 GPU 同步
///
/// # Destroy
/// 不应该实现 Drop，因为可以 Clone，需要手动 destroy
#[derive(Clone)]
pub struct GfxSemaphore {
    semaphore: vk::Semaphore,
}

// new & init
impl GfxSemaphore {
    pub fn new(gfx_device: &GfxDevice, debug_name: &str) -> GfxResult<Self> {
        let semaphore = unsafe { gfx_device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }
            .op("vkCreateSemaphore")?;

        let semaphore = Self { semaphore };
        gfx_device.set_debug_name(&semaphore, debug_name);
        Ok(semaphore)
    }
}

// getters
impl GfxSemaphore {
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

// destroy
impl GfxSemaphore {
    #[inline]
    pub fn destroy(self, gfx_device: &GfxDevice) {
        unsafe {
            gfx_device.destroy_semaphore(self.semaphore, None);
        }
    }
}

impl DebugType for GfxSemaphore {
    fn debug_type_name() -> &'static str {
        "GfxSemaphore"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.semaphore
    }
}
