use ash::vk;

use crate::error::{GfxResult, VkResultExt};
use crate::foundation::{debug_messenger::DebugType, device::GfxDevice, physical_device::GfxQueueFamily};

/// command pool 是和 queue family 绑定的，而不是和 queue 绑定的
pub struct GfxCommandPool {
    handle: vk::CommandPool,

    debug_name: String,
    valid: bool,
}
// new & init
impl GfxCommandPool {
    pub fn new(
        gfx_device: &GfxDevice,
        queue_family: &GfxQueueFamily,
        flags: vk::CommandPoolCreateFlags,
        debug_name: &str,
    ) -> GfxResult<Self> {
        let pool = unsafe {
            gfx_device.create_command_pool(
                &vk::CommandPoolCreateInfo::default().queue_family_index(queue_family.queue_family_index).flags(flags),
                None,
            )
        }
        .op("vkCreateCommandPool")?;

        let command_pool = Self {
            handle: pool,
            debug_name: debug_name.to_string(),
            valid: true,
        };
        gfx_device.set_debug_name(&command_pool, debug_name);
        Ok(command_pool)
    }
}

// getters
impl GfxCommandPool {
    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.handle
    }
}

// tools
impl GfxCommandPool {
    /// 这个调用并不会释放资源，而是将 pool 内的 command buffer 设置到初始状态
    ///
    /// reset 之后，pool 内的 command buffer 又可以重新录制命令
    pub fn reset_all_buffers(&self, gfx_device: &GfxDevice) -> GfxResult<()> {
        unsafe { gfx_device.reset_command_pool(self.handle, vk::CommandPoolResetFlags::empty()) }
            .op("vkResetCommandPool")
    }
}

// destroy
impl GfxCommandPool {
    pub fn destroy(mut self, gfx_device: &GfxDevice) {
        unsafe {
            gfx_device.destroy_command_pool(self.handle, None);
        }
        self.valid = false;
    }
}

impl DebugType for GfxCommandPool {
    fn debug_type_name() -> &'static str {
        "GfxCommandPool"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

impl Drop for GfxCommandPool {
    fn drop(&mut self) {
        debug_assert!(!self.valid || std::thread::panicking(), "CommandPool must be destroyed manually.");
        log::debug!(target: "gpu", "dropping command pool: {}", self.debug_name);
    }
}
