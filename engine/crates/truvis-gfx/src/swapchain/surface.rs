use ash::vk;

use crate::error::{GfxResult, VkResultExt};
use crate::foundation::debug_messenger::DebugType;
use crate::gfx_core::GfxCore;

pub struct GfxSurface {
    pub(crate) handle: vk::SurfaceKHR,
    pub(crate) pf: ash::khr::surface::Instance,
    pdevice: vk::PhysicalDevice,
}

// new & init
impl GfxSurface {
    pub fn new(
        gfx_core: &GfxCore,
        raw_display_handle: raw_window_handle::RawDisplayHandle,
        raw_window_handle: raw_window_handle::RawWindowHandle,
    ) -> GfxResult<Self> {
        let surface_pf = ash::khr::surface::Instance::new(&gfx_core.vk_entry, gfx_core.instance.ash_instance());

        let surface = unsafe {
            ash_window::create_surface(
                &gfx_core.vk_entry,
                gfx_core.instance.ash_instance(),
                raw_display_handle,
                raw_window_handle,
                None,
            )
        }
        .op("vkCreateSurfaceKHR")?;

        let surface = GfxSurface {
            handle: surface,
            pf: surface_pf,
            pdevice: gfx_core.physical_device.vk_handle,
        };
        gfx_core.gfx_device.set_debug_name(&surface, "main");

        Ok(surface)
    }
}

// getters
impl GfxSurface {
    /// 实时获取，窗口尺寸变化后 current_extent 也会变化
    pub fn capabilities(&self) -> GfxResult<vk::SurfaceCapabilitiesKHR> {
        unsafe { self.pf.get_physical_device_surface_capabilities(self.pdevice, self.handle) }
            .op("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")
    }

    pub fn present_supported(&self, queue_family_index: u32) -> GfxResult<bool> {
        unsafe { self.pf.get_physical_device_surface_support(self.pdevice, queue_family_index, self.handle) }
            .op("vkGetPhysicalDeviceSurfaceSupportKHR")
    }

    pub fn formats(&self) -> GfxResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe { self.pf.get_physical_device_surface_formats(self.pdevice, self.handle) }
            .op("vkGetPhysicalDeviceSurfaceFormatsKHR")
    }

    pub fn present_modes(&self) -> GfxResult<Vec<vk::PresentModeKHR>> {
        unsafe { self.pf.get_physical_device_surface_present_modes(self.pdevice, self.handle) }
            .op("vkGetPhysicalDeviceSurfacePresentModesKHR")
    }
}

// destroy
impl GfxSurface {
    /// 需要在 swapchain 销毁之后调用
    pub fn destroy(self) {
        unsafe { self.pf.destroy_surface(self.handle, None) }
    }
}

impl DebugType for GfxSurface {
    fn debug_type_name() -> &'static str {
        "GfxSurface"
    }
    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
