use ash::vk;
use itertools::Itertools;

use crate::error::{GfxError, GfxResult, VkResultExt};
use crate::foundation::debug_messenger::DebugType;

#[derive(Clone, Debug)]
pub struct GfxQueueFamily {
    pub name: String,
    pub queue_family_index: u32,
    pub queue_flags: vk::QueueFlags,
    pub queue_count: u32,
}

/// 表示一张物理显卡
pub struct GfxPhysicalDevice {
    pub(crate) vk_handle: vk::PhysicalDevice,

    /// 当前 gpu 的基础属性
    pub(crate) basic_props: vk::PhysicalDeviceProperties,

    pub(crate) gfx_queue_family: GfxQueueFamily,
}

// new & init
impl GfxPhysicalDevice {
    /// 选择一张物理显卡
    ///
    /// 显卡需要支持 vulkan 1.3、swapchain 以及 graphics queue。优先选择独立显卡，如果没有则选择第一个可用的显卡
    pub fn new_descrete_physical_device(instance: &ash::Instance) -> GfxResult<Self> {
        let pdevices = unsafe { instance.enumerate_physical_devices() }.op("vkEnumeratePhysicalDevices")?;
        pdevices
            .iter()
            .filter_map(|pdevice| GfxPhysicalDevice::new(*pdevice, instance))
            // 优先使用独立显卡
            .find_or_first(GfxPhysicalDevice::is_descrete_gpu)
            .ok_or(GfxError::NoSuitableDevice)
    }

    /// 不满足要求的显卡返回 None
    fn new(pdevice: vk::PhysicalDevice, instance: &ash::Instance) -> Option<Self> {
        let basic_props = unsafe { instance.get_physical_device_properties(pdevice) };
        let physical_device_name = basic_props.device_name_as_c_str().unwrap_or(c"unknown");
        log::info!(target: "gpu", "found gpu: {:?}", physical_device_name);

        if !is_api_version_supported(basic_props.api_version) {
            log::info!(
                target: "gpu",
                "skip gpu {:?}: api version {}.{} < 1.3",
                physical_device_name,
                vk::api_version_major(basic_props.api_version),
                vk::api_version_minor(basic_props.api_version)
            );
            return None;
        }

        let device_extensions = unsafe { instance.enumerate_device_extension_properties(pdevice) }.ok()?;
        let swapchain_supported = device_extensions
            .iter()
            .any(|ext| ext.extension_name_as_c_str().is_ok_and(|name| name == ash::khr::swapchain::NAME));
        if !swapchain_supported {
            log::info!(target: "gpu", "skip gpu {:?}: swapchain is not supported", physical_device_name);
            return None;
        }

        // 找到所有的队列信息并打印出来
        let queue_family_props = unsafe { instance.get_physical_device_queue_family_properties(pdevice) };
        log::debug!(target: "gpu", "physical device: queue family props:\n{:#?}", queue_family_props);

        let Some(gfx_queue_family) = find_gfx_queue_family(&queue_family_props) else {
            log::info!(target: "gpu", "skip gpu {:?}: no graphics queue", physical_device_name);
            return None;
        };

        Some(Self {
            vk_handle: pdevice,
            basic_props,
            gfx_queue_family,
        })
    }
}

// getters
impl GfxPhysicalDevice {
    #[inline]
    pub fn vk_handle(&self) -> vk::PhysicalDevice {
        self.vk_handle
    }

    #[inline]
    pub fn gfx_queue_family(&self) -> &GfxQueueFamily {
        &self.gfx_queue_family
    }

    /// 当前 gpu 是否是独立显卡
    #[inline]
    pub fn is_descrete_gpu(&self) -> bool {
        self.basic_props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU
    }
}

impl DebugType for GfxPhysicalDevice {
    fn debug_type_name() -> &'static str {
        "GfxPhysicalDevice"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.vk_handle
    }
}

#[inline]
fn is_api_version_supported(api_version: u32) -> bool {
    vk::api_version_major(api_version) > 1
        || (vk::api_version_major(api_version) == 1 && vk::api_version_minor(api_version) >= 3)
}

/// 全能的 queue：graphics, compute, transfer
fn find_gfx_queue_family(props: &[vk::QueueFamilyProperties]) -> Option<GfxQueueFamily> {
    let include_flags = vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER;
    props.iter().enumerate().find(|(_, props)| props.queue_flags.contains(include_flags) && props.queue_count > 0).map(
        |(family_idx, props)| GfxQueueFamily {
            name: "gfx".to_string(),
            queue_family_index: family_idx as u32,
            queue_flags: props.queue_flags,
            queue_count: props.queue_count,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_version_must_be_at_least_1_3() {
        assert!(is_api_version_supported(vk::API_VERSION_1_3));
        assert!(is_api_version_supported(vk::make_api_version(0, 1, 4, 0)));
        assert!(!is_api_version_supported(vk::API_VERSION_1_2));
    }

    #[test]
    fn gfx_queue_family_needs_all_three_capabilities() {
        let family = |queue_flags, queue_count| vk::QueueFamilyProperties {
            queue_flags,
            queue_count,
            ..Default::default()
        };
        let props = [
            family(vk::QueueFlags::TRANSFER, 2),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, 4),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, 0),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, 1),
        ];

        let found = find_gfx_queue_family(&props).unwrap();
        assert_eq!(found.queue_family_index, 3);
        assert_eq!(found.queue_count, 1);

        assert!(find_gfx_queue_family(&props[..2]).is_none());
    }
}
