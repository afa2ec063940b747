use std::ffi::{CStr, CString, c_char};

use ash::vk;
use itertools::Itertools;

use crate::error::{GfxError, GfxResult, VkResultExt};
use crate::foundation::debug_messenger::GfxDebugMsger;

pub struct GfxInstance {
    pub(crate) ash_instance: ash::Instance,
}

// new & init
impl GfxInstance {
    const VALIDATION_LAYER: &'static CStr = c"VK_LAYER_KHRONOS_validation";

    /// 设置所需的 layers 和 extensions，创建 vk instance
    ///
    /// # param
    /// * surface_exts - 创建 surface 所需的 instance extensions，由 display handle 决定
    pub fn new(
        vk_entry: &ash::Entry,
        app_name: &str,
        surface_exts: &[*const c_char],
        validation: bool,
    ) -> GfxResult<Self> {
        let _span = tracy_client::span!("GfxInstance::new");

        let app_name = CString::new(app_name).unwrap_or_else(|_| c"Truvis".to_owned());
        let app_info = vk::ApplicationInfo::default()
            .api_version(vk::API_VERSION_1_3) // 使用 dynamic rendering 和 synchronization2
            .application_name(app_name.as_c_str())
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"Truvis")
            .engine_version(vk::make_api_version(0, 1, 0, 0));

        let supported_exts = unsafe { vk_entry.enumerate_instance_extension_properties(None) }
            .op("vkEnumerateInstanceExtensionProperties")?;
        let ext_supported = |ext: &CStr| {
            supported_exts.iter().any(|supported| supported.extension_name_as_c_str().is_ok_and(|name| name == ext))
        };

        let mut enabled_exts = surface_exts.to_vec();
        for ext in &enabled_exts {
            let ext = unsafe { CStr::from_ptr(*ext) };
            if !ext_supported(ext) {
                return Err(GfxError::missing_ext(ext));
            }
        }

        let mut enabled_layers = Vec::new();
        if validation {
            let supported_layers =
                unsafe { vk_entry.enumerate_instance_layer_properties() }.op("vkEnumerateInstanceLayerProperties")?;
            let layer_supported = supported_layers
                .iter()
                .any(|layer| layer.layer_name_as_c_str().is_ok_and(|name| name == Self::VALIDATION_LAYER));
            if !layer_supported {
                return Err(GfxError::missing_layer(Self::VALIDATION_LAYER));
            }
            enabled_layers.push(Self::VALIDATION_LAYER.as_ptr());

            // debug messenger 以及 debug name、debug label
            if !ext_supported(ash::ext::debug_utils::NAME) {
                return Err(GfxError::missing_ext(ash::ext::debug_utils::NAME));
            }
            enabled_exts.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        log::info!(
            target: "gpu",
            "instance extensions: {}",
            enabled_exts.iter().map(|ext| format!("\n\t{:?}", unsafe { CStr::from_ptr(*ext) })).join("")
        );
        log::info!(
            target: "gpu",
            "instance layers: {}",
            enabled_layers.iter().map(|layer| format!("\n\t{:?}", unsafe { CStr::from_ptr(*layer) })).join("")
        );

        let mut instance_ci = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&enabled_exts)
            .enabled_layer_names(&enabled_layers);

        // 为 instance info 添加 debug messenger
        let mut debug_utils_messenger_ci = GfxDebugMsger::debug_utils_messenger_ci();
        if validation {
            instance_ci = instance_ci.push_next(&mut debug_utils_messenger_ci);
        }

        let ash_instance = unsafe { vk_entry.create_instance(&instance_ci, None) }.op("vkCreateInstance")?;
        Ok(Self { ash_instance })
    }
}

// getters
impl GfxInstance {
    #[inline]
    pub fn ash_instance(&self) -> &ash::Instance {
        &self.ash_instance
    }

    #[inline]
    pub fn vk_instance(&self) -> vk::Instance {
        self.ash_instance.handle()
    }
}

// destroy
impl GfxInstance {
    pub fn destroy(self) {
        log::info!(target: "gpu", "destroying instance");
        unsafe {
            self.ash_instance.destroy_instance(None);
        }
    }
}
