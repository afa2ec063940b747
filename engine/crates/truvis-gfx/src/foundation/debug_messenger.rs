use std::ffi::CStr;

use ash::vk;

use crate::error::{GfxResult, VkResultExt};

/// validation layer 的消息输出到 log
///
/// 只有开启 validation 时才会创建
pub struct GfxDebugMsger {
    loader: ash::ext::debug_utils::Instance,
    handle: vk::DebugUtilsMessengerEXT,
}

// new & init
impl GfxDebugMsger {
    const MSG_TYPE: vk::DebugUtilsMessageTypeFlagsEXT = vk::DebugUtilsMessageTypeFlagsEXT::from_raw(
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL.as_raw()
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION.as_raw()
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE.as_raw(),
    );
    const MSG_SEVERITY: vk::DebugUtilsMessageSeverityFlagsEXT = vk::DebugUtilsMessageSeverityFlagsEXT::from_raw(
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING.as_raw() | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR.as_raw(),
    );

    pub fn new(vk_entry: &ash::Entry, instance: &ash::Instance) -> GfxResult<Self> {
        let loader = ash::ext::debug_utils::Instance::new(vk_entry, instance);

        let create_info = Self::debug_utils_messenger_ci();
        let handle =
            unsafe { loader.create_debug_utils_messenger(&create_info, None) }.op("vkCreateDebugUtilsMessengerEXT")?;

        Ok(Self { loader, handle })
    }

    /// 用于创建 debug messenger 的结构体
    ///
    /// 也会挂到 instance create info 上，用于捕获 instance 创建和销毁过程中的消息
    pub fn debug_utils_messenger_ci() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
        vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(Self::MSG_SEVERITY)
            .message_type(Self::MSG_TYPE)
            .pfn_user_callback(Some(vk_debug_callback))
    }
}

// destroy
impl GfxDebugMsger {
    pub fn destroy(self) {
        log::info!(target: "gpu", "destroying debug messenger");
        unsafe {
            self.loader.destroy_debug_utils_messenger(self.handle, None);
        }
    }
}

/// debug messenger 的回调函数
/// # Safety
/// 由 validation layer 调用，`p_callback_data` 在回调期间有效
unsafe extern "system" fn vk_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    let msg = if p_callback_data.is_null() {
        std::borrow::Cow::from("")
    } else {
        let callback_data = unsafe { *p_callback_data };
        if callback_data.p_message.is_null() {
            std::borrow::Cow::from("")
        } else {
            unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
        }
    };

    let format_msg = format!("[{:?}]\n{}", message_type, format_layer_message(&msg));

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::error!(target: "gpu", "{}", format_msg),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!(target: "gpu", "{}", format_msg),
        _ => log::info!(target: "gpu", "{}", format_msg),
    };

    // 只有 layer developer 才需要返回 True
    vk::FALSE
}

/// 某些 layer 会输出 json，其中 MainMessage 字段包含换行符，需要单独输出
fn format_layer_message(msg: &str) -> String {
    let Ok(serde_json::Value::Object(mut obj)) = serde_json::from_str::<serde_json::Value>(msg) else {
        return msg.to_string();
    };

    let main_msg = obj.remove("MainMessage");
    let main_msg_str = main_msg.as_ref().and_then(|value| value.as_str()).unwrap_or_default();
    let total_msg_str = serde_json::to_string_pretty(&obj).unwrap_or_else(|_| msg.to_string());

    format!("{}\n{}\n", total_msg_str, main_msg_str)
}

/// 可以设置 debug name 的 vulkan 对象
pub trait DebugType {
    fn debug_type_name() -> &'static str;
    fn vk_handle(&self) -> impl vk::Handle;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_messages_pass_through() {
        assert_eq!(format_layer_message("vkCreateDevice: bad"), "vkCreateDevice: bad");
    }

    #[test]
    fn json_messages_split_out_the_main_message() {
        let formatted = format_layer_message(r#"{"MainMessage": "line1\nline2", "MessageID": 42}"#);
        assert!(formatted.contains("\"MessageID\": 42"));
        assert!(formatted.ends_with("line1\nline2\n"));
        assert!(!formatted.contains("MainMessage"));
    }
}
