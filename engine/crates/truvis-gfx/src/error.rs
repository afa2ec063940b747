use std::ffi::CStr;

use ash::vk;

/// Vulkan backend 创建及运行过程中的错误
#[derive(Debug, thiserror::Error)]
pub enum GfxError {
    #[error("failed to load vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("{op} failed: {result:?}")]
    Vulkan { op: &'static str, result: vk::Result },

    #[error("required {kind} is not supported: {name}")]
    Missing { kind: &'static str, name: String },

    #[error("no physical device supports vulkan 1.3 graphics with presentation")]
    NoSuitableDevice,

    #[error("failed to get raw window handle: {0}")]
    WindowHandle(#[from] raw_window_handle::HandleError),

    #[error("a window is already claimed by this backend")]
    WindowAlreadyClaimed,

    #[error("the graphics queue cannot present to this window")]
    PresentNotSupported,
}
impl GfxError {
    pub(crate) fn missing_ext(name: &CStr) -> Self {
        Self::Missing {
            kind: "extension",
            name: name.to_string_lossy().into_owned(),
        }
    }

    pub(crate) fn missing_layer(name: &CStr) -> Self {
        Self::Missing {
            kind: "layer",
            name: name.to_string_lossy().into_owned(),
        }
    }

    /// 设备丢失之后，所有后续调用都会失败
    pub fn is_device_lost(&self) -> bool {
        matches!(
            self,
            Self::Vulkan {
                result: vk::Result::ERROR_DEVICE_LOST,
                ..
            }
        )
    }
}

pub type GfxResult<T> = Result<T, GfxError>;

/// 为 `VkResult` 附加操作名称
pub(crate) trait VkResultExt<T> {
    fn op(self, op: &'static str) -> GfxResult<T>;
}
impl<T> VkResultExt<T> for ash::prelude::VkResult<T> {
    #[inline]
    fn op(self, op: &'static str) -> GfxResult<T> {
        self.map_err(|result| GfxError::Vulkan { op, result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vulkan_errors_name_the_failed_operation() {
        let result: ash::prelude::VkResult<()> = Err(vk::Result::ERROR_DEVICE_LOST);
        let err = result.op("vkQueueSubmit2").unwrap_err();
        assert!(err.is_device_lost());
        assert_eq!(err.to_string(), "vkQueueSubmit2 failed: ERROR_DEVICE_LOST");
    }

    #[test]
    fn missing_extension_message() {
        let err = GfxError::missing_ext(ash::khr::swapchain::NAME);
        assert_eq!(err.to_string(), "required extension is not supported: VK_KHR_swapchain");
        assert!(!err.is_device_lost());
    }
}
