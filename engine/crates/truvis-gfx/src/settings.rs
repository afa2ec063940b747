use ash::vk;

/// 显示模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GfxPresentMode {
    /// 垂直同步，所有设备都支持
    #[default]
    Fifo,
    Mailbox,
    Immediate,
}
impl GfxPresentMode {
    #[inline]
    pub fn vk_present_mode(self) -> vk::PresentModeKHR {
        match self {
            Self::Fifo => vk::PresentModeKHR::FIFO,
            Self::Mailbox => vk::PresentModeKHR::MAILBOX,
            Self::Immediate => vk::PresentModeKHR::IMMEDIATE,
        }
    }
}

/// 创建 [`crate::vulkan_backend::VulkanBackend`] 所需的参数
#[derive(Debug, Clone)]
pub struct GfxSettings {
    pub app_name: String,
    pub present_mode: GfxPresentMode,
    /// 同时在 GPU 上执行的帧数
    pub frames_in_flight: usize,
    /// 是否开启 `VK_LAYER_KHRONOS_validation`
    pub validation: bool,
}
impl Default for GfxSettings {
    fn default() -> Self {
        Self {
            app_name: "Truvis".to_string(),
            present_mode: GfxPresentMode::Fifo,
            frames_in_flight: 2,
            validation: false,
        }
    }
}
impl GfxSettings {
    pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

    #[inline]
    pub fn clamped_frames_in_flight(&self) -> usize {
        self.frames_in_flight.clamp(1, Self::MAX_FRAMES_IN_FLIGHT)
    }
}
