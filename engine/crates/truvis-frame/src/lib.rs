//! 帧驱动
//!
//! 每一帧的固定流程：获取命令缓冲 -> 获取 swapchain 纹理 -> 清屏 pass -> 提交。
//! 所有 GPU 调用都经过 [`truvis_gfx::backend::GpuBackend`]，因此可以用脚本化的 backend 测试。

pub mod error;
pub mod event_source;
pub mod frame_driver;
pub mod render_target;
pub mod swapchain_acquire;

pub use error::FrameError;
pub use event_source::EventSource;
pub use frame_driver::{DEFAULT_CLEAR_COLOR, FrameDriver, FrameOutcome, FrameStats};
pub use render_target::make_color_target;
pub use swapchain_acquire::{SwapchainTexture, acquire_swapchain_texture};
