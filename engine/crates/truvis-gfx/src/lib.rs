//! GPU backend 层
//!
//! [`backend`] 定义帧循环依赖的 GPU backend 契约：命令缓冲的获取、swapchain 纹理的获取、
//! render pass 的开始与结束、提交与取消。契约以布尔值 / `Option` 表示成败，以输出槽位返回句柄和尺寸，
//! 失败原因通过 [`backend::GpuBackend::last_error`] 获取。
//!
//! [`vulkan_backend::VulkanBackend`] 是基于 ash 的实现，其余模块是它使用的 Vulkan 封装。

pub mod backend;
pub mod basic;
pub mod commands;
pub mod error;
pub mod foundation;
pub mod gfx_core;
pub mod settings;
pub mod swapchain;
pub mod vulkan_backend;
