use std::rc::Rc;

use ash::vk;
use itertools::Itertools;

use crate::commands::command_queue::GfxCommandQueue;
use crate::commands::semaphore::GfxSemaphore;
use crate::error::{GfxError, GfxResult, VkResultExt};
use crate::foundation::device::GfxDevice;
use crate::swapchain::surface::GfxSurface;

/// acquire_next_image 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GfxSwapchainAcquire {
    Acquired { image_index: u32, suboptimal: bool },
    /// swapchain 已经和 surface 不匹配，需要重建
    OutOfDate,
}

/// 窗口对应的 swapchain
///
/// 窗口最小化时 surface 的 extent 为 0，此时无法创建 swapchain，[`GfxRenderSwapchain::is_ready`] 返回 false。
/// 每次重建都会增加 generation，用于让旧图像的句柄失效。
pub struct GfxRenderSwapchain {
    gfx_device: Rc<GfxDevice>,
    surface: GfxSurface,
    swapchain_handle: vk::SwapchainKHR,

    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    /// 每张图像一个，用于 submit 和 present 之间的同步
    render_complete_semaphores: Vec<GfxSemaphore>,

    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    generation: u32,
}

// new & init
impl GfxRenderSwapchain {
    pub fn new(
        gfx_device: Rc<GfxDevice>,
        surface: GfxSurface,
        preferred_present_mode: vk::PresentModeKHR,
        window_physical_extent: vk::Extent2D,
    ) -> GfxResult<Self> {
        let _span = tracy_client::span!("GfxRenderSwapchain::new");

        let formats_and_modes = surface.formats().and_then(|formats| Ok((formats, surface.present_modes()?)));
        let (formats, present_modes) = match formats_and_modes {
            Ok(v) => v,
            Err(e) => {
                surface.destroy();
                return Err(e);
            }
        };
        let Some(surface_format) = choose_surface_format(&formats) else {
            surface.destroy();
            return Err(GfxError::Missing {
                kind: "surface format",
                name: "any".to_string(),
            });
        };
        let present_mode = choose_present_mode(&present_modes, preferred_present_mode);
        log::info!(
            target: "gpu",
            "swapchain surface format: {:?}, present mode: {:?}",
            surface_format,
            present_mode
        );

        let mut swapchain = Self {
            gfx_device,
            surface,
            swapchain_handle: vk::SwapchainKHR::null(),
            images: vec![],
            image_views: vec![],
            render_complete_semaphores: vec![],
            surface_format,
            present_mode,
            extent: vk::Extent2D::default(),
            generation: 0,
        };
        if let Err(e) = swapchain.rebuild(window_physical_extent) {
            swapchain.destroy();
            return Err(e);
        }
        Ok(swapchain)
    }

    /// 根据当前 surface 的状态重建 swapchain
    ///
    /// 调用者需要保证旧的图像不再被 GPU 使用。
    ///
    /// return: 是否创建出了可用的 swapchain
    pub fn rebuild(&mut self, window_physical_extent: vk::Extent2D) -> GfxResult<bool> {
        let _span = tracy_client::span!("GfxRenderSwapchain::rebuild");

        let surface_capabilities = self.surface.capabilities()?;

        // 确定 window 的 extent 尺寸
        // 如果 surface_capabilities.current_extent 包含特殊值 0xFFFFFFFF，则表示可以自己设置交换链的 extent
        let extent = calculate_swapchain_extent(&surface_capabilities, window_physical_extent);
        log::info!(
            target: "gpu",
            "rebuild swapchain:
            surface current extent: {}x{}, min extent: {}x{}, max extent: {}x{}
            window physical extent: {}x{}
            final swapchain extent: {}x{}",
            surface_capabilities.current_extent.width,
            surface_capabilities.current_extent.height,
            surface_capabilities.min_image_extent.width,
            surface_capabilities.min_image_extent.height,
            surface_capabilities.max_image_extent.width,
            surface_capabilities.max_image_extent.height,
            window_physical_extent.width,
            window_physical_extent.height,
            extent.width,
            extent.height
        );

        let old_swapchain = self.swapchain_handle;
        self.destroy_image_resources();
        self.swapchain_handle = vk::SwapchainKHR::null();
        self.generation = self.generation.wrapping_add(1);

        // 窗口最小化
        if extent.width == 0 || extent.height == 0 {
            self.destroy_swapchain_handle(old_swapchain);
            self.extent = extent;
            return Ok(false);
        }

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface.handle)
            .min_image_count(choose_image_count(&surface_capabilities))
            .image_format(self.surface_format.format)
            .image_color_space(self.surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            // TRANSFER_DST 用于 Nsight 分析
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .pre_transform(surface_capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(self.present_mode)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let result = unsafe { self.gfx_device.swapchain.create_swapchain(&create_info, None) };
        self.destroy_swapchain_handle(old_swapchain);
        self.swapchain_handle = result.op("vkCreateSwapchainKHR")?;
        self.gfx_device.set_object_debug_name(self.swapchain_handle, format!("main-{}", self.generation));
        self.extent = extent;

        self.images = unsafe { self.gfx_device.swapchain.get_swapchain_images(self.swapchain_handle) }
            .op("vkGetSwapchainImagesKHR")?;
        for (idx, image) in self.images.iter().enumerate() {
            let view_ci = vk::ImageViewCreateInfo::default()
                .image(*image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.surface_format.format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            let view = unsafe { self.gfx_device.create_image_view(&view_ci, None) }.op("vkCreateImageView")?;
            self.image_views.push(view);
            self.gfx_device.set_object_debug_name(*image, format!("swapchain-image-{}", idx));

            let semaphore = GfxSemaphore::new(&self.gfx_device, &format!("render-complete-{}", idx))?;
            self.render_complete_semaphores.push(semaphore);
        }

        Ok(true)
    }
}

// getters
impl GfxRenderSwapchain {
    /// 当前是否存在可用的 swapchain
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.swapchain_handle != vk::SwapchainKHR::null()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn image(&self, image_index: u32) -> vk::Image {
        self.images[image_index as usize]
    }

    #[inline]
    pub fn image_view(&self, image_index: u32) -> vk::ImageView {
        self.image_views[image_index as usize]
    }

    #[inline]
    pub fn render_complete_semaphore(&self, image_index: u32) -> &GfxSemaphore {
        &self.render_complete_semaphores[image_index as usize]
    }

    #[inline]
    pub fn surface(&self) -> &GfxSurface {
        &self.surface
    }
}

// update
impl GfxRenderSwapchain {
    /// timeout: nano seconds
    pub fn acquire_next_image(&self, semaphore: &GfxSemaphore, timeout: u64) -> GfxResult<GfxSwapchainAcquire> {
        let result = unsafe {
            self.gfx_device.swapchain.acquire_next_image(
                self.swapchain_handle,
                timeout,
                semaphore.handle(),
                vk::Fence::null(),
            )
        };

        match result {
            Ok((image_index, suboptimal)) => {
                if suboptimal {
                    log::warn!(target: "gpu", "swapchain acquire image index {} is not optimal", image_index);
                }
                Ok(GfxSwapchainAcquire::Acquired {
                    image_index,
                    suboptimal,
                })
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::warn!(target: "gpu", "swapchain is out of date when acquire next image");
                Ok(GfxSwapchainAcquire::OutOfDate)
            }
            Err(result) => Err(GfxError::Vulkan {
                op: "vkAcquireNextImageKHR",
                result,
            }),
        }
    }

    /// return: need recreate
    pub fn present_image(&self, queue: &GfxCommandQueue, image_index: u32) -> GfxResult<bool> {
        let wait_semaphores = [self.render_complete_semaphore(image_index).handle()];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .image_indices(&image_indices)
            .swapchains(std::slice::from_ref(&self.swapchain_handle));

        let result = unsafe { self.gfx_device.swapchain.queue_present(queue.handle(), &present_info) };
        match result {
            Ok(suboptimal) => {
                if suboptimal {
                    log::warn!(target: "gpu", "swapchain present image index {} is not optimal", image_index);
                }
                Ok(suboptimal)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::warn!(target: "gpu", "swapchain is out of date when present image");
                Ok(true)
            }
            Err(result) => Err(GfxError::Vulkan {
                op: "vkQueuePresentKHR",
                result,
            }),
        }
    }
}

// destroy
impl GfxRenderSwapchain {
    fn destroy_image_resources(&mut self) {
        for view in self.image_views.drain(..) {
            unsafe { self.gfx_device.destroy_image_view(view, None) };
        }
        for semaphore in self.render_complete_semaphores.drain(..) {
            semaphore.destroy(&self.gfx_device);
        }
        self.images.clear();
    }

    fn destroy_swapchain_handle(&self, handle: vk::SwapchainKHR) {
        if handle != vk::SwapchainKHR::null() {
            unsafe { self.gfx_device.swapchain.destroy_swapchain(handle, None) };
        }
    }

    /// 调用者需要保证 GPU 已经空闲
    pub fn destroy(mut self) {
        self.destroy_image_resources();
        self.destroy_swapchain_handle(self.swapchain_handle);
        self.swapchain_handle = vk::SwapchainKHR::null();
        log::info!(target: "gpu", "destroyed swapchain");

        let Self { surface, .. } = self;
        surface.destroy();
    }
}

/// 确定 window 的 extent 尺寸
///
/// 如果 surface_capabilities.current_extent 包含特殊值 0xFFFFFFFF，则表示可以自己设置交换链的 extent
pub fn calculate_swapchain_extent(
    surface_capabilities: &vk::SurfaceCapabilitiesKHR,
    window_physical_extent: vk::Extent2D,
) -> vk::Extent2D {
    let surface_extent = surface_capabilities.current_extent;
    if surface_extent.width == u32::MAX || surface_extent.height == u32::MAX {
        let width = window_physical_extent
            .width
            .clamp(surface_capabilities.min_image_extent.width, surface_capabilities.max_image_extent.width);
        let height = window_physical_extent
            .height
            .clamp(surface_capabilities.min_image_extent.height, surface_capabilities.max_image_extent.height);
        vk::Extent2D { width, height }
    } else {
        surface_extent
    }
}

/// max_image_count == 0，表示不限制 image 数量
pub fn choose_image_count(surface_capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    if surface_capabilities.max_image_count == 0 {
        surface_capabilities.min_image_count + 1
    } else {
        u32::min(surface_capabilities.max_image_count, surface_capabilities.min_image_count + 1)
    }
}

/// 优先使用 B8G8R8A8_UNORM + SRGB_NONLINEAR，否则使用第一个
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find_or_first(|f| {
            f.format == vk::Format::B8G8R8A8_UNORM && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .map(|f| {
            // surface 对格式没有偏好
            if f.format == vk::Format::UNDEFINED {
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                }
            } else {
                f
            }
        })
}

/// 不支持时回退到 FIFO，FIFO 是所有设备都支持的
pub fn choose_present_mode(supported: &[vk::PresentModeKHR], preferred: vk::PresentModeKHR) -> vk::PresentModeKHR {
    if supported.contains(&preferred) {
        preferred
    } else {
        log::warn!(target: "gpu", "present mode {:?} is not supported, fallback to FIFO", preferred);
        vk::PresentModeKHR::FIFO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            ..Default::default()
        }
    }

    #[test]
    fn surface_extent_wins_when_defined() {
        let caps = caps((800, 600), (1, 1), (4096, 4096));
        let extent = calculate_swapchain_extent(&caps, vk::Extent2D { width: 1280, height: 780 });
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn window_extent_is_clamped_when_surface_is_undefined() {
        let caps = caps((u32::MAX, u32::MAX), (100, 100), (1024, 1024));
        let extent = calculate_swapchain_extent(&caps, vk::Extent2D { width: 1280, height: 50 });
        assert_eq!((extent.width, extent.height), (1024, 100));
    }

    #[test]
    fn minimized_window_yields_zero_extent() {
        let caps = caps((0, 0), (0, 0), (4096, 4096));
        let extent = calculate_swapchain_extent(&caps, vk::Extent2D { width: 0, height: 0 });
        assert_eq!((extent.width, extent.height), (0, 0));
    }

    #[test]
    fn image_count_is_one_more_than_min_within_max() {
        let mut caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&caps), 3);

        caps.max_image_count = 2;
        assert_eq!(choose_image_count(&caps), 2);
    }

    #[test]
    fn surface_format_prefers_bgra_srgb() {
        let rgba = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let bgra = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let format_of = |formats: &[vk::SurfaceFormatKHR]| choose_surface_format(formats).map(|f| f.format);
        assert_eq!(format_of(&[rgba, bgra]), Some(bgra.format));
        assert_eq!(format_of(&[rgba]), Some(rgba.format));
        assert_eq!(format_of(&[]), None);

        let undefined = vk::SurfaceFormatKHR {
            format: vk::Format::UNDEFINED,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let chosen = choose_surface_format(&[undefined]).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let supported = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(choose_present_mode(&supported, vk::PresentModeKHR::MAILBOX), vk::PresentModeKHR::MAILBOX);
        assert_eq!(choose_present_mode(&supported, vk::PresentModeKHR::IMMEDIATE), vk::PresentModeKHR::FIFO);
    }
}
