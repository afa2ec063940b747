use std::ffi::CString;

use ash::vk;
use itertools::Itertools;

use crate::basic::color::LabelColor;
use crate::commands::{barrier::GfxImageBarrier, command_pool::GfxCommandPool};
use crate::error::{GfxResult, VkResultExt};
use crate::foundation::{debug_messenger::DebugType, device::GfxDevice};

/// 命令缓冲封装
///
/// 由 command pool 统一回收，不需要单独销毁。
///
/// # 使用示例
/// ```ignore
/// let cmd = GfxCommandBuffer::new(&device, &pool, "frame-0")?;
/// cmd.begin(&device, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, "frame")?;
/// cmd.image_memory_barrier(&device, vk::DependencyFlags::empty(), &[barrier]);
/// cmd.end(&device)?;
/// ```
#[derive(Clone)]
pub struct GfxCommandBuffer {
    vk_handle: vk::CommandBuffer,
}
// new & init
impl GfxCommandBuffer {
    pub fn new(gfx_device: &GfxDevice, command_pool: &GfxCommandPool, debug_name: &str) -> GfxResult<Self> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool.handle())
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let command_buffers =
            unsafe { gfx_device.allocate_command_buffers(&info) }.op("vkAllocateCommandBuffers")?;
        let cmd_buffer = GfxCommandBuffer {
            vk_handle: command_buffers[0],
        };
        gfx_device.set_debug_name(&cmd_buffer, debug_name);
        Ok(cmd_buffer)
    }
}
// Basic 命令
impl GfxCommandBuffer {
    /// 开始录制 command
    ///
    /// 自动设置 debug label
    #[inline]
    pub fn begin(
        &self,
        gfx_device: &GfxDevice,
        usage_flag: vk::CommandBufferUsageFlags,
        debug_label_name: &str,
    ) -> GfxResult<()> {
        unsafe {
            gfx_device.begin_command_buffer(self.vk_handle, &vk::CommandBufferBeginInfo::default().flags(usage_flag))
        }
        .op("vkBeginCommandBuffer")?;
        self.begin_label(gfx_device, debug_label_name, LabelColor::COLOR_CMD);
        Ok(())
    }

    /// 结束录制 command
    ///
    /// 结束 debug label
    #[inline]
    pub fn end(&self, gfx_device: &GfxDevice) -> GfxResult<()> {
        self.end_label(gfx_device);
        unsafe { gfx_device.end_command_buffer(self.vk_handle) }.op("vkEndCommandBuffer")
    }
}
// getters
impl GfxCommandBuffer {
    #[inline]
    pub fn vk_handle(&self) -> vk::CommandBuffer {
        self.vk_handle
    }
}
// 绘制类型的命令
impl GfxCommandBuffer {
    /// - command type: action, state
    /// - supported queue types: graphics
    #[inline]
    pub fn cmd_begin_rendering(&self, gfx_device: &GfxDevice, render_info: &vk::RenderingInfo) {
        unsafe {
            gfx_device.cmd_begin_rendering(self.vk_handle, render_info);
        }
    }

    /// - command type: action, state
    /// - supported queue types: graphics
    #[inline]
    pub fn cmd_end_rendering(&self, gfx_device: &GfxDevice) {
        unsafe {
            gfx_device.cmd_end_rendering(self.vk_handle);
        }
    }
}
// 同步相关命令
impl GfxCommandBuffer {
    /// - command type: synchronize
    /// - supported queue types: graphics, compute, transfer
    #[inline]
    pub fn image_memory_barrier(
        &self,
        gfx_device: &GfxDevice,
        dependency_flags: vk::DependencyFlags,
        barriers: &[GfxImageBarrier],
    ) {
        let barriers = barriers.iter().map(|b| *b.inner()).collect_vec();
        let dependency_info =
            vk::DependencyInfo::default().image_memory_barriers(&barriers).dependency_flags(dependency_flags);
        unsafe {
            gfx_device.cmd_pipeline_barrier2(self.vk_handle, &dependency_info);
        }
    }
}
// debug 相关命令
impl GfxCommandBuffer {
    /// 未开启 debug utils 时什么都不做
    #[inline]
    pub fn begin_label(&self, gfx_device: &GfxDevice, label_name: &str, label_color: glam::Vec4) {
        let Some(debug_utils) = gfx_device.debug_utils() else {
            return;
        };
        let Ok(name) = CString::new(label_name) else {
            return;
        };
        unsafe {
            debug_utils.cmd_begin_debug_utils_label(
                self.vk_handle,
                &vk::DebugUtilsLabelEXT::default().label_name(name.as_c_str()).color(label_color.into()),
            );
        }
    }

    #[inline]
    pub fn end_label(&self, gfx_device: &GfxDevice) {
        if let Some(debug_utils) = gfx_device.debug_utils() {
            unsafe {
                debug_utils.cmd_end_debug_utils_label(self.vk_handle);
            }
        }
    }
}

impl DebugType for GfxCommandBuffer {
    fn debug_type_name() -> &'static str {
        "GfxCommandBuffer"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.vk_handle
    }
}
