use std::ffi::c_char;
use std::rc::Rc;

use ash::vk;

use crate::commands::command_queue::GfxCommandQueue;
use crate::error::GfxResult;
use crate::foundation::{
    debug_messenger::GfxDebugMsger, device::GfxDevice, instance::GfxInstance, physical_device::GfxPhysicalDevice,
};

pub struct GfxCore {
    /// vk 基础函数的接口
    ///
    /// 在 drop 之后，会卸载 dll，因此需要确保该字段最后 drop
    pub(crate) vk_entry: ash::Entry,

    pub(crate) instance: GfxInstance,
    pub(crate) physical_device: GfxPhysicalDevice,

    /// 多个组件需要共享相同的设备函数指针（queue、swapchain 等），生命周期由 destroy 手动控制
    pub(crate) gfx_device: Rc<GfxDevice>,

    pub(crate) debug_msger: Option<GfxDebugMsger>,

    pub(crate) gfx_queue: GfxCommandQueue,
}

// new & init
impl GfxCore {
    pub fn new(app_name: &str, surface_exts: &[*const c_char], validation: bool) -> GfxResult<Self> {
        let vk_entry = unsafe { ash::Entry::load() }?;
        let instance = GfxInstance::new(&vk_entry, app_name, surface_exts, validation)?;

        match Self::new_with_instance(vk_entry, instance, validation) {
            Ok(core) => Ok(core),
            Err((instance, e)) => {
                instance.destroy();
                Err(e)
            }
        }
    }

    /// 失败时把 instance 交还给调用者销毁
    #[allow(clippy::result_large_err)]
    fn new_with_instance(
        vk_entry: ash::Entry,
        instance: GfxInstance,
        validation: bool,
    ) -> Result<Self, (GfxInstance, crate::error::GfxError)> {
        let physical_device = match GfxPhysicalDevice::new_descrete_physical_device(instance.ash_instance()) {
            Ok(pdevice) => pdevice,
            Err(e) => return Err((instance, e)),
        };

        let queue_family_index = physical_device.gfx_queue_family.queue_family_index;
        let queue_create_infos =
            [vk::DeviceQueueCreateInfo::default().queue_family_index(queue_family_index).queue_priorities(&[1.0])];

        let gfx_device = match GfxDevice::new(
            instance.ash_instance(),
            physical_device.vk_handle,
            &queue_create_infos,
            validation,
        ) {
            Ok(device) => Rc::new(device),
            Err(e) => return Err((instance, e)),
        };

        let debug_msger = if validation {
            match GfxDebugMsger::new(&vk_entry, instance.ash_instance()) {
                Ok(msger) => Some(msger),
                Err(e) => {
                    gfx_device.destroy();
                    return Err((instance, e));
                }
            }
        } else {
            None
        };

        let gfx_queue = GfxCommandQueue {
            vk_queue: unsafe { gfx_device.get_device_queue(queue_family_index, 0) },
            queue_family: physical_device.gfx_queue_family.clone(),
            gfx_device: gfx_device.clone(),
        };
        log::info!(target: "gpu", "gfx queue's queue family:\n{:#?}", gfx_queue.queue_family);

        gfx_device.set_object_debug_name(instance.vk_instance(), "GfxInstance");
        gfx_device.set_object_debug_name(physical_device.vk_handle, "GfxPhysicalDevice");
        let device: &GfxDevice = &gfx_device;
        device.set_debug_name(device, "main");
        gfx_device.set_debug_name(&gfx_queue, "gfx");

        Ok(Self {
            vk_entry,
            instance,
            physical_device,
            gfx_device,
            debug_msger,
            gfx_queue,
        })
    }
}

// getters
impl GfxCore {
    #[inline]
    pub fn gfx_device(&self) -> &Rc<GfxDevice> {
        &self.gfx_device
    }

    #[inline]
    pub fn gfx_queue(&self) -> &GfxCommandQueue {
        &self.gfx_queue
    }

    #[inline]
    pub fn physical_device(&self) -> &GfxPhysicalDevice {
        &self.physical_device
    }

    #[inline]
    pub fn vk_entry(&self) -> &ash::Entry {
        &self.vk_entry
    }

    #[inline]
    pub fn instance(&self) -> &GfxInstance {
        &self.instance
    }
}

// destroy
impl GfxCore {
    pub fn destroy(self) {
        let Self {
            vk_entry,
            instance,
            physical_device: _,
            gfx_device,
            debug_msger,
            gfx_queue,
        } = self;

        drop(gfx_queue);
        gfx_device.destroy();
        if let Some(debug_msger) = debug_msger {
            debug_msger.destroy();
        }
        instance.destroy();

        // entry 最后卸载
        drop(vk_entry);
    }
}
