use super::{ComputeQueue, DriverResult, Handle, PipelineDriver};
use crate::{Error, PipelineStep};
use ash::vk::{self, Handle as _};
use log::debug;
use picocompute_core::{DescriptorKind, DescriptorSetLayout};
use std::{cell::RefCell, path::Path};

/// [`PipelineDriver`] backed by a Vulkan loader or ICD loaded at runtime.
///
/// Holds at most one instance and one device at a time, which is all pipeline generation needs.
pub struct VulkanDriver {
    entry: ash::Entry,
    instance: RefCell<Option<ash::Instance>>,
    device: RefCell<Option<ash::Device>>,
}

impl VulkanDriver {
    /// Loads the system Vulkan loader, or the library at `library` (e.g. `libvk_swiftshader.so`).
    pub fn load(library: Option<&Path>) -> Result<Self, Error> {
        // SAFETY: loading a Vulkan library runs its initializers, which we trust
        let entry = unsafe {
            match library {
                Some(path) => ash::Entry::load_from(path),
                None => ash::Entry::load(),
            }
        }
        .map_err(|err| Error::Pipeline {
            step: PipelineStep::Loader,
            reason: err.to_string(),
        })?;

        if let Some(path) = library {
            debug!("loaded vulkan from {}", path.display());
        }

        Ok(Self {
            entry,
            instance: RefCell::new(None),
            device: RefCell::new(None),
        })
    }

    fn with_instance<T>(&self, f: impl FnOnce(&ash::Instance) -> DriverResult<T>) -> DriverResult<T> {
        match &*self.instance.borrow() {
            Some(instance) => f(instance),
            None => Err("no vulkan instance".into()),
        }
    }

    fn with_device<T>(&self, f: impl FnOnce(&ash::Device) -> DriverResult<T>) -> DriverResult<T> {
        match &*self.device.borrow() {
            Some(device) => f(device),
            None => Err("no vulkan device".into()),
        }
    }
}

fn reason(result: vk::Result) -> String {
    format!("{} ({})", result, result.as_raw())
}

impl PipelineDriver for VulkanDriver {
    fn create_instance(&self) -> DriverResult<Handle> {
        let app = vk::ApplicationInfo::default().api_version(vk::API_VERSION_1_0);
        let info = vk::InstanceCreateInfo::default().application_info(&app);

        // SAFETY: the create info outlives the call
        let instance = unsafe { self.entry.create_instance(&info, None) }.map_err(reason)?;
        let handle = Handle(instance.handle().as_raw());
        *self.instance.borrow_mut() = Some(instance);
        Ok(handle)
    }

    fn destroy_instance(&self, _: Handle) {
        if let Some(instance) = self.instance.borrow_mut().take() {
            // SAFETY: every child object was destroyed before the instance
            unsafe { instance.destroy_instance(None) };
        }
    }

    fn compute_queue(&self, _: Handle) -> DriverResult<Option<ComputeQueue>> {
        self.with_instance(|instance| {
            // SAFETY: the instance is alive
            let devices = unsafe { instance.enumerate_physical_devices() }.map_err(reason)?;
            let physical_device = *devices.first().ok_or("no vulkan physical device")?;

            // SAFETY: the physical device was just enumerated from this instance
            let families = unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
            Ok(families
                .iter()
                .position(|family| family.queue_flags.contains(vk::QueueFlags::COMPUTE))
                .map(|family| ComputeQueue {
                    physical_device: Handle(physical_device.as_raw()),
                    family: family as u32,
                }))
        })
    }

    fn create_device(&self, _: Handle, queue: ComputeQueue) -> DriverResult<Handle> {
        let device = self.with_instance(|instance| {
            let priorities = [1.0];
            let queues = [vk::DeviceQueueCreateInfo::default()
                .queue_family_index(queue.family)
                .queue_priorities(&priorities)];
            let info = vk::DeviceCreateInfo::default().queue_create_infos(&queues);

            // SAFETY: the physical device belongs to the instance and the create info outlives the call
            unsafe { instance.create_device(vk::PhysicalDevice::from_raw(queue.physical_device.0), &info, None) }
                .map_err(reason)
        })?;

        let handle = Handle(device.handle().as_raw());
        *self.device.borrow_mut() = Some(device);
        Ok(handle)
    }

    fn destroy_device(&self, _: Handle) {
        if let Some(device) = self.device.borrow_mut().take() {
            // SAFETY: every child object was destroyed before the device
            unsafe { device.destroy_device(None) };
        }
    }

    fn create_shader_module(&self, _: Handle, spirv: &[u32]) -> DriverResult<Handle> {
        self.with_device(|device| {
            let info = vk::ShaderModuleCreateInfo::default().code(spirv);

            // SAFETY: the create info outlives the call
            let module = unsafe { device.create_shader_module(&info, None) }.map_err(reason)?;
            Ok(Handle(module.as_raw()))
        })
    }

    fn destroy_shader_module(&self, _: Handle, module: Handle) {
        let _ = self.with_device(|device| {
            // SAFETY: created by `create_shader_module` on this device
            unsafe { device.destroy_shader_module(vk::ShaderModule::from_raw(module.0), None) };
            Ok(())
        });
    }

    fn create_descriptor_set_layout(&self, _: Handle, layout: &DescriptorSetLayout) -> DriverResult<Handle> {
        self.with_device(|device| {
            let bindings = layout
                .iter()
                .map(|desc| {
                    vk::DescriptorSetLayoutBinding::default()
                        .binding(desc.binding)
                        .descriptor_type(match desc.kind {
                            DescriptorKind::Buffer => vk::DescriptorType::STORAGE_BUFFER,
                            DescriptorKind::Image => vk::DescriptorType::STORAGE_IMAGE,
                        })
                        .descriptor_count(desc.count)
                        .stage_flags(vk::ShaderStageFlags::COMPUTE)
                })
                .collect::<Vec<_>>();
            let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);

            // SAFETY: the create info outlives the call
            let layout = unsafe { device.create_descriptor_set_layout(&info, None) }.map_err(reason)?;
            Ok(Handle(layout.as_raw()))
        })
    }

    fn destroy_descriptor_set_layout(&self, _: Handle, layout: Handle) {
        let _ = self.with_device(|device| {
            // SAFETY: created by `create_descriptor_set_layout` on this device
            unsafe { device.destroy_descriptor_set_layout(vk::DescriptorSetLayout::from_raw(layout.0), None) };
            Ok(())
        });
    }

    fn create_pipeline_layout(&self, _: Handle, set_layout: Handle) -> DriverResult<Handle> {
        self.with_device(|device| {
            let set_layouts = [vk::DescriptorSetLayout::from_raw(set_layout.0)];
            let info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);

            // SAFETY: the set layout is alive and the create info outlives the call
            let layout = unsafe { device.create_pipeline_layout(&info, None) }.map_err(reason)?;
            Ok(Handle(layout.as_raw()))
        })
    }

    fn destroy_pipeline_layout(&self, _: Handle, layout: Handle) {
        let _ = self.with_device(|device| {
            // SAFETY: created by `create_pipeline_layout` on this device
            unsafe { device.destroy_pipeline_layout(vk::PipelineLayout::from_raw(layout.0), None) };
            Ok(())
        });
    }

    fn create_compute_pipeline(&self, _: Handle, module: Handle, layout: Handle) -> DriverResult<Handle> {
        self.with_device(|device| {
            let stage = vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::COMPUTE)
                .module(vk::ShaderModule::from_raw(module.0))
                .name(c"main");
            let infos = [vk::ComputePipelineCreateInfo::default()
                .stage(stage)
                .layout(vk::PipelineLayout::from_raw(layout.0))];

            // SAFETY: module and layout are alive and the create infos outlive the call
            let pipelines = unsafe { device.create_compute_pipelines(vk::PipelineCache::null(), &infos, None) }
                .map_err(|(_, result)| reason(result))?;
            let pipeline = pipelines.first().ok_or("driver returned no pipeline")?;
            Ok(Handle(pipeline.as_raw()))
        })
    }

    fn destroy_pipeline(&self, _: Handle, pipeline: Handle) {
        let _ = self.with_device(|device| {
            // SAFETY: created by `create_compute_pipeline` on this device
            unsafe { device.destroy_pipeline(vk::Pipeline::from_raw(pipeline.0), None) };
            Ok(())
        });
    }
}
