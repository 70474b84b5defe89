//! Native code generation through a Vulkan compute pipeline.
//!
//! SwiftShader compiles compute pipelines to native code with its LLVM JIT and, when built to do so,
//! drops the resulting object file into the working directory. Creating a pipeline is therefore
//! all it takes to turn SPIR-V into an object file.

mod vulkan;

pub use vulkan::VulkanDriver;

use crate::{Error, PipelineStep};
use log::{debug, info};
use picocompute_core::DescriptorSetLayout;
use std::{fs, path::Path};

/// Raw value of a driver object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle(pub u64);

/// A physical device together with the index of a queue family that supports compute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComputeQueue {
    pub physical_device: Handle,
    pub family: u32,
}

pub type DriverResult<T> = Result<T, String>;

/// The part of a Vulkan driver needed to build a compute pipeline.
///
/// Every `create_*` call is paired with a `destroy_*` call. Failures carry a human readable reason.
pub trait PipelineDriver {
    fn create_instance(&self) -> DriverResult<Handle>;
    fn destroy_instance(&self, instance: Handle);

    /// First physical device and its first compute capable queue family, `None` if that device has none.
    fn compute_queue(&self, instance: Handle) -> DriverResult<Option<ComputeQueue>>;

    fn create_device(&self, instance: Handle, queue: ComputeQueue) -> DriverResult<Handle>;
    fn destroy_device(&self, device: Handle);

    fn create_shader_module(&self, device: Handle, spirv: &[u32]) -> DriverResult<Handle>;
    fn destroy_shader_module(&self, device: Handle, module: Handle);

    fn create_descriptor_set_layout(&self, device: Handle, layout: &DescriptorSetLayout) -> DriverResult<Handle>;
    fn destroy_descriptor_set_layout(&self, device: Handle, layout: Handle);

    fn create_pipeline_layout(&self, device: Handle, set_layout: Handle) -> DriverResult<Handle>;
    fn destroy_pipeline_layout(&self, device: Handle, layout: Handle);

    /// Creates a compute pipeline with entry point `main`.
    fn create_compute_pipeline(&self, device: Handle, module: Handle, layout: Handle) -> DriverResult<Handle>;
    fn destroy_pipeline(&self, device: Handle, pipeline: Handle);
}

/// Builds a compute pipeline from `spirv` and returns the object file the JIT wrote to `jit_object`.
///
/// Every driver object is released in reverse creation order whether or not generation succeeds.
pub fn generate(
    driver: &dyn PipelineDriver,
    spirv: &[u8],
    layout: &DescriptorSetLayout,
    jit_object: &Path,
) -> Result<Vec<u8>, Error> {
    let words = spirv_words(spirv)?;
    let fail = |step| move |reason| Error::Pipeline { step, reason };

    // a stale object from an earlier run must not be mistaken for ours
    if jit_object.exists() {
        fs::remove_file(jit_object).map_err(Error::io(jit_object))?;
    }

    let instance = driver.create_instance().map_err(fail(PipelineStep::Instance))?;
    let _instance = Defer(|| driver.destroy_instance(instance));

    let queue = driver
        .compute_queue(instance)
        .map_err(fail(PipelineStep::PhysicalDevice))?
        .ok_or(Error::NoComputeQueue)?;
    debug!("using queue family {}", queue.family);

    let device = driver
        .create_device(instance, queue)
        .map_err(fail(PipelineStep::Device))?;
    let _device = Defer(|| driver.destroy_device(device));

    let module = driver
        .create_shader_module(device, &words)
        .map_err(fail(PipelineStep::ShaderModule))?;
    let _module = Defer(|| driver.destroy_shader_module(device, module));

    let set_layout = driver
        .create_descriptor_set_layout(device, layout)
        .map_err(fail(PipelineStep::DescriptorSetLayout))?;
    let _set_layout = Defer(|| driver.destroy_descriptor_set_layout(device, set_layout));

    let pipeline_layout = driver
        .create_pipeline_layout(device, set_layout)
        .map_err(fail(PipelineStep::PipelineLayout))?;
    let _pipeline_layout = Defer(|| driver.destroy_pipeline_layout(device, pipeline_layout));

    let pipeline = driver
        .create_compute_pipeline(device, module, pipeline_layout)
        .map_err(fail(PipelineStep::Pipeline))?;
    let _pipeline = Defer(|| driver.destroy_pipeline(device, pipeline));

    let object = fs::read(jit_object).map_err(|err| Error::Pipeline {
        step: PipelineStep::JitObject,
        reason: format!("{}: {}", jit_object.display(), err),
    })?;
    fs::remove_file(jit_object).map_err(Error::io(jit_object))?;

    info!("generated {} bytes of native code", object.len());
    Ok(object)
}

fn spirv_words(spirv: &[u8]) -> Result<Vec<u32>, Error> {
    if spirv.is_empty() || spirv.len() % 4 != 0 {
        return Err(Error::Pipeline {
            step: PipelineStep::ShaderModule,
            reason: format!("SPIR-V size {} is not a positive multiple of 4", spirv.len()),
        });
    }

    Ok(spirv
        .chunks_exact(4)
        .map(|word| u32::from_ne_bytes([word[0], word[1], word[2], word[3]]))
        .collect())
}

struct Defer<F: FnMut()>(F);
impl<F: FnMut()> Drop for Defer<F> {
    fn drop(&mut self) {
        (self.0)()
    }
}
