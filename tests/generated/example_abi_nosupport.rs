// Code generated by picocompute-compile. DO NOT EDIT.

#![cfg(not(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "arm"))))]

#[derive(Clone, Copy, Debug, Default)]
pub struct ExampleDescriptorSetLayout {}

unsafe impl picocompute::DescriptorSet for ExampleDescriptorSetLayout {}

impl ExampleDescriptorSetLayout {
    pub fn binding0(&mut self) -> Result<&mut picocompute::BufferDescriptor, picocompute::RuntimeError> {
        Err(picocompute::RuntimeError::Unsupported)
    }

    pub fn binding1(&mut self) -> Result<&mut picocompute::ImageDescriptor, picocompute::RuntimeError> {
        Err(picocompute::RuntimeError::Unsupported)
    }
}

pub const EXAMPLE_HASH: picocompute::ContentHash = picocompute::ContentHash::EMPTY;

pub fn example_program() -> picocompute::Program<'static> {
    picocompute::Program::unsupported()
}
