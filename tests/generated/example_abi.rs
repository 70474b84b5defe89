// Code generated by picocompute-compile. DO NOT EDIT.

#![cfg(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "arm")))]

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct ExampleDescriptorSetLayout {
    binding0: picocompute::BufferDescriptor,
    binding1: picocompute::ImageDescriptor,
}

impl Default for ExampleDescriptorSetLayout {
    fn default() -> Self {
        Self {
            binding0: picocompute::BufferDescriptor::default(),
            binding1: picocompute::ImageDescriptor::default(),
        }
    }
}

unsafe impl picocompute::DescriptorSet for ExampleDescriptorSetLayout {}

impl ExampleDescriptorSetLayout {
    pub fn binding0(&mut self) -> Result<&mut picocompute::BufferDescriptor, picocompute::RuntimeError> {
        Ok(&mut self.binding0)
    }

    pub fn binding1(&mut self) -> Result<&mut picocompute::ImageDescriptor, picocompute::RuntimeError> {
        Ok(&mut self.binding1)
    }
}

unsafe extern "C" {
    static example_program_info: picocompute::ProgramInfo;
}

pub const EXAMPLE_HASH: picocompute::ContentHash = picocompute::ContentHash::from_bytes([
    0x47, 0x87, 0x6a, 0xc9, 0x45, 0xeb, 0xa5, 0x0b,
    0xb4, 0xb3, 0xe4, 0xc4, 0xaf, 0xd7, 0xc9, 0x73,
    0x65, 0x72, 0x14, 0x3f, 0xee, 0xf6, 0xa2, 0xa9,
    0x14, 0xb7, 0xb5, 0x0d, 0xa7, 0x5a, 0x14, 0xb0,
]);

pub fn example_program() -> picocompute::Program<'static> {
    // SAFETY: defined in example_abi.c and never written
    picocompute::Program::new(unsafe { &example_program_info }, EXAMPLE_HASH)
}
