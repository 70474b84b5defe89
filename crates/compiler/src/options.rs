use picocompute_core::DescriptorSetLayout;
use std::path::PathBuf;

/// Workgroup memory reserved for every program.
///
/// Disassembly does not reveal how much shared memory the generated code needs,
/// so programs get a fixed amount large enough for typical kernels.
pub const DEFAULT_MEMORY_SIZE: usize = 100_000;

/// Object file the SwiftShader JIT drops into the working directory.
pub const DEFAULT_JIT_OBJECT: &str = "reactor_jit_llvm_0000_ComputeProgram.o";

/// Path of the runtime crate as seen from generated Rust code.
pub const DEFAULT_CRATE_PATH: &str = "picocompute";

/// External programs the compiler shells out to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Toolchain {
    pub glslang: PathBuf,
    pub spirv_dis: PathBuf,
    pub objcopy: PathBuf,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            glslang: "glslangValidator".into(),
            spirv_dis: "spirv-dis".into(),
            objcopy: "objcopy".into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CompileOptions {
    pub layout: DescriptorSetLayout,
    /// Architecture suffix of the `.syso` object.
    pub arch: String,
    pub out_dir: PathBuf,
    pub memory_size: usize,
    pub crate_path: String,
    pub jit_object: PathBuf,
    pub toolchain: Toolchain,
}

impl CompileOptions {
    pub fn new(layout: DescriptorSetLayout) -> Self {
        Self {
            layout,
            arch: std::env::consts::ARCH.to_string(),
            out_dir: PathBuf::from("."),
            memory_size: DEFAULT_MEMORY_SIZE,
            crate_path: DEFAULT_CRATE_PATH.to_string(),
            jit_object: PathBuf::from(DEFAULT_JIT_OBJECT),
            toolchain: Toolchain::default(),
        }
    }
}
