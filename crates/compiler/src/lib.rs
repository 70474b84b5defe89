//! Offline compiler from GLSL compute shaders to native picocompute programs.
//!
//! The pipeline is: `glslangValidator` (GLSL to SPIR-V), `spirv-dis` (program metadata),
//! a Vulkan driver with a code emitting JIT such as SwiftShader (SPIR-V to an object file),
//! `objcopy` (per program symbol names), and finally the C and Rust ABI descriptions.

pub mod build;
pub mod codegen;
mod emit;
mod error;
pub mod frontend;
mod options;
mod rename;

pub use codegen::{PipelineDriver, VulkanDriver};
pub use emit::{Emitter, identifier};
pub use error::{Error, PipelineStep};
pub use frontend::ProgramMetadata;
pub use options::*;
pub use rename::{COROUTINE_SYMBOLS, rename_args, rename_symbols};

use log::info;
use picocompute_core::ContentHash;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Files written for one program.
#[derive(Clone, Debug)]
pub struct Artifacts {
    pub name: String,
    pub hash: ContentHash,
    pub program: ProgramMetadata,
    pub object: PathBuf,
    pub files: Vec<PathBuf>,
}

pub struct Compiler {
    options: CompileOptions,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compiles the shader at `source` and writes every artifact into the output directory.
    pub fn compile(&self, source: &Path, driver: &dyn PipelineDriver) -> Result<Artifacts, Error> {
        let options = &self.options;
        let toolchain = &options.toolchain;

        let glsl = fs::read(source).map_err(Error::io(source))?;
        let name = identifier(
            &source
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        let hash = ContentHash::of(&glsl);
        info!("compiling {} as `{}` ({})", source.display(), name, hash);

        let spirv = frontend::compile_glsl(&toolchain.glslang, source, &glsl)?;
        let disassembly = frontend::disassemble(&toolchain.spirv_dis, &spirv)?;
        let program = frontend::scan_metadata(&disassembly, options.memory_size)?;
        info!(
            "workgroup size {:?}, control barriers: {}",
            program.workgroup_size, program.has_control_barriers
        );

        let object = codegen::generate(driver, &spirv, &options.layout, &options.jit_object)?;

        fs::create_dir_all(&options.out_dir).map_err(Error::io(&options.out_dir))?;
        let object_path = options.out_dir.join(format!("{}_{}.syso", name, options.arch));
        fs::write(&object_path, &object).map_err(Error::io(&object_path))?;
        rename_symbols(&toolchain.objcopy, &name, &object_path)?;

        let emitter = Emitter::new(&name, &options.layout, &program, hash, &options.crate_path);
        let mut files = Vec::new();
        for (file_name, contents) in emitter.files() {
            let path = options.out_dir.join(file_name);
            fs::write(&path, contents).map_err(Error::io(&path))?;
            files.push(path);
        }

        info!("wrote {} and {} support files", object_path.display(), files.len());
        Ok(Artifacts {
            name,
            hash,
            program,
            object: object_path,
            files,
        })
    }
}
