use clap::Parser;
use picocompute_compiler::{
    CompileOptions, Compiler, DEFAULT_CRATE_PATH, DEFAULT_JIT_OBJECT, DEFAULT_MEMORY_SIZE, Error, Toolchain,
    VulkanDriver,
};
use picocompute_core::DescriptorSetLayout;
use std::{path::PathBuf, process};
use tracing_subscriber::EnvFilter;

/// Compile a GLSL compute shader into a native program for the picocompute runtime.
#[derive(Parser, Debug)]
#[command(name = "picocompute-compile", version)]
struct Args {
    /// Descriptor set layout, e.g. `0:buffer,1:image,2:[4]buffer`
    #[arg(long, env = "PICOCOMPUTE_LAYOUT")]
    layout: String,

    /// Architecture suffix of the generated object file
    #[arg(long, env = "PICOCOMPUTE_ARCH", default_value = std::env::consts::ARCH)]
    arch: String,

    #[arg(long, env = "PICOCOMPUTE_OBJCOPY", default_value = "objcopy")]
    objcopy: PathBuf,

    #[arg(long, env = "PICOCOMPUTE_GLSLANG", default_value = "glslangValidator")]
    glslang: PathBuf,

    #[arg(long, env = "PICOCOMPUTE_SPIRV_DIS", default_value = "spirv-dis")]
    spirv_dis: PathBuf,

    /// Vulkan driver to load instead of the system loader, e.g. `libvk_swiftshader.so`
    #[arg(long, env = "PICOCOMPUTE_VULKAN_LIBRARY")]
    vulkan_library: Option<PathBuf>,

    /// Object file the driver's JIT writes when a pipeline is created
    #[arg(long, default_value = DEFAULT_JIT_OBJECT)]
    jit_object: PathBuf,

    /// Workgroup memory reserved for the program, in bytes
    #[arg(long, default_value_t = DEFAULT_MEMORY_SIZE)]
    memory_size: usize,

    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Path of the runtime crate in generated Rust code
    #[arg(long, default_value = DEFAULT_CRATE_PATH)]
    crate_path: String,

    /// More output, repeat for more (`RUST_LOG` takes precedence)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// GLSL compute shader
    source: PathBuf,
}

fn main() {
    let args = Args::parse();

    let level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(args) {
        eprintln!("picocompute-compile: {}", err);
        process::exit(err.exit_code());
    }
}

fn run(args: Args) -> Result<(), Error> {
    let layout = DescriptorSetLayout::parse(&args.layout)?;

    let mut options = CompileOptions::new(layout);
    options.arch = args.arch;
    options.out_dir = args.out_dir;
    options.memory_size = args.memory_size;
    options.crate_path = args.crate_path;
    options.jit_object = args.jit_object;
    options.toolchain = Toolchain {
        glslang: args.glslang,
        spirv_dis: args.spirv_dis,
        objcopy: args.objcopy,
    };

    let driver = VulkanDriver::load(args.vulkan_library.as_deref())?;
    Compiler::new(options).compile(&args.source, &driver)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Args::command().debug_assert();
    }

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["picocompute-compile", "--layout", "0:buffer", "shader.comp"]).unwrap();
        assert_eq!(args.layout, "0:buffer");
        assert_eq!(args.memory_size, DEFAULT_MEMORY_SIZE);
        assert_eq!(args.jit_object, PathBuf::from(DEFAULT_JIT_OBJECT));
        assert_eq!(args.out_dir, PathBuf::from("."));
        assert_eq!(args.source, PathBuf::from("shader.comp"));
        assert_eq!(args.verbose, 0);
    }

    #[test]
    fn layout_help_example_parses() {
        let command = Args::command();
        let help = command
            .get_arguments()
            .find(|arg| arg.get_id() == "layout")
            .and_then(|arg| arg.get_help())
            .map(|help| help.to_string())
            .unwrap();

        let example = help.split('`').nth(1).unwrap();
        let layout = DescriptorSetLayout::parse(example).unwrap();
        assert_eq!(layout.to_string(), example);
    }

    #[test]
    fn bad_layout_is_a_usage_error() {
        let args = Args::try_parse_from(["picocompute-compile", "--layout", "0:texture", "-vv", "shader.comp"]).unwrap();
        assert_eq!(args.verbose, 2);

        let err = run(args).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
        assert_eq!(err.exit_code(), 1);
    }
}
