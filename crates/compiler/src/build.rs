//! Linking compiled programs into a Rust crate, for use from its build script.
//!
//! ```ignore
//! // build.rs
//! fn main() {
//!     picocompute_compiler::build::link("shaders".as_ref(), "blur").unwrap();
//! }
//! ```
//!
//! The crate then includes `shaders/blur_abi.rs` (and `blur_abi_nosupport.rs`) with `#[path]`.

use crate::Error;
use std::{env, io, path::Path};

/// Name of the static library holding program `name`.
pub fn library_name(name: &str) -> String {
    format!("{}_abi", name)
}

/// A `cc` build of `<name>_abi.c` with the native object `<name>_<arch>.syso` added to the archive.
///
/// Both files, plus `abi.h` and `runtime.h`, are expected in `dir` as written by the compiler.
pub fn configure(dir: &Path, name: &str, arch: &str) -> Result<cc::Build, Error> {
    let glue = dir.join(format!("{}_abi.c", name));
    let object = dir.join(format!("{}_{}.syso", name, arch));

    for path in [&glue, &object] {
        if !path.is_file() {
            return Err(Error::Io {
                path: path.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "missing program artifact"),
            });
        }
    }

    let mut build = cc::Build::new();
    build.file(&glue).object(&object).include(dir).pic(true).warnings(false);
    Ok(build)
}

/// Compiles and links program `name` from `dir` for the target being built. Call from a build script.
pub fn link(dir: &Path, name: &str) -> Result<(), Error> {
    let arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_else(|_| env::consts::ARCH.to_string());
    let build = configure(dir, name, &arch)?;

    for file in [
        format!("{}_abi.c", name),
        format!("{}_abi.h", name),
        format!("{}_{}.syso", name, arch),
    ] {
        println!("cargo:rerun-if-changed={}", dir.join(file).display());
    }

    build.try_compile(&library_name(name))?;

    // generated code calls into libm
    println!("cargo:rustc-link-lib=m");
    Ok(())
}

#[cfg(all(test, target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64")))]
mod tests {
    use super::*;
    use crate::{Emitter, ProgramMetadata};
    use picocompute_core::{ContentHash, DescriptorSetLayout};
    use std::fs;

    #[cfg(target_arch = "x86_64")]
    const TARGET: &str = "x86_64-unknown-linux-gnu";
    #[cfg(target_arch = "aarch64")]
    const TARGET: &str = "aarch64-unknown-linux-gnu";

    /// Stands in for the object the JIT produces, with the renamed coroutine triple.
    const COROUTINES: &str = "\
#include <stdbool.h>
#include <stdint.h>

void *example_coroutine_begin(void *data, int32_t x, int32_t y, int32_t z, void *memory, int32_t first, int32_t count) {
\treturn data;
}

bool example_coroutine_await(void *coroutine, int32_t *result) {
\treturn false;
}

void example_coroutine_destroy(void *coroutine) {
}
";

    fn for_test(build: &mut cc::Build, out_dir: &Path) {
        build
            .out_dir(out_dir)
            .target(TARGET)
            .host(TARGET)
            .opt_level(0)
            .debug(false)
            .cargo_metadata(false);
    }

    #[test]
    fn links_glue_with_object() {
        let dir = tempfile::tempdir().unwrap();
        let arch = std::env::consts::ARCH;

        let stub = dir.path().join("coroutines.c");
        fs::write(&stub, COROUTINES).unwrap();
        let mut build = cc::Build::new();
        build.file(&stub).warnings(false);
        for_test(&mut build, &dir.path().join("stub"));
        let objects = build.try_compile_intermediates().unwrap();
        fs::copy(&objects[0], dir.path().join(format!("example_{}.syso", arch))).unwrap();

        let layout = DescriptorSetLayout::parse("0:buffer,1:[2]image").unwrap();
        let program = ProgramMetadata {
            has_control_barriers: true,
            workgroup_size: [8, 8, 1],
            memory_size: 100_000,
        };
        let emitter = Emitter::new("example", &layout, &program, ContentHash::of("void main() {}"), "picocompute");
        for (name, contents) in emitter.files() {
            fs::write(dir.path().join(name), contents).unwrap();
        }

        let mut build = configure(dir.path(), "example", arch).unwrap();
        for_test(&mut build, &dir.path().join("lib"));
        build.try_compile(&library_name("example")).unwrap();

        let archive = fs::read(dir.path().join("lib/libexample_abi.a")).unwrap();
        let contains = |symbol: &[u8]| archive.windows(symbol.len()).any(|w| w == symbol);
        assert!(contains(b"example_program_info"));
        assert!(contains(b"example_coroutine_begin"));
        assert!(contains(b"example_coroutine_destroy"));
    }

    #[test]
    fn missing_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("example_abi.c"), "").unwrap();

        match configure(dir.path(), "example", "x86_64") {
            Err(Error::Io { path, .. }) => assert_eq!(path, dir.path().join("example_x86_64.syso")),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }
}
