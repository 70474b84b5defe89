//! GLSL to SPIR-V through `glslangValidator`, and program metadata from `spirv-dis` output.

use crate::Error;
use log::debug;
use std::{
    ffi::OsString,
    fs,
    io::Write,
    path::Path,
    process::{Command, Output, Stdio},
};

/// What the runtime needs to know about a program that the native object does not tell it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgramMetadata {
    pub has_control_barriers: bool,
    pub workgroup_size: [u32; 3],
    pub memory_size: usize,
}

/// Compiles `glsl`, read from `source`, to SPIR-V. Includes resolve relative to the directory of `source`.
pub fn compile_glsl(glslang: &Path, source: &Path, glsl: &[u8]) -> Result<Vec<u8>, Error> {
    let dir = tempfile::tempdir().map_err(Error::io(std::env::temp_dir()))?;
    let output = dir.path().join(match source.file_name() {
        Some(name) => {
            let mut name = name.to_os_string();
            name.push(".spv");
            name
        }
        None => OsString::from("program.spv"),
    });

    let include = match source.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut include_arg = OsString::from("-I");
    include_arg.push(include);

    let args = [
        OsString::from("-V"),
        OsString::from("-o"),
        output.clone().into_os_string(),
        OsString::from("--stdin"),
        include_arg,
        OsString::from("-S"),
        OsString::from("comp"),
    ];

    let result = run_tool(glslang, &args, glsl)?;
    if !result.status.success() {
        return Err(Error::Compile {
            tool: glslang.display().to_string(),
            diagnostics: diagnostics(&result),
        });
    }

    let spirv = fs::read(&output).map_err(Error::io(&output))?;
    debug!("{}: {} bytes of SPIR-V", source.display(), spirv.len());
    Ok(spirv)
}

/// Disassembles SPIR-V to text, one instruction per line.
pub fn disassemble(spirv_dis: &Path, spirv: &[u8]) -> Result<String, Error> {
    let args = [OsString::from("--no-indent"), OsString::from("--no-header")];
    let result = run_tool(spirv_dis, &args, spirv)?;
    if !result.status.success() {
        return Err(Error::Compile {
            tool: spirv_dis.display().to_string(),
            diagnostics: diagnostics(&result),
        });
    }

    Ok(String::from_utf8_lossy(&result.stdout).into_owned())
}

/// Extracts the workgroup size and the use of control barriers from a disassembly.
pub fn scan_metadata(disassembly: &str, memory_size: usize) -> Result<ProgramMetadata, Error> {
    let mut workgroup_size = None;
    let mut has_control_barriers = false;

    for line in disassembly.lines() {
        if line.starts_with("OpExecutionMode") {
            let Some(index) = line.find("LocalSize ") else {
                return Err(Error::Metadata(format!("unknown execution mode: {}", line)));
            };

            let size = line[index..]
                .split_whitespace()
                .skip(1)
                .take(3)
                .map(|n| n.parse::<u32>())
                .collect::<Result<Vec<_>, _>>()
                .ok()
                .and_then(|size| <[u32; 3]>::try_from(size).ok())
                .ok_or_else(|| Error::Metadata(format!("invalid workgroup size: {}", line)))?;

            workgroup_size = Some(size);
        } else if line.contains("OpControlBarrier") {
            has_control_barriers = true;
        }
    }

    let workgroup_size =
        workgroup_size.ok_or_else(|| Error::Metadata("program declares no LocalSize execution mode".into()))?;
    if workgroup_size.contains(&0) {
        return Err(Error::Metadata(format!("empty workgroup size {:?}", workgroup_size)));
    }

    // the runtime stores the size as i32 and the invocation count as u32
    let invocations = workgroup_size.iter().try_fold(1u32, |n, &dim| n.checked_mul(dim));
    if workgroup_size.iter().any(|&dim| dim > i32::MAX as u32) || invocations.is_none() {
        return Err(Error::Metadata(format!("workgroup size {:?} is too large", workgroup_size)));
    }

    Ok(ProgramMetadata {
        has_control_barriers,
        workgroup_size,
        memory_size,
    })
}

/// Runs `tool` with `input` on stdin and collects its output.
pub(crate) fn run_tool(tool: &Path, args: &[OsString], input: &[u8]) -> Result<Output, Error> {
    let mut child = Command::new(tool)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(Error::io(tool))?;

    let stdin = child.stdin.take();
    std::thread::scope(|scope| {
        // a tool may exit without reading its input, so a broken pipe here is not an error
        scope.spawn(move || stdin.map(|mut stdin| stdin.write_all(input)));
        child.wait_with_output().map_err(Error::io(tool))
    })
}

fn diagnostics(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    const DISASSEMBLY: &str = "\
OpCapability Shader
%1 = OpExtInstImport \"GLSL.std.450\"
OpMemoryModel Logical GLSL450
OpEntryPoint GLCompute %main \"main\" %gl_LocalInvocationID
OpExecutionMode %main LocalSize 16 2 1
OpSource GLSL 450
OpControlBarrier %uint_2 %uint_2 %uint_264
OpReturn
";

    #[test]
    fn scan_workgroup_and_barriers() {
        let meta = scan_metadata(DISASSEMBLY, 100_000).unwrap();
        assert_eq!(
            meta,
            ProgramMetadata {
                has_control_barriers: true,
                workgroup_size: [16, 2, 1],
                memory_size: 100_000,
            }
        );
    }

    #[test]
    fn scan_without_barriers() {
        let meta = scan_metadata("OpExecutionMode %main LocalSize 2 2 1\nOpReturn\n", 64).unwrap();
        assert!(!meta.has_control_barriers);
        assert_eq!(meta.workgroup_size, [2, 2, 1]);
        assert_eq!(meta.memory_size, 64);
    }

    #[test]
    fn scan_errors() {
        assert!(matches!(
            scan_metadata("OpExecutionMode %main OriginUpperLeft\n", 0),
            Err(Error::Metadata(msg)) if msg.starts_with("unknown execution mode")
        ));
        assert!(matches!(
            scan_metadata("OpCapability Shader\n", 0),
            Err(Error::Metadata(_))
        ));
        assert!(matches!(
            scan_metadata("OpExecutionMode %main LocalSize 4 0 1\n", 0),
            Err(Error::Metadata(_))
        ));
        assert!(matches!(
            scan_metadata("OpExecutionMode %main LocalSize 4 x\n", 0),
            Err(Error::Metadata(_))
        ));
    }

    #[test]
    fn scan_rejects_oversized_workgroups() {
        assert!(matches!(
            scan_metadata("OpExecutionMode %main LocalSize 2147483648 1 1\n", 0),
            Err(Error::Metadata(msg)) if msg.ends_with("is too large")
        ));
        assert!(matches!(
            scan_metadata("OpExecutionMode %main LocalSize 65536 65536 1\n", 0),
            Err(Error::Metadata(msg)) if msg.ends_with("is too large")
        ));

        let meta = scan_metadata("OpExecutionMode %main LocalSize 2147483647 1 1\n", 0).unwrap();
        assert_eq!(meta.workgroup_size, [i32::MAX as u32, 1, 1]);
    }

    #[cfg(unix)]
    #[test]
    fn disassembler_output_is_passed_through() {
        let text = disassemble(Path::new("cat"), DISASSEMBLY.as_bytes()).unwrap();
        assert_eq!(text, DISASSEMBLY);
    }

    #[cfg(unix)]
    #[test]
    fn failing_tools() {
        assert!(matches!(
            compile_glsl(Path::new("false"), Path::new("shader.comp"), b"void main() {}"),
            Err(Error::Compile { .. })
        ));
        assert!(matches!(
            disassemble(Path::new("false"), &[]),
            Err(Error::Compile { .. })
        ));
        assert!(matches!(
            disassemble(Path::new("picocompute-no-such-tool"), &[]),
            Err(Error::Io { .. })
        ));
    }
}
