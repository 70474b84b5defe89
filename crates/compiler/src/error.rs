use picocompute_core::ParseError;
use std::{fmt, io, path::PathBuf};

/// Step of native code generation that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStep {
    Loader,
    Instance,
    PhysicalDevice,
    Device,
    ShaderModule,
    DescriptorSetLayout,
    PipelineLayout,
    Pipeline,
    JitObject,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to parse layout: {0}")]
    Parse(#[from] ParseError),

    #[error("{tool} failed:\n{diagnostics}")]
    Compile { tool: String, diagnostics: String },

    #[error("failed to parse SPIR-V parameters: {0}")]
    Metadata(String),

    #[error("failed to build SPIR-V program: no queue family with compute support")]
    NoComputeQueue,

    #[error("failed to build SPIR-V program: {step}: {reason}")]
    Pipeline { step: PipelineStep, reason: String },

    #[error("{tool} failed to rename symbols:\n{diagnostics}")]
    SymbolRename { tool: String, diagnostics: String },

    #[error("failed to build program glue: {0}")]
    Link(#[from] cc::Error),

    #[error("{}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Error::Io { path, source }
    }

    /// Process exit status for this error: 1 for bad input, 2 for tool, driver, linker or filesystem failures.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Parse(_) | Error::Metadata(_) => 1,
            _ => 2,
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PipelineStep::Loader => "loading vulkan",
            PipelineStep::Instance => "creating instance",
            PipelineStep::PhysicalDevice => "selecting physical device",
            PipelineStep::Device => "creating device",
            PipelineStep::ShaderModule => "creating shader module",
            PipelineStep::DescriptorSetLayout => "creating descriptor set layout",
            PipelineStep::PipelineLayout => "creating pipeline layout",
            PipelineStep::Pipeline => "creating compute pipeline",
            PipelineStep::JitObject => "reading jit object",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        assert_eq!(Error::Parse(ParseError::Empty).exit_code(), 1);
        assert_eq!(Error::Metadata("missing LocalSize".into()).exit_code(), 1);
        assert_eq!(Error::NoComputeQueue.exit_code(), 2);
        assert_eq!(
            Error::Compile {
                tool: "glslangValidator".into(),
                diagnostics: "ERROR: 0:1: syntax error".into()
            }
            .exit_code(),
            2
        );
    }

    #[test]
    fn tool_diagnostics_are_verbatim() {
        let err = Error::Compile {
            tool: "glslangValidator".into(),
            diagnostics: "ERROR: 0:3: 'foo' : undeclared identifier\n".into(),
        };
        assert!(err.to_string().ends_with("ERROR: 0:3: 'foo' : undeclared identifier\n"));
    }
}
