use picocompute_core::ContentHash;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("program is not supported on this platform")]
    Unsupported,

    #[error("program content hash mismatch: expected {expected}, found {found}")]
    HashMismatch { expected: ContentHash, found: ContentHash },

    #[error("thread count must be positive")]
    InvalidThreadCount,

    #[error("invalid dispatch grid {x}x{y}x{z}")]
    InvalidGrid { x: u32, y: u32, z: u32 },

    #[error("invalid workgroup size {size:?}")]
    InvalidWorkgroupSize { size: [i32; 3] },

    #[error("descriptor set is {found} bytes, program expects {expected}")]
    DescriptorSetSize { expected: usize, found: usize },

    #[error("dispatch context is not prepared")]
    NotPrepared,

    #[error("subgroup {index} is out of range for {threads} threads")]
    SubgroupOutOfRange { index: usize, threads: usize },

    #[error("subgroup {index} was already dispatched")]
    AlreadyDispatched { index: usize },

    #[error("dispatch still has {remaining} subgroups in flight")]
    Incomplete { remaining: usize },

    #[error("index {index} is out of range for binding {binding} with {count} descriptors")]
    BindingIndex { binding: u32, index: usize, count: usize },
}
