mod abi;
mod hash;
mod layout;

pub use abi::*;
pub use hash::ContentHash;
pub use layout::{Descriptor, DescriptorKind, DescriptorSetLayout, ParseError};
