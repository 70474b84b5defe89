//! Run Vulkan-style compute shaders on the CPU.
//!
//! Programs are compiled offline by `picocompute-compile` into native objects exposing a
//! coroutine per workgroup, or written in Rust as a [`Kernel`]. Either way they are run by a
//! [`DispatchContext`] that spreads the workgroup grid over a fixed number of threads.

pub use picocompute_core::*;
#[cfg(feature = "derive")]
pub use picocompute_derive::DescriptorSet;
pub use picocompute_runtime::*;
