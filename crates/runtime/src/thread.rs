use crate::Buffer;
use bumpalo::Bump;
use picocompute_core::ProgramData;
use std::{ffi::c_void, ptr::null_mut};

/// Scratch state of one worker thread.
///
/// Holds a private copy of the program data, the workgroup memory shared by the coroutines
/// of the workgroup currently running, and an arena for the coroutine list.
/// A context is never used by two dispatches at the same time.
pub struct ThreadContext {
    pub(crate) data: ProgramData,
    pub(crate) arena: Bump,
    memory: Option<Buffer>,
}

// SAFETY: the raw pointers in `data` refer to the descriptor set of the dispatch,
// which outlives every use of this context within that dispatch
unsafe impl Send for ThreadContext {}

impl ThreadContext {
    pub fn new() -> Self {
        Self {
            data: ProgramData::default(),
            arena: Bump::new(),
            memory: None,
        }
    }

    /// Workgroup memory of at least `size` bytes, grown if the previous program needed less.
    pub(crate) fn workgroup_memory(&mut self, size: usize) -> *mut c_void {
        if self.memory.as_ref().is_none_or(|memory| memory.len() < size) {
            self.memory = Some(Buffer::new(size));
        }

        self.memory
            .as_mut()
            .map_or(null_mut(), |memory| memory.as_mut_ptr() as *mut c_void)
    }

    pub fn free(self) {
        drop(self);
    }
}

impl Default for ThreadContext {
    fn default() -> Self {
        Self::new()
    }
}
