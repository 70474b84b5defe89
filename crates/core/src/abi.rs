//! Binary contract between compiled programs and the runtime.
//!
//! Every type here is `#[repr(C)]` and mirrors a declaration in `abi.h` or `runtime.h`.
//! Changing a layout here without changing the headers (or the other way around)
//! breaks every compiled program.

use crate::ContentHash;
use std::{
    ffi::c_void,
    fmt,
    ptr::{null, null_mut},
};

pub const MAX_BOUND_DESCRIPTOR_SETS: usize = 4;
pub const MAX_DESCRIPTOR_SET_COMBINED_BUFFERS_DYNAMIC: usize = 12;
pub const MAX_DESCRIPTOR_DYNAMIC_OFFSETS: usize = MAX_BOUND_DESCRIPTOR_SETS * MAX_DESCRIPTOR_SET_COMBINED_BUFFERS_DYNAMIC;
pub const MAX_PUSH_CONSTANT_SIZE: usize = 128;

/// Number of invocations a single coroutine lane group covers.
pub const SIMD_WIDTH: u32 = 4;

/// `abi.h`, copied verbatim next to every compiled program.
pub const ABI_H: &str = include_str!("../include/abi.h");

/// `runtime.h`, copied verbatim next to every compiled program.
pub const RUNTIME_H: &str = include_str!("../include/runtime.h");

/// Opaque handle to a suspended (or finished) invocation group.
pub type Coroutine = *mut c_void;

/// Reason a coroutine suspended. Only control barriers exist for now.
pub type YieldResult = i32;

pub const YIELD_CONTROL_BARRIER: YieldResult = 0;

/// Creates a coroutine for `subgroup_count` invocation groups of one workgroup, starting at `first_subgroup`.
pub type CoroutineBegin = unsafe extern "C" fn(
    data: *mut ProgramData,
    workgroup_x: i32,
    workgroup_y: i32,
    workgroup_z: i32,
    workgroup_memory: *mut c_void,
    first_subgroup: i32,
    subgroup_count: i32,
) -> Coroutine;

/// Resumes a coroutine. Returns `true` while it is suspended and `false` once it has finished.
pub type CoroutineAwait = unsafe extern "C" fn(coroutine: Coroutine, result: *mut YieldResult) -> bool;

/// Releases a coroutine created by [`CoroutineBegin`].
pub type CoroutineDestroy = unsafe extern "C" fn(coroutine: Coroutine);

/// A storage buffer binding.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug)]
pub struct BufferDescriptor {
    pub ptr: *mut u8,
    pub size_in_bytes: i32,
    pub robustness_size: i32,
}

/// A storage image binding.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug)]
pub struct ImageDescriptor {
    pub ptr: *mut u8,
    pub width: i32,
    pub height: i32,
    pub depth: i32,
    pub row_pitch_bytes: i32,
    pub slice_pitch_bytes: i32,
    pub sample_pitch_bytes: i32,
    pub sample_count: i32,
    pub size_in_bytes: i32,

    pub stencil_ptr: *mut u8,
    pub stencil_row_pitch_bytes: i32,
    pub stencil_slice_pitch_bytes: i32,
    pub stencil_sample_pitch_bytes: i32,

    pub memory_owner: *mut c_void,
}

/// Per dispatch constants handed to every coroutine.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ProgramData {
    pub descriptor_sets: [*mut u8; MAX_BOUND_DESCRIPTOR_SETS],
    pub descriptor_dynamic_offsets: [u32; MAX_DESCRIPTOR_DYNAMIC_OFFSETS],
    pub num_workgroups: [u32; 4],
    pub workgroup_size: [u32; 4],
    pub invocations_per_subgroup: u32,
    pub subgroups_per_workgroup: u32,
    pub invocations_per_workgroup: u32,
    pub push_constants: [u8; MAX_PUSH_CONSTANT_SIZE],
    pub constants: *const c_void,
}

/// Metadata of a compiled program, emitted as `<name>_program_info`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ProgramInfo {
    pub has_cbarriers: bool,
    pub min_memory_size: usize,
    pub desc_set_size: usize,
    pub workgroup_size_x: i32,
    pub workgroup_size_y: i32,
    pub workgroup_size_z: i32,
    pub begin: CoroutineBegin,
    pub await_: CoroutineAwait,
    pub destroy: CoroutineDestroy,
    pub content_hash: ContentHash,
}

/// A program as seen by the host: its native metadata (if the platform has any)
/// and the content hash the host expects that metadata to carry.
#[derive(Clone, Copy)]
pub struct Program<'a> {
    info: Option<&'a ProgramInfo>,
    expected_hash: ContentHash,
}

/// A `#[repr(C)]` struct made of [`BufferDescriptor`]s and [`ImageDescriptor`]s in binding order.
///
/// # Safety
/// The implementor must have exactly the layout the compiled program expects for descriptor set 0.
pub unsafe trait DescriptorSet {
    fn as_mut_ptr(&mut self) -> *mut u8
    where
        Self: Sized,
    {
        self as *mut Self as *mut u8
    }
}

impl Default for BufferDescriptor {
    fn default() -> Self {
        Self {
            ptr: null_mut(),
            size_in_bytes: 0,
            robustness_size: 0,
        }
    }
}

impl Default for ImageDescriptor {
    fn default() -> Self {
        Self {
            ptr: null_mut(),
            width: 0,
            height: 0,
            depth: 0,
            row_pitch_bytes: 0,
            slice_pitch_bytes: 0,
            sample_pitch_bytes: 0,
            sample_count: 0,
            size_in_bytes: 0,
            stencil_ptr: null_mut(),
            stencil_row_pitch_bytes: 0,
            stencil_slice_pitch_bytes: 0,
            stencil_sample_pitch_bytes: 0,
            memory_owner: null_mut(),
        }
    }
}

impl BufferDescriptor {
    pub fn is_bound(&self) -> bool {
        !self.ptr.is_null()
    }

    /// Number of whole `T` elements in the buffer.
    pub fn len<T>(&self) -> usize {
        self.size_in_bytes.max(0) as usize / size_of::<T>()
    }

    /// # Safety
    /// The descriptor must point at live memory of `size_in_bytes` bytes
    /// and nothing may be writing element `index` concurrently.
    pub unsafe fn read<T: Copy>(&self, index: usize) -> T {
        assert!(index < self.len::<T>(), "buffer read out of bounds: {}", index);
        unsafe { self.ptr.cast::<T>().add(index).read_unaligned() }
    }

    /// # Safety
    /// The descriptor must point at live memory of `size_in_bytes` bytes
    /// and nothing may be accessing element `index` concurrently.
    pub unsafe fn write<T: Copy>(&self, index: usize, value: T) {
        assert!(index < self.len::<T>(), "buffer write out of bounds: {}", index);
        unsafe { self.ptr.cast::<T>().add(index).write_unaligned(value) }
    }
}

impl ImageDescriptor {
    pub fn is_bound(&self) -> bool {
        !self.ptr.is_null()
    }

    fn pixel_offset(&self, x: i32, y: i32) -> usize {
        assert!(
            (0..self.width).contains(&x) && (0..self.height).contains(&y),
            "pixel ({}, {}) is out of bounds",
            x,
            y
        );
        y as usize * self.row_pitch_bytes as usize + x as usize * 4
    }

    /// # Safety
    /// The descriptor must describe a live RGBA8 image.
    pub unsafe fn read_pixel(&self, x: i32, y: i32) -> [u8; 4] {
        let offset = self.pixel_offset(x, y);
        unsafe { self.ptr.add(offset).cast::<[u8; 4]>().read() }
    }

    /// # Safety
    /// The descriptor must describe a live RGBA8 image and nothing may be accessing the pixel concurrently.
    pub unsafe fn write_pixel(&self, x: i32, y: i32, rgba: [u8; 4]) {
        let offset = self.pixel_offset(x, y);
        unsafe { self.ptr.add(offset).cast::<[u8; 4]>().write(rgba) }
    }
}

impl Default for ProgramData {
    fn default() -> Self {
        Self {
            descriptor_sets: [null_mut(); MAX_BOUND_DESCRIPTOR_SETS],
            descriptor_dynamic_offsets: [0; MAX_DESCRIPTOR_DYNAMIC_OFFSETS],
            num_workgroups: [0; 4],
            workgroup_size: [0; 4],
            invocations_per_subgroup: 0,
            subgroups_per_workgroup: 0,
            invocations_per_workgroup: 0,
            push_constants: [0; MAX_PUSH_CONSTANT_SIZE],
            constants: null(),
        }
    }
}

impl ProgramInfo {
    /// Workgroup size, or `None` if any dimension is not positive.
    pub fn workgroup_size(&self) -> Option<[u32; 3]> {
        let size = [self.workgroup_size_x, self.workgroup_size_y, self.workgroup_size_z];
        if size.iter().all(|&x| x > 0) {
            Some(size.map(|x| x as u32))
        } else {
            None
        }
    }
}

impl fmt::Debug for ProgramInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgramInfo")
            .field("has_cbarriers", &self.has_cbarriers)
            .field("min_memory_size", &self.min_memory_size)
            .field("desc_set_size", &self.desc_set_size)
            .field(
                "workgroup_size",
                &[self.workgroup_size_x, self.workgroup_size_y, self.workgroup_size_z],
            )
            .field("content_hash", &self.content_hash)
            .finish_non_exhaustive()
    }
}

impl<'a> Program<'a> {
    /// A program backed by native metadata.
    pub const fn new(info: &'a ProgramInfo, expected_hash: ContentHash) -> Self {
        Self {
            info: Some(info),
            expected_hash,
        }
    }

    /// A program for a platform without native support.
    pub const fn unsupported() -> Self {
        Self {
            info: None,
            expected_hash: ContentHash::EMPTY,
        }
    }

    pub fn info(&self) -> Option<&'a ProgramInfo> {
        self.info
    }

    pub fn expected_hash(&self) -> ContentHash {
        self.expected_hash
    }

    pub fn is_supported(&self) -> bool {
        self.info.is_some()
    }
}

impl fmt::Debug for Program<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("info", &self.info)
            .field("expected_hash", &self.expected_hash)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, offset_of, size_of};

    #[test]
    fn descriptor_layouts() {
        assert_eq!(align_of::<BufferDescriptor>(), 16);
        assert_eq!(align_of::<ImageDescriptor>(), 16);
        assert_eq!(size_of::<BufferDescriptor>() % 16, 0);
        assert_eq!(size_of::<ImageDescriptor>() % 16, 0);

        #[cfg(target_pointer_width = "64")]
        {
            assert_eq!(size_of::<BufferDescriptor>(), 16);
            assert_eq!(offset_of!(ImageDescriptor, stencil_ptr), 40);
            assert_eq!(size_of::<ImageDescriptor>(), 80);
        }
    }

    #[test]
    fn program_data_layout() {
        assert_eq!(offset_of!(ProgramData, descriptor_sets), 0);
        assert_eq!(
            offset_of!(ProgramData, num_workgroups),
            offset_of!(ProgramData, descriptor_dynamic_offsets) + MAX_DESCRIPTOR_DYNAMIC_OFFSETS * 4
        );
        assert_eq!(
            offset_of!(ProgramData, push_constants),
            offset_of!(ProgramData, invocations_per_workgroup) + 4
        );
    }

    #[test]
    fn descriptor_access() {
        let mut words = [0u32; 4];
        let buffer = BufferDescriptor {
            ptr: words.as_mut_ptr() as *mut u8,
            size_in_bytes: 16,
            robustness_size: 16,
        };

        assert_eq!(buffer.len::<u32>(), 4);
        unsafe {
            buffer.write(2, 0xdead_u32);
            assert_eq!(buffer.read::<u32>(2), 0xdead);
        }
        assert_eq!(words, [0, 0, 0xdead, 0]);

        let mut pixels = [0u8; 2 * 2 * 4];
        let image = ImageDescriptor {
            ptr: pixels.as_mut_ptr(),
            width: 2,
            height: 2,
            row_pitch_bytes: 8,
            ..Default::default()
        };

        unsafe { image.write_pixel(1, 1, [9, 8, 7, 6]) };
        assert_eq!(unsafe { image.read_pixel(1, 1) }, [9, 8, 7, 6]);
        assert_eq!(&pixels[12..], &[9, 8, 7, 6]);
    }

    #[test]
    #[should_panic]
    fn buffer_read_out_of_bounds() {
        let mut word = 0u32;
        let buffer = BufferDescriptor {
            ptr: &mut word as *mut u32 as *mut u8,
            size_in_bytes: 4,
            robustness_size: 4,
        };
        unsafe { buffer.read::<u32>(1) };
    }

    #[test]
    fn headers_agree_on_constants() {
        assert!(ABI_H.contains(&format!("#define MAX_BOUND_DESCRIPTOR_SETS {}", MAX_BOUND_DESCRIPTOR_SETS)));
        assert!(ABI_H.contains(&format!("#define MAX_PUSH_CONSTANT_SIZE {}", MAX_PUSH_CONSTANT_SIZE)));
        assert!(ABI_H.contains(&format!("#define SIMD_WIDTH {}", SIMD_WIDTH)));
        assert!(RUNTIME_H.contains(&format!("#define CONTENT_HASH_SIZE {}", ContentHash::SIZE)));
    }
}
