use bytemuck::Pod;
use picocompute_core::{BufferDescriptor, ImageDescriptor};
use std::{
    alloc::{Layout, alloc_zeroed, dealloc, handle_alloc_error},
    fmt,
    ptr::{NonNull, null_mut},
    slice,
};

const ALIGN: usize = 16;

/// A zero initialized, 16 byte aligned block of memory bound to programs as a storage buffer.
pub struct Buffer {
    ptr: NonNull<u8>,
    size: usize,
}

/// An RGBA8 image with rows packed at `width * 4` bytes.
pub struct Image {
    buffer: Buffer,
    width: usize,
    height: usize,
}

unsafe impl Send for Buffer {}
unsafe impl Sync for Buffer {}

impl Buffer {
    pub fn new(size: usize) -> Self {
        assert!(
            size <= i32::MAX as usize,
            "buffer size {} does not fit a descriptor (max {})",
            size,
            i32::MAX
        );

        let layout = Self::layout(size);

        // SAFETY: the layout is never zero sized
        let ptr = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).unwrap_or_else(|| handle_alloc_error(layout));

        Self { ptr, size }
    }

    fn layout(size: usize) -> Layout {
        Layout::from_size_align(size.max(1), ALIGN).expect("buffer layout")
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn data(&self) -> &[u8] {
        // SAFETY: the allocation holds `size` initialized bytes
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.size) }
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        // SAFETY: the allocation holds `size` initialized bytes and `self` is borrowed mutably
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.size) }
    }

    /// Views the contents as a slice of `T`. Panics if the size is not a multiple of `size_of::<T>()`.
    pub fn as_slice<T: Pod>(&self) -> &[T] {
        bytemuck::cast_slice(self.data())
    }

    pub fn as_slice_mut<T: Pod>(&mut self) -> &mut [T] {
        bytemuck::cast_slice_mut(self.data_mut())
    }

    /// Descriptor pointing at this buffer. It must not outlive the buffer.
    pub fn descriptor(&mut self) -> BufferDescriptor {
        BufferDescriptor {
            ptr: self.ptr.as_ptr(),
            size_in_bytes: self.size as i32,
            robustness_size: self.size as i32,
        }
    }

    pub fn free(self) {
        drop(self);
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        // SAFETY: allocated in `Buffer::new` with the same layout
        unsafe { dealloc(self.ptr.as_ptr(), Self::layout(self.size)) };
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer").field("size", &self.size).finish()
    }
}

impl Image {
    pub fn new_rgba(width: usize, height: usize) -> Self {
        let size = width
            .checked_mul(height)
            .and_then(|x| x.checked_mul(4))
            .expect("image size overflows");

        Self {
            buffer: Buffer::new(size),
            width,
            height,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.width * 4
    }

    pub fn data(&self) -> &[u8] {
        self.buffer.data()
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.buffer.data_mut()
    }

    pub fn pixel(&self, x: usize, y: usize) -> [u8; 4] {
        assert!(x < self.width && y < self.height, "pixel ({}, {}) is out of bounds", x, y);
        let offset = y * self.stride() + x * 4;
        let mut rgba = [0; 4];
        rgba.copy_from_slice(&self.data()[offset..offset + 4]);
        rgba
    }

    /// Descriptor pointing at this image. It must not outlive the image.
    pub fn descriptor(&mut self) -> ImageDescriptor {
        let row = self.stride() as i32;
        let slice = row * self.height as i32;

        ImageDescriptor {
            ptr: self.buffer.as_mut_ptr(),
            width: self.width as i32,
            height: self.height as i32,
            depth: 1,
            row_pitch_bytes: row,
            slice_pitch_bytes: slice,
            sample_pitch_bytes: slice,
            sample_count: 1,
            size_in_bytes: slice,
            stencil_ptr: null_mut(),
            stencil_row_pitch_bytes: 0,
            stencil_slice_pitch_bytes: 0,
            stencil_sample_pitch_bytes: 0,
            memory_owner: null_mut(),
        }
    }

    pub fn free(self) {
        drop(self);
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}
