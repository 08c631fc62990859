use std::alloc::{Layout, alloc_zeroed, dealloc, realloc};
use std::ptr::NonNull;
use std::{fmt, slice};

use crate::{Error, Result};

/// Alignment of every buffer handed out by [`RawBuffer`].
///
/// Elements are stored tightly packed at multiples of their stride, so any element type whose
/// alignment does not exceed this value is correctly aligned in every slot.
pub const BUFFER_ALIGNMENT: usize = 16;

/// An exclusively owned, untyped, zero-initialized heap buffer.
///
/// This is the allocation primitive underneath every container in the crate. The buffer is
/// released exactly once, when the handle is dropped. Moving the handle moves ownership;
/// there is no implicit aliasing and copies are made with [`try_clone()`](Self::try_clone).
///
/// All bytes of the buffer are always initialized. Fresh allocations are zero-filled and
/// growth zero-fills the newly exposed tail, which is what makes the safe byte views sound.
pub(crate) struct RawBuffer {
    ptr: NonNull<u8>,

    /// Number of usable bytes. The underlying allocation is never smaller than one byte,
    /// so an empty buffer still owns a real (if tiny) allocation.
    len: usize,
}

impl RawBuffer {
    /// Allocates a zero-filled buffer of `len` bytes.
    pub(crate) fn allocate(len: usize) -> Result<Self> {
        let layout = Self::layout_for(len)?;

        // SAFETY: layout_for() never returns a zero-sized layout.
        let ptr = unsafe { alloc_zeroed(layout) };

        let ptr = NonNull::new(ptr).ok_or(Error::AllocationFailure {
            requested_bytes: len,
        })?;

        Ok(Self { ptr, len })
    }

    /// Changes the size of the buffer, preserving the first `min(old, new)` bytes.
    ///
    /// Bytes beyond the old length are zero-filled. On failure the buffer is unchanged.
    pub(crate) fn resize(&mut self, new_len: usize) -> Result<()> {
        if new_len == self.len {
            return Ok(());
        }

        let old_layout = Self::layout_for(self.len)?;
        let new_layout = Self::layout_for(new_len)?;

        // SAFETY: The pointer was allocated by the global allocator with old_layout, the new
        // size is non-zero and was validated by layout_for() not to overflow isize when rounded.
        let ptr = unsafe { realloc(self.ptr.as_ptr(), old_layout, new_layout.size()) };

        // On failure realloc() leaves the original block untouched, so we simply report it.
        self.ptr = NonNull::new(ptr).ok_or(Error::AllocationFailure {
            requested_bytes: new_len,
        })?;

        let old_len = self.len;
        self.len = new_len;

        if new_len > old_len {
            self.zero(old_len, new_len.wrapping_sub(old_len));
        }

        Ok(())
    }

    /// Creates an independent copy of this buffer with identical contents.
    pub(crate) fn try_clone(&self) -> Result<Self> {
        let mut copy = Self::allocate(self.len)?;
        copy.as_bytes_mut().copy_from_slice(self.as_bytes());
        Ok(copy)
    }

    #[must_use]
    pub(crate) fn as_bytes(&self) -> &[u8] {
        // SAFETY: The pointer is valid for `len` bytes for as long as we live, all bytes are
        // initialized (see type-level docs) and the shared borrow of self prevents mutation.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    #[must_use]
    pub(crate) fn as_bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: As in as_bytes(), plus the exclusive borrow of self guarantees uniqueness.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Copies `len` bytes starting at `src` to `dst` within the same buffer.
    /// The ranges may overlap.
    ///
    /// # Panics
    ///
    /// Panics if either range extends beyond the end of the buffer.
    pub(crate) fn copy_within(&mut self, src: usize, dst: usize, len: usize) {
        let src_end = src.checked_add(len).expect("source range overflows usize");
        self.as_bytes_mut().copy_within(src..src_end, dst);
    }

    /// Overwrites `len` bytes starting at `offset` with `bytes`.
    ///
    /// # Panics
    ///
    /// Panics if the range extends beyond the end of the buffer.
    pub(crate) fn write(&mut self, offset: usize, bytes: &[u8]) {
        let end = offset
            .checked_add(bytes.len())
            .expect("destination range overflows usize");

        self.as_bytes_mut()
            .get_mut(offset..end)
            .expect("write range must be within the buffer")
            .copy_from_slice(bytes);
    }

    /// Returns `len` bytes starting at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the range extends beyond the end of the buffer.
    #[must_use]
    pub(crate) fn read(&self, offset: usize, len: usize) -> &[u8] {
        let end = offset.checked_add(len).expect("read range overflows usize");

        self.as_bytes()
            .get(offset..end)
            .expect("read range must be within the buffer")
    }

    /// Mutable counterpart of [`read()`](Self::read).
    #[must_use]
    pub(crate) fn read_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        let end = offset.checked_add(len).expect("read range overflows usize");

        self.as_bytes_mut()
            .get_mut(offset..end)
            .expect("read range must be within the buffer")
    }

    /// Zero-fills `len` bytes starting at `offset`.
    pub(crate) fn zero(&mut self, offset: usize, len: usize) {
        self.read_mut(offset, len).fill(0);
    }

    fn layout_for(len: usize) -> Result<Layout> {
        Layout::from_size_align(len.max(1), BUFFER_ALIGNMENT).map_err(|_layout_error| {
            Error::AllocationFailure {
                requested_bytes: len,
            }
        })
    }
}

impl Drop for RawBuffer {
    fn drop(&mut self) {
        let layout = Self::layout_for(self.len)
            .expect("layout was validated when the buffer was allocated or resized");

        // SAFETY: We allocated this block with exactly this layout (allocate() and resize()
        // keep len in sync with the allocation) and it has not been released before.
        unsafe {
            dealloc(self.ptr.as_ptr(), layout);
        }
    }
}

impl fmt::Debug for RawBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawBuffer")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

// SAFETY: The buffer exclusively owns its allocation and hands out access only through
// borrows of itself, so moving it to another thread moves the only path to the memory.
unsafe impl Send for RawBuffer {}
