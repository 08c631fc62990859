use std::num::NonZero;
use std::slice::ChunksExact;

use tracing::trace;

use crate::growth::{byte_len, capacity_for, offset_of};
use crate::{Error, RawBuffer, Result};

/// A growable buffer of fixed-size elements addressed by a stride, without knowledge of the
/// element type.
///
/// This is the storage engine beneath [`List<T>`][crate::List] and [`Stack<T>`][crate::Stack].
/// Elements are passed in and out as byte slices of exactly `stride` bytes and are stored
/// tightly packed, with no padding between elements.
///
/// Capacity is always a power of two and only grows, unless explicitly shrunk via
/// [`shrink_to_fit()`](Self::shrink_to_fit). Growth jumps straight to the next power of two
/// that fits the request.
///
/// # Panics
///
/// Methods that accept element bytes panic if the byte slice length does not match the stride
/// (or, for ranges, is not a multiple of it). This is a programming error, not a runtime
/// condition, and is therefore not reported via [`Error`].
///
/// # Examples
///
/// ```
/// use std::num::NonZero;
///
/// use opaque_collections::RawSlab;
///
/// let mut slab = RawSlab::new(NonZero::new(4).unwrap(), 1)?;
///
/// slab.append(&1_u32.to_ne_bytes())?;
/// slab.append(&3_u32.to_ne_bytes())?;
/// slab.insert(1, &2_u32.to_ne_bytes())?;
///
/// assert_eq!(slab.len(), 3);
/// assert_eq!(slab.capacity(), 4);
/// assert_eq!(slab.get(1)?, &2_u32.to_ne_bytes());
/// # Ok::<(), opaque_collections::Error>(())
/// ```
#[derive(Debug)]
pub struct RawSlab {
    stride: NonZero<usize>,

    /// Number of live elements, always `<= capacity`.
    count: usize,

    capacity: NonZero<usize>,

    /// Exactly `stride * capacity` bytes. Bytes past `stride * count` are stale or zero.
    buffer: RawBuffer,
}

impl RawSlab {
    /// Creates an empty slab able to hold at least `initial_capacity` elements of
    /// `stride` bytes before reallocating.
    ///
    /// The capacity is rounded up to a power of two, with a minimum of 1.
    pub fn new(stride: NonZero<usize>, initial_capacity: usize) -> Result<Self> {
        let capacity = capacity_for(initial_capacity)?;

        Ok(Self {
            stride,
            count: 0,
            capacity,
            buffer: RawBuffer::allocate(byte_len(stride, capacity.get())?)?,
        })
    }

    /// Size of one element in bytes.
    #[must_use]
    #[inline]
    pub fn stride(&self) -> NonZero<usize> {
        self.stride
    }

    /// Number of live elements.
    #[must_use]
    #[inline]
    #[cfg_attr(test, mutants::skip)] // Can be mutated to infinitely growing memory use and/or infinite loop.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether the slab holds no elements.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of elements the slab can hold without reallocating. Always a power of two.
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Makes sure the slab can hold `needed` elements without reallocating.
    ///
    /// If growth is required, the new capacity is the next power of two that is at least
    /// `needed`. Live elements are copied to the new buffer and the old buffer is released.
    pub fn ensure_capacity(&mut self, needed: usize) -> Result<()> {
        if needed <= self.capacity.get() {
            return Ok(());
        }

        self.reallocate(capacity_for(needed)?)
    }

    /// Ensures there is room for `additional` more elements beyond the current length.
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        self.ensure_capacity(self.required_len(additional)?)
    }

    /// Appends one element to the end of the slab.
    pub fn append(&mut self, element: &[u8]) -> Result<()> {
        self.assert_element(element);

        let new_count = self.required_len(1)?;
        self.ensure_capacity(new_count)?;

        self.buffer
            .write(offset_of(self.stride, self.count), element);
        self.count = new_count;

        Ok(())
    }

    /// Appends a packed run of elements to the end of the slab.
    ///
    /// # Panics
    ///
    /// Panics if the length of `elements` is not a multiple of the stride.
    pub fn append_range(&mut self, elements: &[u8]) -> Result<()> {
        assert!(
            elements.len().rem_euclid(self.stride.get()) == 0,
            "element range of {} bytes is not a multiple of the stride {}",
            elements.len(),
            self.stride
        );

        let added = elements.len().div_euclid(self.stride.get());
        let new_count = self.required_len(added)?;
        self.ensure_capacity(new_count)?;

        self.buffer
            .write(offset_of(self.stride, self.count), elements);
        self.count = new_count;

        Ok(())
    }

    /// Inserts an element at `index`, shifting all later elements one position to the right.
    ///
    /// `index` may be equal to the length, in which case this is an append.
    /// Takes time proportional to the number of shifted elements.
    pub fn insert(&mut self, index: usize, element: &[u8]) -> Result<()> {
        self.assert_element(element);

        if index > self.count {
            return Err(Error::IndexOutOfRange {
                index,
                len: self.count,
            });
        }

        let new_count = self.required_len(1)?;
        self.ensure_capacity(new_count)?;

        let offset = offset_of(self.stride, index);
        let shifted_bytes = offset_of(self.stride, self.count.wrapping_sub(index));

        self.buffer.copy_within(
            offset,
            offset.wrapping_add(self.stride.get()),
            shifted_bytes,
        );
        self.buffer.write(offset, element);
        self.count = new_count;

        Ok(())
    }

    /// Removes the element at `index`, shifting all later elements one position to the left.
    ///
    /// Preserves the order of the remaining elements. Takes time proportional to the number
    /// of shifted elements.
    pub fn remove_at(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;

        let offset = offset_of(self.stride, index);
        let next_offset = offset.wrapping_add(self.stride.get());
        let shifted_bytes = offset_of(
            self.stride,
            self.count.wrapping_sub(index).wrapping_sub(1),
        );

        self.buffer.copy_within(next_offset, offset, shifted_bytes);
        self.count = self.count.wrapping_sub(1);

        Ok(())
    }

    /// Removes the element at `index` by overwriting it with the last element.
    ///
    /// Takes constant time but does not preserve the order of the remaining elements.
    pub fn remove_at_swap(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;

        let last = self.count.wrapping_sub(1);

        if index != last {
            self.buffer.copy_within(
                offset_of(self.stride, last),
                offset_of(self.stride, index),
                self.stride.get(),
            );
        }

        self.count = last;

        Ok(())
    }

    /// Removes the last element and returns its bytes.
    ///
    /// The returned bytes remain valid until the slab is next mutated.
    pub fn pop_last(&mut self) -> Result<&[u8]> {
        let Some(last) = self.count.checked_sub(1) else {
            return Err(Error::EmptyContainer);
        };

        self.count = last;

        Ok(self
            .buffer
            .read(offset_of(self.stride, last), self.stride.get()))
    }

    /// Returns the bytes of the last element without removing it.
    pub fn last(&self) -> Result<&[u8]> {
        let last = self.count.checked_sub(1).ok_or(Error::EmptyContainer)?;
        self.get(last)
    }

    /// Returns the bytes of the element at `index`.
    pub fn get(&self, index: usize) -> Result<&[u8]> {
        self.check_index(index)?;

        Ok(self
            .buffer
            .read(offset_of(self.stride, index), self.stride.get()))
    }

    /// Returns the bytes of the element at `index` for in-place modification.
    pub fn get_mut(&mut self, index: usize) -> Result<&mut [u8]> {
        self.check_index(index)?;

        Ok(self
            .buffer
            .read_mut(offset_of(self.stride, index), self.stride.get()))
    }

    /// Overwrites the element at `index`.
    pub fn set(&mut self, index: usize, element: &[u8]) -> Result<()> {
        self.assert_element(element);
        self.get_mut(index)?.copy_from_slice(element);
        Ok(())
    }

    /// Returns the bytes of the element at `index` without bounds checking.
    ///
    /// The bounds check is only performed in debug builds.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `index < self.len()`.
    #[must_use]
    pub unsafe fn get_unchecked(&self, index: usize) -> &[u8] {
        debug_assert!(
            index < self.count,
            "get_unchecked({index}) out of range for slab of length {}",
            self.count
        );

        let offset = offset_of(self.stride, index);

        // SAFETY: The caller guarantees index < count <= capacity, so the element range lies
        // within the buffer of stride * capacity bytes.
        unsafe {
            self.buffer
                .as_bytes()
                .get_unchecked(offset..offset.wrapping_add(self.stride.get()))
        }
    }

    /// The live elements `[0, len)` as one packed byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.buffer.read(0, offset_of(self.stride, self.count))
    }

    /// Mutable counterpart of [`as_bytes()`](Self::as_bytes).
    #[must_use]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        let len = offset_of(self.stride, self.count);
        self.buffer.read_mut(0, len)
    }

    /// Iterates over the live elements in order, one stride-sized byte slice per element.
    pub fn iter(&self) -> ChunksExact<'_, u8> {
        self.as_bytes().chunks_exact(self.stride.get())
    }

    /// Removes all elements. Capacity is retained and buffer contents are left as they are.
    pub fn clear(&mut self) {
        self.count = 0;
    }

    /// Removes all elements and zero-fills the entire buffer.
    pub fn clear_zeroed(&mut self) {
        self.count = 0;
        self.buffer.as_bytes_mut().fill(0);
    }

    /// Removes all elements and makes sure the capacity is at least `min_capacity`.
    ///
    /// Never shrinks the buffer.
    pub fn clear_with_capacity(&mut self, min_capacity: usize) -> Result<()> {
        if min_capacity > self.capacity.get() {
            let capacity = capacity_for(min_capacity)?;

            // There is nothing to preserve, so a fresh buffer is all we need.
            self.buffer = RawBuffer::allocate(byte_len(self.stride, capacity.get())?)?;
            self.capacity = capacity;
        }

        self.count = 0;
        Ok(())
    }

    /// Shrinks the capacity to the smallest power of two that holds the live elements.
    pub fn shrink_to_fit(&mut self) -> Result<()> {
        let capacity = capacity_for(self.count)?;

        if capacity < self.capacity {
            self.reallocate(capacity)?;
        }

        Ok(())
    }

    /// Creates an independent deep copy of the slab with identical capacity and contents.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            stride: self.stride,
            count: self.count,
            capacity: self.capacity,
            buffer: self.buffer.try_clone()?,
        })
    }

    /// Resizes the buffer to the given capacity. The live elements are a prefix of the
    /// buffer, so they survive the resize in place.
    fn reallocate(&mut self, capacity: NonZero<usize>) -> Result<()> {
        debug_assert!(capacity.get() >= self.count);

        self.buffer.resize(byte_len(self.stride, capacity.get())?)?;

        trace!(
            stride = self.stride.get(),
            old_capacity = self.capacity.get(),
            new_capacity = capacity.get(),
            len = self.count,
            "slab reallocated"
        );

        self.capacity = capacity;

        Ok(())
    }

    fn required_len(&self, additional: usize) -> Result<usize> {
        self.count
            .checked_add(additional)
            .ok_or(Error::AllocationFailure {
                requested_bytes: usize::MAX,
            })
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.count {
            Ok(())
        } else {
            Err(Error::IndexOutOfRange {
                index,
                len: self.count,
            })
        }
    }

    fn assert_element(&self, element: &[u8]) {
        assert_eq!(
            element.len(),
            self.stride.get(),
            "element of {} bytes does not match the slab stride {}",
            element.len(),
            self.stride
        );
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    reason = "test code doesn't need the same rigor as production code"
)]
mod tests {
    use new_zealand::nz;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(RawSlab: Send, std::fmt::Debug);
    assert_not_impl_any!(RawSlab: Sync, Clone);

    fn element(value: u32) -> [u8; 4] {
        value.to_ne_bytes()
    }

    fn values(slab: &RawSlab) -> Vec<u32> {
        slab.iter()
            .map(|bytes| u32::from_ne_bytes(bytes.try_into().unwrap()))
            .collect()
    }

    #[test]
    fn smoke_test() {
        let mut slab = RawSlab::new(nz!(4), 3).unwrap();
        assert_eq!(slab.capacity(), 4);
        assert!(slab.is_empty());

        slab.append(&element(10)).unwrap();
        slab.append(&element(30)).unwrap();
        slab.insert(1, &element(20)).unwrap();

        assert_eq!(values(&slab), vec![10, 20, 30]);
        assert_eq!(slab.get(2).unwrap(), &element(30));
        assert_eq!(slab.last().unwrap(), &element(30));

        slab.set(0, &element(11)).unwrap();
        assert_eq!(values(&slab), vec![11, 20, 30]);
    }

    #[test]
    fn zero_initial_capacity_is_rounded_to_one() {
        let slab = RawSlab::new(nz!(8), 0).unwrap();
        assert_eq!(slab.capacity(), 1);
    }

    #[test]
    fn growth_is_power_of_two() {
        let mut slab = RawSlab::new(nz!(4), 1).unwrap();
        let mut observed = Vec::new();

        for value in 0..9 {
            slab.append(&element(value)).unwrap();
            observed.push(slab.capacity());
        }

        assert_eq!(observed, vec![1, 2, 4, 4, 8, 8, 8, 8, 16]);
        assert_eq!(values(&slab), (0..9).collect::<Vec<_>>());
    }

    #[test]
    fn ensure_capacity_jumps_to_fitting_power() {
        let mut slab = RawSlab::new(nz!(2), 2).unwrap();
        slab.append(&[1, 2]).unwrap();

        slab.ensure_capacity(100).unwrap();
        assert_eq!(slab.capacity(), 128);
        assert_eq!(slab.get(0).unwrap(), &[1, 2]);

        // Smaller requests never shrink.
        slab.ensure_capacity(3).unwrap();
        assert_eq!(slab.capacity(), 128);
    }

    #[test]
    fn insert_at_bounds() {
        let mut slab = RawSlab::new(nz!(4), 1).unwrap();

        slab.insert(0, &element(2)).unwrap();
        slab.insert(0, &element(1)).unwrap();
        slab.insert(2, &element(3)).unwrap();

        assert_eq!(values(&slab), vec![1, 2, 3]);

        assert_eq!(
            slab.insert(4, &element(9)),
            Err(Error::IndexOutOfRange { index: 4, len: 3 })
        );
        assert_eq!(values(&slab), vec![1, 2, 3]);
    }

    #[test]
    fn remove_at_preserves_order() {
        let mut slab = RawSlab::new(nz!(4), 8).unwrap();
        for value in 0..5 {
            slab.append(&element(value)).unwrap();
        }

        slab.remove_at(1).unwrap();
        assert_eq!(values(&slab), vec![0, 2, 3, 4]);

        slab.remove_at(3).unwrap();
        assert_eq!(values(&slab), vec![0, 2, 3]);

        assert_eq!(
            slab.remove_at(3),
            Err(Error::IndexOutOfRange { index: 3, len: 3 })
        );
    }

    #[test]
    fn remove_at_swap_moves_last() {
        let mut slab = RawSlab::new(nz!(4), 8).unwrap();
        for value in 0..5 {
            slab.append(&element(value)).unwrap();
        }

        slab.remove_at_swap(1).unwrap();
        assert_eq!(values(&slab), vec![0, 4, 2, 3]);

        slab.remove_at_swap(3).unwrap();
        assert_eq!(values(&slab), vec![0, 4, 2]);

        let mut empty = RawSlab::new(nz!(4), 1).unwrap();
        assert_eq!(
            empty.remove_at_swap(0),
            Err(Error::IndexOutOfRange { index: 0, len: 0 })
        );
    }

    #[test]
    fn pop_last_returns_bytes() {
        let mut slab = RawSlab::new(nz!(4), 2).unwrap();
        slab.append(&element(5)).unwrap();
        slab.append(&element(6)).unwrap();

        assert_eq!(slab.pop_last().unwrap(), &element(6));
        assert_eq!(slab.pop_last().unwrap(), &element(5));
        assert_eq!(slab.pop_last(), Err(Error::EmptyContainer));
        assert_eq!(slab.last(), Err(Error::EmptyContainer));
    }

    #[test]
    fn append_range_packs_elements() {
        let mut slab = RawSlab::new(nz!(2), 1).unwrap();
        slab.append(&[0, 0]).unwrap();
        slab.append_range(&[1, 1, 2, 2, 3, 3]).unwrap();

        assert_eq!(slab.len(), 4);
        assert_eq!(slab.capacity(), 4);
        assert_eq!(slab.as_bytes(), &[0, 0, 1, 1, 2, 2, 3, 3]);
    }

    #[test]
    #[should_panic]
    fn append_range_rejects_partial_element() {
        let mut slab = RawSlab::new(nz!(2), 1).unwrap();
        _ = slab.append_range(&[1, 1, 2]);
    }

    #[test]
    #[should_panic]
    fn append_rejects_wrong_size() {
        let mut slab = RawSlab::new(nz!(4), 1).unwrap();
        _ = slab.append(&[1, 2]);
    }

    #[test]
    fn clear_keeps_capacity() {
        let mut slab = RawSlab::new(nz!(4), 1).unwrap();
        for value in 0..5 {
            slab.append(&element(value)).unwrap();
        }

        slab.clear();
        assert!(slab.is_empty());
        assert_eq!(slab.capacity(), 8);
    }

    #[test]
    fn clear_with_capacity_only_grows() {
        let mut slab = RawSlab::new(nz!(4), 4).unwrap();
        slab.append(&element(1)).unwrap();

        slab.clear_with_capacity(2).unwrap();
        assert_eq!(slab.capacity(), 4);
        assert!(slab.is_empty());

        slab.clear_with_capacity(9).unwrap();
        assert_eq!(slab.capacity(), 16);
        assert!(slab.is_empty());
    }

    #[test]
    fn clear_zeroed_wipes_buffer() {
        let mut slab = RawSlab::new(nz!(1), 4).unwrap();
        slab.append_range(&[9, 9, 9]).unwrap();

        slab.clear();
        assert_eq!(slab.buffer.as_bytes(), &[9, 9, 9, 0]);

        slab.clear_zeroed();
        assert!(slab.is_empty());
        assert_eq!(slab.buffer.as_bytes(), &[0, 0, 0, 0]);
    }

    #[test]
    fn shrink_to_fit_reduces_to_power_of_two() {
        let mut slab = RawSlab::new(nz!(4), 64).unwrap();
        for value in 0..5 {
            slab.append(&element(value)).unwrap();
        }

        slab.shrink_to_fit().unwrap();
        assert_eq!(slab.capacity(), 8);
        assert_eq!(values(&slab), vec![0, 1, 2, 3, 4]);

        slab.clear();
        slab.shrink_to_fit().unwrap();
        assert_eq!(slab.capacity(), 1);
    }

    #[test]
    fn try_clone_is_independent() {
        let mut original = RawSlab::new(nz!(4), 2).unwrap();
        original.append(&element(1)).unwrap();

        let copy = original.try_clone().unwrap();
        original.set(0, &element(2)).unwrap();
        original.append(&element(3)).unwrap();

        assert_eq!(values(&copy), vec![1]);
        assert_eq!(values(&original), vec![2, 3]);
    }

    #[test]
    fn get_unchecked_reads_element() {
        let mut slab = RawSlab::new(nz!(4), 2).unwrap();
        slab.append(&element(77)).unwrap();

        // SAFETY: Index 0 is in bounds.
        let bytes = unsafe { slab.get_unchecked(0) };
        assert_eq!(bytes, &element(77));
    }

    #[test]
    fn get_mut_modifies_in_place() {
        let mut slab = RawSlab::new(nz!(4), 2).unwrap();
        slab.append(&element(1)).unwrap();

        slab.get_mut(0).unwrap().copy_from_slice(&element(42));
        assert_eq!(values(&slab), vec![42]);

        assert!(slab.get_mut(1).is_err());
    }
}
