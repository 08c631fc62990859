use std::fmt;
use std::marker::PhantomData;

use bytemuck::Pod;

use crate::element::{check_stride, stride_of};
use crate::{Error, RawSlab, Result};

/// A growable list of `T` stored in a [`RawSlab`].
///
/// This is a typed view: every operation forwards to the stride-erased slab, converting
/// values to and from their byte representation. Elements must be [`Pod`] so that any stored
/// byte pattern is a valid `T`.
///
/// # Examples
///
/// ```
/// use opaque_collections::List;
///
/// let mut list = List::<u32>::new()?;
///
/// list.push(10)?;
/// list.push(30)?;
/// list.insert(1, 20)?;
///
/// assert_eq!(list.as_slice(), &[10, 20, 30]);
/// assert_eq!(list.remove(0)?, 10);
/// assert_eq!(list.get(1)?, 30);
/// # Ok::<(), opaque_collections::Error>(())
/// ```
///
/// Element types aligned to more than [`BUFFER_ALIGNMENT`][crate::BUFFER_ALIGNMENT] bytes
/// cannot be stored, not even by re-typing an existing slab of matching stride:
///
/// ```compile_fail
/// use opaque_collections::{List, RawSlab};
/// use new_zealand::nz;
///
/// #[derive(Clone, Copy, bytemuck::Zeroable, bytemuck::Pod)]
/// #[repr(C, align(32))]
/// struct Wide([u8; 32]);
///
/// let slab = RawSlab::new(nz!(32), 4).unwrap();
/// let _list = List::<Wide>::from_raw(slab);
/// ```
pub struct List<T> {
    slab: RawSlab,
    _element: PhantomData<T>,
}

impl<T: Pod> List<T> {
    /// Creates an empty list with room for one element.
    pub fn new() -> Result<Self> {
        Self::with_capacity(1)
    }

    /// Creates an empty list with room for at least `capacity` elements.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Ok(Self {
            slab: RawSlab::new(stride_of::<T>(), capacity)?,
            _element: PhantomData,
        })
    }

    /// Views an existing slab as a list of `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if the slab stride differs from the size of `T`.
    pub fn from_raw(slab: RawSlab) -> Result<Self> {
        check_stride::<T>(slab.stride().get())?;

        Ok(Self {
            slab,
            _element: PhantomData,
        })
    }

    /// Releases the typed view, returning the underlying slab.
    #[must_use]
    pub fn into_raw(self) -> RawSlab {
        self.slab
    }

    /// The underlying storage engine.
    #[must_use]
    pub fn as_raw(&self) -> &RawSlab {
        &self.slab
    }

    /// Number of elements in the list.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.slab.len()
    }

    /// Whether the list holds no elements.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slab.is_empty()
    }

    /// Number of elements the list can hold without reallocating.
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slab.capacity()
    }

    /// Appends a value to the end of the list.
    pub fn push(&mut self, value: T) -> Result<()> {
        self.slab.append(bytemuck::bytes_of(&value))
    }

    /// Appends all values of the slice, growing at most once.
    pub fn extend_from_slice(&mut self, values: &[T]) -> Result<()> {
        self.slab.append_range(bytemuck::cast_slice(values))
    }

    /// Inserts a value at `index`, shifting later elements to the right.
    pub fn insert(&mut self, index: usize, value: T) -> Result<()> {
        self.slab.insert(index, bytemuck::bytes_of(&value))
    }

    /// Removes and returns the value at `index`, shifting later elements to the left.
    pub fn remove(&mut self, index: usize) -> Result<T> {
        let value = self.get(index)?;
        self.slab.remove_at(index)?;
        Ok(value)
    }

    /// Removes and returns the value at `index`, replacing it with the last element.
    pub fn swap_remove(&mut self, index: usize) -> Result<T> {
        let value = self.get(index)?;
        self.slab.remove_at_swap(index)?;
        Ok(value)
    }

    /// Removes and returns the last value, or `None` if the list is empty.
    pub fn pop(&mut self) -> Option<T> {
        self.slab.pop_last().ok().map(bytemuck::pod_read_unaligned)
    }

    /// Returns the value at `index`.
    pub fn get(&self, index: usize) -> Result<T> {
        self.slab.get(index).map(bytemuck::pod_read_unaligned)
    }

    /// Overwrites the value at `index`.
    pub fn set(&mut self, index: usize, value: T) -> Result<()> {
        self.slab.set(index, bytemuck::bytes_of(&value))
    }

    /// Returns the value at `index` without bounds checking.
    ///
    /// The bounds check is only performed in debug builds.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `index < self.len()`.
    #[must_use]
    pub unsafe fn get_unchecked(&self, index: usize) -> T {
        // SAFETY: Forwarding the bounds requirement to the caller.
        bytemuck::pod_read_unaligned(unsafe { self.slab.get_unchecked(index) })
    }

    /// The elements as a slice, in order.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        bytemuck::cast_slice(self.slab.as_bytes())
    }

    /// Mutable counterpart of [`as_slice()`](Self::as_slice).
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        bytemuck::cast_slice_mut(self.slab.as_bytes_mut())
    }

    /// Iterates over the elements in order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    /// Returns the first value.
    pub fn first(&self) -> Result<T> {
        self.get(0).map_err(|_| Error::EmptyContainer)
    }

    /// Returns the last value.
    pub fn last(&self) -> Result<T> {
        self.slab.last().map(bytemuck::pod_read_unaligned)
    }

    /// Removes all elements, retaining the capacity.
    pub fn clear(&mut self) {
        self.slab.clear();
    }

    /// Removes all elements and makes sure the capacity is at least `min_capacity`.
    pub fn clear_with_capacity(&mut self, min_capacity: usize) -> Result<()> {
        self.slab.clear_with_capacity(min_capacity)
    }

    /// Makes sure `additional` more elements fit without reallocating.
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        self.slab.reserve(additional)
    }

    /// Shrinks the capacity to the smallest power of two that holds the elements.
    pub fn shrink_to_fit(&mut self) -> Result<()> {
        self.slab.shrink_to_fit()
    }

    /// Creates an independent deep copy of the list.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            slab: self.slab.try_clone()?,
            _element: PhantomData,
        })
    }
}

impl<'a, T: Pod> IntoIterator for &'a List<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: Pod + fmt::Debug> fmt::Debug for List<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use new_zealand::nz;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(List<u64>: Send, fmt::Debug);
    assert_not_impl_any!(List<u64>: Sync, Clone);

    #[test]
    fn push_insert_remove() {
        let mut list = List::<u64>::new().unwrap();

        list.extend_from_slice(&[1, 2, 3, 4]).unwrap();
        list.insert(0, 0).unwrap();
        assert_eq!(list.as_slice(), &[0, 1, 2, 3, 4]);

        assert_eq!(list.remove(2).unwrap(), 2);
        assert_eq!(list.swap_remove(0).unwrap(), 0);
        assert_eq!(list.as_slice(), &[4, 1, 3]);

        assert_eq!(list.pop(), Some(3));
        assert_eq!(list.len(), 2);
        assert_eq!(list.capacity(), 8);
    }

    #[test]
    fn failures_leave_list_untouched() {
        let mut list = List::<u16>::with_capacity(4).unwrap();
        list.push(5).unwrap();

        assert_eq!(
            list.remove(1),
            Err(Error::IndexOutOfRange { index: 1, len: 1 })
        );
        assert_eq!(
            list.insert(3, 9),
            Err(Error::IndexOutOfRange { index: 3, len: 1 })
        );
        assert_eq!(list.as_slice(), &[5]);

        list.clear();
        assert_eq!(list.first(), Err(Error::EmptyContainer));
        assert_eq!(list.last(), Err(Error::EmptyContainer));
        assert_eq!(list.pop(), None);
    }

    #[test]
    fn mutable_slice_writes_through() {
        let mut list = List::<u32>::new().unwrap();
        list.extend_from_slice(&[1, 2, 3]).unwrap();

        for value in list.as_mut_slice() {
            *value *= 10;
        }
        list.set(0, 7).unwrap();

        assert_eq!(list.iter().copied().collect::<Vec<_>>(), vec![7, 20, 30]);
        assert_eq!(format!("{list:?}"), "[7, 20, 30]");
    }

    #[test]
    fn raw_round_trip_checks_stride() {
        let mut slab = RawSlab::new(nz!(4), 2).unwrap();
        slab.append(&9_u32.to_ne_bytes()).unwrap();

        let list = List::<u32>::from_raw(slab).unwrap();
        assert_eq!(list.get(0).unwrap(), 9);

        let slab = list.into_raw();
        assert_eq!(
            List::<u64>::from_raw(slab).err(),
            Some(Error::TypeMismatch {
                expected_stride: 4,
                actual_size: 8
            })
        );
    }

    #[test]
    fn get_unchecked_in_bounds() {
        let mut list = List::<i8>::new().unwrap();
        list.push(-3).unwrap();

        // SAFETY: Index 0 is in bounds.
        assert_eq!(unsafe { list.get_unchecked(0) }, -3);
    }

    #[test]
    fn try_clone_and_shrink() {
        let mut list = List::<u8>::with_capacity(64).unwrap();
        list.extend_from_slice(&[1, 2, 3]).unwrap();

        let copy = list.try_clone().unwrap();
        list.shrink_to_fit().unwrap();
        list.push(4).unwrap();

        assert_eq!(list.capacity(), 4);
        assert_eq!(copy.as_slice(), &[1, 2, 3]);
        assert_eq!(copy.capacity(), 64);
    }
}
