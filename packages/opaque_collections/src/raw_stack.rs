use std::num::NonZero;
use std::slice::ChunksExact;

use crate::{RawSlab, Result};

/// A last-in-first-out stack of fixed-size elements addressed by a stride.
///
/// The live region is always the first [`len()`](Self::len) elements of the underlying
/// [`RawSlab`], with the top of the stack at the highest index. Pushing onto a full stack
/// doubles its capacity.
///
/// # Examples
///
/// ```
/// use std::num::NonZero;
///
/// use opaque_collections::RawStack;
///
/// let mut stack = RawStack::new(NonZero::new(1).unwrap(), 1)?;
///
/// stack.push(&[1])?;
/// stack.push_range(&[2, 3])?;
///
/// assert_eq!(stack.peek()?, &[3]);
/// assert_eq!(stack.pop()?, &[3]);
/// assert_eq!(stack.as_bytes(), &[1, 2]);
/// # Ok::<(), opaque_collections::Error>(())
/// ```
#[derive(Debug)]
pub struct RawStack {
    slab: RawSlab,
}

impl RawStack {
    /// Creates an empty stack with room for at least `initial_capacity` elements.
    pub fn new(stride: NonZero<usize>, initial_capacity: usize) -> Result<Self> {
        Ok(Self {
            slab: RawSlab::new(stride, initial_capacity)?,
        })
    }

    /// Size of one element in bytes.
    #[must_use]
    #[inline]
    pub fn stride(&self) -> NonZero<usize> {
        self.slab.stride()
    }

    /// Number of elements on the stack.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.slab.len()
    }

    /// Whether the stack holds no elements.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slab.is_empty()
    }

    /// Number of elements the stack can hold without reallocating.
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slab.capacity()
    }

    /// Pushes one element onto the top of the stack.
    pub fn push(&mut self, element: &[u8]) -> Result<()> {
        self.slab.append(element)
    }

    /// Pushes a packed run of elements, the last of which ends up on top.
    ///
    /// Grows at most once, straight to the next power of two that fits.
    pub fn push_range(&mut self, elements: &[u8]) -> Result<()> {
        self.slab.append_range(elements)
    }

    /// Removes the top element and returns its bytes.
    ///
    /// The returned bytes remain valid until the stack is next mutated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyContainer`][crate::Error::EmptyContainer] if the stack is empty.
    pub fn pop(&mut self) -> Result<&[u8]> {
        self.slab.pop_last()
    }

    /// Returns the bytes of the top element without removing it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyContainer`][crate::Error::EmptyContainer] if the stack is empty.
    pub fn peek(&self) -> Result<&[u8]> {
        self.slab.last()
    }

    /// Removes all elements, retaining the capacity.
    pub fn clear(&mut self) {
        self.slab.clear();
    }

    /// Removes all elements and makes sure the capacity is at least `min_capacity`.
    pub fn clear_with_capacity(&mut self, min_capacity: usize) -> Result<()> {
        self.slab.clear_with_capacity(min_capacity)
    }

    /// The live elements, bottom first, as one packed byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.slab.as_bytes()
    }

    /// Iterates over the elements from the bottom of the stack to the top.
    pub fn iter(&self) -> ChunksExact<'_, u8> {
        self.slab.iter()
    }

    /// Creates an independent deep copy of the stack.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            slab: self.slab.try_clone()?,
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::indexing_slicing,
    reason = "test code doesn't need the same rigor as production code"
)]
mod tests {
    use new_zealand::nz;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::Error;

    assert_impl_all!(RawStack: Send, std::fmt::Debug);
    assert_not_impl_any!(RawStack: Sync);

    #[test]
    fn push_doubles_capacity_when_full() {
        let mut stack = RawStack::new(nz!(1), 1).unwrap();
        let mut capacities = Vec::new();

        for value in 1..=5_u8 {
            stack.push(&[value]).unwrap();
            capacities.push(stack.capacity());
        }

        assert_eq!(capacities, vec![1, 2, 4, 4, 8]);

        stack.push_range(&[6, 7, 8, 9, 10]).unwrap();
        assert_eq!(stack.capacity(), 16);
        assert_eq!(stack.len(), 10);

        let mut popped = Vec::new();
        while let Ok(bytes) = stack.pop() {
            popped.push(bytes[0]);
        }

        assert_eq!(popped, vec![10, 9, 8, 7, 6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn pop_and_peek_on_empty_fail() {
        let mut stack = RawStack::new(nz!(2), 4).unwrap();

        assert_eq!(stack.pop(), Err(Error::EmptyContainer));
        assert_eq!(stack.peek(), Err(Error::EmptyContainer));

        stack.push(&[1, 1]).unwrap();
        assert_eq!(stack.peek().unwrap(), &[1, 1]);
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn clear_variants() {
        let mut stack = RawStack::new(nz!(1), 1).unwrap();
        stack.push_range(&[1, 2, 3]).unwrap();

        stack.clear();
        assert!(stack.is_empty());
        assert_eq!(stack.capacity(), 4);

        stack.clear_with_capacity(5).unwrap();
        assert_eq!(stack.capacity(), 8);

        stack.clear_with_capacity(2).unwrap();
        assert_eq!(stack.capacity(), 8);
    }

    #[test]
    fn iter_runs_bottom_to_top() {
        let mut stack = RawStack::new(nz!(1), 1).unwrap();
        stack.push_range(&[4, 5, 6]).unwrap();

        let seen: Vec<u8> = stack.iter().map(|bytes| bytes[0]).collect();
        assert_eq!(seen, vec![4, 5, 6]);

        let copy = stack.try_clone().unwrap();
        stack.clear();
        assert_eq!(copy.as_bytes(), &[4, 5, 6]);
    }
}
