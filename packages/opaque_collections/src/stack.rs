use std::fmt;
use std::marker::PhantomData;

use bytemuck::Pod;

use crate::element::{check_stride, stride_of};
use crate::{RawStack, Result};

/// A last-in-first-out stack of `T` stored in a [`RawStack`].
///
/// # Examples
///
/// ```
/// use opaque_collections::Stack;
///
/// let mut stack = Stack::<i64>::new()?;
///
/// stack.push(1)?;
/// stack.push(2)?;
///
/// assert_eq!(stack.peek()?, 2);
/// assert_eq!(stack.pop()?, 2);
/// assert_eq!(stack.pop()?, 1);
/// assert!(stack.pop().is_err());
/// # Ok::<(), opaque_collections::Error>(())
/// ```
pub struct Stack<T> {
    inner: RawStack,
    _element: PhantomData<T>,
}

impl<T: Pod> Stack<T> {
    /// Creates an empty stack with room for one element.
    pub fn new() -> Result<Self> {
        Self::with_capacity(1)
    }

    /// Creates an empty stack with room for at least `capacity` elements.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Ok(Self {
            inner: RawStack::new(stride_of::<T>(), capacity)?,
            _element: PhantomData,
        })
    }

    /// Views an existing raw stack as a stack of `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`][crate::Error::TypeMismatch] if the stride differs from
    /// the size of `T`.
    pub fn from_raw(inner: RawStack) -> Result<Self> {
        check_stride::<T>(inner.stride().get())?;

        Ok(Self {
            inner,
            _element: PhantomData,
        })
    }

    /// Releases the typed view, returning the underlying storage engine.
    #[must_use]
    pub fn into_raw(self) -> RawStack {
        self.inner
    }

    /// Number of elements in the stack.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the stack holds no elements.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Number of elements the stack can hold without reallocating.
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Pushes a value onto the top of the stack.
    pub fn push(&mut self, value: T) -> Result<()> {
        self.inner.push(bytemuck::bytes_of(&value))
    }

    /// Pushes all values of the slice in order, so the last one ends up on top.
    pub fn push_slice(&mut self, values: &[T]) -> Result<()> {
        self.inner.push_range(bytemuck::cast_slice(values))
    }

    /// Removes and returns the top value.
    pub fn pop(&mut self) -> Result<T> {
        self.inner.pop().map(bytemuck::pod_read_unaligned)
    }

    /// Returns the top value without removing it.
    pub fn peek(&self) -> Result<T> {
        self.inner.peek().map(bytemuck::pod_read_unaligned)
    }

    /// The stacked values, bottom first.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        bytemuck::cast_slice(self.inner.as_bytes())
    }

    /// Iterates from the bottom of the stack to the top.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    /// Removes all elements, retaining the capacity.
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Removes all elements and makes sure the capacity is at least `min_capacity`.
    pub fn clear_with_capacity(&mut self, min_capacity: usize) -> Result<()> {
        self.inner.clear_with_capacity(min_capacity)
    }

    /// Creates an independent deep copy of the stack.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            inner: self.inner.try_clone()?,
            _element: PhantomData,
        })
    }
}

impl<T: Pod + fmt::Debug> fmt::Debug for Stack<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use new_zealand::nz;
    use static_assertions::assert_impl_all;

    use super::*;
    use crate::Error;

    assert_impl_all!(Stack<u32>: Send, fmt::Debug);

    #[test]
    fn lifo_order_across_growth() {
        let mut stack = Stack::<u32>::new().unwrap();

        for value in 1..=10 {
            stack.push(value).unwrap();
        }

        assert_eq!(stack.capacity(), 16);

        for expected in (1..=10).rev() {
            assert_eq!(stack.pop().unwrap(), expected);
        }

        assert_eq!(stack.pop(), Err(Error::EmptyContainer));
        assert_eq!(stack.peek(), Err(Error::EmptyContainer));
    }

    #[test]
    fn push_slice_keeps_last_on_top() {
        let mut stack = Stack::<u16>::with_capacity(2).unwrap();

        stack.push_slice(&[4, 5, 6]).unwrap();

        assert_eq!(stack.peek().unwrap(), 6);
        assert_eq!(stack.as_slice(), &[4, 5, 6]);
        assert_eq!(format!("{stack:?}"), "[4, 5, 6]");
    }

    #[test]
    fn from_raw_rejects_wrong_stride() {
        let raw = RawStack::new(nz!(2), 1).unwrap();

        assert!(matches!(
            Stack::<u32>::from_raw(raw),
            Err(Error::TypeMismatch {
                expected_stride: 2,
                actual_size: 4
            })
        ));
    }

    #[test]
    fn clone_is_independent() {
        let mut stack = Stack::<u8>::new().unwrap();
        stack.push(1).unwrap();

        let mut copy = stack.try_clone().unwrap();
        copy.push(2).unwrap();
        stack.clear();

        assert!(stack.is_empty());
        assert_eq!(copy.as_slice(), &[1, 2]);
    }
}
