use std::fmt;
use std::marker::PhantomData;

use bytemuck::Pod;

use crate::element::{check_stride, stride_of};
use crate::{RawQueue, Result};

/// A first-in-first-out queue of `T` stored in a [`RawQueue`].
///
/// # Examples
///
/// ```
/// use opaque_collections::Queue;
///
/// let mut queue = Queue::<u8>::new()?;
///
/// queue.enqueue(b'a')?;
/// queue.enqueue(b'b')?;
///
/// assert_eq!(queue.dequeue()?, b'a');
/// assert_eq!(queue.peek()?, b'b');
/// # Ok::<(), opaque_collections::Error>(())
/// ```
pub struct Queue<T> {
    inner: RawQueue,
    _element: PhantomData<T>,
}

impl<T: Pod> Queue<T> {
    /// Creates an empty queue with room for one element.
    pub fn new() -> Result<Self> {
        Self::with_capacity(1)
    }

    /// Creates an empty queue with room for at least `capacity` elements.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Ok(Self {
            inner: RawQueue::new(stride_of::<T>(), capacity)?,
            _element: PhantomData,
        })
    }

    /// Views an existing raw queue as a queue of `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`][crate::Error::TypeMismatch] if the stride differs from
    /// the size of `T`.
    pub fn from_raw(inner: RawQueue) -> Result<Self> {
        check_stride::<T>(inner.stride().get())?;

        Ok(Self {
            inner,
            _element: PhantomData,
        })
    }

    /// Releases the typed view, returning the underlying storage engine.
    #[must_use]
    pub fn into_raw(self) -> RawQueue {
        self.inner
    }

    /// Number of elements in the queue.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the queue holds no elements.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Number of elements the queue can hold without reallocating.
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Adds a value at the back of the queue.
    pub fn enqueue(&mut self, value: T) -> Result<()> {
        self.inner.enqueue(bytemuck::bytes_of(&value))
    }

    /// Removes and returns the value at the front of the queue.
    pub fn dequeue(&mut self) -> Result<T> {
        self.inner.dequeue().map(bytemuck::pod_read_unaligned)
    }

    /// Returns the front value without removing it.
    pub fn peek(&self) -> Result<T> {
        self.inner.peek().map(bytemuck::pod_read_unaligned)
    }

    /// Returns the value `index` positions behind the front of the queue.
    pub fn get(&self, index: usize) -> Result<T> {
        self.inner.get(index).map(bytemuck::pod_read_unaligned)
    }

    /// Iterates over the queued values from front to back.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = T> + '_ {
        self.inner.iter().map(bytemuck::pod_read_unaligned)
    }

    /// Removes all elements, retaining the capacity.
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Removes all elements and makes sure the capacity is at least `min_capacity`.
    pub fn clear_with_capacity(&mut self, min_capacity: usize) -> Result<()> {
        self.inner.clear_with_capacity(min_capacity)
    }

    /// Creates an independent deep copy of the queue.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            inner: self.inner.try_clone()?,
            _element: PhantomData,
        })
    }
}

impl<T: Pod + fmt::Debug> fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::collections::VecDeque;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use static_assertions::assert_impl_all;

    use super::*;
    use crate::Error;

    assert_impl_all!(Queue<u64>: Send, fmt::Debug);

    #[test]
    fn fifo_across_wraparound_and_growth() {
        let mut queue = Queue::<u32>::with_capacity(4).unwrap();

        for value in 0..3 {
            queue.enqueue(value).unwrap();
        }
        assert_eq!(queue.dequeue().unwrap(), 0);
        assert_eq!(queue.dequeue().unwrap(), 1);

        // Writes wrap to the start of the buffer before the queue fills up and grows.
        for value in 3..8 {
            queue.enqueue(value).unwrap();
        }

        assert_eq!(queue.capacity(), 8);
        assert_eq!(queue.iter().collect::<Vec<_>>(), vec![2, 3, 4, 5, 6, 7]);
        assert_eq!(queue.get(5).unwrap(), 7);
        assert_eq!(format!("{queue:?}"), "[2, 3, 4, 5, 6, 7]");
    }

    #[test]
    fn empty_queue_errors() {
        let mut queue = Queue::<u16>::new().unwrap();

        assert_eq!(queue.dequeue(), Err(Error::EmptyContainer));
        assert_eq!(queue.peek(), Err(Error::EmptyContainer));
        assert_eq!(
            queue.get(0),
            Err(Error::IndexOutOfRange { index: 0, len: 0 })
        );
    }

    #[test]
    fn matches_vec_deque() {
        let mut rng = StdRng::seed_from_u64(0x51);
        let mut queue = Queue::<u64>::new().unwrap();
        let mut reference = VecDeque::new();

        for _ in 0..2_000 {
            if rng.random_bool(0.6) {
                let value: u64 = rng.random();
                queue.enqueue(value).unwrap();
                reference.push_back(value);
            } else {
                assert_eq!(queue.dequeue().ok(), reference.pop_front());
            }

            assert_eq!(queue.len(), reference.len());
        }

        assert!(queue.iter().eq(reference.iter().copied()));
    }

    #[test]
    fn from_raw_checks_stride() {
        let raw = RawQueue::new(stride_of::<u32>(), 2).unwrap();
        let queue = Queue::<[u8; 4]>::from_raw(raw).unwrap();

        assert!(Queue::<u8>::from_raw(queue.into_raw()).is_err());
    }
}
