use std::iter::FusedIterator;
use std::num::NonZero;

use tracing::{debug, trace};

use crate::growth::{byte_len, capacity_for, offset_of};
use crate::{Error, RawBuffer, Result};

/// A first-in-first-out queue of fixed-size elements in a circular buffer.
///
/// The queue keeps two ever-increasing cursors rather than raw indexes: the write cursor
/// advances on every enqueue and the read cursor on every dequeue. The number of queued
/// elements is their difference and an element's physical slot is its cursor modulo the
/// (power of two) capacity.
///
/// Enqueueing into a full queue doubles the capacity and relinearizes the buffer, copying the
/// queued elements to the start of the new buffer in order.
///
/// # Examples
///
/// ```
/// use std::num::NonZero;
///
/// use opaque_collections::RawQueue;
///
/// let mut queue = RawQueue::new(NonZero::new(2).unwrap(), 2)?;
///
/// queue.enqueue(&[1, 1])?;
/// queue.enqueue(&[2, 2])?;
/// queue.enqueue(&[3, 3])?;
///
/// assert_eq!(queue.capacity(), 4);
/// assert_eq!(queue.dequeue()?, &[1, 1]);
/// assert_eq!(queue.peek()?, &[2, 2]);
/// # Ok::<(), opaque_collections::Error>(())
/// ```
#[derive(Debug)]
pub struct RawQueue {
    stride: NonZero<usize>,
    capacity: NonZero<usize>,
    buffer: RawBuffer,

    /// Cursor of the next element to dequeue.
    rear: usize,

    /// Cursor of the next slot to enqueue into. Always `rear <= top <= rear + capacity`
    /// in wrapping arithmetic.
    top: usize,
}

impl RawQueue {
    /// Creates an empty queue with room for at least `initial_capacity` elements.
    pub fn new(stride: NonZero<usize>, initial_capacity: usize) -> Result<Self> {
        let capacity = capacity_for(initial_capacity)?;

        Ok(Self {
            stride,
            capacity,
            buffer: RawBuffer::allocate(byte_len(stride, capacity.get())?)?,
            rear: 0,
            top: 0,
        })
    }

    /// Size of one element in bytes.
    #[must_use]
    #[inline]
    pub fn stride(&self) -> NonZero<usize> {
        self.stride
    }

    /// Number of queued elements.
    #[must_use]
    #[inline]
    #[cfg_attr(test, mutants::skip)] // Can be mutated to infinitely growing memory use and/or infinite loop.
    pub fn len(&self) -> usize {
        self.top.wrapping_sub(self.rear)
    }

    /// Whether the queue holds no elements.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.top == self.rear
    }

    /// Number of elements the queue can hold without reallocating.
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Adds an element at the back of the queue.
    ///
    /// # Panics
    ///
    /// Panics if the element is not exactly `stride` bytes long.
    pub fn enqueue(&mut self, element: &[u8]) -> Result<()> {
        assert_eq!(
            element.len(),
            self.stride.get(),
            "element of {} bytes does not match the queue stride {}",
            element.len(),
            self.stride
        );

        if self.len() == self.capacity.get() {
            let doubled = self
                .capacity
                .get()
                .checked_add(self.capacity.get())
                .ok_or(Error::AllocationFailure {
                    requested_bytes: usize::MAX,
                })?;

            self.relinearize(capacity_for(doubled)?)?;
        }

        let offset = self.offset_of_cursor(self.top);
        self.buffer.write(offset, element);
        self.top = self.top.wrapping_add(1);

        Ok(())
    }

    /// Removes the element at the front of the queue and returns its bytes.
    ///
    /// The returned bytes remain valid until the queue is next mutated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyContainer`] if the queue is empty.
    pub fn dequeue(&mut self) -> Result<&[u8]> {
        if self.is_empty() {
            return Err(Error::EmptyContainer);
        }

        let offset = self.offset_of_cursor(self.rear);
        self.rear = self.rear.wrapping_add(1);

        Ok(self.buffer.read(offset, self.stride.get()))
    }

    /// Returns the bytes of the element at the front of the queue without removing it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyContainer`] if the queue is empty.
    pub fn peek(&self) -> Result<&[u8]> {
        if self.is_empty() {
            return Err(Error::EmptyContainer);
        }

        Ok(self
            .buffer
            .read(self.offset_of_cursor(self.rear), self.stride.get()))
    }

    /// Returns the bytes of the element `index` positions behind the front of the queue.
    pub fn get(&self, index: usize) -> Result<&[u8]> {
        if index >= self.len() {
            return Err(Error::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }

        let cursor = self.rear.wrapping_add(index);

        Ok(self
            .buffer
            .read(self.offset_of_cursor(cursor), self.stride.get()))
    }

    /// Removes all elements, retaining the capacity. Both cursors are reset to zero.
    pub fn clear(&mut self) {
        self.rear = 0;
        self.top = 0;
    }

    /// Removes all elements and makes sure the capacity is at least `min_capacity`.
    ///
    /// Never shrinks the buffer.
    pub fn clear_with_capacity(&mut self, min_capacity: usize) -> Result<()> {
        let capacity = capacity_for(min_capacity)?;

        if capacity > self.capacity {
            debug!(
                old_capacity = self.capacity.get(),
                new_capacity = capacity.get(),
                "queue reallocated on clear"
            );

            self.buffer = RawBuffer::allocate(byte_len(self.stride, capacity.get())?)?;
            self.capacity = capacity;
        }

        self.clear();
        Ok(())
    }

    /// Iterates over the queued elements from front to back.
    pub fn iter(&self) -> QueueIter<'_> {
        QueueIter {
            queue: self,
            cursor: self.rear,
            remaining: self.len(),
        }
    }

    /// Creates an independent deep copy of the queue with identical capacity and contents.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            stride: self.stride,
            capacity: self.capacity,
            buffer: self.buffer.try_clone()?,
            rear: self.rear,
            top: self.top,
        })
    }

    fn offset_of_cursor(&self, cursor: usize) -> usize {
        let slot = cursor & self.capacity.get().wrapping_sub(1);
        offset_of(self.stride, slot)
    }

    /// Moves the queued elements, in order, to the start of a new buffer of the given
    /// capacity and resets the cursors to `(0, len)`.
    fn relinearize(&mut self, capacity: NonZero<usize>) -> Result<()> {
        let len = self.len();
        debug_assert!(capacity.get() >= len);

        let mut buffer = RawBuffer::allocate(byte_len(self.stride, capacity.get())?)?;

        // The live range is at most two runs: from the read cursor to the end of the old
        // buffer, then from the start of the old buffer.
        let start = self.rear & self.capacity.get().wrapping_sub(1);
        let first_run = len.min(self.capacity.get().wrapping_sub(start));
        let second_run = len.wrapping_sub(first_run);

        let first_bytes = offset_of(self.stride, first_run);
        buffer.write(
            0,
            self.buffer.read(offset_of(self.stride, start), first_bytes),
        );
        buffer.write(
            first_bytes,
            self.buffer.read(0, offset_of(self.stride, second_run)),
        );

        trace!(
            stride = self.stride.get(),
            old_capacity = self.capacity.get(),
            new_capacity = capacity.get(),
            len,
            "queue relinearized"
        );

        self.buffer = buffer;
        self.capacity = capacity;
        self.rear = 0;
        self.top = len;

        Ok(())
    }
}

/// Iterator over the elements of a [`RawQueue`], from front to back.
///
/// Created by [`RawQueue::iter()`].
#[derive(Debug)]
pub struct QueueIter<'a> {
    queue: &'a RawQueue,
    cursor: usize,
    remaining: usize,
}

impl<'a> Iterator for QueueIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let offset = self.queue.offset_of_cursor(self.cursor);
        self.cursor = self.cursor.wrapping_add(1);
        self.remaining = self.remaining.wrapping_sub(1);

        Some(self.queue.buffer.read(offset, self.queue.stride.get()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for QueueIter<'_> {}

impl FusedIterator for QueueIter<'_> {}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation,
    reason = "test code doesn't need the same rigor as production code"
)]
mod tests {
    use std::collections::VecDeque;

    use new_zealand::nz;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(RawQueue: Send, std::fmt::Debug);
    assert_not_impl_any!(RawQueue: Sync, Clone);

    fn drain(queue: &mut RawQueue) -> Vec<u8> {
        let mut drained = Vec::new();
        while let Ok(bytes) = queue.dequeue() {
            drained.push(bytes[0]);
        }
        drained
    }

    #[test]
    fn fifo_order() {
        let mut queue = RawQueue::new(nz!(1), 4).unwrap();

        for value in 1..=3 {
            queue.enqueue(&[value]).unwrap();
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(drain(&mut queue), vec![1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn empty_queue_fails() {
        let mut queue = RawQueue::new(nz!(4), 1).unwrap();

        assert_eq!(queue.dequeue(), Err(Error::EmptyContainer));
        assert_eq!(queue.peek(), Err(Error::EmptyContainer));
        assert_eq!(
            queue.get(0),
            Err(Error::IndexOutOfRange { index: 0, len: 0 })
        );
    }

    #[test]
    fn growth_relinearizes_wrapped_contents() {
        let mut queue = RawQueue::new(nz!(1), 4).unwrap();

        // Advance the cursors so that the live range wraps around the end of the buffer.
        queue.enqueue(&[0]).unwrap();
        queue.enqueue(&[0]).unwrap();
        queue.enqueue(&[0]).unwrap();
        _ = queue.dequeue().unwrap();
        _ = queue.dequeue().unwrap();
        _ = queue.dequeue().unwrap();

        for value in 1..=4 {
            queue.enqueue(&[value]).unwrap();
        }
        assert_eq!(queue.capacity(), 4);
        assert_eq!(queue.rear, 3);

        // Full: the next enqueue doubles and relinearizes.
        queue.enqueue(&[5]).unwrap();

        assert_eq!(queue.capacity(), 8);
        assert_eq!(queue.rear, 0);
        assert_eq!(queue.top, 5);
        assert_eq!(queue.buffer.read(0, 5), &[1, 2, 3, 4, 5]);
        assert_eq!(drain(&mut queue), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn iter_and_get_follow_queue_order() {
        let mut queue = RawQueue::new(nz!(1), 2).unwrap();
        queue.enqueue(&[1]).unwrap();
        queue.enqueue(&[2]).unwrap();
        _ = queue.dequeue().unwrap();
        queue.enqueue(&[3]).unwrap();

        let seen: Vec<u8> = queue.iter().map(|bytes| bytes[0]).collect();
        assert_eq!(seen, vec![2, 3]);
        assert_eq!(queue.iter().len(), 2);
        assert_eq!(queue.get(1).unwrap(), &[3]);
        assert_eq!(queue.peek().unwrap(), &[2]);
    }

    #[test]
    fn clear_resets_cursors() {
        let mut queue = RawQueue::new(nz!(1), 2).unwrap();
        queue.enqueue(&[1]).unwrap();
        _ = queue.dequeue().unwrap();
        queue.enqueue(&[2]).unwrap();

        queue.clear();
        assert!(queue.is_empty());
        assert_eq!((queue.rear, queue.top), (0, 0));

        queue.clear_with_capacity(10).unwrap();
        assert_eq!(queue.capacity(), 16);

        queue.clear_with_capacity(1).unwrap();
        assert_eq!(queue.capacity(), 16);
    }

    #[test]
    fn matches_reference_deque() {
        let mut queue = RawQueue::new(nz!(2), 1).unwrap();
        let mut reference = VecDeque::new();

        for step in 0..500_u32 {
            if step % 3 == 2 {
                let expected = reference.pop_front();
                let actual = queue
                    .dequeue()
                    .ok()
                    .map(|bytes| u16::from_ne_bytes(bytes.try_into().unwrap()));
                assert_eq!(actual, expected);
            } else {
                let value = step as u16;
                queue.enqueue(&value.to_ne_bytes()).unwrap();
                reference.push_back(value);
            }

            assert_eq!(queue.len(), reference.len());
            assert!(queue.capacity().is_power_of_two());
        }

        let remaining: Vec<u16> = queue
            .iter()
            .map(|bytes| u16::from_ne_bytes(bytes.try_into().unwrap()))
            .collect();
        assert_eq!(remaining, reference.into_iter().collect::<Vec<_>>());
    }

    #[test]
    fn try_clone_is_independent() {
        let mut original = RawQueue::new(nz!(1), 2).unwrap();
        original.enqueue(&[7]).unwrap();

        let copy = original.try_clone().unwrap();
        _ = original.dequeue().unwrap();

        assert_eq!(copy.peek().unwrap(), &[7]);
        assert!(original.is_empty());
    }
}
