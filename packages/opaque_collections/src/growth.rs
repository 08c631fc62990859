use std::num::NonZero;

use crate::{Error, Result};

/// Returns the capacity to allocate for a request of `requested` elements: the smallest
/// power of two that is at least `max(1, requested)`.
///
/// Every container in the crate grows through this function, so growth always doubles
/// or jumps straight to the next power of two that fits, never by a fixed increment.
pub(crate) fn capacity_for(requested: usize) -> Result<NonZero<usize>> {
    requested
        .max(1)
        .checked_next_power_of_two()
        .and_then(NonZero::new)
        .ok_or(Error::AllocationFailure {
            requested_bytes: usize::MAX,
        })
}

/// Maximum number of entries a hash table of the given capacity may hold, which is
/// `floor(capacity * 3 / 4)`.
///
/// Computed as `capacity - ceil(capacity / 4)` so that it cannot overflow.
#[must_use]
pub(crate) fn load_limit(capacity: NonZero<usize>) -> usize {
    capacity
        .get()
        .wrapping_sub(capacity.get().div_ceil(MAX_LOAD_DENOMINATOR))
}

/// Load factor denominator. Together with the formula in [`load_limit()`] this pins the
/// maximum load factor at 3/4.
const MAX_LOAD_DENOMINATOR: usize = 4;

/// Number of bytes occupied by `count` elements of `stride` bytes each.
pub(crate) fn byte_len(stride: NonZero<usize>, count: usize) -> Result<usize> {
    stride
        .get()
        .checked_mul(count)
        .ok_or(Error::AllocationFailure {
            requested_bytes: usize::MAX,
        })
}

/// Byte offset of the element at `index`, for an index already known to be in bounds
/// of an existing allocation (which means the multiplication cannot overflow).
#[must_use]
#[inline]
pub(crate) fn offset_of(stride: NonZero<usize>, index: usize) -> usize {
    // Cannot overflow because that would imply the buffer extends beyond virtual memory.
    stride.get().wrapping_mul(index)
}
