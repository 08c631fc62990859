use std::num::NonZero;

use crate::{KeyHasher, RawProbeTable, Result};

/// Builder for creating an instance of [`RawProbeTable`].
///
/// The key stride is mandatory and is set with either `.key_stride()` or
/// `.key_size_of::<K>()`. Everything else is optional: the value stride defaults to zero
/// (a key-only table), the initial capacity to a single slot and the hasher to
/// [`BytesHasher`][crate::BytesHasher].
///
/// # Examples
///
/// ```
/// use opaque_collections::RawProbeTable;
///
/// let table = RawProbeTable::builder()
///     .key_size_of::<u64>()
///     .value_size_of::<[u8; 3]>()
///     .capacity(10)
///     .build()?;
///
/// assert_eq!(table.key_stride().get(), 8);
/// assert_eq!(table.value_stride(), 3);
/// assert_eq!(table.capacity(), 16);
/// # Ok::<(), opaque_collections::Error>(())
/// ```
#[derive(Debug)]
#[must_use]
pub struct RawProbeTableBuilder<H> {
    key_stride: Option<NonZero<usize>>,
    value_stride: usize,
    capacity: usize,
    hasher: H,
}

impl<H: Default> RawProbeTableBuilder<H> {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            key_stride: None,
            value_stride: 0,
            capacity: 1,
            hasher: H::default(),
        }
    }
}

impl<H> RawProbeTableBuilder<H> {
    /// Sets the size of each key in bytes.
    #[inline]
    pub fn key_stride(mut self, stride: NonZero<usize>) -> Self {
        self.key_stride = Some(stride);
        self
    }

    /// Sets the key stride to the size of `K`.
    ///
    /// # Panics
    ///
    /// Panics if `K` is zero-sized.
    #[inline]
    pub fn key_size_of<K>(mut self) -> Self {
        let stride =
            NonZero::new(size_of::<K>()).expect("RawProbeTable keys must have non-zero size");
        self.key_stride = Some(stride);
        self
    }

    /// Sets the size of each value in bytes. Zero is allowed.
    #[inline]
    pub fn value_stride(mut self, stride: usize) -> Self {
        self.value_stride = stride;
        self
    }

    /// Sets the value stride to the size of `V`.
    #[inline]
    pub fn value_size_of<V>(mut self) -> Self {
        self.value_stride = size_of::<V>();
        self
    }

    /// Sets the minimum number of slots to allocate up front. Rounded up to a power of two.
    #[inline]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Replaces the hasher used for keys.
    #[inline]
    pub fn hasher<H2: KeyHasher>(self, hasher: H2) -> RawProbeTableBuilder<H2> {
        RawProbeTableBuilder {
            key_stride: self.key_stride,
            value_stride: self.value_stride,
            capacity: self.capacity,
            hasher,
        }
    }

    /// Builds the table with the specified configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`][crate::Error::AllocationFailure] if the initial
    /// buffers cannot be allocated.
    ///
    /// # Panics
    ///
    /// Panics if no key stride has been set using either [`key_stride`](Self::key_stride)
    /// or [`key_size_of`](Self::key_size_of).
    pub fn build(self) -> Result<RawProbeTable<H>>
    where
        H: KeyHasher,
    {
        let key_stride = self.key_stride.expect(
            "key stride must be set using .key_stride() or .key_size_of::<K>() before calling .build()",
        );

        RawProbeTable::with_hasher(key_stride, self.value_stride, self.capacity, self.hasher)
    }
}
