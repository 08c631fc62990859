use std::fmt;
use std::hash::{BuildHasher, Hash};

use bytemuck::Pod;

use crate::element::{check_stride, stride_of};
use crate::{DefaultHashBuilder, InsertMode, InsertOutcome, RawProbeTable, Result, TypedKeyHasher};

/// A set of `K` values stored in a [`RawProbeTable`] with a zero value stride.
///
/// # Examples
///
/// ```
/// use opaque_collections::{Error, HashSet};
///
/// let mut seen = HashSet::<u16>::new()?;
///
/// seen.add(3)?;
/// assert_eq!(seen.add(3), Err(Error::DuplicateKey));
/// assert!(!seen.insert(3)?);
///
/// assert!(seen.contains(3));
/// seen.remove(3)?;
/// assert!(seen.is_empty());
/// # Ok::<(), Error>(())
/// ```
pub struct HashSet<K, S = DefaultHashBuilder> {
    table: RawProbeTable<TypedKeyHasher<K, S>>,
}

impl<K, S> HashSet<K, S>
where
    K: Pod + Eq + Hash,
    S: BuildHasher + Default,
{
    /// Creates an empty set.
    pub fn new() -> Result<Self> {
        Self::with_capacity(1)
    }

    /// Creates an empty set with at least `capacity` slots.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Self::with_capacity_and_hasher(capacity, S::default())
    }
}

impl<K, S> HashSet<K, S>
where
    K: Pod + Eq + Hash,
    S: BuildHasher,
{
    /// Creates an empty set with at least `capacity` slots, hashing keys with `build_hasher`.
    pub fn with_capacity_and_hasher(capacity: usize, build_hasher: S) -> Result<Self> {
        Ok(Self {
            table: RawProbeTable::with_hasher(
                stride_of::<K>(),
                0,
                capacity,
                TypedKeyHasher::new(build_hasher),
            )?,
        })
    }

    /// Views an existing key-only table as a set of `K`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`][crate::Error::TypeMismatch] if the key stride differs
    /// from the size of `K` or the table stores values.
    pub fn from_raw(table: RawProbeTable<TypedKeyHasher<K, S>>) -> Result<Self> {
        check_stride::<K>(table.key_stride().get())?;
        check_stride::<()>(table.value_stride())?;

        Ok(Self { table })
    }

    /// Releases the typed view, returning the underlying storage engine.
    #[must_use]
    pub fn into_raw(self) -> RawProbeTable<TypedKeyHasher<K, S>> {
        self.table
    }

    /// Number of elements in the set.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether the set holds no elements.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Number of slots. At most three quarters of them are ever occupied.
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Adds a key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateKey`][crate::Error::DuplicateKey] if the key is already present.
    pub fn add(&mut self, key: K) -> Result<()> {
        self.table.add(bytemuck::bytes_of(&key), &[])
    }

    /// Adds a key if it is not yet present, returning whether it was added.
    pub fn insert(&mut self, key: K) -> Result<bool> {
        let outcome = self
            .table
            .insert(bytemuck::bytes_of(&key), &[], InsertMode::AddOrSet)?;

        Ok(outcome == InsertOutcome::Added)
    }

    /// Whether `key` is in the set.
    #[must_use]
    pub fn contains(&self, key: K) -> bool {
        self.table.contains_key(bytemuck::bytes_of(&key))
    }

    /// Removes a key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`][crate::Error::KeyNotFound] if the key is not present.
    pub fn remove(&mut self, key: K) -> Result<()> {
        self.table.remove(bytemuck::bytes_of(&key))
    }

    /// Makes sure `additional` more elements fit without reallocating.
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        self.table.reserve(additional)
    }

    /// Iterates over the keys in an unspecified order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = K> + '_ {
        self.table.keys().map(bytemuck::pod_read_unaligned)
    }

    /// Removes all elements, retaining the capacity.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Removes all elements and makes sure the capacity is at least `min_capacity`.
    pub fn clear_with_capacity(&mut self, min_capacity: usize) -> Result<()> {
        self.table.clear_with_capacity(min_capacity)
    }

    /// Creates an independent deep copy of the set.
    pub fn try_clone(&self) -> Result<Self>
    where
        S: Clone,
    {
        Ok(Self {
            table: self.table.try_clone()?,
        })
    }
}

impl<K, S> fmt::Debug for HashSet<K, S>
where
    K: Pod + Eq + Hash + fmt::Debug,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
