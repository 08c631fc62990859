use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;

use bytemuck::Pod;

use crate::element::{check_stride, stride_of, value_stride_of};
use crate::{InsertMode, InsertOutcome, RawProbeTable, Result, TypedKeyHasher};

/// Default [`BuildHasher`] of the hashed adapters: foldhash with a per-instance random seed.
pub type DefaultHashBuilder = foldhash::fast::RandomState;

/// A hash map from `K` to `V` stored in a [`RawProbeTable`].
///
/// Keys are hashed and compared as `K` values through a [`TypedKeyHasher`], so `K`'s own
/// [`Hash`] and [`Eq`] implementations apply. Values are copied in and out.
///
/// Unlike [`std::collections::HashMap`], adding a key that is already present is an error
/// rather than a silent overwrite. Use [`insert()`](Self::insert) for upsert semantics.
///
/// # Examples
///
/// ```
/// use opaque_collections::{Dictionary, Error, InsertOutcome};
///
/// let mut ages = Dictionary::<u32, u8>::new()?;
///
/// ages.add(1, 30)?;
/// assert_eq!(ages.add(1, 31), Err(Error::DuplicateKey));
///
/// ages.set(1, 31)?;
/// assert_eq!(ages.insert(2, 40)?, InsertOutcome::Added);
///
/// assert_eq!(ages.get(1), Some(31));
/// assert_eq!(ages.remove(2)?, 40);
/// assert_eq!(ages.len(), 1);
/// # Ok::<(), Error>(())
/// ```
///
/// Keys and values may be aligned to at most [`BUFFER_ALIGNMENT`][crate::BUFFER_ALIGNMENT]
/// bytes. Wider alignment is rejected when the dictionary is created:
///
/// ```compile_fail
/// use opaque_collections::Dictionary;
///
/// #[derive(Clone, Copy, bytemuck::Zeroable, bytemuck::Pod)]
/// #[repr(C, align(64))]
/// struct CacheLine([u8; 64]);
///
/// let _lines = Dictionary::<u32, CacheLine>::new();
/// ```
pub struct Dictionary<K, V, S = DefaultHashBuilder> {
    table: RawProbeTable<TypedKeyHasher<K, S>>,
    _value: PhantomData<V>,
}

impl<K, V, S> Dictionary<K, V, S>
where
    K: Pod + Eq + Hash,
    V: Pod,
    S: BuildHasher + Default,
{
    /// Creates an empty dictionary.
    pub fn new() -> Result<Self> {
        Self::with_capacity(1)
    }

    /// Creates an empty dictionary with at least `capacity` slots.
    ///
    /// Note that a table only fills up to three quarters of its slots before growing.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Self::with_capacity_and_hasher(capacity, S::default())
    }
}

impl<K, V, S> Dictionary<K, V, S>
where
    K: Pod + Eq + Hash,
    V: Pod,
    S: BuildHasher,
{
    /// Creates an empty dictionary with at least `capacity` slots, hashing keys with `build_hasher`.
    pub fn with_capacity_and_hasher(capacity: usize, build_hasher: S) -> Result<Self> {
        Ok(Self {
            table: RawProbeTable::with_hasher(
                stride_of::<K>(),
                value_stride_of::<V>(),
                capacity,
                TypedKeyHasher::new(build_hasher),
            )?,
            _value: PhantomData,
        })
    }

    /// Views an existing table as a dictionary from `K` to `V`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`][crate::Error::TypeMismatch] if either stride differs
    /// from the size of the corresponding type.
    pub fn from_raw(table: RawProbeTable<TypedKeyHasher<K, S>>) -> Result<Self> {
        check_stride::<K>(table.key_stride().get())?;
        check_stride::<V>(table.value_stride())?;

        Ok(Self {
            table,
            _value: PhantomData,
        })
    }

    /// Releases the typed view, returning the underlying storage engine.
    #[must_use]
    pub fn into_raw(self) -> RawProbeTable<TypedKeyHasher<K, S>> {
        self.table
    }

    /// The underlying storage engine.
    #[must_use]
    pub fn as_raw(&self) -> &RawProbeTable<TypedKeyHasher<K, S>> {
        &self.table
    }

    /// Number of elements in the dictionary.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether the dictionary holds no elements.
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

    /// The [`BuildHasher`] used to hash keys.
    #[must_use]
    pub fn build_hasher(&self) -> &S {
        self.table.hasher().build_hasher()
    }

    /// Adds a new entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateKey`][crate::Error::DuplicateKey] if the key is present.
    pub fn add(&mut self, key: K, value: V) -> Result<()> {
        self.table
            .add(bytemuck::bytes_of(&key), bytemuck::bytes_of(&value))
    }

    /// Replaces the value of an existing entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`][crate::Error::KeyNotFound] if the key is not present.
    pub fn set(&mut self, key: K, value: V) -> Result<()> {
        self.table
            .set(bytemuck::bytes_of(&key), bytemuck::bytes_of(&value))
    }

    /// Adds a new entry or replaces the value of an existing one.
    pub fn insert(&mut self, key: K, value: V) -> Result<InsertOutcome> {
        self.table.insert(
            bytemuck::bytes_of(&key),
            bytemuck::bytes_of(&value),
            InsertMode::AddOrSet,
        )
    }

    /// Returns the value stored for `key`, if present.
    #[must_use]
    pub fn get(&self, key: K) -> Option<V> {
        self.table
            .get(bytemuck::bytes_of(&key))
            .map(bytemuck::pod_read_unaligned)
    }

    /// Returns the value stored for `key` for in-place modification.
    #[must_use]
    pub fn get_mut(&mut self, key: K) -> Option<&mut V> {
        self.table
            .get_mut(bytemuck::bytes_of(&key))
            .map(bytemuck::from_bytes_mut)
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: K) -> bool {
        self.table.contains_key(bytemuck::bytes_of(&key))
    }

    /// Removes the entry for `key`, returning its value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`][crate::Error::KeyNotFound] if the key is not present.
    pub fn remove(&mut self, key: K) -> Result<V> {
        let mut value = V::zeroed();

        self.table.remove_into(
            bytemuck::bytes_of(&key),
            bytemuck::bytes_of_mut(&mut value),
        )?;

        Ok(value)
    }

    /// Makes sure `additional` more entries can be added without growing.
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        self.table.reserve(additional)
    }

    /// Iterates over `(key, value)` pairs in an unspecified order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (K, V)> + '_ {
        self.table.iter().map(|(key, value)| {
            (
                bytemuck::pod_read_unaligned(key),
                bytemuck::pod_read_unaligned(value),
            )
        })
    }

    /// Iterates over the keys in an unspecified order.
    pub fn keys(&self) -> impl ExactSizeIterator<Item = K> + '_ {
        self.table.keys().map(bytemuck::pod_read_unaligned)
    }

    /// Iterates over the values in an unspecified order.
    pub fn values(&self) -> impl ExactSizeIterator<Item = V> + '_ {
        self.table.values().map(bytemuck::pod_read_unaligned)
    }

    /// Removes all elements, retaining the capacity.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Removes all elements and makes sure the capacity is at least `min_capacity`.
    pub fn clear_with_capacity(&mut self, min_capacity: usize) -> Result<()> {
        self.table.clear_with_capacity(min_capacity)
    }

    /// Creates an independent deep copy of the dictionary.
    pub fn try_clone(&self) -> Result<Self>
    where
        S: Clone,
    {
        Ok(Self {
            table: self.table.try_clone()?,
            _value: PhantomData,
        })
    }
}

impl<K, V, S> fmt::Debug for Dictionary<K, V, S>
where
    K: Pod + Eq + Hash + fmt::Debug,
    V: Pod + fmt::Debug,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::collections::HashMap;
    use std::hash::BuildHasherDefault;

    use foldhash::fast::FixedState;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use static_assertions::assert_impl_all;

    use super::*;
    use crate::Error;

    assert_impl_all!(Dictionary<u64, u64>: Send, fmt::Debug);

    #[derive(Clone, Copy, Debug, PartialEq, Eq, bytemuck::Zeroable, bytemuck::Pod)]
    #[repr(C, align(16))]
    struct Aligned([u64; 2]);

    #[test]
    fn get_mut_with_maximally_aligned_values() {
        let mut dictionary = Dictionary::<u32, Aligned>::new().unwrap();

        for key in 0..8 {
            dictionary.add(key, Aligned([u64::from(key), 0])).unwrap();
        }

        for key in 0..8 {
            let value = dictionary.get_mut(key).unwrap();
            assert_eq!(value.0[0], u64::from(key));
            value.0[1] = 7;
        }

        assert!(dictionary.values().all(|value| value.0[1] == 7));
    }

    #[test]
    fn add_set_insert_semantics() {
        let mut dictionary = Dictionary::<u16, u32>::new().unwrap();

        dictionary.add(5, 50).unwrap();
        assert_eq!(dictionary.add(5, 51), Err(Error::DuplicateKey));
        assert_eq!(dictionary.set(6, 60), Err(Error::KeyNotFound));
        assert_eq!(dictionary.insert(5, 52).unwrap(), InsertOutcome::Replaced);
        assert_eq!(dictionary.insert(6, 60).unwrap(), InsertOutcome::Added);

        assert_eq!(dictionary.get(5), Some(52));
        assert_eq!(dictionary.get(6), Some(60));
        assert_eq!(dictionary.get(7), None);
        assert_eq!(dictionary.len(), 2);
    }

    #[test]
    fn get_mut_writes_in_place() {
        let mut dictionary = Dictionary::<u8, [u16; 2]>::new().unwrap();
        dictionary.add(1, [0, 0]).unwrap();

        let value = dictionary.get_mut(1).unwrap();
        value[1] = 9;

        assert_eq!(dictionary.get(1), Some([0, 9]));
        assert!(dictionary.get_mut(2).is_none());
    }

    #[test]
    fn remove_returns_value() {
        let mut dictionary = Dictionary::<u64, i32>::with_capacity(16).unwrap();

        for key in 0..10_u8 {
            dictionary.add(u64::from(key), -i32::from(key)).unwrap();
        }

        assert_eq!(dictionary.remove(4), Ok(-4));
        assert_eq!(dictionary.remove(4), Err(Error::KeyNotFound));
        assert!(!dictionary.contains_key(4));
        assert_eq!(dictionary.len(), 9);

        let mut keys = dictionary.keys().collect::<Vec<_>>();
        keys.sort_unstable();
        assert_eq!(keys, vec![0, 1, 2, 3, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn custom_build_hasher() {
        let mut first =
            Dictionary::<u32, u32, BuildHasherDefault<std::hash::DefaultHasher>>::new().unwrap();
        let mut second = Dictionary::<u32, u32, FixedState>::new().unwrap();

        for key in 0..100 {
            first.add(key, key).unwrap();
            second.add(key, key).unwrap();
        }

        assert_eq!(first.len(), 100);
        assert_eq!(second.len(), 100);
        assert_eq!(second.capacity(), 256);
        assert!(first.iter().all(|(key, value)| key == value));
    }

    #[test]
    fn matches_hash_map() {
        let mut rng = StdRng::seed_from_u64(0xD1C7);
        let mut dictionary = Dictionary::<u32, u64>::new().unwrap();
        let mut reference = HashMap::new();

        for _ in 0..5_000 {
            let key = rng.random_range(0..300_u32);

            match rng.random_range(0..4) {
                0 => {
                    let value: u64 = rng.random();
                    let expected = if reference.contains_key(&key) {
                        Err(Error::DuplicateKey)
                    } else {
                        reference.insert(key, value);
                        Ok(())
                    };
                    assert_eq!(dictionary.add(key, value), expected);
                }
                1 => {
                    let value: u64 = rng.random();
                    let outcome = dictionary.insert(key, value).unwrap();
                    let expected = match reference.insert(key, value) {
                        Some(_) => InsertOutcome::Replaced,
                        None => InsertOutcome::Added,
                    };
                    assert_eq!(outcome, expected);
                }
                2 => {
                    let expected = reference.remove(&key).ok_or(Error::KeyNotFound);
                    assert_eq!(dictionary.remove(key), expected);
                }
                _ => {
                    assert_eq!(dictionary.get(key), reference.get(&key).copied());
                }
            }

            assert_eq!(dictionary.len(), reference.len());
        }

        let mut entries = dictionary.iter().collect::<Vec<_>>();
        let mut expected = reference.into_iter().collect::<Vec<_>>();
        entries.sort_unstable();
        expected.sort_unstable();
        assert_eq!(entries, expected);
    }

    #[test]
    fn raw_round_trip_checks_both_strides() {
        let dictionary = Dictionary::<u32, u16, FixedState>::new().unwrap();
        let table = dictionary.into_raw();

        assert_eq!(table.key_stride().get(), 4);
        assert_eq!(table.value_stride(), 2);

        assert_eq!(
            Dictionary::<u32, u32, FixedState>::from_raw(table).err(),
            Some(Error::TypeMismatch {
                expected_stride: 2,
                actual_size: 4
            })
        );
    }

    #[test]
    fn clone_and_clear() {
        let mut dictionary = Dictionary::<u8, u8>::new().unwrap();
        dictionary.add(1, 2).unwrap();

        let copy = dictionary.try_clone().unwrap();
        dictionary.clear_with_capacity(64).unwrap();

        assert!(dictionary.is_empty());
        assert_eq!(dictionary.capacity(), 64);
        assert_eq!(copy.get(1), Some(2));
        assert_eq!(format!("{copy:?}"), "{1: 2}");
    }
}
