use std::iter::FusedIterator;
use std::num::NonZero;

use new_zealand::nz;
use tracing::{debug, trace};

use crate::growth::{byte_len, capacity_for, load_limit, offset_of};
use crate::hashing::{hash_code, home_slot, probe_distance};
use crate::{BytesHasher, Error, KeyHasher, Occupancy, RawBuffer, RawProbeTableBuilder, Result};

/// How [`RawProbeTable::insert()`] treats a key that may or may not already be present.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum InsertMode {
    /// Adds a new entry. Fails with [`Error::DuplicateKey`] if the key is already present.
    Add,

    /// Replaces the value of an existing entry. Fails with [`Error::KeyNotFound`] if the key
    /// is not present.
    Set,

    /// Adds a new entry or replaces the value of an existing one.
    AddOrSet,
}

/// What a successful [`RawProbeTable::insert()`] did.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum InsertOutcome {
    /// A new entry was added to the table.
    Added,

    /// The key was already present and its value was overwritten in place.
    Replaced,
}

/// Capacity multiplier applied when an insertion would exceed the load limit.
const GROWTH_FACTOR: NonZero<usize> = nz!(2);

/// An open-addressing hash table over stride-erased keys and values.
///
/// This is the engine beneath [`Dictionary`][crate::Dictionary] and
/// [`HashSet`][crate::HashSet]. Keys and values are passed as byte slices of exactly
/// `key_stride` and `value_stride` bytes. The value stride may be zero, for tables that
/// only track keys.
///
/// # Layout
///
/// Entries live in parallel buffers (keys, 31-bit hash codes, values and an occupancy bitset)
/// with one element per slot. The number of slots is always a power of two and the table
/// grows by doubling as soon as an insertion would push it above a load factor of 3/4.
///
/// Collisions are resolved by linear probing. There are no tombstones: removal immediately
/// closes the gap by shifting later entries of the same cluster backward, so lookups always
/// stop at the first empty slot.
///
/// # Iteration order
///
/// Iteration visits entries in ascending physical slot order. This is not insertion order
/// and it changes when the table grows.
///
/// # Examples
///
/// ```
/// use opaque_collections::{Error, InsertMode, RawProbeTable};
///
/// let mut table = RawProbeTable::builder()
///     .key_size_of::<u32>()
///     .value_size_of::<u64>()
///     .build()?;
///
/// table.insert(&7_u32.to_ne_bytes(), &70_u64.to_ne_bytes(), InsertMode::Add)?;
///
/// assert_eq!(
///     table.get(&7_u32.to_ne_bytes()),
///     Some(&70_u64.to_ne_bytes()[..])
/// );
/// assert_eq!(
///     table.insert(&7_u32.to_ne_bytes(), &0_u64.to_ne_bytes(), InsertMode::Add),
///     Err(Error::DuplicateKey)
/// );
///
/// table.remove(&7_u32.to_ne_bytes())?;
/// assert!(table.is_empty());
/// # Ok::<(), Error>(())
/// ```
#[derive(Debug)]
pub struct RawProbeTable<H = BytesHasher> {
    slots: SlotArrays,

    /// Number of occupied slots, never above `load_limit(capacity)` after an insertion.
    count: usize,

    hasher: H,
}

/// Outcome of probing for a key.
enum Probe {
    /// The key is stored in this slot.
    Found(usize),

    /// The key is not present; this is the first empty slot on its probe path.
    Vacant(usize),
}

impl<H: KeyHasher + Default> RawProbeTable<H> {
    /// Creates an empty table with room for at least `initial_capacity` slots, using the
    /// default hasher.
    pub fn new(
        key_stride: NonZero<usize>,
        value_stride: usize,
        initial_capacity: usize,
    ) -> Result<Self> {
        Self::with_hasher(key_stride, value_stride, initial_capacity, H::default())
    }
}

impl RawProbeTable {
    /// Creates a builder for configuring and constructing a [`RawProbeTable`].
    ///
    /// The key stride is mandatory, everything else is optional.
    pub fn builder() -> RawProbeTableBuilder<BytesHasher> {
        RawProbeTableBuilder::new()
    }
}

impl<H: KeyHasher> RawProbeTable<H> {
    /// Creates an empty table with room for at least `initial_capacity` slots.
    ///
    /// The slot count is rounded up to a power of two, with a minimum of 1.
    pub fn with_hasher(
        key_stride: NonZero<usize>,
        value_stride: usize,
        initial_capacity: usize,
        hasher: H,
    ) -> Result<Self> {
        Ok(Self {
            slots: SlotArrays::allocate(key_stride, value_stride, capacity_for(initial_capacity)?)?,
            count: 0,
            hasher,
        })
    }

    /// Size of one key in bytes.
    #[must_use]
    #[inline]
    pub fn key_stride(&self) -> NonZero<usize> {
        self.slots.key_stride
    }

    /// Size of one value in bytes. May be zero.
    #[must_use]
    #[inline]
    pub fn value_stride(&self) -> usize {
        self.slots.value_stride
    }

    /// Number of entries in the table.
    #[must_use]
    #[inline]
    #[cfg_attr(test, mutants::skip)] // Can be mutated to infinitely growing memory use and/or infinite loop.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether the table holds no elements.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of slots. Always a power of two.
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.capacity.get()
    }

    /// The hasher used for keys.
    #[must_use]
    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    /// Inserts an entry according to `mode`.
    ///
    /// If the key is not yet present and adding it would take the table above its load
    /// factor, the table first doubles its capacity and rehashes every entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateKey`] for [`InsertMode::Add`] if the key is present and
    /// [`Error::KeyNotFound`] for [`InsertMode::Set`] if it is not. In both cases the table
    /// is left untouched, including its capacity.
    pub fn insert(&mut self, key: &[u8], value: &[u8], mode: InsertMode) -> Result<InsertOutcome> {
        self.slots.assert_entry(key, value);

        let hash = hash_code(self.hasher.hash_key(key));

        match self.probe(key, hash) {
            Probe::Found(slot) => match mode {
                InsertMode::Add => Err(Error::DuplicateKey),
                InsertMode::Set | InsertMode::AddOrSet => {
                    self.slots.value_mut(slot).copy_from_slice(value);
                    Ok(InsertOutcome::Replaced)
                }
            },
            Probe::Vacant(mut slot) => {
                if mode == InsertMode::Set {
                    return Err(Error::KeyNotFound);
                }

                let new_count = self.count.wrapping_add(1);

                if new_count > load_limit(self.slots.capacity) {
                    let doubled = self
                        .slots
                        .capacity
                        .checked_mul(GROWTH_FACTOR)
                        .ok_or(Error::AllocationFailure {
                            requested_bytes: usize::MAX,
                        })?;

                    self.rehash(doubled)?;
                    slot = self.slots.first_vacant(hash);
                }

                self.slots.occupy(slot, key, hash, value);
                self.count = new_count;

                Ok(InsertOutcome::Added)
            }
        }
    }

    /// Adds a new entry, failing with [`Error::DuplicateKey`] if the key is present.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.insert(key, value, InsertMode::Add).map(|_| ())
    }

    /// Replaces the value of an existing entry, failing with [`Error::KeyNotFound`] if the
    /// key is not present.
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.insert(key, value, InsertMode::Set).map(|_| ())
    }

    /// Adds a new entry or replaces the value of an existing one.
    pub fn add_or_set(&mut self, key: &[u8], value: &[u8]) -> Result<InsertOutcome> {
        self.insert(key, value, InsertMode::AddOrSet)
    }

    /// Returns the value stored for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.slot_of(key).map(|slot| self.slots.value(slot))
    }

    /// Returns the value stored for `key` for in-place modification, if present.
    #[must_use]
    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut [u8]> {
        self.slot_of(key).map(|slot| self.slots.value_mut(slot))
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.slot_of(key).is_some()
    }

    /// Returns the physical slot that currently holds `key`, if present.
    ///
    /// Slots are only stable until the next insertion or removal.
    #[must_use]
    pub fn slot_of(&self, key: &[u8]) -> Option<usize> {
        self.slots.assert_key(key);

        match self.probe(key, hash_code(self.hasher.hash_key(key))) {
            Probe::Found(slot) => Some(slot),
            Probe::Vacant(_) => None,
        }
    }

    /// Removes the entry for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`] if the key is not present.
    pub fn remove(&mut self, key: &[u8]) -> Result<()> {
        let slot = self.slot_of(key).ok_or(Error::KeyNotFound)?;
        self.remove_slot(slot);
        Ok(())
    }

    /// Removes the entry for `key`, copying its value into `value_out` first.
    ///
    /// # Panics
    ///
    /// Panics if `value_out` is not exactly `value_stride` bytes long.
    pub fn remove_into(&mut self, key: &[u8], value_out: &mut [u8]) -> Result<()> {
        assert_eq!(
            value_out.len(),
            self.slots.value_stride,
            "output buffer of {} bytes does not match the value stride {}",
            value_out.len(),
            self.slots.value_stride
        );

        let slot = self.slot_of(key).ok_or(Error::KeyNotFound)?;
        value_out.copy_from_slice(self.slots.value(slot));
        self.remove_slot(slot);
        Ok(())
    }

    /// Makes sure `additional` more entries can be added without the table growing.
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        let needed = self
            .count
            .checked_add(additional)
            .ok_or(Error::AllocationFailure {
                requested_bytes: usize::MAX,
            })?;

        if needed <= load_limit(self.slots.capacity) {
            return Ok(());
        }

        let mut capacity = capacity_for(needed)?;

        while load_limit(capacity) < needed {
            capacity = capacity
                .checked_mul(GROWTH_FACTOR)
                .ok_or(Error::AllocationFailure {
                    requested_bytes: usize::MAX,
                })?;
        }

        self.rehash(capacity)
    }

    /// Removes all entries. The buffers are reused and the capacity is retained.
    pub fn clear(&mut self) {
        self.slots.occupancy.clear();
        self.count = 0;
    }

    /// Removes all entries and makes sure the table has at least `min_capacity` slots.
    ///
    /// Never shrinks the table.
    pub fn clear_with_capacity(&mut self, min_capacity: usize) -> Result<()> {
        let capacity = capacity_for(min_capacity)?;

        if capacity > self.slots.capacity {
            debug!(
                old_capacity = self.slots.capacity.get(),
                new_capacity = capacity.get(),
                "probe table reallocated on clear"
            );

            self.slots =
                SlotArrays::allocate(self.slots.key_stride, self.slots.value_stride, capacity)?;
        } else {
            self.slots.occupancy.clear();
        }

        self.count = 0;
        Ok(())
    }

    /// Iterates over `(key, value)` pairs in ascending physical slot order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            slots: &self.slots,
            next_slot: 0,
            remaining: self.count,
        }
    }

    /// Iterates over the keys in ascending physical slot order.
    pub fn keys(&self) -> impl ExactSizeIterator<Item = &[u8]> + FusedIterator {
        self.iter().map(|(key, _)| key)
    }

    /// Iterates over the values in ascending physical slot order.
    pub fn values(&self) -> impl ExactSizeIterator<Item = &[u8]> + FusedIterator {
        self.iter().map(|(_, value)| value)
    }

    /// Creates an independent deep copy of the table, preserving the physical layout.
    pub fn try_clone(&self) -> Result<Self>
    where
        H: Clone,
    {
        Ok(Self {
            slots: self.slots.try_clone()?,
            count: self.count,
            hasher: self.hasher.clone(),
        })
    }

    /// Walks the probe path of `key` until it finds the key or an empty slot.
    ///
    /// Terminates because the load limit guarantees at least one empty slot, and the cluster
    /// invariant guarantees that a present key is reached before any empty slot.
    #[cfg_attr(test, mutants::skip)] // Can be mutated to infinite loop.
    fn probe(&self, key: &[u8], hash: u32) -> Probe {
        let mut slot = home_slot(hash, self.slots.capacity);

        loop {
            if !self.slots.occupancy.is_occupied(slot) {
                return Probe::Vacant(slot);
            }

            if self.slots.hash_code(slot) == hash
                && self.hasher.keys_equal(self.slots.key(slot), key)
            {
                return Probe::Found(slot);
            }

            slot = self.slots.next_slot(slot);
        }
    }

    /// Empties `hole` and repairs the cluster that follows it by backward shifting.
    ///
    /// Every entry after the hole, up to the next empty slot, is moved into the hole if the
    /// hole lies on that entry's probe path; the vacated slot then becomes the new hole.
    /// Entries whose probe path does not include the hole stay where they are, and the scan
    /// continues past them because entries further along may still need to move.
    #[cfg_attr(test, mutants::skip)] // Can be mutated to infinite loop.
    fn remove_slot(&mut self, mut hole: usize) {
        self.slots.occupancy.set_empty(hole);
        self.count = self.count.wrapping_sub(1);

        let capacity = self.slots.capacity;
        let mut slot = self.slots.next_slot(hole);

        while self.slots.occupancy.is_occupied(slot) {
            let home = home_slot(self.slots.hash_code(slot), capacity);

            if probe_distance(home, slot, capacity) >= probe_distance(hole, slot, capacity) {
                self.slots.move_entry(slot, hole);
                hole = slot;
            }

            slot = self.slots.next_slot(slot);
        }

        #[cfg(debug_assertions)]
        self.integrity_check();
    }

    /// Moves every entry into fresh buffers of the given capacity, visiting old slots in
    /// ascending order. Keys are already unique so no equality checks are needed.
    fn rehash(&mut self, capacity: NonZero<usize>) -> Result<()> {
        let mut grown =
            SlotArrays::allocate(self.slots.key_stride, self.slots.value_stride, capacity)?;

        let mut next = 0;

        while let Some(slot) = self.slots.occupancy.next_occupied(next) {
            let hash = self.slots.hash_code(slot);
            let target = grown.first_vacant(hash);

            grown.occupy(target, self.slots.key(slot), hash, self.slots.value(slot));

            next = slot.wrapping_add(1);
        }

        trace!(
            old_capacity = self.slots.capacity.get(),
            new_capacity = capacity.get(),
            len = self.count,
            "probe table rehashed"
        );

        // The old buffers are released here.
        self.slots = grown;

        #[cfg(debug_assertions)]
        self.integrity_check();

        Ok(())
    }

    /// Verifies the structural invariants of the table, panicking on any violation.
    #[cfg(any(test, debug_assertions))]
    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    pub(crate) fn integrity_check(&self) {
        let capacity = self.slots.capacity;

        assert!(
            capacity.is_power_of_two(),
            "capacity {capacity} is not a power of two"
        );

        assert_eq!(
            self.count,
            self.slots.occupancy.count_occupied(),
            "tracked count does not match the number of occupied slots"
        );

        assert!(
            self.count <= load_limit(capacity),
            "count {} exceeds the load limit of capacity {capacity}",
            self.count
        );

        let mut next = 0;

        while let Some(slot) = self.slots.occupancy.next_occupied(next) {
            let key = self.slots.key(slot);
            let hash = self.slots.hash_code(slot);

            assert_eq!(
                hash,
                hash_code(self.hasher.hash_key(key)),
                "stale hash code in slot {slot}"
            );

            // Every slot between the home slot and the entry must be occupied.
            let mut path_slot = home_slot(hash, capacity);
            while path_slot != slot {
                assert!(
                    self.slots.occupancy.is_occupied(path_slot),
                    "empty slot {path_slot} breaks the probe path of the entry in slot {slot}"
                );
                path_slot = self.slots.next_slot(path_slot);
            }

            // Also rules out duplicates: an earlier equal key would be found first.
            assert!(
                matches!(self.probe(key, hash), Probe::Found(found) if found == slot),
                "lookup of the key in slot {slot} does not find that slot"
            );

            next = slot.wrapping_add(1);
        }
    }
}

/// The parallel per-slot buffers of a [`RawProbeTable`], all sized for the same capacity.
#[derive(Debug)]
struct SlotArrays {
    key_stride: NonZero<usize>,
    value_stride: usize,
    capacity: NonZero<usize>,

    keys: RawBuffer,

    /// One native-endian `u32` per slot, each with the top bit clear.
    hash_codes: RawBuffer,

    values: RawBuffer,
    occupancy: Occupancy,
}

const HASH_CODE_STRIDE: NonZero<usize> = nz!(4);

impl SlotArrays {
    fn allocate(
        key_stride: NonZero<usize>,
        value_stride: usize,
        capacity: NonZero<usize>,
    ) -> Result<Self> {
        let values_len = value_stride
            .checked_mul(capacity.get())
            .ok_or(Error::AllocationFailure {
                requested_bytes: usize::MAX,
            })?;

        Ok(Self {
            key_stride,
            value_stride,
            capacity,
            keys: RawBuffer::allocate(byte_len(key_stride, capacity.get())?)?,
            hash_codes: RawBuffer::allocate(byte_len(HASH_CODE_STRIDE, capacity.get())?)?,
            values: RawBuffer::allocate(values_len)?,
            occupancy: Occupancy::new(capacity)?,
        })
    }

    #[inline]
    fn next_slot(&self, slot: usize) -> usize {
        slot.wrapping_add(1) & self.capacity.get().wrapping_sub(1)
    }

    fn key(&self, slot: usize) -> &[u8] {
        self.keys
            .read(offset_of(self.key_stride, slot), self.key_stride.get())
    }

    fn value(&self, slot: usize) -> &[u8] {
        self.values
            .read(self.value_stride.wrapping_mul(slot), self.value_stride)
    }

    fn value_mut(&mut self, slot: usize) -> &mut [u8] {
        let offset = self.value_stride.wrapping_mul(slot);
        self.values.read_mut(offset, self.value_stride)
    }

    fn hash_code(&self, slot: usize) -> u32 {
        *bytemuck::cast_slice::<u8, u32>(self.hash_codes.as_bytes())
            .get(slot)
            .expect("slot index must be within the table capacity")
    }

    fn set_hash_code(&mut self, slot: usize, hash: u32) {
        *bytemuck::cast_slice_mut::<u8, u32>(self.hash_codes.as_bytes_mut())
            .get_mut(slot)
            .expect("slot index must be within the table capacity") = hash;
    }

    /// First empty slot on the probe path of `hash`, without checking for equal keys.
    #[cfg_attr(test, mutants::skip)] // Can be mutated to infinite loop.
    fn first_vacant(&self, hash: u32) -> usize {
        let mut slot = home_slot(hash, self.capacity);

        while self.occupancy.is_occupied(slot) {
            slot = self.next_slot(slot);
        }

        slot
    }

    fn occupy(&mut self, slot: usize, key: &[u8], hash: u32, value: &[u8]) {
        debug_assert!(!self.occupancy.is_occupied(slot));

        self.keys.write(offset_of(self.key_stride, slot), key);
        self.set_hash_code(slot, hash);
        self.value_mut(slot).copy_from_slice(value);
        self.occupancy.set_occupied(slot);
    }

    /// Moves the entry in slot `from` into the empty slot `to`, leaving `from` empty.
    fn move_entry(&mut self, from: usize, to: usize) {
        debug_assert!(self.occupancy.is_occupied(from));
        debug_assert!(!self.occupancy.is_occupied(to));

        self.keys.copy_within(
            offset_of(self.key_stride, from),
            offset_of(self.key_stride, to),
            self.key_stride.get(),
        );

        let hash = self.hash_code(from);
        self.set_hash_code(to, hash);

        self.values.copy_within(
            self.value_stride.wrapping_mul(from),
            self.value_stride.wrapping_mul(to),
            self.value_stride,
        );

        self.occupancy.set_occupied(to);
        self.occupancy.set_empty(from);
    }

    fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            key_stride: self.key_stride,
            value_stride: self.value_stride,
            capacity: self.capacity,
            keys: self.keys.try_clone()?,
            hash_codes: self.hash_codes.try_clone()?,
            values: self.values.try_clone()?,
            occupancy: self.occupancy.try_clone()?,
        })
    }

    fn assert_key(&self, key: &[u8]) {
        assert_eq!(
            key.len(),
            self.key_stride.get(),
            "key of {} bytes does not match the key stride {}",
            key.len(),
            self.key_stride
        );
    }

    fn assert_entry(&self, key: &[u8], value: &[u8]) {
        self.assert_key(key);

        assert_eq!(
            value.len(),
            self.value_stride,
            "value of {} bytes does not match the value stride {}",
            value.len(),
            self.value_stride
        );
    }
}

/// Iterator over the `(key, value)` pairs of a [`RawProbeTable`], in ascending physical
/// slot order.
///
/// Created by [`RawProbeTable::iter()`].
#[derive(Debug)]
pub struct Iter<'a> {
    slots: &'a SlotArrays,
    next_slot: usize,
    remaining: usize,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a [u8], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let slot = self.slots.occupancy.next_occupied(self.next_slot)?;

        self.next_slot = slot.wrapping_add(1);
        self.remaining = self.remaining.wrapping_sub(1);

        Some((self.slots.key(slot), self.slots.value(slot)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl FusedIterator for Iter<'_> {}

impl<'a, H: KeyHasher> IntoIterator for &'a RawProbeTable<H> {
    type Item = (&'a [u8], &'a [u8]);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation,
    reason = "test code doesn't need the same rigor as production code"
)]
mod tests {
    use std::collections::HashMap;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(RawProbeTable: Send, std::fmt::Debug);
    assert_not_impl_any!(RawProbeTable: Sync, Clone);

    /// Uses the `u32` key itself as the hash, so tests control home slots exactly.
    #[derive(Clone, Debug, Default)]
    struct IdentityHasher;

    impl KeyHasher for IdentityHasher {
        fn hash_key(&self, key: &[u8]) -> u64 {
            u64::from(u32::from_ne_bytes(key.try_into().unwrap()))
        }
    }

    /// Maps every key to one of a handful of hashes to produce long, tangled clusters.
    #[derive(Clone, Debug, Default)]
    struct FewHomesHasher;

    impl KeyHasher for FewHomesHasher {
        fn hash_key(&self, key: &[u8]) -> u64 {
            u64::from(u32::from_ne_bytes(key.try_into().unwrap()) % 5)
        }
    }

    fn key(value: u32) -> [u8; 4] {
        value.to_ne_bytes()
    }

    fn value(value: u64) -> [u8; 8] {
        value.to_ne_bytes()
    }

    fn table<H: KeyHasher + Default>(capacity: usize) -> RawProbeTable<H> {
        RawProbeTable::new(nz!(4), 8, capacity).unwrap()
    }

    fn keys_in_slot_order<H: KeyHasher>(table: &RawProbeTable<H>) -> Vec<u32> {
        table
            .keys()
            .map(|bytes| u32::from_ne_bytes(bytes.try_into().unwrap()))
            .collect()
    }

    #[test]
    fn smoke_test() {
        let mut table = table::<BytesHasher>(1);

        for k in 0..100 {
            table.add(&key(k), &value(u64::from(k) * 10)).unwrap();
        }

        assert_eq!(table.len(), 100);
        for k in 0..100 {
            assert_eq!(table.get(&key(k)), Some(&value(u64::from(k) * 10)[..]));
        }
        assert_eq!(table.get(&key(100)), None);

        table.integrity_check();
    }

    #[test]
    fn initial_capacity_rounds_up() {
        assert_eq!(table::<BytesHasher>(0).capacity(), 1);
        assert_eq!(table::<BytesHasher>(3).capacity(), 4);
        assert_eq!(table::<BytesHasher>(8).capacity(), 8);
    }

    #[test]
    fn insert_modes() {
        let mut table = table::<IdentityHasher>(8);

        assert_eq!(
            table.insert(&key(1), &value(10), InsertMode::Set),
            Err(Error::KeyNotFound)
        );
        assert!(table.is_empty());

        assert_eq!(
            table.insert(&key(1), &value(10), InsertMode::Add),
            Ok(InsertOutcome::Added)
        );
        assert_eq!(
            table.insert(&key(1), &value(11), InsertMode::Add),
            Err(Error::DuplicateKey)
        );
        assert_eq!(table.get(&key(1)), Some(&value(10)[..]));

        assert_eq!(
            table.insert(&key(1), &value(12), InsertMode::Set),
            Ok(InsertOutcome::Replaced)
        );
        assert_eq!(
            table.insert(&key(1), &value(13), InsertMode::AddOrSet),
            Ok(InsertOutcome::Replaced)
        );
        assert_eq!(
            table.insert(&key(2), &value(20), InsertMode::AddOrSet),
            Ok(InsertOutcome::Added)
        );

        assert_eq!(table.get(&key(1)), Some(&value(13)[..]));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn failed_add_does_not_grow() {
        let mut table = table::<IdentityHasher>(4);
        table.add(&key(0), &value(0)).unwrap();
        table.add(&key(1), &value(1)).unwrap();
        table.add(&key(2), &value(2)).unwrap();

        // The table is at its load limit. A failing add must not trigger growth.
        assert_eq!(table.add(&key(2), &value(9)), Err(Error::DuplicateKey));
        assert_eq!(table.capacity(), 4);

        // Neither must overwriting an existing key.
        table.set(&key(2), &value(9)).unwrap();
        assert_eq!(table.capacity(), 4);
    }

    #[test]
    fn remove_missing_key_fails_without_mutation() {
        let mut table = table::<IdentityHasher>(4);
        table.add(&key(3), &value(3)).unwrap();

        assert_eq!(table.remove(&key(7)), Err(Error::KeyNotFound));
        assert_eq!(table.len(), 1);
        assert_eq!(table.slot_of(&key(3)), Some(3));
    }

    // Capacity 4: keys 0, 1, 23 land in slots 0, 1, 3. After removing 23 and 1, inserting
    // 2 and 23 again must land in slots 2 and 3 without growth.
    #[test]
    fn remove_and_reinsert_without_growth() {
        let mut table = table::<IdentityHasher>(4);

        for k in [0, 1, 23] {
            table.add(&key(k), &value(u64::from(k))).unwrap();
        }
        assert_eq!(table.slot_of(&key(0)), Some(0));
        assert_eq!(table.slot_of(&key(1)), Some(1));
        assert_eq!(table.slot_of(&key(23)), Some(3));

        table.remove(&key(23)).unwrap();
        table.remove(&key(1)).unwrap();
        assert_eq!(keys_in_slot_order(&table), vec![0]);
        assert_eq!(table.slot_of(&key(0)), Some(0));

        table.add(&key(2), &value(2)).unwrap();
        assert_eq!(table.slot_of(&key(2)), Some(2));

        table.add(&key(23), &value(23)).unwrap();
        assert_eq!(table.slot_of(&key(23)), Some(3));

        assert_eq!(table.capacity(), 4);
        assert_eq!(keys_in_slot_order(&table), vec![0, 2, 23]);
        table.integrity_check();
    }

    // Capacity 8: three keys with home slot 3 occupy slots 3, 4, 5. Removing the middle one
    // shifts the last one back into slot 4.
    #[test]
    fn backward_shift_closes_gap() {
        let mut table = table::<IdentityHasher>(8);

        for k in [3, 11, 19] {
            table.add(&key(k), &value(u64::from(k))).unwrap();
        }
        assert_eq!(table.slot_of(&key(3)), Some(3));
        assert_eq!(table.slot_of(&key(11)), Some(4));
        assert_eq!(table.slot_of(&key(19)), Some(5));

        table.remove(&key(11)).unwrap();

        assert_eq!(table.slot_of(&key(19)), Some(4));
        assert!(!table.slots.occupancy.is_occupied(5));
        assert_eq!(table.get(&key(19)), Some(&value(19)[..]));
        table.integrity_check();
    }

    // Capacity 4 with 3 keys is at the load limit; a fourth key doubles the table.
    #[test]
    fn growth_rehashes_all_keys() {
        let mut table = table::<IdentityHasher>(4);

        for k in [1, 5, 6] {
            table.add(&key(k), &value(u64::from(k))).unwrap();
        }
        assert_eq!(table.capacity(), 4);

        table.add(&key(7), &value(7)).unwrap();

        assert_eq!(table.capacity(), 8);
        for k in [1, 5, 6, 7] {
            assert_eq!(table.get(&key(k)), Some(&value(u64::from(k))[..]));
        }

        // Recomputed homes in the doubled table.
        assert_eq!(table.slot_of(&key(1)), Some(1));
        assert_eq!(table.slot_of(&key(5)), Some(5));
        assert_eq!(table.slot_of(&key(6)), Some(6));
        assert_eq!(table.slot_of(&key(7)), Some(7));
        table.integrity_check();
    }

    #[test]
    fn shift_skips_entries_that_cannot_move() {
        let mut table = table::<IdentityHasher>(8);

        // Slot 3: key 3 (home 3). Slot 4: key 4 (home 4). Slot 5: key 11 (home 3).
        for k in [3, 4, 11] {
            table.add(&key(k), &value(u64::from(k))).unwrap();
        }
        assert_eq!(table.slot_of(&key(11)), Some(5));

        // Key 4 cannot move into slot 3, but key 11 must still be pulled back into it.
        table.remove(&key(3)).unwrap();

        assert_eq!(table.slot_of(&key(4)), Some(4));
        assert_eq!(table.slot_of(&key(11)), Some(3));
        table.integrity_check();
    }

    #[test]
    fn shift_wraps_around_end_of_table() {
        let mut table = table::<IdentityHasher>(8);

        // Homes 6 and 7 overflow into slots 0 and 1.
        for k in [6, 14, 7, 15] {
            table.add(&key(k), &value(u64::from(k))).unwrap();
        }
        assert_eq!(table.slot_of(&key(6)), Some(6));
        assert_eq!(table.slot_of(&key(14)), Some(7));
        assert_eq!(table.slot_of(&key(7)), Some(0));
        assert_eq!(table.slot_of(&key(15)), Some(1));

        table.remove(&key(6)).unwrap();

        assert_eq!(table.slot_of(&key(14)), Some(6));
        assert_eq!(table.slot_of(&key(7)), Some(7));
        assert_eq!(table.slot_of(&key(15)), Some(0));
        assert!(!table.slots.occupancy.is_occupied(1));
        table.integrity_check();

        // An entry sitting in its home slot after the wrap must not move backward past it.
        table.add(&key(1), &value(1)).unwrap();
        table.remove(&key(15)).unwrap();
        assert_eq!(table.slot_of(&key(1)), Some(1));
        table.integrity_check();
    }

    #[test]
    fn remove_into_copies_value() {
        let mut table = table::<BytesHasher>(4);
        table.add(&key(9), &value(900)).unwrap();

        let mut out = [0_u8; 8];
        table.remove_into(&key(9), &mut out).unwrap();

        assert_eq!(out, value(900));
        assert!(table.is_empty());
        assert_eq!(table.remove_into(&key(9), &mut out), Err(Error::KeyNotFound));
    }

    #[test]
    fn get_mut_updates_value() {
        let mut table = table::<BytesHasher>(4);
        table.add(&key(1), &value(1)).unwrap();

        table
            .get_mut(&key(1))
            .unwrap()
            .copy_from_slice(&value(2));

        assert_eq!(table.get(&key(1)), Some(&value(2)[..]));
        assert!(table.get_mut(&key(2)).is_none());
    }

    #[test]
    fn iteration_is_slot_ordered_and_restartable() {
        let mut table = table::<IdentityHasher>(16);

        for k in [9, 2, 14, 5] {
            table.add(&key(k), &value(u64::from(k))).unwrap();
        }

        assert_eq!(keys_in_slot_order(&table), vec![2, 5, 9, 14]);
        assert_eq!(table.iter().len(), 4);

        let pairs: Vec<_> = table.iter().collect();
        assert_eq!(pairs.len(), 4);
        assert_eq!(pairs[0], (&key(2)[..], &value(2)[..]));

        // A fresh iterator starts from the beginning again.
        assert_eq!(keys_in_slot_order(&table), vec![2, 5, 9, 14]);

        let values: Vec<_> = table
            .values()
            .map(|bytes| u64::from_ne_bytes(bytes.try_into().unwrap()))
            .collect();
        assert_eq!(values, vec![2, 5, 9, 14]);
    }

    #[test]
    fn clear_retains_capacity() {
        let mut table = table::<BytesHasher>(1);
        for k in 0..20 {
            table.add(&key(k), &value(0)).unwrap();
        }
        let capacity = table.capacity();

        table.clear();

        assert!(table.is_empty());
        assert_eq!(table.capacity(), capacity);
        assert_eq!(table.iter().count(), 0);
        assert!(!table.contains_key(&key(3)));

        table.add(&key(3), &value(3)).unwrap();
        assert!(table.contains_key(&key(3)));
        table.integrity_check();
    }

    #[test]
    fn clear_with_capacity_only_grows() {
        let mut table = table::<BytesHasher>(8);
        table.add(&key(1), &value(1)).unwrap();

        table.clear_with_capacity(2).unwrap();
        assert_eq!(table.capacity(), 8);
        assert!(table.is_empty());

        table.add(&key(1), &value(1)).unwrap();
        table.clear_with_capacity(100).unwrap();
        assert_eq!(table.capacity(), 128);
        assert!(table.is_empty());
        assert!(!table.contains_key(&key(1)));
    }

    #[test]
    fn reserve_prevents_growth() {
        let mut table = table::<BytesHasher>(1);
        table.reserve(100).unwrap();

        let capacity = table.capacity();
        assert!(load_limit(NonZero::new(capacity).unwrap()) >= 100);

        for k in 0..100 {
            table.add(&key(k), &value(0)).unwrap();
        }
        assert_eq!(table.capacity(), capacity);
    }

    #[test]
    fn zero_sized_values() {
        let mut table: RawProbeTable = RawProbeTable::new(nz!(4), 0, 4).unwrap();

        table.add(&key(1), &[]).unwrap();
        table.add(&key(2), &[]).unwrap();

        assert_eq!(table.get(&key(1)), Some(&[][..]));
        assert_eq!(table.add(&key(1), &[]), Err(Error::DuplicateKey));

        table.remove(&key(1)).unwrap();
        assert!(!table.contains_key(&key(1)));
        assert!(table.contains_key(&key(2)));
    }

    #[test]
    fn try_clone_is_independent() {
        let mut original = table::<IdentityHasher>(8);
        original.add(&key(1), &value(1)).unwrap();

        let copy = original.try_clone().unwrap();
        original.remove(&key(1)).unwrap();
        original.add(&key(2), &value(2)).unwrap();

        assert!(copy.contains_key(&key(1)));
        assert!(!copy.contains_key(&key(2)));
        assert_eq!(copy.slot_of(&key(1)), Some(1));
        copy.integrity_check();
    }

    #[test]
    #[should_panic]
    fn wrong_key_size_panics() {
        let table = table::<BytesHasher>(4);
        _ = table.get(&[1, 2]);
    }

    #[test]
    fn adversarial_collisions_against_reference() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut table = table::<FewHomesHasher>(1);
        let mut reference = HashMap::new();

        for _ in 0..4000 {
            let k = rng.random_range(0..48_u32);

            if rng.random_bool(0.55) {
                let v = rng.random::<u64>();
                let expected = if reference.contains_key(&k) {
                    Err(Error::DuplicateKey)
                } else {
                    Ok(())
                };

                assert_eq!(table.add(&key(k), &value(v)), expected);
                reference.entry(k).or_insert(v);
            } else {
                let expected = if reference.remove(&k).is_some() {
                    Ok(())
                } else {
                    Err(Error::KeyNotFound)
                };

                assert_eq!(table.remove(&key(k)), expected);
            }

            table.integrity_check();
            assert_eq!(table.len(), reference.len());
        }

        for k in 0..48 {
            assert_eq!(
                table
                    .get(&key(k))
                    .map(|bytes| u64::from_ne_bytes(bytes.try_into().unwrap())),
                reference.get(&k).copied()
            );
        }
    }

    #[test]
    fn dense_wraparound_clusters_survive_every_removal_order() {
        // Every key hashes near the end of the table so clusters wrap past slot 0.
        for first_removed in 0..6_u32 {
            let mut table = table::<IdentityHasher>(8);
            let keys = [6, 14, 22, 7, 15, 0];

            for k in keys {
                table.add(&key(k), &value(u64::from(k))).unwrap();
            }

            let order = keys
                .iter()
                .copied()
                .cycle()
                .skip(first_removed as usize)
                .take(keys.len());

            let mut present: Vec<u32> = keys.to_vec();

            for k in order {
                table.remove(&key(k)).unwrap();
                present.retain(|p| *p != k);

                table.integrity_check();
                for p in &present {
                    assert!(table.contains_key(&key(*p)), "lost key {p} after removing {k}");
                }
            }

            assert!(table.is_empty());
        }
    }
}
