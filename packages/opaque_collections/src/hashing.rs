use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;
use std::num::NonZero;

use bytemuck::Pod;

/// Mask applied to every hash code stored in a hash table: hash codes are 31-bit
/// non-negative values.
pub(crate) const HASH_CODE_MASK: u32 = 0x7FFF_FFFF;

/// Hashing and equality for stride-erased keys.
///
/// The hash table engine never knows the type of its keys, only their byte representation.
/// Implementations of this trait supply the "natural" hash of a key and decide whether two
/// stored keys are equal. The engine truncates the natural hash to 31 bits.
///
/// # Examples
///
/// ```
/// use opaque_collections::KeyHasher;
///
/// /// Uses the first key byte as the hash, which is handy for forcing collisions.
/// struct FirstByte;
///
/// impl KeyHasher for FirstByte {
///     fn hash_key(&self, key: &[u8]) -> u64 {
///         u64::from(key.first().copied().unwrap_or_default())
///     }
/// }
///
/// assert_eq!(FirstByte.hash_key(&[7, 1, 1]), 7);
/// assert!(FirstByte.keys_equal(&[1, 2], &[1, 2]));
/// ```
pub trait KeyHasher {
    /// Returns the natural hash of the key bytes.
    fn hash_key(&self, key: &[u8]) -> u64;

    /// Returns whether two keys are equal. Defaults to byte equality.
    fn keys_equal(&self, left: &[u8], right: &[u8]) -> bool {
        left == right
    }
}

/// Reduces a natural hash to the 31-bit hash code stored in the table.
#[must_use]
#[inline]
pub(crate) fn hash_code(natural: u64) -> u32 {
    #[expect(
        clippy::cast_possible_truncation,
        reason = "truncation to the low bits is the intended reduction"
    )]
    let truncated = natural as u32;

    truncated & HASH_CODE_MASK
}

/// Slot a hash code maps to before any probing happens.
#[must_use]
#[inline]
pub(crate) fn home_slot(hash_code: u32, capacity: NonZero<usize>) -> usize {
    // Capacity is a power of two, so the mask is all low bits set.
    (hash_code as usize) & capacity.get().wrapping_sub(1)
}

/// Number of probe steps from slot `from` forward to slot `to` on a table of the
/// given (power of two) capacity.
#[must_use]
#[inline]
pub(crate) fn probe_distance(from: usize, to: usize, capacity: NonZero<usize>) -> usize {
    to.wrapping_sub(from) & capacity.get().wrapping_sub(1)
}

/// Hashes raw key bytes with a [`BuildHasher`] and compares keys byte for byte.
///
/// This is the default hasher of [`RawProbeTable`][crate::RawProbeTable], suitable whenever
/// two keys are equal exactly when their bytes are equal.
#[derive(Clone, Default)]
pub struct BytesHasher<S = foldhash::fast::FixedState> {
    build_hasher: S,
}

impl<S> BytesHasher<S> {
    /// Creates a hasher that uses the given [`BuildHasher`] for the key bytes.
    #[must_use]
    pub fn with_build_hasher(build_hasher: S) -> Self {
        Self { build_hasher }
    }
}

impl<S: BuildHasher> KeyHasher for BytesHasher<S> {
    fn hash_key(&self, key: &[u8]) -> u64 {
        self.build_hasher.hash_one(key)
    }
}

impl<S> fmt::Debug for BytesHasher<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BytesHasher").finish_non_exhaustive()
    }
}

/// Hashes and compares keys as values of type `K`, the bridge between the typed
/// [`Dictionary`][crate::Dictionary]/[`HashSet`][crate::HashSet] adapters and the
/// stride-erased table engine.
///
/// Equality follows `K: Eq`, not byte equality.
pub struct TypedKeyHasher<K, S> {
    build_hasher: S,
    _key: PhantomData<fn(K) -> K>,
}

impl<K, S> TypedKeyHasher<K, S> {
    /// Creates a typed hasher over the given [`BuildHasher`].
    #[must_use]
    pub fn new(build_hasher: S) -> Self {
        Self {
            build_hasher,
            _key: PhantomData,
        }
    }

    /// The [`BuildHasher`] used to hash keys.
    #[must_use]
    pub fn build_hasher(&self) -> &S {
        &self.build_hasher
    }
}

impl<K, S> KeyHasher for TypedKeyHasher<K, S>
where
    K: Pod + Eq + Hash,
    S: BuildHasher,
{
    fn hash_key(&self, key: &[u8]) -> u64 {
        self.build_hasher
            .hash_one(bytemuck::pod_read_unaligned::<K>(key))
    }

    fn keys_equal(&self, left: &[u8], right: &[u8]) -> bool {
        bytemuck::pod_read_unaligned::<K>(left) == bytemuck::pod_read_unaligned::<K>(right)
    }
}

impl<K, S: Clone> Clone for TypedKeyHasher<K, S> {
    fn clone(&self) -> Self {
        Self::new(self.build_hasher.clone())
    }
}

impl<K, S> fmt::Debug for TypedKeyHasher<K, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedKeyHasher")
            .field("key", &std::any::type_name::<K>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use new_zealand::nz;

    use super::*;

    #[test]
    fn hash_code_clears_sign_bit() {
        assert_eq!(hash_code(0xFFFF_FFFF), 0x7FFF_FFFF);
        assert_eq!(hash_code(0x1_0000_0005), 5);
        assert_eq!(hash_code(23), 23);
    }

    #[test]
    fn home_slot_masks_low_bits() {
        assert_eq!(home_slot(0, nz!(4)), 0);
        assert_eq!(home_slot(23, nz!(4)), 3);
        assert_eq!(home_slot(23, nz!(8)), 7);
        assert_eq!(home_slot(HASH_CODE_MASK, nz!(1)), 0);
    }

    #[test]
    fn probe_distance_wraps_around() {
        assert_eq!(probe_distance(3, 5, nz!(8)), 2);
        assert_eq!(probe_distance(6, 1, nz!(8)), 3);
        assert_eq!(probe_distance(4, 4, nz!(8)), 0);
    }

    #[test]
    fn bytes_hasher_is_deterministic() {
        let hasher = BytesHasher::<foldhash::fast::FixedState>::default();

        assert_eq!(hasher.hash_key(&[1, 2, 3]), hasher.hash_key(&[1, 2, 3]));
        assert!(hasher.keys_equal(&[1, 2, 3], &[1, 2, 3]));
        assert!(!hasher.keys_equal(&[1, 2, 3], &[1, 2, 4]));
    }

    #[test]
    fn typed_hasher_matches_build_hasher() {
        let build_hasher = foldhash::fast::FixedState::with_seed(42);
        let hasher = TypedKeyHasher::<u64, _>::new(build_hasher);

        assert_eq!(
            hasher.hash_key(&99_u64.to_ne_bytes()),
            build_hasher.hash_one(99_u64)
        );
        assert!(hasher.keys_equal(&5_u64.to_ne_bytes(), &5_u64.to_ne_bytes()));
        assert!(!hasher.keys_equal(&5_u64.to_ne_bytes(), &6_u64.to_ne_bytes()));
    }
}
