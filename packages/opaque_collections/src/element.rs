use std::num::NonZero;

use crate::{BUFFER_ALIGNMENT, Error, Result};

/// Stride used to store elements of type `T`.
///
/// Rejects zero-sized and over-aligned types at compile time.
#[must_use]
pub(crate) const fn stride_of<T>() -> NonZero<usize> {
    const {
        assert!(
            align_of::<T>() <= BUFFER_ALIGNMENT,
            "element alignment exceeds the buffer alignment"
        );

        match NonZero::new(size_of::<T>()) {
            Some(stride) => stride,
            None => panic!("zero-sized element types are not supported"),
        }
    }
}

/// Stride used to store values next to hash table keys. Unlike [`stride_of()`], zero-sized
/// types are accepted and yield a zero stride.
///
/// Rejects over-aligned types at compile time.
#[must_use]
pub(crate) const fn value_stride_of<V>() -> usize {
    const {
        assert!(
            align_of::<V>() <= BUFFER_ALIGNMENT,
            "value alignment exceeds the buffer alignment"
        );

        size_of::<V>()
    }
}

/// Verifies that existing storage with the given stride can be viewed as elements of type `T`.
///
/// Over-aligned types are rejected at compile time, as the storage is only aligned to
/// [`BUFFER_ALIGNMENT`].
pub(crate) fn check_stride<T>(stride: usize) -> Result<()> {
    const {
        assert!(
            align_of::<T>() <= BUFFER_ALIGNMENT,
            "element alignment exceeds the buffer alignment"
        );
    }

    if stride == size_of::<T>() {
        Ok(())
    } else {
        Err(Error::TypeMismatch {
            expected_stride: stride,
            actual_size: size_of::<T>(),
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn stride_matches_size() {
        assert_eq!(stride_of::<u8>().get(), 1);
        assert_eq!(stride_of::<[u16; 3]>().get(), 6);
        assert_eq!(stride_of::<u128>().get(), 16);
    }

    #[test]
    fn value_stride_allows_zero_sized() {
        assert_eq!(value_stride_of::<()>(), 0);
        assert_eq!(value_stride_of::<[u32; 3]>(), 12);
        assert_eq!(value_stride_of::<u128>(), 16);
    }

    #[test]
    fn check_stride_reports_mismatch() {
        assert_eq!(check_stride::<u32>(4), Ok(()));
        assert_eq!(
            check_stride::<u32>(8),
            Err(Error::TypeMismatch {
                expected_stride: 8,
                actual_size: 4
            })
        );
    }
}
