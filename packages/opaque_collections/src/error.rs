use thiserror::Error;

/// Errors that can occur when operating on the containers in this crate.
///
/// Every operation that returns an error has left the container exactly as it was
/// before the call.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The caller referenced an element position that does not exist in the container.
    #[error("index {index} is out of range for a container of length {len}")]
    IndexOutOfRange {
        /// The index that was requested.
        index: usize,

        /// The number of live elements at the time of the request.
        len: usize,
    },

    /// The caller attempted to take or inspect an element of an empty container.
    #[error("the container is empty")]
    EmptyContainer,

    /// A strict add was attempted for a key that is already present in the table.
    #[error("an entry with the same key is already present")]
    DuplicateKey,

    /// The caller attempted to replace or remove a key that is not present in the table.
    #[error("the key is not present")]
    KeyNotFound,

    /// A typed view was requested over storage whose stride does not match the
    /// size of the requested element type.
    #[error("element size {actual_size} does not match the storage stride {expected_stride}")]
    TypeMismatch {
        /// The stride of the existing storage, in bytes.
        expected_stride: usize,

        /// The size of the requested element type, in bytes.
        actual_size: usize,
    },

    /// The allocator could not provide the requested memory, or the requested size
    /// cannot be represented as a valid allocation.
    #[error("failed to allocate a buffer of {requested_bytes} bytes")]
    AllocationFailure {
        /// The requested allocation size in bytes. `usize::MAX` if the size overflowed.
        requested_bytes: usize,
    },
}

/// A specialized `Result` type for container operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug, Clone);

    #[test]
    fn messages_carry_context() {
        let error = Error::IndexOutOfRange { index: 7, len: 3 };
        assert_eq!(
            error.to_string(),
            "index 7 is out of range for a container of length 3"
        );

        let error = Error::TypeMismatch {
            expected_stride: 8,
            actual_size: 4,
        };
        assert_eq!(
            error.to_string(),
            "element size 4 does not match the storage stride 8"
        );
    }

    #[test]
    fn allocation_failure_is_error() {
        let result: Result<()> = Err(Error::AllocationFailure {
            requested_bytes: usize::MAX,
        });
        assert!(matches!(result, Err(Error::AllocationFailure { .. })));
    }
}
