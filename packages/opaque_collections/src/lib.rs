#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Growable collections built on stride-addressed byte buffers.
//!
//! The core of this crate is a small set of storage engines that know nothing about the type
//! of their elements. Each engine is configured with a stride (the size of one element in
//! bytes) and moves elements in and out as byte slices of exactly that length:
//!
//! - [`RawSlab`] - a packed, growable array with insertion, removal and swap-removal.
//! - [`RawStack`] - last-in-first-out on top of a slab.
//! - [`RawQueue`] - first-in-first-out in a circular buffer.
//! - [`RawProbeTable`] - an open-addressing hash table with linear probing and
//!   backward-shift deletion, keyed by byte strings and hashed through a [`KeyHasher`].
//!
//! All capacities are powers of two. Growth doubles the capacity (or jumps straight to the
//! next power of two that fits a bulk request) and copies the live elements over, so no
//! allocation is ever done per element.
//!
//! On top of the engines sit thin typed adapters: [`List<T>`], [`Stack<T>`], [`Queue<T>`],
//! [`Dictionary<K, V>`] and [`HashSet<K>`]. Their element types must be
//! [`bytemuck::Pod`], which guarantees that any stored byte pattern is a valid value.
//!
//! # Errors
//!
//! Recoverable conditions (index out of range, empty container, duplicate or missing keys,
//! stride mismatches and allocation failures) are reported as [`Error`]. Passing a byte slice
//! whose length does not match the stride is a programming error and panics.
//!
//! # Thread safety
//!
//! Every collection is [`Send`] but not [`Sync`]. Share one between threads by wrapping it in
//! a lock.
//!
//! # Examples
//!
//! ```rust
//! use opaque_collections::{Dictionary, List, Queue};
//!
//! let mut list = List::<u32>::new()?;
//! list.extend_from_slice(&[3, 1, 2])?;
//! list.as_mut_slice().sort_unstable();
//! assert_eq!(list.as_slice(), &[1, 2, 3]);
//!
//! let mut queue = Queue::<u32>::new()?;
//! for value in &list {
//!     queue.enqueue(*value)?;
//! }
//! assert_eq!(queue.dequeue()?, 1);
//!
//! let mut squares = Dictionary::<u32, u64>::new()?;
//! for value in queue.iter() {
//!     squares.add(value, u64::from(value) * u64::from(value))?;
//! }
//! assert_eq!(squares.get(3), Some(9));
//! # Ok::<(), opaque_collections::Error>(())
//! ```
//!
//! Working with the stride-erased engine directly:
//!
//! ```rust
//! use opaque_collections::{InsertMode, InsertOutcome, RawProbeTable};
//!
//! let mut table = RawProbeTable::builder()
//!     .key_stride(std::num::NonZero::new(3).unwrap())
//!     .value_stride(1)
//!     .capacity(8)
//!     .build()?;
//!
//! table.insert(b"abc", b"1", InsertMode::Add)?;
//! let outcome = table.insert(b"abc", b"2", InsertMode::AddOrSet)?;
//!
//! assert_eq!(outcome, InsertOutcome::Replaced);
//! assert_eq!(table.get(b"abc"), Some(&b"2"[..]));
//! # Ok::<(), opaque_collections::Error>(())
//! ```

mod buffer;
mod builder;
mod dictionary;
mod element;
mod error;
mod growth;
mod hash_set;
mod hashing;
mod list;
mod occupancy;
mod queue;
mod raw_probe_table;
mod raw_queue;
mod raw_slab;
mod raw_stack;
mod stack;

pub use buffer::BUFFER_ALIGNMENT;
pub(crate) use buffer::RawBuffer;
pub use builder::RawProbeTableBuilder;
pub use dictionary::{DefaultHashBuilder, Dictionary};
pub use error::{Error, Result};
pub use hash_set::HashSet;
pub use hashing::{BytesHasher, KeyHasher, TypedKeyHasher};
pub use list::List;
pub(crate) use occupancy::Occupancy;
pub use queue::Queue;
pub use raw_probe_table::{InsertMode, InsertOutcome, Iter, RawProbeTable};
pub use raw_queue::{QueueIter, RawQueue};
pub use raw_slab::RawSlab;
pub use raw_stack::RawStack;
pub use stack::Stack;
