//! Integration tests for the `opaque_collections` package.
//!
//! These exercise the public API end to end: the stride-erased engines through
//! custom key hashers, and the typed adapters against the standard library collections.

use std::collections::{HashMap, VecDeque};
use std::num::NonZero;

use bytemuck::{Pod, Zeroable};
use new_zealand::nz;
use opaque_collections::{
    Dictionary, Error, HashSet, InsertMode, InsertOutcome, KeyHasher, List, Queue, RawProbeTable,
    RawSlab, RawStack, Stack,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Uses the key itself as its hash, so tests control exactly where entries land.
#[derive(Clone, Debug, Default)]
struct IdentityHasher;

impl KeyHasher for IdentityHasher {
    fn hash_key(&self, key: &[u8]) -> u64 {
        u64::from(u32::from_ne_bytes(key.try_into().unwrap()))
    }
}

/// Hashes every key to the same home slot.
#[derive(Clone, Debug, Default)]
struct ConstantHasher(u64);

impl KeyHasher for ConstantHasher {
    fn hash_key(&self, _key: &[u8]) -> u64 {
        self.0
    }
}

fn key(value: u32) -> [u8; 4] {
    value.to_ne_bytes()
}

fn identity_table(capacity: usize) -> RawProbeTable<IdentityHasher> {
    RawProbeTable::builder()
        .key_size_of::<u32>()
        .value_size_of::<u32>()
        .capacity(capacity)
        .hasher(IdentityHasher)
        .build()
        .unwrap()
}

#[test]
fn removal_then_reinsertion_lands_on_home_slots() {
    let mut table = identity_table(4);

    for k in [0, 1, 23] {
        table.add(&key(k), &key(k * 10)).unwrap();
    }

    assert_eq!(table.slot_of(&key(0)), Some(0));
    assert_eq!(table.slot_of(&key(1)), Some(1));
    assert_eq!(table.slot_of(&key(23)), Some(3));

    table.remove(&key(23)).unwrap();
    table.remove(&key(1)).unwrap();

    assert_eq!(table.len(), 1);
    assert_eq!(table.slot_of(&key(0)), Some(0));

    table.add(&key(2), &key(20)).unwrap();
    table.add(&key(23), &key(230)).unwrap();

    assert_eq!(table.capacity(), 4);
    assert_eq!(table.slot_of(&key(2)), Some(2));
    assert_eq!(table.slot_of(&key(23)), Some(3));

    let keys = table
        .keys()
        .map(|k| u32::from_ne_bytes(k.try_into().unwrap()))
        .collect::<Vec<_>>();
    assert_eq!(keys, vec![0, 2, 23]);
}

#[test]
fn stack_grows_and_pops_in_reverse() {
    let mut stack = RawStack::new(nz!(4), 1).unwrap();
    let mut capacities = Vec::new();

    for value in 1_u32..=5 {
        stack.push(&value.to_ne_bytes()).unwrap();
        capacities.push(stack.capacity());
    }

    assert_eq!(capacities, vec![1, 2, 4, 4, 8]);

    let range = (6_u32..=10).flat_map(u32::to_ne_bytes).collect::<Vec<_>>();
    stack.push_range(&range).unwrap();
    assert_eq!(stack.capacity(), 16);

    let popped = (0..10)
        .map(|_| u32::from_ne_bytes(stack.pop().unwrap().try_into().unwrap()))
        .collect::<Vec<_>>();

    assert_eq!(popped, (1..=10).rev().collect::<Vec<_>>());
    assert_eq!(stack.pop(), Err(Error::EmptyContainer));
}

#[test]
fn removal_shifts_cluster_backward() {
    let mut table = RawProbeTable::builder()
        .key_size_of::<u32>()
        .value_stride(0)
        .capacity(8)
        .hasher(ConstantHasher(3))
        .build()
        .unwrap();

    for k in [100, 200, 300] {
        table.add(&key(k), &[]).unwrap();
    }

    assert_eq!(table.slot_of(&key(100)), Some(3));
    assert_eq!(table.slot_of(&key(200)), Some(4));
    assert_eq!(table.slot_of(&key(300)), Some(5));

    table.remove(&key(200)).unwrap();

    assert_eq!(table.slot_of(&key(300)), Some(4));
    assert!(table.contains_key(&key(300)));
    assert!(table.contains_key(&key(100)));
    assert!(!table.contains_key(&key(200)));
    assert_eq!(table.len(), 2);
}

#[test]
fn insertion_past_load_limit_rehashes() {
    let mut table = identity_table(4);

    for k in [4, 9, 14] {
        table.add(&key(k), &key(k)).unwrap();
    }
    assert_eq!(table.capacity(), 4);

    table.add(&key(19), &key(19)).unwrap();

    assert_eq!(table.capacity(), 8);
    assert_eq!(table.len(), 4);

    for k in [4, 9, 14, 19] {
        assert_eq!(table.get(&key(k)), Some(&key(k)[..]));
    }

    // Homes after the rehash are the keys modulo 8.
    assert_eq!(table.slot_of(&key(4)), Some(4));
    assert_eq!(table.slot_of(&key(9)), Some(1));
    assert_eq!(table.slot_of(&key(14)), Some(6));
    assert_eq!(table.slot_of(&key(19)), Some(3));
}

#[test]
fn failed_inserts_do_not_grow() {
    let mut table = identity_table(4);

    for k in 0..3 {
        table.add(&key(k), &key(k)).unwrap();
    }

    assert_eq!(table.add(&key(1), &key(9)), Err(Error::DuplicateKey));
    assert_eq!(table.set(&key(7), &key(9)), Err(Error::KeyNotFound));
    assert_eq!(
        table.insert(&key(2), &key(22), InsertMode::AddOrSet),
        Ok(InsertOutcome::Replaced)
    );

    assert_eq!(table.capacity(), 4);
    assert_eq!(table.get(&key(1)), Some(&key(1)[..]));
    assert_eq!(table.get(&key(2)), Some(&key(22)[..]));
}

#[test]
fn every_entry_is_iterated_once() {
    let mut table = identity_table(1);

    for k in (0..500).map(|k| k * 37) {
        table.add(&key(k), &key(k + 1)).unwrap();
    }

    for k in (0..500).filter(|k| k % 3 == 0).map(|k| k * 37) {
        table.remove(&key(k)).unwrap();
    }

    let mut seen = table
        .iter()
        .map(|(k, v)| {
            let k = u32::from_ne_bytes(k.try_into().unwrap());
            assert_eq!(u32::from_ne_bytes(v.try_into().unwrap()), k + 1);
            k
        })
        .collect::<Vec<_>>();
    seen.sort_unstable();

    let expected = (0..500)
        .filter(|k| k % 3 != 0)
        .map(|k| k * 37)
        .collect::<Vec<_>>();

    assert_eq!(table.iter().len(), expected.len());
    assert_eq!(seen, expected);
}

#[test]
fn list_matches_vec() {
    let mut rng = StdRng::seed_from_u64(0x1157);
    let mut list = List::<i32>::new().unwrap();
    let mut reference = Vec::new();
    let mut max_len = 0_usize;

    for _ in 0..4_000 {
        match rng.random_range(0..5) {
            0 | 1 => {
                let value = rng.random();
                list.push(value).unwrap();
                reference.push(value);
            }
            2 => {
                let index = rng.random_range(0..=reference.len());
                let value = rng.random();
                list.insert(index, value).unwrap();
                reference.insert(index, value);
            }
            3 if !reference.is_empty() => {
                let index = rng.random_range(0..reference.len());
                assert_eq!(list.remove(index).unwrap(), reference.remove(index));
            }
            _ if !reference.is_empty() => {
                let index = rng.random_range(0..reference.len());
                assert_eq!(list.swap_remove(index).unwrap(), reference.swap_remove(index));
            }
            _ => assert_eq!(list.pop(), None),
        }

        assert_eq!(list.len(), reference.len());

        // Capacity only ever grows, to the smallest power of two that fits the largest length.
        max_len = max_len.max(reference.len());
        assert_eq!(list.capacity(), max_len.max(1).next_power_of_two());
    }

    assert_eq!(list.as_slice(), reference.as_slice());
}

#[test]
fn stack_and_queue_order() {
    let mut stack = Stack::<u64>::new().unwrap();
    let mut queue = Queue::<u64>::new().unwrap();
    let mut reference = VecDeque::new();

    for value in 0..100 {
        stack.push(value).unwrap();
        queue.enqueue(value).unwrap();
        reference.push_back(value);

        if value % 3 == 0 {
            assert_eq!(queue.dequeue().ok(), reference.pop_front());
        }
    }

    assert_eq!(stack.peek(), Ok(99));
    assert!(queue.iter().eq(reference.iter().copied()));
    assert_eq!(queue.capacity(), 128);
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Pod, Zeroable)]
struct Point {
    x: i32,
    y: i32,
}

#[test]
fn dictionary_with_struct_keys_matches_hash_map() {
    let mut rng = StdRng::seed_from_u64(0xD0C5);
    let mut dictionary = Dictionary::<Point, u64>::new().unwrap();
    let mut reference = HashMap::new();

    for _ in 0..5_000 {
        let point = Point {
            x: rng.random_range(-10..10),
            y: rng.random_range(-10..10),
        };

        if rng.random_bool(0.6) {
            let value: u64 = rng.random();
            let expected = match reference.insert(point, value) {
                Some(_) => InsertOutcome::Replaced,
                None => InsertOutcome::Added,
            };
            assert_eq!(dictionary.insert(point, value), Ok(expected));
        } else {
            let expected = reference.remove(&point).ok_or(Error::KeyNotFound);
            assert_eq!(dictionary.remove(point), expected);
        }
    }

    assert_eq!(dictionary.len(), reference.len());

    for (point, value) in &reference {
        assert_eq!(dictionary.get(*point), Some(*value));
    }
}

#[test]
fn hash_set_over_adapted_table() {
    let mut set = HashSet::<u32>::with_capacity(4).unwrap();

    for value in 0..10 {
        set.add(value * value).unwrap();
    }

    assert!(set.contains(81));
    assert!(!set.contains(80));
    assert_eq!(set.len(), 10);
    assert_eq!(set.capacity(), 16);
}

#[test]
fn adapters_reject_storage_of_other_sizes() {
    let slab = RawSlab::new(NonZero::new(3).unwrap(), 1).unwrap();

    assert_eq!(
        List::<u32>::from_raw(slab).err(),
        Some(Error::TypeMismatch {
            expected_stride: 3,
            actual_size: 4
        })
    );
}

#[test]
fn clear_with_capacity_never_shrinks() {
    let mut list = List::<u8>::with_capacity(32).unwrap();
    list.extend_from_slice(&[1, 2, 3]).unwrap();

    list.clear_with_capacity(4).unwrap();
    assert!(list.is_empty());
    assert_eq!(list.capacity(), 32);

    list.clear_with_capacity(100).unwrap();
    assert_eq!(list.capacity(), 128);
}
