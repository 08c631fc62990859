use std::num::NonZero;

use crate::{RawBuffer, Result};

/// One bit per hash table slot, set when the slot holds an entry.
///
/// There is no third "deleted" state: a slot is either occupied or empty.
#[derive(Debug)]
pub(crate) struct Occupancy {
    bits: RawBuffer,
    slots: NonZero<usize>,
}

impl Occupancy {
    /// Creates a bitset for `slots` slots, all empty.
    pub(crate) fn new(slots: NonZero<usize>) -> Result<Self> {
        Ok(Self {
            bits: RawBuffer::allocate(slots.get().div_ceil(8))?,
            slots,
        })
    }

    #[must_use]
    pub(crate) fn is_occupied(&self, slot: usize) -> bool {
        let (byte, mask) = Self::locate(slot);
        self.byte(byte) & mask != 0
    }

    pub(crate) fn set_occupied(&mut self, slot: usize) {
        let (byte, mask) = Self::locate(slot);
        *self.byte_mut(byte) |= mask;
    }

    pub(crate) fn set_empty(&mut self, slot: usize) {
        let (byte, mask) = Self::locate(slot);
        *self.byte_mut(byte) &= !mask;
    }

    /// Marks every slot empty.
    pub(crate) fn clear(&mut self) {
        self.bits.as_bytes_mut().fill(0);
    }

    /// Number of occupied slots. Used to cross-check the tracked entry count.
    #[cfg(any(test, debug_assertions))]
    #[must_use]
    pub(crate) fn count_occupied(&self) -> usize {
        self.bits
            .as_bytes()
            .iter()
            .map(|byte| byte.count_ones() as usize)
            .sum()
    }

    /// Returns the first occupied slot at or after `start`, if any.
    #[must_use]
    pub(crate) fn next_occupied(&self, start: usize) -> Option<usize> {
        let mut slot = start;

        while slot < self.slots.get() {
            let (byte_index, _) = Self::locate(slot);
            let byte = self.byte(byte_index);

            // Skip whole empty bytes in one step.
            if byte == 0 {
                slot = byte_index.wrapping_add(1).wrapping_mul(8);
                continue;
            }

            if self.is_occupied(slot) {
                return Some(slot);
            }

            slot = slot.wrapping_add(1);
        }

        None
    }

    pub(crate) fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            bits: self.bits.try_clone()?,
            slots: self.slots,
        })
    }

    fn locate(slot: usize) -> (usize, u8) {
        (slot >> 3, 1_u8 << (slot & 7))
    }

    fn byte(&self, index: usize) -> u8 {
        *self
            .bits
            .as_bytes()
            .get(index)
            .expect("slot index must be within the table capacity")
    }

    fn byte_mut(&mut self, index: usize) -> &mut u8 {
        self.bits
            .as_bytes_mut()
            .get_mut(index)
            .expect("slot index must be within the table capacity")
    }
}
