//! Basic usage example for the typed collections and the probe table beneath them.
//!
//! Counts word lengths with a `Dictionary`, then inspects the stride-erased table directly.

use opaque_collections::{Dictionary, List, Queue};

const TEXT: &str = "the quick brown fox jumps over the lazy dog and keeps running far away";

fn main() -> opaque_collections::Result<()> {
    let mut lengths = List::<u8>::new()?;

    for word in TEXT.split_whitespace() {
        lengths.push(u8::try_from(word.len()).unwrap_or(u8::MAX))?;
    }

    println!(
        "Collected {} word lengths, list capacity is {}",
        lengths.len(),
        lengths.capacity()
    );

    let mut histogram = Dictionary::<u8, u32>::new()?;

    for length in &lengths {
        match histogram.get_mut(*length) {
            Some(count) => *count = count.saturating_add(1),
            None => histogram.add(*length, 1)?,
        }
    }

    let mut rows = histogram.iter().collect::<Vec<_>>();
    rows.sort_unstable();

    for (length, count) in rows {
        println!("{length:>2} letters: {count}");
    }

    let table = histogram.into_raw();
    println!(
        "Underlying table: {} entries in {} slots, key stride {}, value stride {}",
        table.len(),
        table.capacity(),
        table.key_stride(),
        table.value_stride()
    );

    let mut pending = Queue::<u8>::with_capacity(2)?;

    for length in lengths.iter().take(5) {
        pending.enqueue(*length)?;
    }

    while let Ok(length) = pending.dequeue() {
        println!("Dequeued {length}");
    }

    Ok(())
}
