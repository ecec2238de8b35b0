use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

const WORD_BITS: usize = 64;

/// Growable bitset supporting concurrent readers and writers.
///
/// Bits are addressed by absolute position and the storage grows on the first
/// write past the current end. Reads past the end return zero bits. Group
/// operations (`count` bits starting at `pos`) may straddle word boundaries.
#[derive(Debug, Default)]
pub struct DynamicBitset {
    words: RwLock<Vec<AtomicU64>>,
}

impl DynamicBitset {
    /// Creates an empty bitset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `count` bits starting at `pos`, packed least-significant first.
    pub fn at(&self, pos: usize, count: usize) -> u64 {
        debug_assert!(count <= WORD_BITS, "group read wider than a word");
        let words = self.words.read();
        let mut out = 0u64;
        for offset in 0..count {
            let bit = pos + offset;
            let Some(word) = words.get(bit / WORD_BITS) else {
                break;
            };
            if word.load(Ordering::Acquire) & (1u64 << (bit % WORD_BITS)) != 0 {
                out |= 1u64 << offset;
            }
        }
        out
    }

    /// Returns whether the single bit at `pos` is set.
    pub fn get(&self, pos: usize) -> bool {
        self.at(pos, 1) == 1
    }

    /// Sets `count` bits starting at `pos`.
    pub fn set(&self, pos: usize, count: usize) {
        if count == 0 {
            return;
        }
        self.ensure_capacity(pos + count);
        let words = self.words.read();
        for bit in pos..pos + count {
            words[bit / WORD_BITS].fetch_or(1u64 << (bit % WORD_BITS), Ordering::AcqRel);
        }
    }

    /// Clears `count` bits starting at `pos`.
    pub fn clear(&self, pos: usize, count: usize) {
        let words = self.words.read();
        for bit in pos..pos + count {
            let Some(word) = words.get(bit / WORD_BITS) else {
                return;
            };
            word.fetch_and(!(1u64 << (bit % WORD_BITS)), Ordering::AcqRel);
        }
    }

    /// Number of bits currently backed by storage.
    pub fn capacity(&self) -> usize {
        self.words.read().len() * WORD_BITS
    }

    fn ensure_capacity(&self, bits: usize) {
        let needed = bits.div_ceil(WORD_BITS);
        if self.words.read().len() >= needed {
            return;
        }
        let mut words = self.words.write();
        // Grow geometrically so commit-log appends stay amortised O(1).
        let target = needed.max(words.len() * 2);
        while words.len() < target {
            words.push(AtomicU64::new(0));
        }
    }
}
