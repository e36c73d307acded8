//! 128-bit relay membership set.
//!
//! Alarms, fault alarms and relay timers each address an arbitrary subset
//! of the up to 128 relays.  On flash the set is four little-endian `u32`
//! words (relays 0..31, 32..63, 64..95, 96..127); in RAM it is an opaque
//! bit-set with membership and iteration operations.

use serde::{Deserialize, Serialize};

use crate::config::{MAX_RELAYS, SEGMENTS, SEGMENT_SIZE};

/// A set of relay indices in `0..128`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelaySet {
    words: [u32; SEGMENTS],
}

impl RelaySet {
    /// The empty set.
    pub const EMPTY: Self = Self { words: [0; SEGMENTS] };

    /// Build from the four on-flash words.
    pub const fn from_words(words: [u32; SEGMENTS]) -> Self {
        Self { words }
    }

    /// The four on-flash words.
    pub const fn words(&self) -> [u32; SEGMENTS] {
        self.words
    }

    /// Single-member set.  Out-of-range indices yield the empty set.
    pub fn single(index: usize) -> Self {
        let mut set = Self::EMPTY;
        set.insert(index);
        set
    }

    /// Add `index`.  Returns `false` if the index is out of range.
    pub fn insert(&mut self, index: usize) -> bool {
        if index >= MAX_RELAYS {
            return false;
        }
        self.words[index / SEGMENT_SIZE] |= 1 << (index % SEGMENT_SIZE);
        true
    }

    pub fn contains(&self, index: usize) -> bool {
        index < MAX_RELAYS && self.words[index / SEGMENT_SIZE] & (1 << (index % SEGMENT_SIZE)) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Members in ascending index order.
    pub fn iter(&self) -> Iter {
        Iter {
            words: self.words,
            segment: 0,
        }
    }

    pub fn union_with(&mut self, other: &Self) {
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a |= *b;
        }
    }
}

impl FromIterator<usize> for RelaySet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = Self::EMPTY;
        for index in iter {
            set.insert(index);
        }
        set
    }
}

/// Ascending iterator over the members of a [`RelaySet`].
pub struct Iter {
    words: [u32; SEGMENTS],
    segment: usize,
}

impl Iterator for Iter {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.segment < SEGMENTS {
            let word = self.words[self.segment];
            if word != 0 {
                let bit = word.trailing_zeros() as usize;
                self.words[self.segment] &= word - 1;
                return Some(self.segment * SEGMENT_SIZE + bit);
            }
            self.segment += 1;
        }
        None
    }
}

impl IntoIterator for &RelaySet {
    type Item = usize;
    type IntoIter = Iter;

    fn into_iter(self) -> Iter {
        self.iter()
    }
}
