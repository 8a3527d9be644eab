//! Fixed-width bit set stored as packed `u64` words.
//!
//! Bit `i` lives in word `i / 64` at position `i % 64`. Binary vector
//! dimensions are multiples of 64, so there is never a partial tail word.

/// Packed bit set with word-parallel boolean operations.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct BitSet {
    words: Vec<u64>,
}

impl BitSet {
    /// All-zero set holding `num_words * 64` bits.
    pub fn zeros(num_words: usize) -> Self {
        Self {
            words: vec![0; num_words],
        }
    }

    /// All-one set holding `num_words * 64` bits.
    pub fn ones(num_words: usize) -> Self {
        Self {
            words: vec![u64::MAX; num_words],
        }
    }

    pub fn from_words(words: Vec<u64>) -> Self {
        Self { words }
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    pub fn words_mut(&mut self) -> &mut [u64] {
        &mut self.words
    }

    pub fn into_words(self) -> Vec<u64> {
        self.words
    }

    /// Number of addressable bits.
    pub fn len(&self) -> usize {
        self.words.len() * 64
    }

    pub fn num_words(&self) -> usize {
        self.words.len()
    }

    #[inline]
    pub fn get(&self, index: usize) -> bool {
        (self.words[index / 64] >> (index % 64)) & 1 == 1
    }

    #[inline]
    pub fn set(&mut self, index: usize) {
        self.words[index / 64] |= 1u64 << (index % 64);
    }

    #[inline]
    pub fn clear(&mut self, index: usize) {
        self.words[index / 64] &= !(1u64 << (index % 64));
    }

    #[inline]
    pub fn flip(&mut self, index: usize) {
        self.words[index / 64] ^= 1u64 << (index % 64);
    }

    /// Number of set bits.
    pub fn cardinality(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// True if no bit is set.
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// True if every bit is set.
    pub fn is_full(&self) -> bool {
        self.words.iter().all(|&w| w == u64::MAX)
    }

    pub fn xor_with(&mut self, other: &BitSet) {
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a ^= b;
        }
    }

    pub fn and_with(&mut self, other: &BitSet) {
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a &= b;
        }
    }

    pub fn and_not_with(&mut self, other: &BitSet) {
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a &= !b;
        }
    }

    pub fn or_with(&mut self, other: &BitSet) {
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= b;
        }
    }

    /// Flip every bit in place.
    pub fn invert(&mut self) {
        for w in &mut self.words {
            *w = !*w;
        }
    }

    /// Hamming distance: popcount of `a ^ b`.
    pub fn xor_count(a: &BitSet, b: &BitSet) -> usize {
        a.words
            .iter()
            .zip(&b.words)
            .map(|(x, y)| (x ^ y).count_ones() as usize)
            .sum()
    }

    /// Iterate over the indices of set bits in ascending order.
    pub fn ones_iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &word)| {
            let mut w = word;
            std::iter::from_fn(move || {
                if w == 0 {
                    return None;
                }
                let bit = w.trailing_zeros() as usize;
                w &= w - 1;
                Some(wi * 64 + bit)
            })
        })
    }
}

impl std::fmt::Debug for BitSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitSet")
            .field("len", &self.len())
            .field("cardinality", &self.cardinality())
            .finish()
    }
}
