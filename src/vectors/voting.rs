//! Bit-plane voting record for weighted superposition of binary vectors.
//!
//! The record stores one integer counter per dimension, sliced into bit
//! planes: plane `p` holds bit `p` of every counter. The true count for
//! dimension `i` is
//!
//! ```text
//! minimum + Σ_p 2^p · planes[p][i]
//! ```
//!
//! Adding a vector is a ripple-carry addition performed 64 dimensions at a
//! time: XOR the incoming word into plane `p`, and whatever was already `1`
//! there carries into plane `p + 1`. A weight `w` is decomposed into powers
//! of two, each power starting its sweep at the matching plane, so the cost
//! is `O(popcount(w) · planes)` word operations rather than `O(w · planes)`.
//!
//! Before each sweep the largest value shared by every dimension is moved
//! into `minimum`, which keeps the number of planes proportional to the
//! spread of the counts instead of their magnitude.

use super::bitset::BitSet;
use crate::error::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// Decimal places kept when the first superposed weight is not integral.
pub const FRACTIONAL_DECIMAL_PLACES: u32 = 2;

/// Per-dimension vote counters stored as bit planes.
#[derive(Clone, Debug, PartialEq)]
pub struct VotingRecord {
    num_words: usize,
    planes: Vec<BitSet>,
    /// Sum of all weights added, in scaled units.
    total_votes: u64,
    /// Count shared by every dimension, held outside the planes.
    minimum: u64,
    decimal_places: u32,
}

impl VotingRecord {
    /// Empty record over `num_words * 64` dimensions.
    pub fn new(num_words: usize, decimal_places: u32) -> Self {
        Self {
            num_words,
            planes: Vec::new(),
            total_votes: 0,
            minimum: 0,
            decimal_places,
        }
    }

    pub fn dimension(&self) -> usize {
        self.num_words * 64
    }

    pub fn planes(&self) -> &[BitSet] {
        &self.planes
    }

    pub fn num_planes(&self) -> usize {
        self.planes.len()
    }

    /// Total weight added so far, in scaled units.
    pub fn total_votes(&self) -> u64 {
        self.total_votes
    }

    pub fn minimum(&self) -> u64 {
        self.minimum
    }

    pub fn decimal_places(&self) -> u32 {
        self.decimal_places
    }

    /// Multiplier from real-valued weights to integer vote units.
    pub fn scale(&self) -> u64 {
        10u64.pow(self.decimal_places)
    }

    /// Round a real weight to this record's precision.
    pub fn scale_weight(&self, weight: f64) -> Result<u64> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(Error::InvalidParameter(format!(
                "superposition weight must be finite and non-negative, got {weight}"
            )));
        }
        let scaled = (weight * self.scale() as f64).round();
        // u64::MAX as f64 rounds up to 2^64.
        if scaled >= u64::MAX as f64 {
            return Err(Error::InvalidParameter(format!(
                "superposition weight {weight} does not fit in a vote count"
            )));
        }
        Ok(scaled as u64)
    }

    /// True vote count for a single dimension.
    pub fn count(&self, dimension: usize) -> u64 {
        self.planes
            .iter()
            .enumerate()
            .filter(|(_, plane)| plane.get(dimension))
            .fold(self.minimum, |acc, (p, _)| acc + (1u64 << p))
    }

    /// True vote counts for every dimension.
    pub fn counts(&self) -> Vec<u64> {
        let mut counts = vec![self.minimum; self.dimension()];
        for (p, plane) in self.planes.iter().enumerate() {
            for i in plane.ones_iter() {
                counts[i] += 1u64 << p;
            }
        }
        counts
    }

    /// Record holding `bits` as its only vote.
    pub(crate) fn single_vote(bits: &BitSet, decimal_places: u32) -> Self {
        let mut record = Self::new(bits.num_words(), decimal_places);
        record.accumulate(bits, record.scale());
        record
    }

    /// Add `weight` votes (scaled units) to every dimension set in `incoming`.
    ///
    /// Fails without touching the counts if the total would overflow `u64`.
    /// Every count is bounded by the total, so the planes never outgrow 64.
    pub fn add(&mut self, incoming: &BitSet, weight: u64) -> Result<()> {
        if self.total_votes.checked_add(weight).is_none() {
            return Err(Error::InvalidParameter(format!(
                "adding {weight} votes to a record holding {} overflows",
                self.total_votes
            )));
        }
        self.accumulate(incoming, weight);
        Ok(())
    }

    fn accumulate(&mut self, incoming: &BitSet, weight: u64) {
        if weight == 0 {
            return;
        }
        self.total_votes += weight;
        if incoming.is_empty() {
            return;
        }
        for_each_power_of_two(weight, |row| {
            self.extract_shared_minimum();
            self.carry_sweep(incoming, row);
        });
    }

    /// Remove `weight` votes from every dimension set in `incoming`.
    ///
    /// This is the exact inverse of [`add`](Self::add). Fails without
    /// touching the counts if any selected dimension holds fewer than
    /// `weight` votes.
    pub fn subtract(&mut self, incoming: &BitSet, weight: u64) -> Result<()> {
        if weight == 0 {
            return Ok(());
        }
        if weight > self.total_votes {
            return Err(Error::InvalidParameter(format!(
                "cannot retract {weight} votes from a record holding {}",
                self.total_votes
            )));
        }
        if !incoming.is_empty() {
            let mut short = incoming.clone();
            short.and_not_with(&self.dims_with_count_at_least(weight));
            if !short.is_empty() {
                return Err(Error::InvalidParameter(format!(
                    "cannot retract {weight} votes: {} dimensions hold fewer",
                    short.cardinality()
                )));
            }
            self.materialize_minimum();
            for_each_power_of_two(weight, |row| self.borrow_sweep(incoming, row));
            self.trim();
        }
        self.total_votes -= weight;
        Ok(())
    }

    /// Lower every plane count by `weight` and raise `minimum` to match.
    ///
    /// True counts are unchanged. Every dimension must hold at least
    /// `weight` in its planes.
    pub(crate) fn decrement(&mut self, weight: u64) {
        if weight == 0 {
            return;
        }
        let all = BitSet::ones(self.num_words);
        self.minimum += weight;
        for_each_power_of_two(weight, |row| self.borrow_sweep(&all, row));
        self.trim();
    }

    /// Smallest plane count over all dimensions, computed bit-parallel from
    /// the top plane down.
    pub(crate) fn shared_minimum(&self) -> u64 {
        if self.planes.is_empty() {
            return 0;
        }
        let mut union = BitSet::zeros(self.num_words);
        for plane in &self.planes {
            union.or_with(plane);
        }
        if !union.is_full() {
            return 0;
        }

        // Dimensions that could still be the minimum.
        let mut candidates = BitSet::ones(self.num_words);
        let mut min = 0u64;
        for p in (0..self.planes.len()).rev() {
            let mut lacking = candidates.clone();
            lacking.and_not_with(&self.planes[p]);
            if lacking.is_empty() {
                min |= 1u64 << p;
            } else {
                candidates = lacking;
            }
        }
        min
    }

    fn extract_shared_minimum(&mut self) {
        let shared = self.shared_minimum();
        if shared > 0 {
            self.decrement(shared);
        }
    }

    /// Move `minimum` back into the planes so every count can be borrowed from.
    fn materialize_minimum(&mut self) {
        if self.minimum == 0 {
            return;
        }
        let all = BitSet::ones(self.num_words);
        let minimum = std::mem::take(&mut self.minimum);
        for_each_power_of_two(minimum, |row| self.carry_sweep(&all, row));
    }

    /// Add `2^row` to every dimension set in `incoming`.
    fn carry_sweep(&mut self, incoming: &BitSet, row: usize) {
        while self.planes.len() < row {
            self.planes.push(BitSet::zeros(self.num_words));
        }
        for w in 0..self.num_words {
            let mut carry = incoming.words()[w];
            let mut p = row;
            while carry != 0 {
                if p == self.planes.len() {
                    self.planes.push(BitSet::zeros(self.num_words));
                }
                let slot = &mut self.planes[p].words_mut()[w];
                let old = *slot;
                *slot = old ^ carry;
                carry &= old;
                p += 1;
            }
        }
    }

    /// Subtract `2^row` from every dimension set in `incoming`.
    fn borrow_sweep(&mut self, incoming: &BitSet, row: usize) {
        for w in 0..self.num_words {
            let mut borrow = incoming.words()[w];
            let mut p = row;
            while borrow != 0 {
                if p >= self.planes.len() {
                    debug_assert!(false, "voting record underflow at plane {p}");
                    break;
                }
                let slot = &mut self.planes[p].words_mut()[w];
                let old = *slot;
                *slot = old ^ borrow;
                borrow &= !old;
                p += 1;
            }
        }
    }

    /// Drop empty high planes.
    fn trim(&mut self) {
        while self.planes.last().is_some_and(BitSet::is_empty) {
            self.planes.pop();
        }
    }

    /// Compare every plane count against `target`: returns (greater, equal).
    fn compare_planes(&self, target: u64) -> (BitSet, BitSet) {
        let target_bits = (64 - target.leading_zeros()) as usize;
        let top = self.planes.len().max(target_bits);
        let mut greater = BitSet::zeros(self.num_words);
        let mut equal = BitSet::ones(self.num_words);

        for p in (0..top).rev() {
            let target_bit = (target >> p) & 1 == 1;
            for w in 0..self.num_words {
                let x = self.planes.get(p).map_or(0, |plane| plane.words()[w]);
                let eq = &mut equal.words_mut()[w];
                if target_bit {
                    *eq &= x;
                } else {
                    greater.words_mut()[w] |= *eq & x;
                    *eq &= !x;
                }
            }
        }
        (greater, equal)
    }

    /// Dimensions whose true count is at least `count`.
    pub fn dims_with_count_at_least(&self, count: u64) -> BitSet {
        if count <= self.minimum {
            return BitSet::ones(self.num_words);
        }
        let (mut greater, equal) = self.compare_planes(count - self.minimum);
        greater.or_with(&equal);
        greater
    }

    /// Dimensions whose true count is exactly `count`.
    pub fn dims_with_count_exactly(&self, count: u64) -> BitSet {
        if count < self.minimum {
            return BitSet::zeros(self.num_words);
        }
        self.compare_planes(count - self.minimum).1
    }

    /// Seed derived from the accumulated counts, so identical histories
    /// normalize identically regardless of how the planes are laid out.
    pub fn seed(&self) -> u64 {
        let mut h = 0x9E37_79B9_7F4A_7C15u64 ^ self.total_votes;
        for c in self.counts() {
            h ^= c;
            h = h.wrapping_mul(0x0000_0100_0000_01B3);
            h ^= h >> 29;
        }
        h
    }

    /// Majority vote: 1 where count > total/2, 0 where count < total/2,
    /// exact ties broken by a draw seeded from [`seed`](Self::seed).
    pub fn majority(&self) -> BitSet {
        let total = self.total_votes;
        if total == 0 {
            return BitSet::zeros(self.num_words);
        }
        let mut result = self.dims_with_count_at_least(total / 2 + 1);
        if total % 2 == 0 {
            let ties = self.dims_with_count_exactly(total / 2);
            if !ties.is_empty() {
                let mut rng = StdRng::seed_from_u64(self.seed());
                for i in ties.ones_iter() {
                    if rng.random_bool(0.5) {
                        result.set(i);
                    }
                }
            }
        }
        result
    }

    /// Probabilistic vote: each dimension is set with probability
    /// Φ((count − total/2) / (√total / 2)), counts taken in whole votes.
    pub fn probabilistic(&self) -> BitSet {
        let total = self.total_votes;
        if total == 0 {
            return BitSet::zeros(self.num_words);
        }
        let counts = self.counts();

        // Unanimous dimensions carry no uncertainty.
        if counts.iter().all(|&c| c == 0 || c == total) {
            return self.dims_with_count_at_least(total);
        }

        let scale = self.scale() as f64;
        let total_votes = total as f64 / scale;
        let mean = total_votes / 2.0;
        let std_dev = total_votes.sqrt() / 2.0;

        let mut rng = StdRng::seed_from_u64(self.seed());
        let mut probabilities: HashMap<u64, f64> = HashMap::new();
        let mut result = BitSet::zeros(self.num_words);
        for (i, &count) in counts.iter().enumerate() {
            let p = *probabilities
                .entry(count)
                .or_insert_with(|| normal_cdf((count as f64 / scale - mean) / std_dev));
            if rng.random::<f64>() < p {
                result.set(i);
            }
        }
        result
    }
}

/// Call `f(row)` for every set bit of `weight`, highest first.
fn for_each_power_of_two(mut weight: u64, mut f: impl FnMut(usize)) {
    while weight > 0 {
        let row = 63 - weight.leading_zeros() as usize;
        f(row);
        weight -= 1u64 << row;
    }
}

/// Standard normal CDF via [`erf`].
pub fn normal_cdf(z: f64) -> f64 {
    (1.0 + erf(z / std::f64::consts::SQRT_2)) / 2.0
}

/// Abramowitz & Stegun 7.1.27 approximation of the error function
/// (absolute error ≤ 5e-4).
pub fn erf(z: f64) -> f64 {
    let sign = z.signum();
    let z = z.abs();
    let (a1, a2, a3, a4) = (0.278393, 0.230389, 0.000972, 0.078108);
    let sum = 1.0 + a1 * z + a2 * z.powi(2) + a3 * z.powi(3) + a4 * z.powi(4);
    sign * (1.0 - 1.0 / sum.powi(4))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(words: &[u64]) -> BitSet {
        BitSet::from_words(words.to_vec())
    }

    #[test]
    fn test_add_counts_in_binary() {
        let mut record = VotingRecord::new(1, 0);
        let a = pattern(&[0b0111]);
        let b = pattern(&[0b0101]);
        record.add(&a, 1).unwrap();
        record.add(&b, 2).unwrap();
        record.add(&a, 5).unwrap();

        assert_eq!(record.count(0), 8);
        assert_eq!(record.count(1), 6);
        assert_eq!(record.count(2), 8);
        assert_eq!(record.count(3), 0);
        assert_eq!(record.total_votes(), 8);
    }

    #[test]
    fn test_large_weight_uses_few_planes() {
        let mut record = VotingRecord::new(1, 0);
        record.add(&pattern(&[1]), 1 << 20).unwrap();
        assert_eq!(record.count(0), 1 << 20);
        assert_eq!(record.num_planes(), 21);
    }

    #[test]
    fn test_shared_minimum_is_extracted() {
        let mut record = VotingRecord::new(1, 0);
        record.add(&BitSet::ones(1), 3).unwrap();
        record.add(&pattern(&[0b10]), 1).unwrap();

        assert_eq!(record.minimum(), 3);
        assert_eq!(record.count(0), 3);
        assert_eq!(record.count(1), 4);
        // At least one dimension sits at the extracted minimum.
        assert!(!record.dims_with_count_exactly(3).is_empty());
    }

    #[test]
    fn test_shared_minimum_exact() {
        let mut record = VotingRecord::new(1, 0);
        record.add(&pattern(&[0b1]), 1).unwrap();
        record.add(&BitSet::ones(1), 6).unwrap();
        assert_eq!(record.count(0), 7);
        assert_eq!(record.count(5), 6);

        // Plane 0 is not full, yet every plane count is at least 2.
        assert!(!record.planes()[0].is_full());
        let shared = record.shared_minimum();
        assert_eq!(record.minimum() + shared, 6);
        assert!(shared > 0);

        let before = record.counts();
        record.decrement(shared);
        assert_eq!(record.counts(), before);
        assert_eq!(record.minimum(), 6);
        assert_eq!(record.num_planes(), 1);
    }

    #[test]
    fn test_subtract_inverts_add() {
        let mut record = VotingRecord::new(2, 0);
        record.add(&pattern(&[0xF0F0, 1]), 3).unwrap();
        record.add(&BitSet::ones(2), 2).unwrap();
        let before = record.counts();

        let v = pattern(&[0xFF00, u64::MAX]);
        record.add(&v, 7).unwrap();
        record.subtract(&v, 7).unwrap();

        assert_eq!(record.counts(), before);
        assert_eq!(record.total_votes(), 5);
    }

    #[test]
    fn test_subtract_underflow_is_rejected() {
        let mut record = VotingRecord::new(1, 0);
        record.add(&pattern(&[0b01]), 2).unwrap();
        record.add(&pattern(&[0b10]), 1).unwrap();
        let before = record.counts();

        assert!(record.subtract(&pattern(&[0b10]), 2).is_err());
        assert_eq!(record.counts(), before);
    }

    #[test]
    fn test_count_thresholds() {
        let mut record = VotingRecord::new(1, 0);
        record.add(&pattern(&[0b1110]), 1).unwrap();
        record.add(&pattern(&[0b1100]), 1).unwrap();
        record.add(&pattern(&[0b1000]), 1).unwrap();

        assert_eq!(record.dims_with_count_at_least(2).words()[0], 0b1100);
        assert_eq!(record.dims_with_count_exactly(1).words()[0], 0b0010);
        assert_eq!(record.dims_with_count_exactly(0).words()[0], !0b1110u64);
        assert_eq!(record.dims_with_count_at_least(4).words()[0], 0);
    }

    #[test]
    fn test_majority_odd_total() {
        let mut record = VotingRecord::new(1, 0);
        record.add(&pattern(&[0b011]), 1).unwrap();
        record.add(&pattern(&[0b110]), 1).unwrap();
        record.add(&pattern(&[0b010]), 1).unwrap();
        assert_eq!(record.majority().words()[0], 0b010);
    }

    #[test]
    fn test_majority_ties_are_reproducible() {
        let build = || {
            let mut record = VotingRecord::new(4, 0);
            record.add(&BitSet::from_words(vec![0xAAAA_0000_FFFF_1234; 4]), 1).unwrap();
            record.add(&BitSet::from_words(vec![0x5555_FFFF_0000_4321; 4]), 1).unwrap();
            record
        };
        assert_eq!(build().majority(), build().majority());
    }

    #[test]
    fn test_probabilistic_unanimous_is_exact() {
        let mut record = VotingRecord::new(1, 0);
        record.add(&pattern(&[0xDEAD_BEEF]), 4).unwrap();
        assert_eq!(record.probabilistic().words()[0], 0xDEAD_BEEF);
    }

    #[test]
    fn test_probabilistic_is_reproducible() {
        let build = || {
            let mut record = VotingRecord::new(8, 2);
            record.add(&BitSet::from_words(vec![0x0123_4567_89AB_CDEF; 8]), 150).unwrap();
            record.add(&BitSet::from_words(vec![0xFEDC_BA98_7654_3210; 8]), 75).unwrap();
            record
        };
        assert_eq!(build().probabilistic(), build().probabilistic());
    }

    #[test]
    fn test_erf_approximation() {
        assert!(erf(0.0).abs() < 1e-12);
        assert!((erf(1.0) - 0.842_700_79).abs() < 5e-4);
        assert!((erf(-1.0) + 0.842_700_79).abs() < 5e-4);
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-12);
        assert!(normal_cdf(40.0) > 0.999_999);
        assert!(normal_cdf(-40.0) < 1e-6);
    }

    #[test]
    fn test_scale_weight() {
        let record = VotingRecord::new(1, FRACTIONAL_DECIMAL_PLACES);
        assert_eq!(record.scale_weight(0.456).unwrap(), 46);
        assert!(record.scale_weight(-1.0).is_err());
        assert!(record.scale_weight(f64::NAN).is_err());
        assert!(record.scale_weight(1e300).is_err());
    }

    #[test]
    fn test_add_rejects_total_overflow() {
        let mut record = VotingRecord::new(1, 0);
        let bits = pattern(&[0b11]);
        record.add(&bits, u64::MAX - 1).unwrap();
        let before = record.clone();

        assert!(matches!(
            record.add(&bits, 2),
            Err(Error::InvalidParameter(_))
        ));
        assert_eq!(record, before);
        assert_eq!(record.count(0), u64::MAX - 1);
        assert!(record.num_planes() <= 64);

        record.add(&pattern(&[0b01]), 1).unwrap();
        assert_eq!(record.count(0), u64::MAX);
        assert_eq!(record.count(1), u64::MAX - 1);
        assert_eq!(record.total_votes(), u64::MAX);
    }
}
