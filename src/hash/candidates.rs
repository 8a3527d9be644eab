//! Enumeration of bucket codes near a base code.
//!
//! Codes within Hamming radius `d` of a `K`-bit code are `base ^ mask` for
//! every mask with at most `d` bits set. Masks of a given popcount are
//! walked in increasing order with Gosper's hack, so no recursion and no
//! duplicate elimination is needed.

/// `C(n, k)`, exact for the small arguments used here.
pub fn binomial(n: usize, k: usize) -> usize {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    (0..k).fold(1usize, |acc, i| acc * (n - i) / (i + 1))
}

/// Number of codes within Hamming distance `max_bits_diff` of a `num_bits`-bit code.
pub fn candidate_count(num_bits: usize, max_bits_diff: usize) -> usize {
    (0..=max_bits_diff.min(num_bits))
        .map(|i| binomial(num_bits, i))
        .sum()
}

/// Every `num_bits`-bit code within Hamming distance `max_bits_diff` of `base`.
///
/// `base` comes first, followed by codes at distance 1, 2, ... in turn.
pub fn codes_within(base: u16, num_bits: usize, max_bits_diff: usize) -> Vec<u16> {
    let mut codes = Vec::with_capacity(candidate_count(num_bits, max_bits_diff));
    codes.push(base);

    let limit = 1u32 << num_bits;
    for radius in 1..=max_bits_diff.min(num_bits) {
        let mut mask = (1u32 << radius) - 1;
        while mask < limit {
            codes.push(base ^ mask as u16);
            // Next larger integer with the same popcount.
            let lowest = mask & mask.wrapping_neg();
            let ripple = mask + lowest;
            mask = (((ripple ^ mask) >> 2) / lowest) | ripple;
        }
    }
    codes
}
