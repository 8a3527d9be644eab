//! Word-level permutations of binary vectors.
//!
//! A permutation `p` of length `dimension / 64` moves whole words:
//! `permuted[i] = original[p[i]]`.

use crate::error::{Error, Result};

/// Cyclic shift: `p[i] = (i + shift) mod len`.
pub fn shift_permutation(len: usize, shift: isize) -> Vec<usize> {
    if len == 0 {
        return Vec::new();
    }
    let shift = shift.rem_euclid(len as isize) as usize;
    (0..len).map(|i| (i + shift) % len).collect()
}

/// Permutation that undoes `permutation`.
pub fn inverse_permutation(permutation: &[usize]) -> Result<Vec<usize>> {
    validate_permutation(permutation, permutation.len())?;
    let mut inverse = vec![0; permutation.len()];
    for (i, &p) in permutation.iter().enumerate() {
        inverse[p] = i;
    }
    Ok(inverse)
}

/// Check that `permutation` is a bijection on `0..len`.
pub fn validate_permutation(permutation: &[usize], len: usize) -> Result<()> {
    if permutation.len() != len {
        return Err(Error::InvalidPermutation(format!(
            "expected length {len}, got {}",
            permutation.len()
        )));
    }
    let mut seen = vec![false; len];
    for &p in permutation {
        if p >= len || std::mem::replace(&mut seen[p], true) {
            return Err(Error::InvalidPermutation(format!(
                "{p} is out of range or repeated"
            )));
        }
    }
    Ok(())
}

/// Apply `permutation` to a word slice.
pub(crate) fn apply(words: &[u64], permutation: &[usize]) -> Vec<u64> {
    permutation.iter().map(|&p| words[p]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift() {
        assert_eq!(shift_permutation(4, 1), vec![1, 2, 3, 0]);
        assert_eq!(shift_permutation(4, -1), vec![3, 0, 1, 2]);
        assert_eq!(shift_permutation(4, 9), vec![1, 2, 3, 0]);
    }

    #[test]
    fn test_inverse_undoes() {
        let p = vec![2, 0, 3, 1];
        let inv = inverse_permutation(&p).unwrap();
        let words = vec![10, 11, 12, 13];
        assert_eq!(apply(&apply(&words, &p), &inv), words);
    }

    #[test]
    fn test_shift_inverse_is_negative_shift() {
        let p = shift_permutation(5, 2);
        assert_eq!(inverse_permutation(&p).unwrap(), shift_permutation(5, -2));
    }

    #[test]
    fn test_rejects_non_bijection() {
        assert!(validate_permutation(&[0, 0, 1], 3).is_err());
        assert!(validate_permutation(&[0, 3, 1], 3).is_err());
        assert!(validate_permutation(&[0, 1], 3).is_err());
        assert!(validate_permutation(&[2, 0, 1], 3).is_ok());
    }
}
