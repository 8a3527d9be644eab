//! Vector representations.
//!
//! Everything the index needs from a vector type is captured by [`Vector`]:
//! a dimension, random generation, orthogonalization, a scalar product whose
//! sign defines a hash bit, and a fixed-width binary encoding. Only binary
//! spatter codes are implemented; the trait is the seam where other
//! representations would plug in.

mod binary;
mod bitset;
pub mod permutation;
mod voting;

pub use binary::BinaryVector;
pub use bitset::BitSet;
pub use permutation::{inverse_permutation, shift_permutation};
pub use voting::{erf, normal_cdf, VotingRecord, FRACTIONAL_DECIMAL_PLACES};

use crate::error::{Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

/// Vector representation tag, as recorded in index and store headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VectorType {
    Binary,
}

impl VectorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VectorType::Binary => "BINARY",
        }
    }
}

impl fmt::Display for VectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VectorType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BINARY" => Ok(VectorType::Binary),
            other => Err(Error::IncompatibleVectors {
                expected: VectorType::Binary.to_string(),
                found: other.to_string(),
            }),
        }
    }
}

/// A vector that can be hashed into buckets and stored on disk.
pub trait Vector: Clone + Send + Sync + fmt::Debug + 'static {
    const VECTOR_TYPE: VectorType;

    fn dimension(&self) -> usize;

    fn zero_vector(dimension: usize) -> Result<Self>;

    /// Random vector suitable as a hash projection.
    fn random_vector<R: Rng + ?Sized>(dimension: usize, rng: &mut R) -> Result<Self>;

    fn is_zero(&self) -> bool;

    /// Signed similarity used for hashing: positive and negative values put
    /// the vector on opposite sides of `other`'s hyperplane.
    fn scalar_product(&self, other: &Self) -> Result<f64>;

    /// Similarity score in `[-1, 1]`.
    fn overlap(&self, other: &Self) -> Result<f64>;

    /// Make `vectors` mutually orthogonal in place, as far as the
    /// representation allows. Earlier vectors take precedence.
    fn orthogonalize<R: Rng + ?Sized>(vectors: &mut [Self], rng: &mut R) -> Result<()>;

    /// Bytes used by [`write_to`](Vector::write_to) at `dimension`.
    fn encoded_len(dimension: usize) -> usize;

    fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()>;

    fn read_from<R: Read>(dimension: usize, reader: &mut R) -> Result<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_type_tag() {
        assert_eq!(VectorType::Binary.to_string(), "BINARY");
        assert_eq!("binary".parse::<VectorType>().unwrap(), VectorType::Binary);
        assert!("REAL".parse::<VectorType>().is_err());
    }

    #[test]
    fn test_binary_encoded_len() {
        assert_eq!(BinaryVector::encoded_len(1024), 128);
    }
}
