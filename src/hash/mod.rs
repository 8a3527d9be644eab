//! Locality-sensitive hashing for binary vectors.
//!
//! The core idea: **design hash functions where similar items collide more
//! often than dissimilar ones**.
//!
//! ## The LSH Intuition
//!
//! Traditional hash functions try to *minimize* collisions. LSH does the
//! opposite for similar items. It is designed so that:
//!
//! - P[h(a) = h(b)] is high when a and b are similar
//! - P[h(a) = h(b)] is low when a and b are dissimilar
//!
//! This enables sublinear search: instead of comparing against all items,
//! you only compare against items in the same (or a nearby) bucket.
//!
//! ## Random Hyperplanes
//!
//! **Key insight** (Charikar 2002): project vectors onto random hyperplanes.
//! Similar vectors land on the same side more often.
//!
//! ```text
//! P[sign(r·a) = sign(r·b)] = 1 - θ(a,b)/π
//! ```
//!
//! For binary spatter codes the "scalar product" with a projection `r` is
//! the normalized overlap `1 - 2·hamming(a, r)/n`, and its sign says whether
//! `a` is closer to `r` or to its complement. With K projections each vector
//! gets a K-bit bucket code.
//!
//! ## Multi-probe Queries
//!
//! A single bucket misses neighbours that fall just across one hyperplane.
//! Rather than building several tables, a query probes every code within
//! Hamming distance `d` of its own:
//!
//! ```text
//! |probes| = Σ_{i=0..d} C(K, i)        (K = 4, d = 1  →  5 buckets)
//! ```
//!
//! ```rust
//! use bitlsh::hash::LocalitySensitiveHash;
//! use bitlsh::{BinaryVector, LshConfig};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let config = LshConfig::new(4, 1).unwrap().with_seed(7);
//! let lsh = LocalitySensitiveHash::<BinaryVector>::new(config, 256).unwrap();
//!
//! let mut rng = StdRng::seed_from_u64(1);
//! let v = BinaryVector::random(256, 128, &mut rng).unwrap();
//! let probes = lsh.similar_hashes(&v).unwrap();
//! assert_eq!(probes.len(), 5);
//! assert_eq!(probes[0], lsh.hash(&v).unwrap());
//! ```
//!
//! ## References
//!
//! - Charikar (2002). "Similarity estimation techniques from rounding algorithms."
//! - Indyk & Motwani (1998). "Approximate nearest neighbors: towards removing
//!   the curse of dimensionality." (LSH theory)
//! - Lv et al. (2007). "Multi-probe LSH: efficient indexing for
//!   high-dimensional similarity search."
//! - Kanerva (2009). "Hyperdimensional computing." (binary spatter codes)

pub mod candidates;
mod lsh;

pub use candidates::{candidate_count, codes_within};
pub use lsh::LocalitySensitiveHash;
