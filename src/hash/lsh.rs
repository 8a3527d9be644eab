//! Random-hyperplane LSH over [`Vector`] types.
//!
//! K projection vectors are drawn at random and orthogonalized. A vector's
//! code has bit `i` set iff its scalar product with projection `i` is
//! positive, so nearby vectors agree on most bits and land in the same or a
//! nearby bucket. Queries probe every code within `max_bits_diff` flips of
//! the query's own code.
//!
//! # File format
//!
//! ```text
//! u32 K | u32 maxBitsDiff | u16 len + UTF-8 vector type | u32 dimension
//! K × encoded projection
//! ```
//!
//! Big-endian throughout; the projections use [`Vector::write_to`].

use super::candidates::codes_within;
use crate::config::LshConfig;
use crate::error::{Error, Result};
use crate::persistence::format::{
    read_short_str, read_u32, write_atomic, write_short_str, write_u32,
};
use crate::persistence::PersistenceError;
use crate::vectors::Vector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;
use tracing::debug;

/// K orthogonalized projections plus the probing radius.
#[derive(Debug, Clone)]
pub struct LocalitySensitiveHash<V: Vector> {
    config: LshConfig,
    dimension: usize,
    projections: Vec<V>,
}

impl<V: Vector> LocalitySensitiveHash<V> {
    /// Draw and orthogonalize `config.num_hashes` projections.
    ///
    /// A fixed `config.seed` makes the projections reproducible.
    pub fn new(config: LshConfig, dimension: usize) -> Result<Self> {
        config.validate()?;
        let seed = config.seed.unwrap_or_else(|| rand::rng().random());
        let mut rng = StdRng::seed_from_u64(seed);

        let mut projections = (0..config.num_hashes)
            .map(|_| V::random_vector(dimension, &mut rng))
            .collect::<Result<Vec<_>>>()?;
        V::orthogonalize(&mut projections, &mut rng)?;

        debug!(
            num_hashes = config.num_hashes,
            max_bits_diff = config.max_bits_diff,
            dimension,
            "generated LSH projections"
        );
        Ok(Self {
            config,
            dimension,
            projections,
        })
    }

    pub fn config(&self) -> &LshConfig {
        &self.config
    }

    pub fn num_hashes(&self) -> usize {
        self.config.num_hashes
    }

    pub fn max_bits_diff(&self) -> usize {
        self.config.max_bits_diff
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn projections(&self) -> &[V] {
        &self.projections
    }

    fn check_dimension(&self, vector: &V) -> Result<()> {
        if vector.dimension() != self.dimension {
            return Err(Error::dimension_mismatch(self.dimension, vector.dimension()));
        }
        Ok(())
    }

    /// Bucket code of `vector`.
    pub fn hash(&self, vector: &V) -> Result<u16> {
        self.check_dimension(vector)?;
        let mut code = 0u16;
        for (i, projection) in self.projections.iter().enumerate() {
            if vector.scalar_product(projection)? > 0.0 {
                code |= 1 << i;
            }
        }
        Ok(code)
    }

    /// The code of `vector` followed by every code within `max_bits_diff`
    /// bit flips of it.
    pub fn similar_hashes(&self, vector: &V) -> Result<Vec<u16>> {
        let base = self.hash(vector)?;
        Ok(codes_within(
            base,
            self.config.num_hashes,
            self.config.max_bits_diff,
        ))
    }

    /// Serialize the parameters and projections.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_u32(writer, self.config.num_hashes as u32)?;
        write_u32(writer, self.config.max_bits_diff as u32)?;
        write_short_str(writer, V::VECTOR_TYPE.as_str())?;
        let dimension = u32::try_from(self.dimension).map_err(|_| {
            PersistenceError::Format(format!("dimension {} does not fit in u32", self.dimension))
        })?;
        write_u32(writer, dimension)?;
        for projection in &self.projections {
            projection.write_to(writer)?;
        }
        Ok(())
    }

    /// Read what [`write_to`](Self::write_to) produced.
    ///
    /// Fails with [`Error::IncompatibleVectors`] if the file holds another
    /// vector type.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let num_hashes = read_u32(reader)? as usize;
        let max_bits_diff = read_u32(reader)? as usize;
        let vector_type = read_short_str(reader)?;
        if vector_type != V::VECTOR_TYPE.as_str() {
            return Err(Error::IncompatibleVectors {
                expected: V::VECTOR_TYPE.to_string(),
                found: vector_type,
            });
        }
        let dimension = read_u32(reader)? as usize;

        let config = LshConfig {
            num_hashes,
            max_bits_diff,
            seed: None,
        };
        config
            .validate()
            .map_err(|e| PersistenceError::Format(format!("stored hash parameters: {e}")))?;

        let projections = (0..num_hashes)
            .map(|_| V::read_from(dimension, reader))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            config,
            dimension,
            projections,
        })
    }

    /// Write to `path` atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, |w| self.write_to(w))
    }

    /// Load from `path` and check it matches `config` and `dimension`.
    pub fn load(path: &Path, config: &LshConfig, dimension: usize) -> Result<Self> {
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                Error::from(PersistenceError::NotFound(path.display().to_string()))
            }
            _ => Error::from(e),
        })?;
        let mut lsh = Self::read_from(&mut BufReader::new(file))?;

        if lsh.config.num_hashes != config.num_hashes
            || lsh.config.max_bits_diff != config.max_bits_diff
        {
            return Err(PersistenceError::InvalidConfig(format!(
                "{} holds K={} maxBitsDiff={}, expected K={} maxBitsDiff={}",
                path.display(),
                lsh.config.num_hashes,
                lsh.config.max_bits_diff,
                config.num_hashes,
                config.max_bits_diff
            ))
            .into());
        }
        if lsh.dimension != dimension {
            return Err(Error::dimension_mismatch(dimension, lsh.dimension));
        }
        lsh.config.seed = config.seed;
        Ok(lsh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::candidates::candidate_count;
    use crate::vectors::BinaryVector;

    fn lsh(k: usize, d: usize) -> LocalitySensitiveHash<BinaryVector> {
        let config = LshConfig::new(k, d).unwrap().with_seed(11);
        LocalitySensitiveHash::new(config, 1024).unwrap()
    }

    fn random_vector(seed: u64) -> BinaryVector {
        let mut rng = StdRng::seed_from_u64(seed);
        BinaryVector::random(1024, 512, &mut rng).unwrap()
    }

    #[test]
    fn test_hash_fits_k_bits() {
        let h = lsh(6, 2);
        for seed in 0..20 {
            assert!(h.hash(&random_vector(seed)).unwrap() < 1 << 6);
        }
    }

    #[test]
    fn test_similar_hashes_count() {
        let h = lsh(4, 1);
        let codes = h.similar_hashes(&random_vector(1)).unwrap();
        assert_eq!(codes.len(), 5);
        assert_eq!(codes.len(), candidate_count(4, 1));
    }

    #[test]
    fn test_base_hash_comes_first() {
        let h = lsh(8, 3);
        let v = random_vector(2);
        let base = h.hash(&v).unwrap();
        let codes = h.similar_hashes(&v).unwrap();
        assert_eq!(codes[0], base);
        assert!(codes.iter().all(|c| (c ^ base).count_ones() <= 3));
    }

    #[test]
    fn test_projections_are_orthogonal() {
        let h = lsh(10, 2);
        let p = h.projections();
        for i in 0..p.len() {
            for j in 0..i {
                assert_eq!(p[i].scalar_product(&p[j]).unwrap(), 0.0, "({i}, {j})");
            }
        }
    }

    #[test]
    fn test_seed_is_reproducible() {
        let a = lsh(6, 2);
        let b = lsh(6, 2);
        for (x, y) in a.projections().iter().zip(b.projections()) {
            assert_eq!(x.words(), y.words());
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let h = lsh(4, 1);
        let v = BinaryVector::zero(512).unwrap();
        assert!(matches!(
            h.hash(&v),
            Err(Error::IncompatibleVectors { .. })
        ));
    }

    #[test]
    fn test_serialized_layout() {
        let h = lsh(3, 1);
        let mut buf = Vec::new();
        h.write_to(&mut buf).unwrap();

        assert_eq!(&buf[0..4], &3u32.to_be_bytes());
        assert_eq!(&buf[4..8], &1u32.to_be_bytes());
        assert_eq!(&buf[8..10], &6u16.to_be_bytes());
        assert_eq!(&buf[10..16], b"BINARY");
        assert_eq!(&buf[16..20], &1024u32.to_be_bytes());
        assert_eq!(buf.len(), 20 + 3 * 128);
    }

    #[test]
    fn test_save_load_is_bit_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.bin.lsh62");
        let h = lsh(6, 2);
        h.save(&path).unwrap();

        let loaded =
            LocalitySensitiveHash::<BinaryVector>::load(&path, h.config(), 1024).unwrap();
        for (x, y) in h.projections().iter().zip(loaded.projections()) {
            assert_eq!(x.words(), y.words());
        }
        let v = random_vector(5);
        assert_eq!(h.hash(&v).unwrap(), loaded.hash(&v).unwrap());
    }

    #[test]
    fn test_load_rejects_other_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.bin.lsh62");
        lsh(6, 2).save(&path).unwrap();

        let other = LshConfig::new(6, 3).unwrap();
        assert!(matches!(
            LocalitySensitiveHash::<BinaryVector>::load(&path, &other, 1024),
            Err(Error::Persistence(PersistenceError::InvalidConfig(_)))
        ));
    }

    #[test]
    fn test_load_rejects_other_vector_type() {
        let mut buf = Vec::new();
        write_u32(&mut buf, 2).unwrap();
        write_u32(&mut buf, 1).unwrap();
        write_short_str(&mut buf, "REAL").unwrap();
        write_u32(&mut buf, 64).unwrap();
        assert!(matches!(
            LocalitySensitiveHash::<BinaryVector>::read_from(&mut buf.as_slice()),
            Err(Error::IncompatibleVectors { .. })
        ));
    }
}
