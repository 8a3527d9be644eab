//! Hash configuration shared by every index built over a vector store.

use crate::error::{Error, Result};
use crate::persistence::PersistenceResult;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upper bound on the number of projections: bucket codes are stored as 16-bit values.
pub const MAX_NUM_HASHES: usize = 15;

/// Parameters of the locality-sensitive hash.
///
/// `num_hashes` and `max_bits_diff` are part of the on-disk file names, so an
/// index built with one configuration is never reused for another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LshConfig {
    /// Number of random projections (K), i.e. the bit width of a bucket code.
    pub num_hashes: usize,
    /// Maximum Hamming distance between the query code and a probed bucket code.
    pub max_bits_diff: usize,
    /// Seed for projection generation. `None` draws from the thread RNG.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for LshConfig {
    fn default() -> Self {
        Self {
            num_hashes: 6,
            max_bits_diff: 2,
            seed: None,
        }
    }
}

impl LshConfig {
    /// Create a configuration and validate it.
    pub fn new(num_hashes: usize, max_bits_diff: usize) -> Result<Self> {
        let config = Self {
            num_hashes,
            max_bits_diff,
            seed: None,
        };
        config.validate()?;
        Ok(config)
    }

    /// Same configuration with a fixed projection seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_hashes == 0 || self.num_hashes > MAX_NUM_HASHES {
            return Err(Error::InvalidParameter(format!(
                "num_hashes must be in 1..={MAX_NUM_HASHES}, got {}",
                self.num_hashes
            )));
        }
        if self.max_bits_diff > self.num_hashes {
            return Err(Error::InvalidParameter(format!(
                "max_bits_diff ({}) must not exceed num_hashes ({})",
                self.max_bits_diff, self.num_hashes
            )));
        }
        Ok(())
    }

    /// Suffix appended to index file names: `<K><maxBitsDiff>`.
    ///
    /// Since `max_bits_diff <= num_hashes <= 15` the concatenation is unambiguous.
    pub fn file_suffix(&self) -> String {
        format!("{}{}", self.num_hashes, self.max_bits_diff)
    }

    /// Parse a configuration from JSON and validate it.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::InvalidParameter(format!("bad LSH config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Write the configuration as pretty JSON.
    pub fn save(&self, path: &Path) -> PersistenceResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(LshConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(LshConfig::new(0, 0).is_err());
        assert!(LshConfig::new(16, 1).is_err());
        assert!(LshConfig::new(4, 5).is_err());
        assert!(LshConfig::new(15, 15).is_ok());
    }

    #[test]
    fn test_file_suffix() {
        assert_eq!(LshConfig::new(6, 2).unwrap().file_suffix(), "62");
        assert_eq!(LshConfig::new(12, 10).unwrap().file_suffix(), "1210");
    }

    #[test]
    fn test_json_roundtrip() {
        let config = LshConfig::new(8, 3).unwrap().with_seed(7);
        let json = serde_json::to_string(&config).unwrap();
        let parsed = LshConfig::from_json_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_json_seed_is_optional() {
        let parsed = LshConfig::from_json_str(r#"{"num_hashes": 4, "max_bits_diff": 1}"#).unwrap();
        assert_eq!(parsed.seed, None);
        assert!(LshConfig::from_json_str(r#"{"num_hashes": 4, "max_bits_diff": 9}"#).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lsh.json");
        let config = LshConfig::new(10, 2).unwrap();
        config.save(&path).unwrap();
        assert_eq!(LshConfig::load(&path).unwrap(), config);
    }
}
