//! Reader and writer configuration

use serde::{Deserialize, Serialize};

use crate::block::MAX_DECOMPRESSION_SIZE;

/// Options controlling how archives are read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    /// Largest declared decompressed length accepted for a zipped asset
    pub max_decompressed_size: usize,

    /// Check decoded asset bytes against the entry's DataHash
    ///
    /// DataHash is supplied by whoever wrote the archive and is frequently
    /// zero, so this is off by default.
    pub verify_data_hash: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            max_decompressed_size: MAX_DECOMPRESSION_SIZE,
            verify_data_hash: false,
        }
    }
}

impl ReaderOptions {
    /// Set the decompressed size limit
    #[must_use]
    pub const fn with_max_decompressed_size(mut self, size: usize) -> Self {
        self.max_decompressed_size = size;
        self
    }

    /// Enable or disable DataHash verification
    #[must_use]
    pub const fn with_verify_data_hash(mut self, verify: bool) -> Self {
        self.verify_data_hash = verify;
        self
    }
}

/// Options controlling how archives are written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterOptions {
    /// zlib compression level for zipped assets (0-9)
    pub compression_level: u32,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            compression_level: 6,
        }
    }
}

impl WriterOptions {
    /// Set the compression level, clamped to 9
    #[must_use]
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level.min(9);
        self
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let reader = ReaderOptions::default();
        assert_eq!(reader.max_decompressed_size, 1024 * 1024 * 1024);
        assert!(!reader.verify_data_hash);
        assert_eq!(WriterOptions::default().compression_level, 6);
        assert_eq!(WriterOptions::default().with_compression_level(12).compression_level, 9);
    }

    #[test]
    fn test_partial_json() {
        let options: ReaderOptions = serde_json::from_str(r#"{"verify_data_hash": true}"#).unwrap();
        assert!(options.verify_data_hash);
        assert_eq!(options.max_decompressed_size, MAX_DECOMPRESSION_SIZE);

        let json = serde_json::to_string(&WriterOptions::default()).unwrap();
        assert_eq!(json, r#"{"compression_level":6}"#);
    }
}
