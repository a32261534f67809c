use serde::{Deserialize, Serialize};

/// Largest blob any add path will materialize by default (`u32::MAX`).
pub const DEFAULT_MAX_BLOB_SIZE: u64 = u32::MAX as u64;

/// `get` refuses blobs above the signed 32-bit bound regardless of config.
pub const MAX_GET_SIZE: u64 = i32::MAX as u64;

/// Configuration shared by the blob managers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum blob size in bytes accepted by the add paths.
    pub max_blob_size: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_blob_size: DEFAULT_MAX_BLOB_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_max_is_u32() {
        assert_eq!(StoreConfig::default().max_blob_size, u32::MAX as u64);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let config: StoreConfig = toml::from_str("").unwrap();
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn max_blob_size_from_toml() {
        let config: StoreConfig = toml::from_str("max_blob_size = 1024").unwrap();
        assert_eq!(config.max_blob_size, 1024);
    }
}
