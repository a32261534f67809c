use radblob_store::StoreConfig;
use serde::{Deserialize, Serialize};

/// Configuration for [`crate::ArchiveBlobManager`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Deflate level for new entries (default: 1, fastest).
    pub compression_level: i32,
    /// Write ZIP64 headers so single entries may exceed 4 GiB.
    pub zip64: bool,
    /// Chunk size used when streaming the serialized archive out (default: 64 KiB).
    pub copy_chunk_size: usize,
    /// Limits shared with the other backends.
    pub store: StoreConfig,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            compression_level: 1,
            zip64: false,
            copy_chunk_size: 64 * 1024, // 64 KiB
            store: StoreConfig::default(),
        }
    }
}
