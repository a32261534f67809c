use std::collections::BTreeMap;

use tracing::debug;

use crate::config::StoreConfig;
use crate::error::{BlobError, BlobResult};
use crate::flags::BlobFlags;
use crate::id::compute_id;
use crate::ops::{check_blob_size, require_readable, require_writable};
use crate::stream::BlobStream;
use crate::traits::{BlobManager, ManagerKind};

/// In-memory, map-based blob manager.
///
/// Each blob owns a copy of its bytes. `open` hands out borrowed views, so the
/// manager cannot be mutated (or cleared) while any stream is alive.
pub struct MemoryBlobManager {
    blobs: BTreeMap<String, Vec<u8>>,
    flags: BlobFlags,
    initialized: bool,
    config: StoreConfig,
}

impl MemoryBlobManager {
    /// Create an uninitialized manager with the default configuration.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            blobs: BTreeMap::new(),
            flags: BlobFlags::NONE,
            initialized: false,
            config,
        }
    }

    /// Initialize with the given flags, dropping any previous contents.
    pub fn init(&mut self, flags: BlobFlags) -> BlobResult<()> {
        self.deinit()?;
        if !flags.has_access() {
            return Err(BlobError::InvalidFlags(flags));
        }
        self.flags = flags;
        self.initialized = true;
        Ok(())
    }

    /// Number of blobs currently stored.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Total bytes across all stored blobs.
    pub fn total_bytes(&self) -> u64 {
        self.blobs.values().map(|b| b.len() as u64).sum()
    }

    /// Remove every blob, keeping the manager initialized.
    pub fn clear(&mut self) {
        self.blobs.clear();
    }
}

impl Default for MemoryBlobManager {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobManager for MemoryBlobManager {
    fn kind(&self) -> ManagerKind {
        ManagerKind::Memory
    }

    fn flags(&self) -> BlobFlags {
        if self.initialized {
            self.flags
        } else {
            BlobFlags::NONE
        }
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn max_blob_size(&self) -> u64 {
        self.config.max_blob_size
    }

    fn deinit(&mut self) -> BlobResult<()> {
        self.blobs.clear();
        self.flags = BlobFlags::NONE;
        self.initialized = false;
        Ok(())
    }

    fn add_buf_using_id(&mut self, data: &[u8], id: &str) -> BlobResult<String> {
        require_writable(self, "add")?;

        let id = if id.is_empty() {
            compute_id(data, "", "", None)?
        } else {
            id.to_string()
        };
        check_blob_size(&id, data.len() as u64, self.config.max_blob_size)?;

        // Content addressing: an existing entry already holds these bytes.
        if self.blobs.contains_key(&id) {
            debug!(id = id.as_str(), "blob already present, not replacing");
            return Ok(id);
        }
        self.blobs.insert(id.clone(), data.to_vec());
        Ok(id)
    }

    fn open(&self, id: &str) -> BlobResult<Option<BlobStream<'_>>> {
        require_readable(self, "open")?;
        Ok(self
            .blobs
            .get(id)
            .map(|data| BlobStream::view(id, data.as_slice())))
    }

    fn does_exist(&self, id: &str) -> bool {
        self.blobs.contains_key(id)
    }

    fn get_size(&self, id: &str) -> u64 {
        self.blobs.get(id).map(|b| b.len() as u64).unwrap_or(0)
    }

    fn enumerate(&self) -> Vec<String> {
        if !self.initialized {
            return Vec::new();
        }
        self.blobs.keys().cloned().collect()
    }
}

impl std::fmt::Debug for MemoryBlobManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBlobManager")
            .field("flags", &self.flags())
            .field("blob_count", &self.blobs.len())
            .finish()
    }
}
