use crate::error::{BlobError, BlobResult};
use crate::flags::BlobFlags;
use crate::id::compute_id;
use crate::ops::require_writable;
use crate::stream::BlobStream;
use crate::traits::{BlobManager, ManagerKind};

/// A sink: accepts every add, stores nothing, finds nothing.
#[derive(Debug, Default)]
pub struct NullBlobManager {
    flags: Option<BlobFlags>,
}

impl NullBlobManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init(&mut self, flags: BlobFlags) -> BlobResult<()> {
        if !flags.has_access() {
            return Err(BlobError::InvalidFlags(flags));
        }
        self.flags = Some(flags);
        Ok(())
    }
}

impl BlobManager for NullBlobManager {
    fn kind(&self) -> ManagerKind {
        ManagerKind::Null
    }

    fn flags(&self) -> BlobFlags {
        self.flags.unwrap_or_default()
    }

    fn is_initialized(&self) -> bool {
        self.flags.is_some()
    }

    fn deinit(&mut self) -> BlobResult<()> {
        self.flags = None;
        Ok(())
    }

    fn add_buf_using_id(&mut self, data: &[u8], id: &str) -> BlobResult<String> {
        require_writable(self, "add")?;
        if id.is_empty() {
            compute_id(data, "", "", None)
        } else {
            Ok(id.to_string())
        }
    }

    fn open(&self, _id: &str) -> BlobResult<Option<BlobStream<'_>>> {
        Ok(None)
    }

    fn does_exist(&self, _id: &str) -> bool {
        false
    }

    fn get_size(&self, _id: &str) -> u64 {
        0
    }

    fn enumerate(&self) -> Vec<String> {
        Vec::new()
    }
}
