use std::fmt;

use crate::config::DEFAULT_MAX_BLOB_SIZE;
use crate::error::BlobResult;
use crate::flags::BlobFlags;
use crate::ops;
use crate::stream::{BlobSource, BlobStream};

/// Which backend a manager is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ManagerKind {
    Null,
    Memory,
    LooseFile,
    Archive,
    Multi,
}

impl fmt::Display for ManagerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Memory => write!(f, "memory"),
            Self::LooseFile => write!(f, "loose-file"),
            Self::Archive => write!(f, "archive"),
            Self::Multi => write!(f, "multi"),
        }
    }
}

/// Content-addressed blob manager.
///
/// Backends implement the primitives (`add_buf_using_id`, `open`,
/// `does_exist`, `get_size`, `enumerate`, `deinit`); the template algorithms
/// (`get`, `populate`, `copy_file` and the stream/compute-ID add helpers) are
/// provided on top of them and live in [`crate::ops`].
///
/// Lifecycle: construct, `init` (backend-specific, fixes the flags), any
/// number of operations, `deinit`. `deinit` is idempotent, runs again on drop,
/// and leaves the manager ready for another `init`.
///
/// No backend locks internally for writes: adds take `&mut self`, so a
/// manager cannot be mutated while any stream it handed out is still alive.
pub trait BlobManager: Send + Sync {
    /// The backend kind.
    fn kind(&self) -> ManagerKind;

    /// Flags fixed at `init`; [`BlobFlags::NONE`] when not initialized.
    fn flags(&self) -> BlobFlags;

    fn is_initialized(&self) -> bool;

    fn is_readable(&self) -> bool {
        self.is_initialized() && self.flags().is_readable()
    }

    fn is_writable(&self) -> bool {
        self.is_initialized() && self.flags().is_writable()
    }

    fn is_read_only(&self) -> bool {
        self.is_initialized() && self.flags().is_read_only()
    }

    fn is_write_only(&self) -> bool {
        self.is_initialized() && self.flags().is_write_only()
    }

    /// Largest blob the add paths accept.
    fn max_blob_size(&self) -> u64 {
        DEFAULT_MAX_BLOB_SIZE
    }

    /// Release every resource and return to the uninitialized state.
    ///
    /// Resources are released even when an error is reported.
    fn deinit(&mut self) -> BlobResult<()>;

    /// Store `data` under `id`, or under its computed content ID when `id` is
    /// empty. Returns the ID the blob is reachable under.
    fn add_buf_using_id(&mut self, data: &[u8], id: &str) -> BlobResult<String>;

    /// Open a blob for reading. `Ok(None)` means no such blob.
    fn open(&self, id: &str) -> BlobResult<Option<BlobStream<'_>>>;

    /// Release a stream returned by [`BlobManager::open`]. Dropping the stream
    /// is equivalent.
    fn close(&self, stream: BlobStream<'_>) {
        drop(stream);
    }

    fn does_exist(&self, id: &str) -> bool;

    /// Size of a blob in bytes, `0` if it does not exist.
    fn get_size(&self, id: &str) -> u64;

    /// Every ID in the manager, sorted and unique.
    fn enumerate(&self) -> Vec<String>;

    /// Read a whole blob into memory.
    fn get(&self, id: &str) -> BlobResult<Vec<u8>> {
        ops::get(self, id)
    }

    fn add_buf_compute_unique_id(
        &mut self,
        data: &[u8],
        prefix: &str,
        ext: &str,
        precomputed_crc: Option<u64>,
    ) -> BlobResult<String> {
        ops::add_buf_compute_unique_id(self, data, prefix, ext, precomputed_crc)
    }

    fn add_stream_using_id(&mut self, stream: &mut dyn BlobSource, id: &str) -> BlobResult<String> {
        ops::add_stream_using_id(self, stream, id)
    }

    fn add_stream_compute_unique_id(
        &mut self,
        stream: &mut dyn BlobSource,
        prefix: &str,
        ext: &str,
        precomputed_crc: Option<u64>,
    ) -> BlobResult<String> {
        ops::add_stream_compute_unique_id(self, stream, prefix, ext, precomputed_crc)
    }

    /// Copy every blob of `other` into this manager under the same IDs.
    fn populate(&mut self, other: &dyn BlobManager) -> BlobResult<()> {
        ops::populate(self, other)
    }

    /// Copy `src_id` from `src` into this manager as `dst_id`.
    fn copy_file(&mut self, src: &dyn BlobManager, src_id: &str, dst_id: &str) -> BlobResult<String> {
        ops::copy_file(self, src, src_id, dst_id)
    }
}
