use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Cursor, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use radblob_store::ops::{check_blob_size, require_readable, require_writable};
use radblob_store::{
    compute_id, BlobError, BlobFlags, BlobManager, BlobResult, BlobStream, ManagerKind,
};
use tracing::{debug, error, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::central::{read_entry, read_index, CentralEntry};
use crate::config::ArchiveConfig;
use crate::storage::{codec_error, ArchiveStorage, SharedStorage};
use crate::window::ArchiveWindow;

/// Where an archive's bytes come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArchiveOrigin {
    /// Read-only archive over a caller-supplied buffer.
    Memory,
    /// Write archive growing in a heap buffer, retrieved with `deinit_heap`.
    Heap,
    /// Archive file on disk.
    File(PathBuf),
    /// Archive embedded in an already-open file at its current position.
    CFile,
}

impl fmt::Display for ArchiveOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "<memory>"),
            Self::Heap => write!(f, "<heap>"),
            Self::File(path) => write!(f, "{}", path.display()),
            Self::CFile => write!(f, "<cfile>"),
        }
    }
}

enum ZipState {
    Closed,
    Reading(ArchiveStorage),
    /// The writer and the manager share the storage: entries are read back
    /// by offset without touching the writer.
    Writing {
        writer: ZipWriter<SharedStorage>,
        storage: SharedStorage,
    },
}

struct ArchiveInner {
    state: ZipState,
    blobs: BTreeMap<String, CentralEntry>,
}

/// Blob manager over a single ZIP archive.
///
/// Every blob is one ZIP entry named by its ID. The archive is append-only:
/// adding an ID that is already present returns it untouched. `open`
/// decompresses the entry into a private buffer, so streams stay valid after
/// the manager moves on.
///
/// A writable archive gets its central directory exactly once, in `deinit`;
/// until then other tools cannot read it. Reads during a write session go
/// straight to the entries already on storage. `deinit` runs on drop, and
/// still releases the file when finalization fails.
pub struct ArchiveBlobManager {
    inner: Mutex<ArchiveInner>,
    origin: Option<ArchiveOrigin>,
    flags: BlobFlags,
    config: ArchiveConfig,
}

impl ArchiveBlobManager {
    pub fn new() -> Self {
        Self::with_config(ArchiveConfig::default())
    }

    pub fn with_config(config: ArchiveConfig) -> Self {
        Self {
            inner: Mutex::new(ArchiveInner {
                state: ZipState::Closed,
                blobs: BTreeMap::new(),
            }),
            origin: None,
            flags: BlobFlags::NONE,
            config,
        }
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    /// Where the open archive lives, `None` when uninitialized.
    pub fn archive_origin(&self) -> Option<&ArchiveOrigin> {
        self.origin.as_ref()
    }

    /// Path of a file-backed archive.
    pub fn archive_path(&self) -> Option<&Path> {
        match &self.origin {
            Some(ArchiveOrigin::File(path)) => Some(path),
            _ => None,
        }
    }

    // -----------------------------------------------------------------------
    // init
    // -----------------------------------------------------------------------

    /// Open a read-only archive held in memory.
    pub fn init_memory(&mut self, flags: BlobFlags, data: Vec<u8>) -> BlobResult<()> {
        self.reset();
        if !flags.is_read_only() {
            return Err(BlobError::InvalidFlags(flags));
        }
        self.open_existing(flags, ArchiveOrigin::Memory, ArchiveStorage::heap(data), false)
    }

    /// Start a new archive in a heap buffer. Finish it with [`Self::deinit_heap`].
    pub fn init_heap(&mut self, flags: BlobFlags) -> BlobResult<()> {
        self.reset();
        if !flags.is_writable() {
            return Err(BlobError::InvalidFlags(flags));
        }
        self.create_new(flags, ArchiveOrigin::Heap, ArchiveStorage::heap(Vec::new()));
        Ok(())
    }

    /// Open or create an archive file.
    ///
    /// The archive occupies the file from `file_start_ofs`; a non-zero
    /// `actual_archive_size` bounds it, otherwise it runs to end of file.
    ///
    /// - Writable with `OPEN_EXISTING` or `OPEN_EXISTING_OR_CREATE_NEW`: an
    ///   existing archive is indexed and new entries are appended after its
    ///   contents. A missing file is created only with the latter flag.
    /// - Read-only: the archive must exist.
    /// - Writable otherwise: a new archive replaces whatever was at `path`.
    pub fn init_file(
        &mut self,
        flags: BlobFlags,
        path: impl AsRef<Path>,
        file_start_ofs: u64,
        actual_archive_size: u64,
    ) -> BlobResult<()> {
        self.reset();
        if !flags.has_access() {
            return Err(BlobError::InvalidFlags(flags));
        }

        let path = path.as_ref();
        let origin = ArchiveOrigin::File(path.to_path_buf());
        let window_len = (actual_archive_size > 0).then_some(actual_archive_size);
        let open_flags = BlobFlags::OPEN_EXISTING | BlobFlags::OPEN_EXISTING_OR_CREATE_NEW;

        if flags.is_writable() && flags.intersects(open_flags) {
            if path.exists() {
                let file = OpenOptions::new().read(true).write(true).open(path)?;
                let window = ArchiveWindow::new(file, file_start_ofs, window_len)?;
                self.open_existing(flags, origin, ArchiveStorage::File(window), true)
            } else if flags.contains(BlobFlags::OPEN_EXISTING_OR_CREATE_NEW) {
                self.create_file(flags, path, file_start_ofs)
            } else {
                error!(path = %path.display(), "blob archive does not exist");
                Err(BlobError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("blob archive {} does not exist", path.display()),
                )))
            }
        } else if flags.is_read_only() {
            if flags.contains(BlobFlags::OPEN_EXISTING_OR_CREATE_NEW) {
                return Err(BlobError::InvalidFlags(flags));
            }
            let file = File::open(path)?;
            let window = ArchiveWindow::new(file, file_start_ofs, window_len)?;
            self.open_existing(flags, origin, ArchiveStorage::File(window), false)
        } else {
            self.create_file(flags, path, file_start_ofs)
        }
    }

    /// Create a new archive under a unique temporary path and return it.
    ///
    /// The file is not removed by `deinit`; the caller owns it.
    pub fn init_file_temp(&mut self, flags: BlobFlags) -> BlobResult<PathBuf> {
        self.reset();
        if !flags.is_writable() {
            return Err(BlobError::InvalidFlags(flags));
        }

        let (file, path) = tempfile::Builder::new()
            .prefix("radblob")
            .suffix(".zip")
            .tempfile()?
            .keep()
            .map_err(|err| err.error)?;
        drop(file);

        let create_flags =
            flags.without(BlobFlags::OPEN_EXISTING | BlobFlags::OPEN_EXISTING_OR_CREATE_NEW);
        if let Err(err) = self.init_file(create_flags, &path, 0, 0) {
            if let Err(rm_err) = fs::remove_file(&path) {
                warn!(path = %path.display(), %rm_err, "failed removing temp archive");
            }
            return Err(err);
        }
        Ok(path)
    }

    /// Use an already-open file, starting at its current position.
    ///
    /// A writable manager appends to the `cur_size` bytes of archive already
    /// there, or starts a new archive when `cur_size` is zero.
    pub fn init_cfile(&mut self, flags: BlobFlags, mut file: File, cur_size: u64) -> BlobResult<()> {
        self.reset();
        if !flags.has_access() {
            return Err(BlobError::InvalidFlags(flags));
        }

        let start = file.stream_position()?;
        let window_len = (cur_size > 0).then_some(cur_size);
        let window = ArchiveWindow::new(file, start, window_len)?;
        let storage = ArchiveStorage::File(window);

        if flags.is_writable() && cur_size == 0 {
            self.create_new(flags, ArchiveOrigin::CFile, storage);
            Ok(())
        } else {
            self.open_existing(flags, ArchiveOrigin::CFile, storage, flags.is_writable())
        }
    }

    fn reset(&mut self) {
        // Failures are already logged by deinit.
        let _ = self.deinit();
    }

    fn create_file(&mut self, flags: BlobFlags, path: &Path, start: u64) -> BlobResult<()> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        // Zero-filled space in front of the archive.
        file.set_len(start)?;
        let window = ArchiveWindow::new(file, start, None)?;
        self.create_new(flags, ArchiveOrigin::File(path.to_path_buf()), ArchiveStorage::File(window));
        Ok(())
    }

    fn create_new(&mut self, flags: BlobFlags, origin: ArchiveOrigin, storage: ArchiveStorage) {
        info!(archive = %origin, %flags, "created blob archive");
        let storage = SharedStorage::new(storage);
        let state = ZipState::Writing {
            writer: ZipWriter::new(storage.clone()),
            storage,
        };
        self.install(flags, origin, state, BTreeMap::new());
    }

    fn open_existing(
        &mut self,
        flags: BlobFlags,
        origin: ArchiveOrigin,
        mut storage: ArchiveStorage,
        append: bool,
    ) -> BlobResult<()> {
        let label = origin.to_string();
        let index = read_index(&mut storage, &label).map_err(|err| {
            error!(archive = label.as_str(), %err, "failed opening blob archive");
            err
        })?;

        let state = if append {
            if index.duplicates > 0 {
                warn!(
                    archive = label.as_str(),
                    duplicates = index.duplicates,
                    "appending to an archive with duplicate names; the rewritten directory keeps one entry per name"
                );
            }
            let storage = SharedStorage::new(storage);
            let writer = ZipWriter::new_append(storage.clone()).map_err(|err| {
                let err = codec_error(err);
                error!(archive = label.as_str(), %err, "failed reopening blob archive for append");
                err
            })?;
            ZipState::Writing { writer, storage }
        } else {
            ZipState::Reading(storage)
        };

        info!(archive = label.as_str(), blobs = index.entries.len(), append, "opened blob archive");
        self.install(flags, origin, state, index.entries);
        Ok(())
    }

    fn install(
        &mut self,
        flags: BlobFlags,
        origin: ArchiveOrigin,
        state: ZipState,
        blobs: BTreeMap<String, CentralEntry>,
    ) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        inner.state = state;
        inner.blobs = blobs;
        self.flags = flags;
        self.origin = Some(origin);
    }

    // -----------------------------------------------------------------------
    // Whole-archive access
    // -----------------------------------------------------------------------

    /// Finalize a heap archive, returning its bytes, and deinit the manager.
    pub fn deinit_heap(&mut self) -> BlobResult<Vec<u8>> {
        match self.origin {
            Some(ArchiveOrigin::Heap) => {}
            None => return Err(BlobError::NotInitialized),
            Some(_) => {
                return Err(BlobError::CapabilityDenied {
                    op: "deinit_heap",
                    flags: self.flags,
                })
            }
        }

        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        let storage = match std::mem::replace(&mut inner.state, ZipState::Closed) {
            ZipState::Writing { writer, storage } => {
                drop(storage);
                writer.finish().map_err(codec_error).map(SharedStorage::into_inner)
            }
            ZipState::Reading(storage) => Ok(Some(storage)),
            ZipState::Closed => Err(BlobError::NotInitialized),
        };
        self.deinit()?;

        match storage {
            Ok(Some(ArchiveStorage::Heap(cursor))) => Ok(cursor.into_inner()),
            Ok(Some(ArchiveStorage::File(_))) => Err(BlobError::Codec {
                code: "other",
                message: "heap archive is backed by a file".to_string(),
            }),
            Ok(None) => Err(BlobError::Codec {
                code: "other",
                message: "heap archive storage is still shared".to_string(),
            }),
            Err(err) => {
                error!(%err, "failed finalizing heap archive");
                Err(err)
            }
        }
    }

    /// Size in bytes of the archive as it stands.
    ///
    /// While writing, that is the entries stored so far: the central directory
    /// only lands in `deinit`.
    pub fn get_archive_size(&self) -> BlobResult<u64> {
        if !self.is_initialized() {
            return Err(BlobError::NotInitialized);
        }
        let mut inner = self.lock();
        let size = match &mut inner.state {
            ZipState::Reading(storage) => storage.len(),
            ZipState::Writing { storage, .. } => storage.lock().len(),
            ZipState::Closed => return Err(BlobError::NotInitialized),
        };
        Ok(size?)
    }

    /// Stream the archive bytes to `out` in `copy_chunk_size` chunks and
    /// return how many were written. Like [`Self::get_archive_size`], a write
    /// session exports its entries without a central directory.
    pub fn write_archive_to_stream(&self, out: &mut dyn Write) -> BlobResult<u64> {
        if !self.is_initialized() {
            return Err(BlobError::NotInitialized);
        }
        let chunk_size = self.config.copy_chunk_size;
        let mut inner = self.lock();
        let copied = match &mut inner.state {
            ZipState::Reading(storage) => storage.copy_to(out, chunk_size),
            ZipState::Writing { storage, .. } => storage.lock().copy_to(out, chunk_size),
            ZipState::Closed => return Err(BlobError::NotInitialized),
        };
        copied.map_err(|err| {
            error!(%err, "failed copying archive to stream");
            BlobError::from(err)
        })
    }

    fn lock(&self) -> MutexGuard<'_, ArchiveInner> {
        self.inner.lock().expect("lock poisoned")
    }

    fn entry_options(&self) -> SimpleFileOptions {
        SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(self.config.compression_level.into()))
            .large_file(self.config.zip64)
    }
}

impl Default for ArchiveBlobManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ArchiveBlobManager {
    fn drop(&mut self) {
        self.reset();
    }
}

impl BlobManager for ArchiveBlobManager {
    fn kind(&self) -> ManagerKind {
        ManagerKind::Archive
    }

    fn flags(&self) -> BlobFlags {
        self.flags
    }

    fn is_initialized(&self) -> bool {
        self.origin.is_some()
    }

    fn max_blob_size(&self) -> u64 {
        self.config.store.max_blob_size
    }

    fn deinit(&mut self) -> BlobResult<()> {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        let state = std::mem::replace(&mut inner.state, ZipState::Closed);
        inner.blobs.clear();
        let origin = self.origin.take();
        self.flags = BlobFlags::NONE;

        let (
            ZipState::Writing { writer, .. },
            Some(origin @ (ArchiveOrigin::File(_) | ArchiveOrigin::CFile)),
        ) = (state, origin)
        else {
            return Ok(());
        };

        // Both storage handles are dropped on return, whatever the outcome.
        match writer.finish() {
            Ok(mut storage) => {
                if let Err(err) = storage.flush() {
                    error!(archive = %origin, %err, "failed flushing blob archive");
                    return Err(err.into());
                }
                info!(archive = %origin, "finalized blob archive");
                Ok(())
            }
            Err(err) => {
                let err = codec_error(err);
                error!(archive = %origin, %err, "failed finalizing blob archive");
                Err(err)
            }
        }
    }

    fn add_buf_using_id(&mut self, data: &[u8], id: &str) -> BlobResult<String> {
        require_writable(self, "add")?;

        let id = if id.is_empty() {
            compute_id(data, "", "", None)?
        } else {
            id.to_string()
        };
        let size = data.len() as u64;
        check_blob_size(&id, size, self.config.store.max_blob_size)?;

        let options = self.entry_options();
        let flags = self.flags;
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);

        if inner.blobs.contains_key(&id) {
            debug!(id = id.as_str(), "archive already contains blob, not replacing");
            return Ok(id);
        }

        let ZipState::Writing { writer, storage } = &mut inner.state else {
            error!(id = id.as_str(), "blob archive is not open for writing");
            return Err(BlobError::CapabilityDenied { op: "add", flags });
        };

        match append_entry(writer, storage, &id, data, options) {
            Ok(entry) => {
                inner.blobs.insert(id.clone(), entry);
                Ok(id)
            }
            Err(err) => {
                error!(id = id.as_str(), size, %err, "failed adding blob to archive");
                Err(err)
            }
        }
    }

    fn open(&self, id: &str) -> BlobResult<Option<BlobStream<'_>>> {
        require_readable(self, "open")?;

        let mut inner = self.lock();
        let Some(entry) = inner.blobs.get(id).copied() else {
            return Ok(None);
        };

        let data = match &mut inner.state {
            ZipState::Reading(storage) => read_entry(storage, id, &entry),
            ZipState::Writing { storage, .. } => read_entry(&mut *storage.lock(), id, &entry),
            ZipState::Closed => Err(BlobError::NotInitialized),
        };

        match data {
            Ok(data) => Ok(Some(BlobStream::owned(id, data))),
            Err(err) => {
                error!(id, size = entry.size, %err, "failed extracting blob from archive");
                Err(err)
            }
        }
    }

    fn does_exist(&self, id: &str) -> bool {
        self.is_initialized() && self.lock().blobs.contains_key(id)
    }

    fn get_size(&self, id: &str) -> u64 {
        self.lock().blobs.get(id).map(|e| e.size).unwrap_or(0)
    }

    fn enumerate(&self) -> Vec<String> {
        self.lock().blobs.keys().cloned().collect()
    }
}

impl fmt::Debug for ArchiveBlobManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveBlobManager")
            .field("origin", &self.origin)
            .field("flags", &self.flags)
            .finish()
    }
}

/// Compress `data` into a one-entry scratch archive, then copy the finished
/// entry into `writer` raw. The entry is complete on storage when this
/// returns, so it can be read back by offset before the archive is finalized.
fn append_entry(
    writer: &mut ZipWriter<SharedStorage>,
    storage: &SharedStorage,
    id: &str,
    data: &[u8],
    options: SimpleFileOptions,
) -> BlobResult<CentralEntry> {
    let mut scratch = ZipWriter::new(Cursor::new(Vec::with_capacity(data.len() / 2 + 128)));
    scratch.start_file(id, options).map_err(codec_error)?;
    scratch.write_all(data)?;
    let mut packed = scratch.finish_into_readable().map_err(codec_error)?;
    let file = packed.by_index_raw(0).map_err(codec_error)?;

    let entry = CentralEntry {
        header_offset: storage.lock().stream_position()?,
        compressed_size: file.compressed_size(),
        size: file.size(),
        crc32: file.crc32(),
    };
    if let Err(err) = writer.raw_copy_file(file) {
        if let Err(abort_err) = writer.abort_file() {
            warn!(id, %abort_err, "failed discarding partial archive entry");
        }
        return Err(codec_error(err));
    }
    Ok(entry)
}
