use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::config::StoreConfig;
use crate::error::{BlobError, BlobResult};
use crate::flags::BlobFlags;
use crate::id::{compute_id, looks_like_blob_id};
use crate::ops::{check_blob_size, require_readable, require_writable};
use crate::stream::BlobStream;
use crate::traits::{BlobManager, ManagerKind};

/// Blob manager over a directory where each blob is one file named by its ID.
///
/// Nothing is cached: existence and size are always filesystem queries, so
/// another process writing into the same directory is visible immediately.
pub struct LooseFileBlobManager {
    dir: Option<PathBuf>,
    flags: BlobFlags,
    config: StoreConfig,
}

impl LooseFileBlobManager {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            dir: None,
            flags: BlobFlags::NONE,
            config,
        }
    }

    /// Bind the manager to `path`.
    ///
    /// A writable manager creates the directory when it is missing. A
    /// read-only manager requires it to exist already.
    pub fn init(&mut self, flags: BlobFlags, path: impl AsRef<Path>) -> BlobResult<()> {
        self.deinit()?;
        if !flags.has_access() {
            return Err(BlobError::InvalidFlags(flags));
        }

        let path = path.as_ref();
        if !path.is_dir() {
            if !flags.is_writable() {
                error!(path = %path.display(), "blob directory does not exist");
                return Err(BlobError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("blob directory {} does not exist", path.display()),
                )));
            }
            fs::create_dir_all(path)?;
            info!(path = %path.display(), "created blob directory");
        }

        self.dir = Some(path.to_path_buf());
        self.flags = flags;
        Ok(())
    }

    /// The directory the manager is bound to.
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Resolve `id` to a file inside the blob directory, refusing anything that
    /// could escape it.
    fn blob_path(&self, id: &str) -> BlobResult<PathBuf> {
        let dir = self.dir.as_ref().ok_or(BlobError::NotInitialized)?;
        if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\', '\0']) {
            return Err(BlobError::InvalidId(id.to_string()));
        }
        Ok(dir.join(id))
    }

    /// Create a file that must not exist yet, let `fill` write `data` into
    /// it, and return the length that reached the disk.
    fn write_new<F>(path: &Path, data: &[u8], fill: F) -> io::Result<u64>
    where
        F: FnOnce(&mut dyn Write, &[u8]) -> io::Result<()>,
    {
        let file = OpenOptions::new().write(true).create_new(true).open(path)?;
        let mut writer = BufWriter::new(file);
        fill(&mut writer, data)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(writer.get_ref().metadata()?.len())
    }

    /// Add path shared by every buffer add. `fill` moves the bytes into the
    /// freshly created file; whatever it leaves behind on failure is removed.
    fn add_with<F>(&mut self, data: &[u8], id: &str, fill: F) -> BlobResult<String>
    where
        F: FnOnce(&mut dyn Write, &[u8]) -> io::Result<()>,
    {
        require_writable(self, "add")?;

        let id = if id.is_empty() {
            compute_id(data, "", "", None)?
        } else {
            id.to_string()
        };
        let path = self.blob_path(&id)?;
        let size = data.len() as u64;
        check_blob_size(&id, size, self.config.max_blob_size)?;

        match fs::metadata(&path) {
            Ok(meta) if meta.len() == size => {
                debug!(id = id.as_str(), size, "blob file already exists");
                return Ok(id);
            }
            Ok(meta) => {
                error!(
                    id = id.as_str(),
                    existing = meta.len(),
                    requested = size,
                    "blob file already exists with a different size"
                );
                return Err(BlobError::SizeMismatch {
                    id,
                    existing: meta.len(),
                    requested: size,
                });
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        match Self::write_new(&path, data, fill) {
            Ok(written) if written == size => Ok(id),
            Ok(written) => {
                error!(id = id.as_str(), size, written, "short write on blob file");
                Self::remove_partial(&path);
                Err(BlobError::TruncatedWrite {
                    id,
                    expected: size,
                    actual: written,
                })
            }
            Err(err) => {
                error!(id = id.as_str(), size, %err, "failed writing blob file");
                // create_new failing means someone else owns the file; leave it.
                if err.kind() != io::ErrorKind::AlreadyExists {
                    Self::remove_partial(&path);
                }
                Err(err.into())
            }
        }
    }

    fn remove_partial(path: &Path) {
        if let Err(rm_err) = fs::remove_file(path) {
            warn!(path = %path.display(), %rm_err, "failed removing partial blob file");
        }
    }
}

impl Default for LooseFileBlobManager {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobManager for LooseFileBlobManager {
    fn kind(&self) -> ManagerKind {
        ManagerKind::LooseFile
    }

    fn flags(&self) -> BlobFlags {
        self.flags
    }

    fn is_initialized(&self) -> bool {
        self.dir.is_some()
    }

    fn max_blob_size(&self) -> u64 {
        self.config.max_blob_size
    }

    fn deinit(&mut self) -> BlobResult<()> {
        self.dir = None;
        self.flags = BlobFlags::NONE;
        Ok(())
    }

    fn add_buf_using_id(&mut self, data: &[u8], id: &str) -> BlobResult<String> {
        self.add_with(data, id, |sink, data| sink.write_all(data))
    }

    fn open(&self, id: &str) -> BlobResult<Option<BlobStream<'_>>> {
        require_readable(self, "open")?;
        let path = self.blob_path(id)?;

        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                error!(id, %err, "failed opening blob file");
                return Err(err.into());
            }
        };
        let size = file.metadata()?.len();
        Ok(Some(BlobStream::file(id, file, size)))
    }

    fn does_exist(&self, id: &str) -> bool {
        self.blob_path(id).map(|p| p.is_file()).unwrap_or(false)
    }

    fn get_size(&self, id: &str) -> u64 {
        self.blob_path(id)
            .and_then(|p| Ok(fs::metadata(p)?.len()))
            .unwrap_or(0)
    }

    fn enumerate(&self) -> Vec<String> {
        let Some(dir) = &self.dir else {
            return Vec::new();
        };
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                error!(path = %dir.display(), %err, "failed listing blob directory");
                return Vec::new();
            }
        };

        let mut ids: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| looks_like_blob_id(name))
            .collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for LooseFileBlobManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LooseFileBlobManager")
            .field("dir", &self.dir)
            .field("flags", &self.flags)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamKind;
    use std::io::Read;

    fn writable(dir: &Path) -> LooseFileBlobManager {
        let mut mgr = LooseFileBlobManager::new();
        mgr.init(BlobFlags::READ_WRITE, dir).unwrap();
        mgr
    }

    // -----------------------------------------------------------------------
    // init
    // -----------------------------------------------------------------------

    #[test]
    fn init_creates_missing_directory_when_writable() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested/blobs");
        let mgr = writable(&dir);
        assert!(dir.is_dir());
        assert_eq!(mgr.path(), Some(dir.as_path()));
    }

    #[test]
    fn init_read_only_requires_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let mut mgr = LooseFileBlobManager::new();
        let err = mgr
            .init(BlobFlags::READABLE, tmp.path().join("missing"))
            .unwrap_err();
        assert!(matches!(err, BlobError::Io(_)));
        assert!(!mgr.is_initialized());
    }

    // -----------------------------------------------------------------------
    // add / get
    // -----------------------------------------------------------------------

    #[test]
    fn add_writes_file_named_by_id() {
        let tmp = tempfile::tempdir().unwrap();
        let mut mgr = writable(tmp.path());
        let id = mgr.add_buf_using_id(b"on disk", "").unwrap();
        assert_eq!(fs::read(tmp.path().join(&id)).unwrap(), b"on disk");
        assert_eq!(mgr.get(&id).unwrap(), b"on disk");
        assert_eq!(mgr.get_size(&id), 7);
    }

    #[test]
    fn re_add_same_size_is_a_no_op() {
        let tmp = tempfile::tempdir().unwrap();
        let mut mgr = writable(tmp.path());
        let id1 = mgr.add_buf_using_id(b"twice", "").unwrap();
        let id2 = mgr.add_buf_using_id(b"twice", "").unwrap();
        assert_eq!(id1, id2);
        assert_eq!(mgr.enumerate().len(), 1);
    }

    #[test]
    fn re_add_different_size_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let mut mgr = writable(tmp.path());
        mgr.add_buf_using_id(b"short", "x.radblob.raw").unwrap();
        let err = mgr.add_buf_using_id(b"much longer", "x.radblob.raw").unwrap_err();
        assert!(matches!(
            err,
            BlobError::SizeMismatch { existing: 5, requested: 11, .. }
        ));
        assert_eq!(mgr.get("x.radblob.raw").unwrap(), b"short");
    }

    #[test]
    fn add_rejects_path_like_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let mut mgr = writable(tmp.path());
        for bad in ["../escape", "a/b", "..", "."] {
            let err = mgr.add_buf_using_id(b"x", bad).unwrap_err();
            assert!(matches!(err, BlobError::InvalidId(_)), "{bad}");
        }
        assert!(!tmp.path().parent().unwrap().join("escape").exists());
    }

    #[test]
    fn read_only_add_is_denied() {
        let tmp = tempfile::tempdir().unwrap();
        let mut mgr = LooseFileBlobManager::new();
        mgr.init(BlobFlags::READABLE, tmp.path()).unwrap();
        assert!(matches!(
            mgr.add_buf_using_id(b"x", "").unwrap_err(),
            BlobError::CapabilityDenied { .. }
        ));
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    // -----------------------------------------------------------------------
    // open / enumerate
    // -----------------------------------------------------------------------

    #[test]
    fn open_returns_file_stream() {
        let tmp = tempfile::tempdir().unwrap();
        let mut mgr = writable(tmp.path());
        let id = mgr.add_buf_using_id(b"file stream", "").unwrap();
        let mut stream = mgr.open(&id).unwrap().unwrap();
        assert_eq!(stream.kind(), StreamKind::File);
        assert_eq!(stream.size(), 11);
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"file stream");
    }

    #[test]
    fn open_missing_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = writable(tmp.path());
        assert!(mgr.open("absent.radblob.raw").unwrap().is_none());
        assert!(!mgr.does_exist("absent.radblob.raw"));
        assert_eq!(mgr.get_size("absent.radblob.raw"), 0);
    }

    #[test]
    fn enumerate_only_lists_blob_files() {
        let tmp = tempfile::tempdir().unwrap();
        let mut mgr = writable(tmp.path());
        let a = mgr.add_buf_using_id(b"aaa", "").unwrap();
        let b = mgr.add_buf_using_id(b"bb", "").unwrap();
        fs::write(tmp.path().join("notes.txt"), b"ignore me").unwrap();
        fs::create_dir(tmp.path().join("sub.radblob.dir")).unwrap();

        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(mgr.enumerate(), expected);
    }

    #[test]
    fn second_manager_sees_existing_files() {
        let tmp = tempfile::tempdir().unwrap();
        let id = writable(tmp.path()).add_buf_using_id(b"shared", "").unwrap();

        let mut reader = LooseFileBlobManager::new();
        reader.init(BlobFlags::READABLE, tmp.path()).unwrap();
        assert!(reader.does_exist(&id));
        assert_eq!(reader.get(&id).unwrap(), b"shared");
    }

    #[test]
    fn deinit_then_reinit_elsewhere() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let mut mgr = writable(first.path());
        let id = mgr.add_buf_using_id(b"one", "").unwrap();
        mgr.deinit().unwrap();
        mgr.deinit().unwrap();
        assert!(mgr.enumerate().is_empty());

        mgr.init(BlobFlags::READ_WRITE, second.path()).unwrap();
        assert!(!mgr.does_exist(&id));
    }

    // -----------------------------------------------------------------------
    // failed writes
    // -----------------------------------------------------------------------

    fn blob_files(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn io_error_mid_write_leaves_no_file() {
        let tmp = tempfile::tempdir().unwrap();
        let mut mgr = writable(tmp.path());
        let data = vec![7u8; 64 * 1024];

        let err = mgr
            .add_with(&data, "", |sink, data| {
                sink.write_all(&data[..data.len() / 2])?;
                sink.flush()?;
                Err(io::Error::other("disk went away"))
            })
            .unwrap_err();
        assert!(matches!(err, BlobError::Io(_)), "{err:?}");
        assert!(blob_files(tmp.path()).is_empty());

        // The same ID can be stored once the sink behaves again.
        let id = mgr.add_buf_using_id(&data, "").unwrap();
        assert_eq!(mgr.get_size(&id), data.len() as u64);
    }

    #[test]
    fn short_write_is_truncated_and_removed() {
        let tmp = tempfile::tempdir().unwrap();
        let mut mgr = writable(tmp.path());

        let err = mgr
            .add_with(b"0123456789", "short", |sink, data| sink.write_all(&data[..4]))
            .unwrap_err();
        match err {
            BlobError::TruncatedWrite { id, expected, actual } => {
                assert_eq!(id, "short");
                assert_eq!(expected, 10);
                assert_eq!(actual, 4);
            }
            other => panic!("expected TruncatedWrite, got {other:?}"),
        }
        assert!(!mgr.does_exist("short"));
        assert!(blob_files(tmp.path()).is_empty());
    }

    #[test]
    fn existing_file_is_not_removed_on_create_conflict() {
        let tmp = tempfile::tempdir().unwrap();
        let mut mgr = writable(tmp.path());
        let id = mgr.add_buf_using_id(b"keep me", "").unwrap();

        // Size differs, so add stops before touching the file.
        let err = mgr.add_with(b"other", &id, |sink, data| sink.write_all(data)).unwrap_err();
        assert!(matches!(err, BlobError::SizeMismatch { .. }));
        assert_eq!(mgr.get(&id).unwrap(), b"keep me");
    }
}
