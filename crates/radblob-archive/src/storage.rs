use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use radblob_store::BlobError;
use zip::result::ZipError;

use crate::window::ArchiveWindow;

/// The bytes an archive lives in: a heap buffer or a window of a file.
#[derive(Debug)]
pub enum ArchiveStorage {
    Heap(Cursor<Vec<u8>>),
    File(ArchiveWindow<File>),
}

impl ArchiveStorage {
    pub fn heap(data: Vec<u8>) -> Self {
        Self::Heap(Cursor::new(data))
    }

    /// Serialized archive length in bytes.
    pub fn len(&mut self) -> io::Result<u64> {
        match self {
            Self::Heap(cursor) => Ok(cursor.get_ref().len() as u64),
            Self::File(window) => window.len(),
        }
    }

    /// Copy the whole archive to `out` in `chunk_size` pieces, returning the
    /// number of bytes written. The current position is kept.
    pub fn copy_to(&mut self, out: &mut dyn Write, chunk_size: usize) -> io::Result<u64> {
        let resume = self.stream_position()?;
        let copied = self.copy_all(out, chunk_size);
        self.seek(SeekFrom::Start(resume))?;
        copied
    }

    fn copy_all(&mut self, out: &mut dyn Write, chunk_size: usize) -> io::Result<u64> {
        let total = self.len()?;
        self.seek(SeekFrom::Start(0))?;

        let mut buf = vec![0u8; chunk_size.max(1)];
        let mut remaining = total;
        while remaining > 0 {
            let n = remaining.min(buf.len() as u64) as usize;
            self.read_exact(&mut buf[..n])?;
            out.write_all(&buf[..n])?;
            remaining -= n as u64;
        }
        Ok(total)
    }
}

/// Storage handle shared between a ZIP writer and the manager that owns it,
/// so entries can be read back by offset while the writer stays open.
#[derive(Clone, Debug)]
pub struct SharedStorage(Arc<Mutex<ArchiveStorage>>);

impl SharedStorage {
    pub fn new(storage: ArchiveStorage) -> Self {
        Self(Arc::new(Mutex::new(storage)))
    }

    pub fn lock(&self) -> MutexGuard<'_, ArchiveStorage> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The storage back, or `None` while another handle is alive.
    pub fn into_inner(self) -> Option<ArchiveStorage> {
        Arc::try_unwrap(self.0)
            .ok()
            .map(|m| m.into_inner().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Read for SharedStorage {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.lock().read(buf)
    }
}

impl Write for SharedStorage {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock().flush()
    }
}

impl Seek for SharedStorage {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.lock().seek(pos)
    }
}

impl Read for ArchiveStorage {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Heap(c) => c.read(buf),
            Self::File(w) => w.read(buf),
        }
    }
}

impl Write for ArchiveStorage {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Heap(c) => c.write(buf),
            Self::File(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Heap(c) => c.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Seek for ArchiveStorage {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Self::Heap(c) => c.seek(pos),
            Self::File(w) => w.seek(pos),
        }
    }
}

/// Map a ZIP codec error onto [`BlobError::Codec`] with a stable short code.
pub fn codec_error(err: ZipError) -> BlobError {
    let code = match &err {
        ZipError::Io(_) => "io",
        ZipError::InvalidArchive(_) => "invalid_archive",
        ZipError::UnsupportedArchive(_) => "unsupported_archive",
        ZipError::FileNotFound => "file_not_found",
        _ => "other",
    };
    BlobError::Codec {
        code,
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_to_uses_small_chunks() {
        let mut storage = ArchiveStorage::heap((0u8..=255).collect());
        let mut out = Vec::new();
        assert_eq!(storage.copy_to(&mut out, 7).unwrap(), 256);
        assert_eq!(out, (0u8..=255).collect::<Vec<_>>());
    }

    #[test]
    fn copy_to_keeps_position() {
        let mut storage = ArchiveStorage::heap(b"0123456789".to_vec());
        storage.seek(SeekFrom::Start(4)).unwrap();
        let mut out = Vec::new();
        storage.copy_to(&mut out, 3).unwrap();
        assert_eq!(out, b"0123456789");
        assert_eq!(storage.stream_position().unwrap(), 4);
    }

    #[test]
    fn shared_storage_sees_writes_from_every_handle() {
        let shared = SharedStorage::new(ArchiveStorage::heap(Vec::new()));
        let mut writer = shared.clone();
        writer.write_all(b"abc").unwrap();
        assert_eq!(shared.lock().len().unwrap(), 3);
        assert_eq!(shared.lock().stream_position().unwrap(), 3);

        assert!(shared.clone().into_inner().is_none());
        drop(writer);
        match shared.into_inner() {
            Some(ArchiveStorage::Heap(cursor)) => assert_eq!(cursor.into_inner(), b"abc"),
            other => panic!("unexpected storage: {other:?}"),
        }
    }

    #[test]
    fn file_storage_respects_window() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"..payload..").unwrap();
        let window = ArchiveWindow::new(file, 2, Some(7)).unwrap();
        let mut storage = ArchiveStorage::File(window);
        assert_eq!(storage.len().unwrap(), 7);
        let mut out = Vec::new();
        storage.copy_to(&mut out, 64 * 1024).unwrap();
        assert_eq!(out, b"payload");
    }

    #[test]
    fn codec_error_codes() {
        let err = codec_error(ZipError::FileNotFound);
        assert!(matches!(err, BlobError::Codec { code: "file_not_found", .. }));
        let err = codec_error(ZipError::Io(io::Error::other("disk gone")));
        match err {
            BlobError::Codec { code, message } => {
                assert_eq!(code, "io");
                assert!(message.contains("disk gone"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
