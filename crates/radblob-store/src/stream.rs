use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};

/// How a [`BlobStream`] holds its bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamKind {
    /// Borrowed view into bytes owned by the manager. The borrow checker keeps
    /// the manager from being mutated while the view is alive.
    View,
    /// Private decompressed copy, freed when the stream is dropped.
    Owned,
    /// Open file handle, closed when the stream is dropped.
    File,
}

enum Source<'a> {
    View(Cursor<&'a [u8]>),
    Owned(Cursor<Vec<u8>>),
    File(BufReader<File>),
}

/// A readable, seekable handle to one blob, returned by `open`.
///
/// Streams release whatever they hold when dropped, so callers never need to
/// know which backend produced one.
pub struct BlobStream<'a> {
    id: String,
    size: u64,
    source: Source<'a>,
    origin: Option<usize>,
}

impl<'a> BlobStream<'a> {
    /// A view over bytes the manager keeps owning.
    pub fn view(id: impl Into<String>, data: &'a [u8]) -> Self {
        Self {
            id: id.into(),
            size: data.len() as u64,
            source: Source::View(Cursor::new(data)),
            origin: None,
        }
    }

    /// A stream that owns its buffer.
    pub fn owned(id: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            size: data.len() as u64,
            source: Source::Owned(Cursor::new(data)),
            origin: None,
        }
    }

    /// A stream over an open file of known size.
    pub fn file(id: impl Into<String>, file: File, size: u64) -> Self {
        Self {
            id: id.into(),
            size,
            source: Source::File(BufReader::new(file)),
            origin: None,
        }
    }

    /// The ID this stream was opened with.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Total size of the blob in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn kind(&self) -> StreamKind {
        match self.source {
            Source::View(_) => StreamKind::View,
            Source::Owned(_) => StreamKind::Owned,
            Source::File(_) => StreamKind::File,
        }
    }

    /// Index of the child manager that produced this stream, when it came
    /// through a cascading manager.
    pub fn origin(&self) -> Option<usize> {
        self.origin
    }

    /// Tag the stream with the index of the child that produced it.
    pub fn with_origin(mut self, origin: usize) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Clear the origin tag, returning it.
    pub fn take_origin(&mut self) -> Option<usize> {
        self.origin.take()
    }

    /// Consume the stream and return its remaining bytes.
    ///
    /// Owned streams that have not been read from hand back their buffer
    /// without copying.
    pub fn into_bytes(self) -> io::Result<Vec<u8>> {
        match self.source {
            Source::Owned(cursor) if cursor.position() == 0 => Ok(cursor.into_inner()),
            mut source => {
                let mut buf = Vec::new();
                source.read_to_end(&mut buf)?;
                Ok(buf)
            }
        }
    }
}

impl Read for Source<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::View(c) => c.read(buf),
            Self::Owned(c) => c.read(buf),
            Self::File(f) => f.read(buf),
        }
    }
}

impl Seek for Source<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Self::View(c) => c.seek(pos),
            Self::Owned(c) => c.seek(pos),
            Self::File(f) => f.seek(pos),
        }
    }
}

impl Read for BlobStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.source.read(buf)
    }
}

impl Seek for BlobStream<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.source.seek(pos)
    }
}

impl std::fmt::Debug for BlobStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStream")
            .field("id", &self.id)
            .field("size", &self.size)
            .field("kind", &self.kind())
            .field("origin", &self.origin)
            .finish()
    }
}

/// Anything a blob can be added from: a readable, seekable byte source.
pub trait BlobSource: Read + Seek {}

impl<T: Read + Seek + ?Sized> BlobSource for T {}
