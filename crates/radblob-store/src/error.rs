use crate::flags::BlobFlags;

/// Errors from blob manager operations.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// The manager was used before `init` (or after `deinit`).
    #[error("blob manager is not initialized")]
    NotInitialized,

    /// The operation needs a capability the manager was not initialized with.
    #[error("{op} denied: manager flags are {flags}")]
    CapabilityDenied { op: &'static str, flags: BlobFlags },

    /// The flag combination is not valid for this backend or origin.
    #[error("invalid flags for this manager: {0}")]
    InvalidFlags(BlobFlags),

    /// No blob with this ID exists.
    #[error("blob not found: {0}")]
    NotFound(String),

    /// The blob is larger than the manager will materialize.
    #[error("blob {id} is too large: {size} bytes (max {max})")]
    SizeTooLarge { id: String, size: u64, max: u64 },

    /// A blob with this ID already exists with a different size.
    #[error("blob {id} already exists with {existing} bytes, refusing {requested} bytes")]
    SizeMismatch {
        id: String,
        existing: u64,
        requested: u64,
    },

    /// Fewer bytes were read than the stream declared.
    #[error("short read on blob {id}: expected {expected} bytes, got {actual}")]
    TruncatedRead {
        id: String,
        expected: u64,
        actual: u64,
    },

    /// Fewer bytes were written than requested.
    #[error("short write on blob {id}: expected {expected} bytes, wrote {actual}")]
    TruncatedWrite {
        id: String,
        expected: u64,
        actual: u64,
    },

    /// The archive codec reported a failure.
    #[error("archive codec failure ({code}): {message}")]
    Codec { code: &'static str, message: String },

    /// I/O error from the filesystem or an underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// ID prefixes may not contain the bracket delimiters.
    #[error("invalid blob ID prefix {0:?}: brackets are reserved")]
    InvalidPrefix(String),

    /// The ID cannot be used as a storage key by this backend.
    #[error("invalid blob ID {0:?}")]
    InvalidId(String),

    /// `populate` copied some blobs but not all of them.
    #[error("populate incomplete: {failed} of {total} blobs failed")]
    PopulateIncomplete { failed: usize, total: usize },
}

/// Result alias for blob manager operations.
pub type BlobResult<T> = Result<T, BlobError>;
