//! Content-addressed blob storage.
//!
//! A blob manager is a key/value store for opaque binary payloads. Keys are
//! either caller-chosen or derived from the content itself (CRC-64 plus size),
//! so identical payloads written by unrelated callers land on the same ID.
//!
//! # Backends
//!
//! All backends implement the [`BlobManager`] trait:
//!
//! - [`MemoryBlobManager`] -- `BTreeMap`-backed store, streams are borrowed views
//! - [`LooseFileBlobManager`] -- one file per blob in a directory
//! - [`NullBlobManager`] -- accepts everything, keeps nothing
//! - [`MultiBlobManager`] -- read-only overlay cascading over other managers
//!
//! The ZIP archive backend lives in the `radblob-archive` crate.
//!
//! # Design Rules
//!
//! 1. A manager is initialized once with a fixed [`BlobFlags`] set; every
//!    operation is checked against it and fails without mutating state.
//! 2. Re-adding an existing ID never overwrites it.
//! 3. Streams release their resources on drop.
//! 4. Mutation takes `&mut self`, so no stream can outlive a write.
//! 5. `get`, `populate` and `copy_file` are written once, in [`ops`].

pub mod config;
pub mod error;
pub mod flags;
pub mod id;
pub mod loose;
pub mod memory;
pub mod multi;
pub mod null;
pub mod ops;
pub mod stream;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use config::{StoreConfig, DEFAULT_MAX_BLOB_SIZE, MAX_GET_SIZE};
pub use error::{BlobError, BlobResult};
pub use flags::BlobFlags;
pub use id::{compute_id, crc64, crc64_update, extension_of, prefix_of, BlobIdParts};
pub use loose::LooseFileBlobManager;
pub use memory::MemoryBlobManager;
pub use multi::MultiBlobManager;
pub use null::NullBlobManager;
pub use stream::{BlobSource, BlobStream, StreamKind};
pub use traits::{BlobManager, ManagerKind};
