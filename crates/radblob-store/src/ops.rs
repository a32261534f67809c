//! Template algorithms shared by every backend.
//!
//! These are written once against the [`BlobManager`] primitives. The trait's
//! provided methods forward here, so backends get them for free.

use std::io::{Read, SeekFrom};

use tracing::{debug, error, warn};

use crate::config::MAX_GET_SIZE;
use crate::error::{BlobError, BlobResult};
use crate::id::compute_id;
use crate::stream::BlobSource;
use crate::traits::BlobManager;

pub(crate) fn require_initialized<M: BlobManager + ?Sized>(manager: &M) -> BlobResult<()> {
    if manager.is_initialized() {
        Ok(())
    } else {
        error!(kind = %manager.kind(), "blob manager used before init");
        Err(BlobError::NotInitialized)
    }
}

/// Fail with `CapabilityDenied` unless the manager is initialized and readable.
pub fn require_readable<M: BlobManager + ?Sized>(manager: &M, op: &'static str) -> BlobResult<()> {
    require_initialized(manager)?;
    if manager.is_readable() {
        Ok(())
    } else {
        error!(kind = %manager.kind(), op, "manager is not readable");
        Err(BlobError::CapabilityDenied {
            op,
            flags: manager.flags(),
        })
    }
}

/// Fail with `CapabilityDenied` unless the manager is initialized and writable.
pub fn require_writable<M: BlobManager + ?Sized>(manager: &M, op: &'static str) -> BlobResult<()> {
    require_initialized(manager)?;
    if manager.is_writable() {
        Ok(())
    } else {
        error!(kind = %manager.kind(), op, "manager is not writable");
        Err(BlobError::CapabilityDenied {
            op,
            flags: manager.flags(),
        })
    }
}

/// Reject blobs above `max`.
pub fn check_blob_size(id: &str, size: u64, max: u64) -> BlobResult<()> {
    if size > max {
        error!(id, size, max, "blob exceeds maximum size");
        return Err(BlobError::SizeTooLarge {
            id: id.to_string(),
            size,
            max,
        });
    }
    Ok(())
}

/// Open `id`, read its full declared size, close it.
///
/// A short read is an error, never a partial result.
pub fn get<M: BlobManager + ?Sized>(manager: &M, id: &str) -> BlobResult<Vec<u8>> {
    require_initialized(manager)?;

    let Some(mut stream) = manager.open(id)? else {
        error!(id, "failed finding blob");
        return Err(BlobError::NotFound(id.to_string()));
    };

    let size = stream.size();
    if let Err(err) = check_blob_size(id, size, MAX_GET_SIZE) {
        manager.close(stream);
        return Err(err);
    }

    let mut data = Vec::with_capacity(size as usize);
    let read = stream.by_ref().take(size).read_to_end(&mut data);
    manager.close(stream);

    let actual = read? as u64;
    if actual != size {
        error!(id, size, actual, "short read on blob");
        return Err(BlobError::TruncatedRead {
            id: id.to_string(),
            expected: size,
            actual,
        });
    }
    Ok(data)
}

pub fn add_buf_compute_unique_id<M: BlobManager + ?Sized>(
    manager: &mut M,
    data: &[u8],
    prefix: &str,
    ext: &str,
    precomputed_crc: Option<u64>,
) -> BlobResult<String> {
    require_writable(manager, "add")?;
    let id = compute_id(data, prefix, ext, precomputed_crc)?;
    manager.add_buf_using_id(data, &id)
}

/// Read a whole stream from its start into a buffer bounded by the manager's
/// maximum blob size.
fn read_source<M: BlobManager + ?Sized>(
    manager: &M,
    stream: &mut dyn BlobSource,
    id: &str,
) -> BlobResult<Vec<u8>> {
    let size = stream.seek(SeekFrom::End(0))?;
    check_blob_size(id, size, manager.max_blob_size())?;
    stream.seek(SeekFrom::Start(0))?;

    let mut data = Vec::with_capacity(size as usize);
    let actual = stream.take(size).read_to_end(&mut data)? as u64;
    if actual != size {
        error!(id, size, actual, "short read while materializing stream");
        return Err(BlobError::TruncatedRead {
            id: id.to_string(),
            expected: size,
            actual,
        });
    }
    Ok(data)
}

pub fn add_stream_using_id<M: BlobManager + ?Sized>(
    manager: &mut M,
    stream: &mut dyn BlobSource,
    id: &str,
) -> BlobResult<String> {
    require_writable(manager, "add")?;
    let data = read_source(manager, stream, id)?;
    manager.add_buf_using_id(&data, id)
}

pub fn add_stream_compute_unique_id<M: BlobManager + ?Sized>(
    manager: &mut M,
    stream: &mut dyn BlobSource,
    prefix: &str,
    ext: &str,
    precomputed_crc: Option<u64>,
) -> BlobResult<String> {
    require_writable(manager, "add")?;
    let data = read_source(manager, stream, "<stream>")?;
    let id = compute_id(&data, prefix, ext, precomputed_crc)?;
    manager.add_buf_using_id(&data, &id)
}

/// Copy every blob of `src` into `dst` under the same ID.
///
/// Best effort: blobs that copy successfully stay in `dst` even when others
/// fail, and the failures are reported together.
pub fn populate<M: BlobManager + ?Sized>(dst: &mut M, src: &dyn BlobManager) -> BlobResult<()> {
    require_initialized(dst)?;
    require_initialized(src)?;

    let ids = src.enumerate();
    let total = ids.len();
    let mut failed = 0;

    for id in &ids {
        match src.open(id) {
            Ok(Some(mut stream)) => {
                if let Err(err) = dst.add_stream_using_id(&mut stream, id) {
                    warn!(id = id.as_str(), %err, "populate failed adding blob");
                    failed += 1;
                }
                src.close(stream);
            }
            Ok(None) => {
                warn!(id = id.as_str(), "populate: enumerated blob could not be opened");
                failed += 1;
            }
            Err(err) => {
                warn!(id = id.as_str(), %err, "populate failed opening blob");
                failed += 1;
            }
        }
    }

    debug!(total, failed, "populate finished");
    if failed > 0 {
        return Err(BlobError::PopulateIncomplete { failed, total });
    }
    Ok(())
}

/// `get` from `src`, then add into `dst` as `dst_id`.
pub fn copy_file<M: BlobManager + ?Sized>(
    dst: &mut M,
    src: &dyn BlobManager,
    src_id: &str,
    dst_id: &str,
) -> BlobResult<String> {
    let data = src.get(src_id)?;
    dst.add_buf_using_id(&data, dst_id)
}
