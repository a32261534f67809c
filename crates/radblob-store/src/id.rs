//! Content ID codec.
//!
//! A blob ID is derived from a CRC-64 of the content plus its size:
//!
//! ```text
//! [PREFIX]_HASHHEX_SIZE.radblob.EXT
//! HASHHEX_SIZE.radblob.EXT
//! ```
//!
//! `HASHHEX` is the 16-digit upper-case hex CRC-64/XZ, `EXT` defaults to
//! `raw`. Identical `(data, prefix, ext)` always yields the identical ID, which
//! is what lets unrelated writers deduplicate payloads without coordination.

use crate::error::{BlobError, BlobResult};

/// Marker every generated ID carries between the size and the extension.
pub const BLOB_TAG: &str = ".radblob.";

/// Extension used when the caller supplies none.
pub const DEFAULT_EXTENSION: &str = "raw";

const CRC64_POLY: u64 = 0xC96C_5795_D787_0F42;

const CRC64_TABLE: [u64; 256] = build_crc64_table();

const fn build_crc64_table() -> [u64; 256] {
    let mut table = [0u64; 256];
    let mut i = 0;
    while i < 256 {
        let mut r = i as u64;
        let mut bit = 0;
        while bit < 8 {
            r = if r & 1 != 0 { (r >> 1) ^ CRC64_POLY } else { r >> 1 };
            bit += 1;
        }
        table[i] = r;
        i += 1;
    }
    table
}

/// CRC-64/XZ of `data`.
pub fn crc64(data: &[u8]) -> u64 {
    crc64_update(0, data)
}

/// Continue a CRC-64/XZ computation. `crc64_update(crc64(a), b) == crc64(a ++ b)`.
pub fn crc64_update(crc: u64, data: &[u8]) -> u64 {
    let mut crc = !crc;
    for &byte in data {
        crc = CRC64_TABLE[((crc ^ byte as u64) & 0xff) as usize] ^ (crc >> 8);
    }
    !crc
}

/// Compute the content ID for `data`.
///
/// `precomputed_crc` skips hashing when the caller already has the CRC-64 of
/// `data`. A leading `.` on `ext` is stripped. Fails only when `prefix`
/// contains `[` or `]`.
pub fn compute_id(
    data: &[u8],
    prefix: &str,
    ext: &str,
    precomputed_crc: Option<u64>,
) -> BlobResult<String> {
    if prefix.contains(['[', ']']) {
        return Err(BlobError::InvalidPrefix(prefix.to_string()));
    }
    let crc = precomputed_crc.unwrap_or_else(|| crc64(data));
    let ext = ext.strip_prefix('.').unwrap_or(ext);
    let ext = if ext.is_empty() { DEFAULT_EXTENSION } else { ext };
    let size = data.len();

    if prefix.is_empty() {
        Ok(format!("{crc:016X}_{size}{BLOB_TAG}{ext}"))
    } else {
        Ok(format!("[{prefix}]_{crc:016X}_{size}{BLOB_TAG}{ext}"))
    }
}

/// The bracketed prefix of an ID, or `""` if it has none.
pub fn prefix_of(id: &str) -> &str {
    id.strip_prefix('[')
        .and_then(|rest| rest.find(']').map(|end| &rest[..end]))
        .unwrap_or("")
}

/// The extension of an ID (text after the last `.`), or `""`.
pub fn extension_of(id: &str) -> &str {
    match id.rfind('.') {
        Some(dot) => &id[dot + 1..],
        None => "",
    }
}

/// Returns `true` for names shaped like `*.radblob.*`.
pub fn looks_like_blob_id(name: &str) -> bool {
    match name.find(BLOB_TAG) {
        Some(pos) => pos > 0 && pos + BLOB_TAG.len() < name.len(),
        None => false,
    }
}

/// The decoded fields of a generated ID.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobIdParts<'a> {
    pub prefix: &'a str,
    pub crc: u64,
    pub size: u64,
    pub ext: &'a str,
}

impl<'a> BlobIdParts<'a> {
    /// Decode an ID produced by [`compute_id`]. Caller-chosen IDs that do not
    /// follow the generated shape return `None`.
    pub fn parse(id: &'a str) -> Option<Self> {
        let (prefix, rest) = if id.starts_with('[') {
            let end = id.find("]_")?;
            (&id[1..end], &id[end + 2..])
        } else {
            ("", id)
        };
        let (stem, ext) = rest.split_once(BLOB_TAG)?;
        let (hash, size) = stem.split_once('_')?;
        if hash.len() != 16 {
            return None;
        }
        Some(Self {
            prefix,
            crc: u64::from_str_radix(hash, 16).ok()?,
            size: size.parse().ok()?,
            ext,
        })
    }

    /// Check `data` against the size and CRC recorded in the ID.
    pub fn matches(&self, data: &[u8]) -> bool {
        self.size == data.len() as u64 && self.crc == crc64(data)
    }
}
