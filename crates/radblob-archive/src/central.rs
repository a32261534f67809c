//! Central-directory index and offset-based entry reads.
//!
//! The index is built from the raw central directory rather than through the
//! ZIP codec's name map, so the first record for a name is the one that stays
//! reachable. Entries are then read straight from their local header offset,
//! which also works while a writer is still appending to the same storage.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Seek, SeekFrom};

use radblob_store::{BlobError, BlobResult};
use tracing::{debug, warn};
use zip::read::read_zipfile_from_stream;

use crate::storage::codec_error;

const EOCD_SIG: u32 = 0x0605_4b50;
const EOCD_LEN: usize = 22;
const MAX_COMMENT_LEN: usize = u16::MAX as usize;
const ZIP64_LOCATOR_SIG: u32 = 0x0706_4b50;
const ZIP64_LOCATOR_LEN: usize = 20;
const ZIP64_EOCD_SIG: u32 = 0x0606_4b50;
const ZIP64_EOCD_LEN: usize = 56;
const CENTRAL_SIG: u32 = 0x0201_4b50;
const CENTRAL_LEN: usize = 46;
const LOCAL_SIG: u32 = 0x0403_4b50;
const LOCAL_LEN: usize = 30;
const ZIP64_EXTRA_ID: u16 = 0x0001;
const DATA_DESCRIPTOR_FLAG: u16 = 1 << 3;
const U16_SENTINEL: u16 = u16::MAX;
const U32_SENTINEL: u32 = u32::MAX;
/// Upper bound on the buffer reserved up front for one entry.
const MAX_PREALLOC: u64 = 16 * 1024 * 1024;

/// Location and checksums of one entry, taken from its central record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CentralEntry {
    /// Offset of the local header from the start of the storage.
    pub header_offset: u64,
    pub compressed_size: u64,
    pub size: u64,
    pub crc32: u32,
}

/// Name index over an archive's central directory.
#[derive(Debug, Default)]
pub struct CentralIndex {
    pub entries: BTreeMap<String, CentralEntry>,
    /// Records that shared a name with an earlier one and were skipped.
    pub duplicates: usize,
}

fn invalid(message: impl Into<String>) -> BlobError {
    BlobError::Codec {
        code: "invalid_archive",
        message: message.into(),
    }
}

fn le_u16(buf: &[u8], at: usize) -> u16 {
    let mut bytes = [0u8; 2];
    bytes.copy_from_slice(&buf[at..at + 2]);
    u16::from_le_bytes(bytes)
}

fn le_u32(buf: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(bytes)
}

fn le_u64(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}

fn read_at<R: Read + Seek>(reader: &mut R, offset: u64, len: usize) -> BlobResult<Vec<u8>> {
    reader.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Where the central directory sits and how many records it declares.
#[derive(Debug, PartialEq, Eq)]
struct DirectoryLocation {
    /// Bytes in front of the archive proper, added to every stored offset.
    archive_offset: u64,
    start: u64,
    size: u64,
    records: u64,
}

fn locate_directory<R: Read + Seek>(reader: &mut R) -> BlobResult<DirectoryLocation> {
    let len = reader.seek(SeekFrom::End(0))?;
    if len < EOCD_LEN as u64 {
        return Err(invalid("too short to hold an end of central directory record"));
    }

    let tail_len = len.min((EOCD_LEN + MAX_COMMENT_LEN) as u64);
    let tail_start = len - tail_len;
    let tail = read_at(reader, tail_start, tail_len as usize)?;

    // The last signature whose comment length fits the remaining bytes.
    let eocd_at = (0..=tail.len() - EOCD_LEN)
        .rev()
        .find(|&at| {
            le_u32(&tail, at) == EOCD_SIG
                && at + EOCD_LEN + le_u16(&tail, at + 20) as usize <= tail.len()
        })
        .ok_or_else(|| invalid("no end of central directory record"))?;
    let eocd = &tail[eocd_at..eocd_at + EOCD_LEN];
    let eocd_pos = tail_start + eocd_at as u64;

    let mut records = u64::from(le_u16(eocd, 10));
    let mut size = u64::from(le_u32(eocd, 12));
    let mut offset = u64::from(le_u32(eocd, 16));
    let mut directory_end = eocd_pos;

    let zip64 = records == u64::from(U16_SENTINEL)
        || size == u64::from(U32_SENTINEL)
        || offset == u64::from(U32_SENTINEL);
    if zip64 && eocd_pos >= ZIP64_LOCATOR_LEN as u64 {
        let locator_pos = eocd_pos - ZIP64_LOCATOR_LEN as u64;
        let locator = read_at(reader, locator_pos, ZIP64_LOCATOR_LEN)?;
        if le_u32(&locator, 0) == ZIP64_LOCATOR_SIG {
            let record_pos = find_zip64_record(reader, le_u64(&locator, 8), locator_pos)?;
            let record = read_at(reader, record_pos, ZIP64_EOCD_LEN)?;
            records = le_u64(&record, 32);
            size = le_u64(&record, 40);
            offset = le_u64(&record, 48);
            directory_end = record_pos;
        }
    }

    let archive_offset = directory_end
        .checked_sub(size)
        .and_then(|start| start.checked_sub(offset))
        .ok_or_else(|| invalid("central directory extends past the start of the archive"))?;

    Ok(DirectoryLocation {
        archive_offset,
        start: archive_offset + offset,
        size,
        records,
    })
}

/// The zip64 end record normally sits at its stated offset; with bytes in
/// front of the archive it sits right before the locator instead.
fn find_zip64_record<R: Read + Seek>(
    reader: &mut R,
    stated: u64,
    locator_pos: u64,
) -> BlobResult<u64> {
    let fallback = locator_pos.checked_sub(ZIP64_EOCD_LEN as u64);
    for candidate in [Some(stated), fallback].into_iter().flatten() {
        if candidate + ZIP64_EOCD_LEN as u64 > locator_pos {
            continue;
        }
        if le_u32(&read_at(reader, candidate, 4)?, 0) == ZIP64_EOCD_SIG {
            return Ok(candidate);
        }
    }
    Err(invalid("zip64 end of central directory record not found"))
}

/// Apply a zip64 extended-information field to whichever values carried the
/// 32-bit sentinel.
fn apply_zip64_extra(
    extra: &[u8],
    size: &mut u64,
    compressed_size: &mut u64,
    header_offset: &mut u64,
) -> BlobResult<()> {
    let mut at = 0;
    while at + 4 <= extra.len() {
        let id = le_u16(extra, at);
        let len = le_u16(extra, at + 2) as usize;
        let body_end = at + 4 + len;
        if body_end > extra.len() {
            return Err(invalid("extra field runs past its record"));
        }
        if id == ZIP64_EXTRA_ID {
            let mut field = at + 4;
            for value in [size, compressed_size, header_offset] {
                if *value != u64::from(U32_SENTINEL) {
                    continue;
                }
                if field + 8 > body_end {
                    return Err(invalid("zip64 extra field is truncated"));
                }
                *value = le_u64(extra, field);
                field += 8;
            }
            return Ok(());
        }
        at = body_end;
    }
    Ok(())
}

/// Index every central-directory record by name. The first record for a
/// name wins; later ones are counted and logged but stay unreachable.
pub fn read_index<R: Read + Seek>(reader: &mut R, label: &str) -> BlobResult<CentralIndex> {
    let location = locate_directory(reader)?;
    let len = reader.seek(SeekFrom::End(0))?;
    if location.start.saturating_add(location.size) > len {
        return Err(invalid("central directory runs past the end of the archive"));
    }
    let size = usize::try_from(location.size)
        .map_err(|_| invalid("central directory is too large to index"))?;
    let directory = read_at(reader, location.start, size)?;

    let mut index = CentralIndex::default();
    let mut at = 0;
    for record in 0..location.records {
        if at + CENTRAL_LEN > directory.len() || le_u32(&directory, at) != CENTRAL_SIG {
            return Err(invalid(format!("central directory record {record} is malformed")));
        }
        let name_len = le_u16(&directory, at + 28) as usize;
        let extra_len = le_u16(&directory, at + 30) as usize;
        let comment_len = le_u16(&directory, at + 32) as usize;
        let name_start = at + CENTRAL_LEN;
        let extra_start = name_start + name_len;
        let next = extra_start + extra_len + comment_len;
        if next > directory.len() {
            return Err(invalid(format!("central directory record {record} is truncated")));
        }

        let mut compressed_size = u64::from(le_u32(&directory, at + 20));
        let mut size = u64::from(le_u32(&directory, at + 24));
        let mut header_offset = u64::from(le_u32(&directory, at + 42));
        apply_zip64_extra(
            &directory[extra_start..extra_start + extra_len],
            &mut size,
            &mut compressed_size,
            &mut header_offset,
        )?;

        let name = String::from_utf8_lossy(&directory[name_start..extra_start]).into_owned();
        let entry = CentralEntry {
            header_offset: location.archive_offset + header_offset,
            compressed_size,
            size,
            crc32: le_u32(&directory, at + 16),
        };
        match index.entries.entry(name) {
            Entry::Vacant(slot) => {
                slot.insert(entry);
            }
            Entry::Occupied(slot) => {
                index.duplicates += 1;
                warn!(
                    id = slot.key().as_str(),
                    archive = label,
                    record,
                    "duplicate entry in blob archive, keeping the first"
                );
            }
        }
        at = next;
    }

    debug!(
        archive = label,
        records = location.records,
        prefix = location.archive_offset,
        "indexed central directory"
    );
    Ok(index)
}

/// Decompress the entry at `entry.header_offset` into a fresh buffer. The
/// reader's position is restored afterwards so a writer sharing it carries
/// on where it left off.
pub fn read_entry<R: Read + Seek>(
    reader: &mut R,
    id: &str,
    entry: &CentralEntry,
) -> BlobResult<Vec<u8>> {
    let resume = reader.stream_position()?;
    let result = read_entry_at(reader, id, entry);
    reader.seek(SeekFrom::Start(resume))?;
    result
}

fn read_entry_at<R: Read + Seek>(
    reader: &mut R,
    id: &str,
    entry: &CentralEntry,
) -> BlobResult<Vec<u8>> {
    let mut header = read_at(reader, entry.header_offset, LOCAL_LEN)?;
    if le_u32(&header, 0) != LOCAL_SIG {
        return Err(invalid(format!(
            "no local header for {id:?} at offset {}",
            entry.header_offset
        )));
    }
    let variable = le_u16(&header, 26) as usize + le_u16(&header, 28) as usize;
    header.resize(LOCAL_LEN + variable, 0);
    reader.read_exact(&mut header[LOCAL_LEN..])?;

    // Sizes and checksum come from the central record, which is complete even
    // when the local header defers them to a trailing data descriptor. Zip64
    // headers keep their sentinels so the extra field still lines up.
    let flags = le_u16(&header, 6) & !DATA_DESCRIPTOR_FLAG;
    header[6..8].copy_from_slice(&flags.to_le_bytes());
    header[14..18].copy_from_slice(&entry.crc32.to_le_bytes());
    let local_zip64 =
        le_u32(&header, 18) == U32_SENTINEL || le_u32(&header, 22) == U32_SENTINEL;
    if let (false, Ok(compressed), Ok(size)) = (
        local_zip64,
        u32::try_from(entry.compressed_size),
        u32::try_from(entry.size),
    ) {
        header[18..22].copy_from_slice(&compressed.to_le_bytes());
        header[22..26].copy_from_slice(&size.to_le_bytes());
    }

    let mut stream = Cursor::new(header).chain(reader.by_ref().take(entry.compressed_size));
    let mut file = read_zipfile_from_stream(&mut stream)
        .map_err(codec_error)?
        .ok_or_else(|| invalid(format!("no entry for {id:?} at offset {}", entry.header_offset)))?;
    if file.name() != id {
        return Err(invalid(format!(
            "entry at offset {} is {:?}, expected {id:?}",
            entry.header_offset,
            file.name()
        )));
    }

    let mut data = Vec::with_capacity(entry.size.min(MAX_PREALLOC) as usize);
    file.read_to_end(&mut data)?;
    if data.len() as u64 != entry.size {
        return Err(BlobError::TruncatedRead {
            id: id.to_string(),
            expected: entry.size,
            actual: data.len() as u64,
        });
    }
    Ok(data)
}
