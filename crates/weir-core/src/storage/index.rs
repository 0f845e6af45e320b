//! Packed offset index: one 20-byte entry per batch in the segment log.
//!
//! Entry layout (little-endian): `i64 relative_offset | i64 file_position |
//! i32 batch_size`. Entries are strictly increasing by relative offset, and
//! `file_position` always points at a frame boundary past the segment header.

use crate::{Error, Result};
use bytes::{Buf, BufMut, BytesMut};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

pub const INDEX_ENTRY_BYTES: usize = 8 + 8 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub relative_offset: i64,
    pub file_position: i64,
    pub batch_size: i32,
}

impl IndexEntry {
    pub fn new(relative_offset: i64, file_position: i64, batch_size: i32) -> Self {
        Self {
            relative_offset,
            file_position,
            batch_size,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_i64_le(self.relative_offset);
        buf.put_i64_le(self.file_position);
        buf.put_i32_le(self.batch_size);
    }

    pub fn decode(mut data: &[u8]) -> Self {
        let relative_offset = data.get_i64_le();
        let file_position = data.get_i64_le();
        let batch_size = data.get_i32_le();
        Self {
            relative_offset,
            file_position,
            batch_size,
        }
    }
}

/// Read entries from an index file. A real entry always has a positive batch
/// size, so the load stops at the first zero-sized entry (the preallocated
/// tail of an active segment). A trailing partial entry (torn write) is
/// silently dropped; the recovery scan repairs the file either way.
pub fn load_entries(path: &Path) -> Result<Vec<IndexEntry>> {
    let mut file = File::open(path).map_err(|e| Error::io_at(path, e))?;
    let mut raw = Vec::new();
    file.read_to_end(&mut raw)
        .map_err(|e| Error::io_at(path, e))?;

    let count = raw.len() / INDEX_ENTRY_BYTES;
    let mut entries = Vec::with_capacity(count);
    for chunk in raw.chunks_exact(INDEX_ENTRY_BYTES) {
        let entry = IndexEntry::decode(chunk);
        if entry.batch_size <= 0 {
            break;
        }
        entries.push(entry);
    }
    Ok(entries)
}

/// Replace the index file's contents with the given entries.
pub fn rewrite(path: &Path, entries: &[IndexEntry]) -> Result<()> {
    let mut buf = BytesMut::with_capacity(entries.len() * INDEX_ENTRY_BYTES);
    for entry in entries {
        entry.encode(&mut buf);
    }
    let mut file = File::create(path).map_err(|e| Error::io_at(path, e))?;
    file.write_all(&buf).map_err(|e| Error::io_at(path, e))?;
    Ok(())
}

/// Index of the greatest entry with `relative_offset <= target`, or `None`
/// when the first entry is already past the target.
pub fn find_floor(entries: &[IndexEntry], target: i64) -> Option<usize> {
    entries
        .partition_point(|e| e.relative_offset <= target)
        .checked_sub(1)
}
