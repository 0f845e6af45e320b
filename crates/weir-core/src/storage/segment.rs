//! Append-only log segment: a `<base>.log` / `<base>.index` file pair.
//!
//! The log file opens with a fixed 24-byte header:
//!
//! ```text
//! i64 base_offset | i64 timestamp_ms | u32 magic (0xDEADBEEF) | u32 version (1)
//! ```
//!
//! followed by framed batches:
//!
//! ```text
//! u32 len | u32 crc32 | i64 base_offset | payload[len]
//! ```
//!
//! where the frame CRC covers the payload bytes and `len` is the payload
//! length. All integers are little-endian. Writes are positional so the file
//! can be preallocated to its full size up front without disturbing the
//! append point.

use crate::metrics::{StorageMetrics, Timer};
use crate::record::{Record, RecordBatch, MAX_BATCH_BYTES};
use crate::storage::index::{self, IndexEntry};
use crate::storage::manifest::ManifestStore;
use crate::storage::FlushPolicy;
use crate::{Error, Result};
use bytes::{Buf, BufMut, BytesMut};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const SEGMENT_MAGIC: u32 = 0xDEAD_BEEF;
pub const SEGMENT_VERSION: u32 = 1;
pub const SEGMENT_HEADER_BYTES: u64 = 8 + 8 + 4 + 4;
pub const FRAME_HEADER_BYTES: u64 = 4 + 4 + 8;

pub const LOG_SUFFIX: &str = "log";
pub const INDEX_SUFFIX: &str = "index";

/// One append-only segment of a partition. Internally synchronized; shared
/// between the partition's appender and any number of in-flight fetches via
/// `Arc<Segment>`.
#[derive(Debug)]
pub struct Segment {
    log_path: PathBuf,
    index_path: PathBuf,
    base_offset: i64,
    max_size_bytes: u64,
    flush_policy: FlushPolicy,
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    log_file: File,
    index_file: File,
    entries: Vec<IndexEntry>,
    /// Next byte to write in the log file.
    log_position: u64,
    /// Next byte to write in the index file.
    index_position: u64,
    /// Next offset to assign.
    end_offset: i64,
    closed: bool,
    manifest: ManifestStore,
}

impl Segment {
    /// Path of the segment log file for a given base offset.
    pub fn log_path_for(dir: &Path, base_offset: i64) -> PathBuf {
        dir.join(format!("{base_offset}.{LOG_SUFFIX}"))
    }

    /// Path of the segment index file for a given base offset.
    pub fn index_path_for(dir: &Path, base_offset: i64) -> PathBuf {
        dir.join(format!("{base_offset}.{INDEX_SUFFIX}"))
    }

    /// Create a fresh segment, writing the header and preallocating the log
    /// file to `max_size_bytes`. Preallocation and access hints are advisory.
    pub fn create(
        dir: &Path,
        base_offset: i64,
        max_size_bytes: u64,
        flush_policy: FlushPolicy,
    ) -> Result<Self> {
        let log_path = Self::log_path_for(dir, base_offset);
        let index_path = Self::index_path_for(dir, base_offset);

        let log_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&log_path)
            .map_err(|e| Error::io_at(&log_path, e))?;
        let index_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&index_path)
            .map_err(|e| Error::io_at(&index_path, e))?;

        let mut header = BytesMut::with_capacity(SEGMENT_HEADER_BYTES as usize);
        header.put_i64_le(base_offset);
        header.put_i64_le(chrono::Utc::now().timestamp_millis());
        header.put_u32_le(SEGMENT_MAGIC);
        header.put_u32_le(SEGMENT_VERSION);
        log_file
            .write_all_at(&header, 0)
            .map_err(|e| Error::io_at(&log_path, e))?;

        preallocate(&log_file, max_size_bytes);
        preallocate(&index_file, max_size_bytes / 1024);
        hint_sequential(&log_file);

        debug!(
            path = %log_path.display(),
            base_offset,
            max_size_bytes,
            "created segment"
        );

        Ok(Self {
            log_path,
            index_path,
            base_offset,
            max_size_bytes,
            flush_policy,
            inner: Mutex::new(Inner {
                log_file,
                index_file,
                entries: Vec::new(),
                log_position: SEGMENT_HEADER_BYTES,
                index_position: 0,
                end_offset: base_offset,
                closed: false,
                manifest: ManifestStore::new(dir),
            }),
        })
    }

    /// Reopen an existing segment. Validates the header and loads the
    /// persisted index, then runs `recover_tail`, which rebuilds the index
    /// from the log, truncates any torn tail, and rewrites the `.index` file
    /// if the persisted copy disagrees with the scan.
    pub fn open(
        dir: &Path,
        base_offset: i64,
        max_size_bytes: u64,
        flush_policy: FlushPolicy,
    ) -> Result<Self> {
        let log_path = Self::log_path_for(dir, base_offset);
        let index_path = Self::index_path_for(dir, base_offset);

        let log_file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&log_path)
            .map_err(|e| Error::io_at(&log_path, e))?;
        let index_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&index_path)
            .map_err(|e| Error::io_at(&index_path, e))?;

        let mut header = [0u8; SEGMENT_HEADER_BYTES as usize];
        log_file
            .read_exact_at(&mut header, 0)
            .map_err(|_| Error::CorruptedData(format!("{}: short header", log_path.display())))?;
        let mut cursor: &[u8] = &header;
        let header_base = cursor.get_i64_le();
        let _timestamp_ms = cursor.get_i64_le();
        let magic = cursor.get_u32_le();
        let version = cursor.get_u32_le();
        if magic != SEGMENT_MAGIC || version != SEGMENT_VERSION {
            return Err(Error::CorruptedData(format!(
                "{}: bad magic {magic:#x} or version {version}",
                log_path.display()
            )));
        }
        if header_base != base_offset {
            return Err(Error::CorruptedData(format!(
                "{}: header base offset {header_base} does not match file name",
                log_path.display()
            )));
        }

        // An unreadable index is not fatal; recovery rebuilds it from the log.
        let persisted_entries = index::load_entries(&index_path).unwrap_or_else(|e| {
            warn!(
                path = %index_path.display(),
                error = %e,
                "discarding unreadable index"
            );
            Vec::new()
        });

        let segment = Self {
            log_path,
            index_path,
            base_offset,
            max_size_bytes,
            flush_policy,
            inner: Mutex::new(Inner {
                log_file,
                index_file,
                entries: persisted_entries,
                log_position: SEGMENT_HEADER_BYTES,
                index_position: 0,
                end_offset: base_offset,
                closed: false,
                manifest: ManifestStore::new(dir),
            }),
        };
        segment.recover_tail()?;
        Ok(segment)
    }

    pub fn base_offset(&self) -> i64 {
        self.base_offset
    }

    /// Next offset this segment would assign.
    pub fn end_offset(&self) -> i64 {
        self.inner.lock().end_offset
    }

    /// Bytes written to the log file, header included.
    pub fn size(&self) -> u64 {
        self.inner.lock().log_position
    }

    pub fn is_full(&self) -> bool {
        self.inner.lock().log_position >= self.max_size_bytes
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn flush_policy(&self) -> FlushPolicy {
        self.flush_policy
    }

    /// Append records as one batch. Returns the offset assigned to the first
    /// record. Fails with `SegmentClosed` on a closed segment and
    /// `SegmentFull` when the framed batch would overflow `max_size_bytes`;
    /// the owning partition rolls and retries on the latter.
    pub fn append(&self, records: &[Record]) -> Result<i64> {
        let timer = Timer::new();
        let mut inner = self.inner.lock();

        if inner.closed {
            return Err(Error::SegmentClosed);
        }
        if records.is_empty() {
            return Ok(inner.end_offset);
        }

        let batch = RecordBatch::new(
            inner.end_offset,
            records.to_vec(),
            chrono::Utc::now().timestamp_millis(),
        );
        let payload = batch.serialize();
        if payload.len() > MAX_BATCH_BYTES {
            return Err(Error::InvalidArgument(format!(
                "batch of {} bytes exceeds the {MAX_BATCH_BYTES}-byte limit",
                payload.len()
            )));
        }

        let frame_size = FRAME_HEADER_BYTES + payload.len() as u64;
        if inner.log_position + frame_size > self.max_size_bytes {
            return Err(Error::SegmentFull {
                needed: frame_size,
                available: self.max_size_bytes.saturating_sub(inner.log_position),
            });
        }

        let mut frame = BytesMut::with_capacity(frame_size as usize);
        frame.put_u32_le(payload.len() as u32);
        frame.put_u32_le(frame_crc(&payload));
        frame.put_i64_le(batch.base_offset);
        frame.put_slice(&payload);

        let frame_position = inner.log_position;
        inner
            .log_file
            .write_all_at(&frame, frame_position)
            .map_err(|e| Error::io_at(&self.log_path, e))?;

        let entry = IndexEntry::new(
            inner.end_offset - self.base_offset,
            frame_position as i64,
            frame_size as i32,
        );
        let mut encoded = BytesMut::with_capacity(index::INDEX_ENTRY_BYTES);
        entry.encode(&mut encoded);
        let index_position = inner.index_position;
        inner
            .index_file
            .write_all_at(&encoded, index_position)
            .map_err(|e| Error::io_at(&self.index_path, e))?;

        inner.entries.push(entry);
        inner.log_position += frame_size;
        inner.index_position += index::INDEX_ENTRY_BYTES as u64;

        let assigned = inner.end_offset;
        inner.end_offset += records.len() as i64;

        if self.flush_policy == FlushPolicy::EachBatch {
            inner
                .log_file
                .sync_data()
                .map_err(|e| Error::io_at(&self.log_path, e))?;
            inner
                .index_file
                .sync_data()
                .map_err(|e| Error::io_at(&self.index_path, e))?;
        }

        let end_offset = inner.end_offset;
        if let Err(e) = inner.manifest.update_offsets(end_offset, end_offset) {
            warn!(path = %self.log_path.display(), error = %e, "manifest update failed");
        }

        StorageMetrics::record_append(records.len() as u64, frame_size, timer.elapsed_ms());
        Ok(assigned)
    }

    /// Read batches starting at the batch containing `from_offset`,
    /// accumulating whole frames until `max_bytes` would be exceeded.
    ///
    /// The first returned batch may contain records below `from_offset`;
    /// callers filter by offset. A frame with a CRC mismatch stops the scan
    /// and the batches read so far are returned.
    pub fn read(&self, from_offset: i64, max_bytes: usize) -> Result<Vec<RecordBatch>> {
        let timer = Timer::new();
        let inner = self.inner.lock();

        if from_offset < self.base_offset || from_offset >= inner.end_offset {
            return Ok(Vec::new());
        }

        let relative = from_offset - self.base_offset;
        let Some(start_idx) = index::find_floor(&inner.entries, relative) else {
            return Ok(Vec::new());
        };

        let mut batches = Vec::new();
        let mut bytes_read = 0usize;

        for entry in &inner.entries[start_idx..] {
            if bytes_read + entry.batch_size as usize > max_bytes {
                break;
            }

            let mut frame = vec![0u8; entry.batch_size as usize];
            inner
                .log_file
                .read_exact_at(&mut frame, entry.file_position as u64)
                .map_err(|e| Error::io_at(&self.log_path, e))?;

            let mut cursor: &[u8] = &frame;
            let len = cursor.get_u32_le() as usize;
            let stored_crc = cursor.get_u32_le();
            let _frame_base = cursor.get_i64_le();
            if cursor.len() != len {
                warn!(
                    path = %self.log_path.display(),
                    position = entry.file_position,
                    "frame length disagrees with index entry, stopping read"
                );
                break;
            }
            if frame_crc(cursor) != stored_crc {
                warn!(
                    path = %self.log_path.display(),
                    position = entry.file_position,
                    "frame CRC mismatch, stopping read"
                );
                break;
            }

            match RecordBatch::deserialize(cursor) {
                Ok(batch) => {
                    bytes_read += entry.batch_size as usize;
                    batches.push(batch);
                }
                Err(e) => {
                    warn!(
                        path = %self.log_path.display(),
                        position = entry.file_position,
                        error = %e,
                        "batch deserialization failed, stopping read"
                    );
                    break;
                }
            }
        }

        StorageMetrics::record_read(batches.len() as u64, bytes_read as u64, timer.elapsed_ms());
        Ok(batches)
    }

    /// fsync both files.
    pub fn flush(&self) -> Result<()> {
        let inner = self.inner.lock();
        inner
            .log_file
            .sync_data()
            .map_err(|e| Error::io_at(&self.log_path, e))?;
        inner
            .index_file
            .sync_data()
            .map_err(|e| Error::io_at(&self.index_path, e))?;
        Ok(())
    }

    /// Walk the log from just past the header, accept frames until the first
    /// short read, bad length, overrun, or CRC mismatch, and truncate there.
    /// The in-memory index is rebuilt from the accepted frames; the `.index`
    /// file is rewritten whenever the persisted copy disagrees with the scan,
    /// so a stale or corrupt index never survives a reopen.
    pub fn recover_tail(&self) -> Result<()> {
        let mut inner = self.inner.lock();

        let file_size = inner
            .log_file
            .metadata()
            .map_err(|e| Error::io_at(&self.log_path, e))?
            .len();

        let mut entries = Vec::new();
        let mut record_total: i64 = 0;
        let mut position = SEGMENT_HEADER_BYTES;

        while position + FRAME_HEADER_BYTES <= file_size {
            let mut header = [0u8; FRAME_HEADER_BYTES as usize];
            if inner.log_file.read_exact_at(&mut header, position).is_err() {
                break;
            }
            let mut cursor: &[u8] = &header;
            let len = cursor.get_u32_le() as u64;
            let stored_crc = cursor.get_u32_le();
            let frame_base = cursor.get_i64_le();

            if len == 0 || len > MAX_BATCH_BYTES as u64 {
                break;
            }
            if position + FRAME_HEADER_BYTES + len > file_size {
                break;
            }

            let mut payload = vec![0u8; len as usize];
            if inner
                .log_file
                .read_exact_at(&mut payload, position + FRAME_HEADER_BYTES)
                .is_err()
            {
                break;
            }
            if frame_crc(&payload) != stored_crc {
                break;
            }
            let Ok(batch) = RecordBatch::deserialize(&payload) else {
                break;
            };

            entries.push(IndexEntry::new(
                frame_base - self.base_offset,
                position as i64,
                (FRAME_HEADER_BYTES + len) as i32,
            ));
            record_total += batch.record_count() as i64;
            position += FRAME_HEADER_BYTES + len;
        }

        if position < file_size {
            inner
                .log_file
                .set_len(position)
                .map_err(|e| Error::io_at(&self.log_path, e))?;
            debug!(
                path = %self.log_path.display(),
                truncated_at = position,
                dropped = file_size - position,
                "truncated torn segment tail"
            );
            StorageMetrics::record_recovery_truncation(file_size - position);
        }

        if entries != inner.entries {
            debug!(
                path = %self.index_path.display(),
                persisted = inner.entries.len(),
                rebuilt = entries.len(),
                "persisted index disagrees with log scan, rewriting"
            );
            index::rewrite(&self.index_path, &entries)?;
        }
        inner.index_position = (entries.len() * index::INDEX_ENTRY_BYTES) as u64;
        inner.entries = entries;
        inner.log_position = position;
        inner.end_offset = self.base_offset + record_total;

        Ok(())
    }

    /// Close the segment. Further appends fail with `SegmentClosed`. Flushes
    /// unless the policy is `Never`, and checkpoints the manifest durably.
    pub fn close(&self) -> Result<()> {
        {
            let inner = self.inner.lock();
            if inner.closed {
                return Ok(());
            }
        }

        if self.flush_policy != FlushPolicy::Never {
            self.flush()?;
        }

        let mut inner = self.inner.lock();
        inner.closed = true;
        let end_offset = inner.end_offset;
        if let Err(e) = inner.manifest.update_offsets(end_offset, end_offset) {
            warn!(path = %self.log_path.display(), error = %e, "manifest update on close failed");
        }
        Ok(())
    }

    /// Remove the segment's files from disk. The segment must not be used
    /// afterwards.
    pub fn delete_files(&self) -> Result<()> {
        for path in [&self.log_path, &self.index_path] {
            if path.exists() {
                std::fs::remove_file(path).map_err(|e| Error::io_at(path, e))?;
            }
        }
        Ok(())
    }
}

fn frame_crc(payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(payload);
    hasher.finalize()
}

/// Best-effort file preallocation. `fallocate` on Linux, no-op elsewhere;
/// failure is logged and ignored.
fn preallocate(file: &File, len: u64) {
    if len == 0 {
        return;
    }
    #[cfg(target_os = "linux")]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: the fd is valid for the lifetime of `file` and fallocate
        // only extends the allocation, never the visible contents.
        let rc = unsafe { libc::fallocate(file.as_raw_fd(), 0, 0, len as i64) };
        if rc != 0 {
            warn!(
                error = %std::io::Error::last_os_error(),
                "fallocate failed, continuing without preallocation"
            );
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = (file, len);
    }
}

/// Advise the kernel that the log is written sequentially. Advisory only.
fn hint_sequential(file: &File) {
    #[cfg(target_os = "linux")]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: fadvise reads no memory and the fd is valid.
        let rc = unsafe { libc::posix_fadvise(file.as_raw_fd(), 0, 0, libc::POSIX_FADV_SEQUENTIAL) };
        if rc != 0 {
            warn!(rc, "posix_fadvise(SEQUENTIAL) failed");
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = file;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::tempdir;

    fn record(n: usize) -> Record {
        Record::new(
            Bytes::from(format!("k{n}")),
            Bytes::from(format!("value-{n}")),
            1_700_000_000_000 + n as i64,
        )
    }

    #[test]
    fn append_assigns_sequential_offsets() {
        let dir = tempdir().unwrap();
        let segment = Segment::create(dir.path(), 0, 1 << 20, FlushPolicy::Never).unwrap();

        assert_eq!(segment.append(&[record(0), record(1)]).unwrap(), 0);
        assert_eq!(segment.append(&[record(2)]).unwrap(), 2);
        assert_eq!(segment.end_offset(), 3);
        assert!(!segment.is_full());
    }

    #[test]
    fn read_returns_batches_from_offset() {
        let dir = tempdir().unwrap();
        let segment = Segment::create(dir.path(), 0, 1 << 20, FlushPolicy::Never).unwrap();
        segment.append(&[record(0), record(1)]).unwrap();
        segment.append(&[record(2), record(3)]).unwrap();

        let batches = segment.read(0, 1 << 20).unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].base_offset, 0);
        assert_eq!(batches[1].base_offset, 2);

        // Offset 3 lands inside the second batch.
        let batches = segment.read(3, 1 << 20).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].base_offset, 2);

        // Past the end: empty.
        assert!(segment.read(4, 1 << 20).unwrap().is_empty());
    }

    #[test]
    fn read_respects_max_bytes() {
        let dir = tempdir().unwrap();
        let segment = Segment::create(dir.path(), 0, 1 << 20, FlushPolicy::Never).unwrap();
        segment.append(&[record(0)]).unwrap();
        segment.append(&[record(1)]).unwrap();

        // Smaller than the first frame: zero batches.
        assert!(segment.read(0, 8).unwrap().is_empty());

        // Exactly one frame's worth.
        let one_frame = segment.read(0, 1 << 20).unwrap()[0].serialized_size()
            + FRAME_HEADER_BYTES as usize;
        let batches = segment.read(0, one_frame).unwrap();
        assert_eq!(batches.len(), 1);
    }

    #[test]
    fn append_to_closed_segment_fails() {
        let dir = tempdir().unwrap();
        let segment = Segment::create(dir.path(), 0, 1 << 20, FlushPolicy::OnRoll).unwrap();
        segment.append(&[record(0)]).unwrap();
        segment.close().unwrap();
        assert!(matches!(
            segment.append(&[record(1)]),
            Err(Error::SegmentClosed)
        ));
        assert!(segment.is_closed());
    }

    #[test]
    fn full_segment_rejects_append() {
        let dir = tempdir().unwrap();
        // Big enough for the header and one small frame only.
        let segment = Segment::create(dir.path(), 0, 128, FlushPolicy::Never).unwrap();
        segment.append(&[record(0)]).unwrap();
        assert!(matches!(
            segment.append(&[record(1)]),
            Err(Error::SegmentFull { .. })
        ));
    }

    #[test]
    fn reopen_recovers_state() {
        let dir = tempdir().unwrap();
        {
            let segment = Segment::create(dir.path(), 0, 1 << 20, FlushPolicy::EachBatch).unwrap();
            segment.append(&[record(0), record(1)]).unwrap();
            segment.append(&[record(2)]).unwrap();
        }

        let segment = Segment::open(dir.path(), 0, 1 << 20, FlushPolicy::OnRoll).unwrap();
        assert_eq!(segment.end_offset(), 3);
        let batches = segment.read(0, 1 << 20).unwrap();
        assert_eq!(batches.len(), 2);

        // The segment stays appendable after recovery.
        assert_eq!(segment.append(&[record(3)]).unwrap(), 3);
    }

    #[test]
    fn recovery_truncates_torn_tail() {
        use std::io::{Seek, SeekFrom, Write};

        let dir = tempdir().unwrap();
        let clean_size;
        {
            let segment = Segment::create(dir.path(), 0, 1 << 20, FlushPolicy::EachBatch).unwrap();
            for i in 0..5 {
                segment.append(&[record(i)]).unwrap();
            }
            clean_size = segment.size();
        }

        // Simulate a crash 20 bytes into a torn frame write.
        let log_path = Segment::log_path_for(dir.path(), 0);
        {
            let mut file = OpenOptions::new().write(true).open(&log_path).unwrap();
            file.set_len(clean_size).unwrap();
            file.seek(SeekFrom::End(0)).unwrap();
            file.write_all(&[0xAB; 20]).unwrap();
        }

        let segment = Segment::open(dir.path(), 0, 1 << 20, FlushPolicy::OnRoll).unwrap();
        assert_eq!(segment.end_offset(), 5);
        assert_eq!(segment.size(), clean_size);
        assert_eq!(
            std::fs::metadata(&log_path).unwrap().len(),
            clean_size,
            "file truncated at the last valid frame"
        );
        assert_eq!(segment.read(0, 1 << 20).unwrap().len(), 5);

        // Appends continue where the valid data ends.
        assert_eq!(segment.append(&[record(5)]).unwrap(), 5);
    }

    #[test]
    fn recovery_truncates_corrupted_middle_byte() {
        let dir = tempdir().unwrap();
        let first_batch_end;
        {
            let segment = Segment::create(dir.path(), 0, 1 << 20, FlushPolicy::EachBatch).unwrap();
            segment.append(&[record(0)]).unwrap();
            first_batch_end = segment.size();
            segment.append(&[record(1)]).unwrap();
        }

        // Corrupt one payload byte of the second frame.
        let log_path = Segment::log_path_for(dir.path(), 0);
        {
            let mut data = std::fs::read(&log_path).unwrap();
            let target = first_batch_end as usize + FRAME_HEADER_BYTES as usize + 4;
            data[target] ^= 0xFF;
            std::fs::write(&log_path, &data).unwrap();
        }

        let segment = Segment::open(dir.path(), 0, 1 << 20, FlushPolicy::OnRoll).unwrap();
        assert_eq!(segment.end_offset(), 1);
        assert_eq!(segment.size(), first_batch_end);
        let batches = segment.read(0, 1 << 20).unwrap();
        assert_eq!(batches.len(), 1);
        assert!(batches[0].verify_crc32());
    }

    #[test]
    fn recovery_discards_corrupt_index() {
        let dir = tempdir().unwrap();
        {
            let segment = Segment::create(dir.path(), 0, 1 << 20, FlushPolicy::EachBatch).unwrap();
            segment.append(&[record(0), record(1)]).unwrap();
        }

        // Trash the index file entirely.
        std::fs::write(Segment::index_path_for(dir.path(), 0), b"garbage").unwrap();

        let segment = Segment::open(dir.path(), 0, 1 << 20, FlushPolicy::OnRoll).unwrap();
        assert_eq!(segment.end_offset(), 2);
        assert_eq!(segment.read(0, 1 << 20).unwrap().len(), 1);
    }

    #[test]
    fn reopen_repairs_missing_index() {
        let dir = tempdir().unwrap();
        {
            let segment = Segment::create(dir.path(), 0, 1 << 20, FlushPolicy::EachBatch).unwrap();
            segment.append(&[record(0)]).unwrap();
            segment.append(&[record(1), record(2)]).unwrap();
        }

        let index_path = Segment::index_path_for(dir.path(), 0);
        std::fs::remove_file(&index_path).unwrap();

        let segment = Segment::open(dir.path(), 0, 1 << 20, FlushPolicy::OnRoll).unwrap();
        assert_eq!(segment.end_offset(), 3);
        assert_eq!(segment.read(0, 1 << 20).unwrap().len(), 2);

        // The scan rewrote the index file; a fresh load sees both frames.
        let entries = index::load_entries(&index_path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].relative_offset, 0);
        assert_eq!(entries[1].relative_offset, 1);
    }

    #[test]
    fn open_rejects_bad_magic() {
        let dir = tempdir().unwrap();
        {
            Segment::create(dir.path(), 0, 1 << 20, FlushPolicy::Never).unwrap();
        }
        let log_path = Segment::log_path_for(dir.path(), 0);
        let mut data = std::fs::read(&log_path).unwrap();
        data[16] = 0; // first magic byte
        std::fs::write(&log_path, &data).unwrap();

        assert!(matches!(
            Segment::open(dir.path(), 0, 1 << 20, FlushPolicy::OnRoll),
            Err(Error::CorruptedData(_))
        ));
    }
}
