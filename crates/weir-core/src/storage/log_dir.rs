//! The partition set: every `(topic, partition)` log under one root
//! directory, laid out as `<root>/<topic>/<partition>/`.
//!
//! A single mutex guards the topic → partition → segments map; callers get
//! snapshots of `Arc<Segment>` handles and the segments synchronize
//! themselves, so different partitions append in parallel.

use crate::metrics::StorageMetrics;
use crate::storage::manifest::ManifestStore;
use crate::storage::segment::{Segment, LOG_SUFFIX};
use crate::storage::FlushPolicy;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct LogDir {
    root: PathBuf,
    max_segment_size: u64,
    flush_policy: FlushPolicy,
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    segments: HashMap<String, HashMap<i32, Vec<Arc<Segment>>>>,
    high_water_marks: HashMap<String, HashMap<i32, i64>>,
}

impl LogDir {
    /// Open the log directory, discovering existing partitions and running
    /// tail recovery on every segment found.
    pub fn open(
        root: impl Into<PathBuf>,
        max_segment_size: u64,
        flush_policy: FlushPolicy,
    ) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| Error::io_at(&root, e))?;

        let log_dir = Self {
            root,
            max_segment_size,
            flush_policy,
            inner: Mutex::new(Inner::default()),
        };
        log_dir.discover()?;
        Ok(log_dir)
    }

    fn discover(&self) -> Result<()> {
        let mut inner = self.inner.lock();

        for topic_entry in fs::read_dir(&self.root).map_err(|e| Error::io_at(&self.root, e))? {
            let topic_entry = topic_entry.map_err(|e| Error::io_at(&self.root, e))?;
            if !topic_entry.path().is_dir() {
                continue;
            }
            let Some(topic) = topic_entry.file_name().to_str().map(str::to_string) else {
                continue;
            };

            let topic_path = topic_entry.path();
            for partition_entry in
                fs::read_dir(&topic_path).map_err(|e| Error::io_at(&topic_path, e))?
            {
                let partition_entry = partition_entry.map_err(|e| Error::io_at(&topic_path, e))?;
                if !partition_entry.path().is_dir() {
                    continue;
                }
                let Some(partition) = partition_entry
                    .file_name()
                    .to_str()
                    .and_then(|s| s.parse::<i32>().ok())
                else {
                    continue;
                };

                let partition_path = partition_entry.path();
                let segments = load_partition_segments(
                    &partition_path,
                    self.max_segment_size,
                    self.flush_policy,
                )?;
                if segments.is_empty() {
                    continue;
                }

                let hwm = ManifestStore::new(&partition_path)
                    .load_high_water_mark()
                    .unwrap_or(0);

                info!(
                    topic = %topic,
                    partition,
                    segments = segments.len(),
                    high_watermark = hwm,
                    "recovered partition"
                );

                inner
                    .high_water_marks
                    .entry(topic.clone())
                    .or_default()
                    .insert(partition, hwm);
                inner
                    .segments
                    .entry(topic.clone())
                    .or_default()
                    .insert(partition, segments);
            }
        }
        Ok(())
    }

    fn partition_path(&self, topic: &str, partition: i32) -> PathBuf {
        self.root.join(topic).join(partition.to_string())
    }

    /// The active segment for appends: the last segment if it is neither full
    /// nor closed, otherwise a freshly rolled one.
    pub fn get_or_create_segment(&self, topic: &str, partition: i32) -> Result<Arc<Segment>> {
        let mut inner = self.inner.lock();

        if let Some(active) = inner
            .segments
            .get(topic)
            .and_then(|parts| parts.get(&partition))
            .and_then(|segments| segments.last())
        {
            if !active.is_full() && !active.is_closed() {
                return Ok(active.clone());
            }
        }

        self.roll_locked(&mut inner, topic, partition)
    }

    /// Snapshot of every segment of a partition, sorted by base offset.
    pub fn get_segments(&self, topic: &str, partition: i32) -> Vec<Arc<Segment>> {
        self.inner
            .lock()
            .segments
            .get(topic)
            .and_then(|parts| parts.get(&partition))
            .cloned()
            .unwrap_or_default()
    }

    /// Close the current active segment and open a new one at the partition's
    /// end offset.
    pub fn roll_segment(&self, topic: &str, partition: i32) -> Result<Arc<Segment>> {
        let mut inner = self.inner.lock();
        self.roll_locked(&mut inner, topic, partition)
    }

    fn roll_locked(
        &self,
        inner: &mut Inner,
        topic: &str,
        partition: i32,
    ) -> Result<Arc<Segment>> {
        let segments = inner
            .segments
            .entry(topic.to_string())
            .or_default()
            .entry(partition)
            .or_default();

        let base_offset = match segments.last() {
            Some(previous) => {
                if let Err(e) = previous.close() {
                    warn!(topic, partition, error = %e, "closing rolled segment failed");
                }
                previous.end_offset()
            }
            None => 0,
        };

        let path = self.partition_path(topic, partition);
        fs::create_dir_all(&path).map_err(|e| Error::io_at(&path, e))?;
        let segment = Arc::new(Segment::create(
            &path,
            base_offset,
            self.max_segment_size,
            self.flush_policy,
        )?);

        debug!(topic, partition, base_offset, "rolled segment");
        StorageMetrics::record_segment_roll();
        segments.push(segment.clone());
        Ok(segment)
    }

    /// Next offset the partition would assign; 0 for an unknown partition.
    pub fn end_offset(&self, topic: &str, partition: i32) -> i64 {
        self.inner
            .lock()
            .segments
            .get(topic)
            .and_then(|parts| parts.get(&partition))
            .and_then(|segments| segments.last())
            .map(|s| s.end_offset())
            .unwrap_or(0)
    }

    pub fn high_watermark(&self, topic: &str, partition: i32) -> i64 {
        self.inner
            .lock()
            .high_water_marks
            .get(topic)
            .and_then(|parts| parts.get(&partition))
            .copied()
            .unwrap_or(0)
    }

    /// Advance the partition high watermark. Regressions are ignored so the
    /// watermark stays monotone.
    pub fn set_high_watermark(&self, topic: &str, partition: i32, offset: i64) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            let current = inner
                .high_water_marks
                .entry(topic.to_string())
                .or_default()
                .entry(partition)
                .or_insert(0);
            if offset <= *current {
                return Ok(());
            }
            *current = offset;
        }

        ManifestStore::new(self.partition_path(topic, partition)).save_high_water_mark(offset)
    }

    pub fn list_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.inner.lock().segments.keys().cloned().collect();
        topics.sort();
        topics
    }

    pub fn list_partitions(&self, topic: &str) -> Vec<i32> {
        let mut partitions: Vec<i32> = self
            .inner
            .lock()
            .segments
            .get(topic)
            .map(|parts| parts.keys().copied().collect())
            .unwrap_or_default();
        partitions.sort_unstable();
        partitions
    }

    /// Delete oldest segments until the retained bytes fit the budget. The
    /// active (last) segment always survives. Returns the number of segments
    /// removed.
    pub fn cleanup_old_segments(
        &self,
        topic: &str,
        partition: i32,
        retention_bytes: u64,
    ) -> Result<usize> {
        let removed = {
            let mut inner = self.inner.lock();
            let Some(segments) = inner
                .segments
                .get_mut(topic)
                .and_then(|parts| parts.get_mut(&partition))
            else {
                return Ok(0);
            };
            if segments.len() <= 1 {
                return Ok(0);
            }

            let mut retained: u64 = segments.iter().map(|s| s.size()).sum();
            let mut remove_count = 0;
            while remove_count < segments.len() - 1 && retained > retention_bytes {
                retained -= segments[remove_count].size();
                remove_count += 1;
            }

            segments.drain(..remove_count).collect::<Vec<_>>()
        };

        for segment in &removed {
            if let Err(e) = segment.delete_files() {
                warn!(
                    topic,
                    partition,
                    base_offset = segment.base_offset(),
                    error = %e,
                    "deleting retired segment files failed"
                );
            }
        }
        if !removed.is_empty() {
            info!(
                topic,
                partition,
                removed = removed.len(),
                "retention removed segments"
            );
        }
        Ok(removed.len())
    }

    /// Drop a topic's segments from the map and remove its directory tree.
    pub fn delete_topic(&self, topic: &str) -> Result<()> {
        let existed = {
            let mut inner = self.inner.lock();
            inner.high_water_marks.remove(topic);
            inner.segments.remove(topic).is_some()
        };

        let path = self.root.join(topic);
        if path.exists() {
            fs::remove_dir_all(&path).map_err(|e| Error::io_at(&path, e))?;
        }
        if existed {
            info!(topic, "deleted topic data");
        }
        Ok(())
    }

    /// Flush and close every segment. Called once on shutdown, after the
    /// accept loop has stopped and in-flight handlers drained.
    pub fn close_all(&self) -> Result<()> {
        let all: Vec<Arc<Segment>> = {
            let inner = self.inner.lock();
            inner
                .segments
                .values()
                .flat_map(|parts| parts.values())
                .flatten()
                .cloned()
                .collect()
        };
        for segment in all {
            segment.close()?;
        }
        Ok(())
    }
}

fn load_partition_segments(
    partition_path: &Path,
    max_segment_size: u64,
    flush_policy: FlushPolicy,
) -> Result<Vec<Arc<Segment>>> {
    let mut base_offsets = Vec::new();
    for entry in fs::read_dir(partition_path).map_err(|e| Error::io_at(partition_path, e))? {
        let entry = entry.map_err(|e| Error::io_at(partition_path, e))?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == LOG_SUFFIX) {
            if let Some(base) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<i64>().ok())
            {
                base_offsets.push(base);
            }
        }
    }
    base_offsets.sort_unstable();

    let mut segments = Vec::with_capacity(base_offsets.len());
    for base in base_offsets {
        match Segment::open(partition_path, base, max_segment_size, flush_policy) {
            Ok(segment) => segments.push(Arc::new(segment)),
            Err(e) => {
                warn!(
                    path = %partition_path.display(),
                    base_offset = base,
                    error = %e,
                    "skipping unreadable segment"
                );
            }
        }
    }
    Ok(segments)
}
