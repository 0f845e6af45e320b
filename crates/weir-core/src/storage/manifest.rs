//! Per-partition metadata files.
//!
//! `MANIFEST` holds line-oriented `key: value` pairs for the partition's
//! offset bookkeeping; `high_water_mark` holds a single ASCII decimal. Both
//! are written atomically (temp file, fsync, rename) so a crash mid-write
//! leaves the previous version intact.

use crate::{Error, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

const MANIFEST_FILE: &str = "MANIFEST";
const HIGH_WATER_MARK_FILE: &str = "high_water_mark";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionManifest {
    pub base_offset: i64,
    pub next_offset: i64,
    pub high_watermark: i64,
    pub timestamp_ms: i64,
}

/// Reads and writes a partition directory's MANIFEST and high_water_mark.
#[derive(Debug)]
pub struct ManifestStore {
    partition_dir: PathBuf,
}

impl ManifestStore {
    pub fn new(partition_dir: impl Into<PathBuf>) -> Self {
        Self {
            partition_dir: partition_dir.into(),
        }
    }

    fn manifest_path(&self) -> PathBuf {
        self.partition_dir.join(MANIFEST_FILE)
    }

    fn high_water_mark_path(&self) -> PathBuf {
        self.partition_dir.join(HIGH_WATER_MARK_FILE)
    }

    pub fn exists(&self) -> bool {
        self.manifest_path().exists()
    }

    pub fn load(&self) -> Result<PartitionManifest> {
        let path = self.manifest_path();
        let content = fs::read_to_string(&path).map_err(|e| Error::io_at(&path, e))?;

        let mut manifest = PartitionManifest::default();
        for line in content.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "base_offset" => manifest.base_offset = value.parse().unwrap_or(0),
                "next_offset" => manifest.next_offset = value.parse().unwrap_or(0),
                "high_watermark" => manifest.high_watermark = value.parse().unwrap_or(0),
                "timestamp_ms" => manifest.timestamp_ms = value.parse().unwrap_or(0),
                _ => {}
            }
        }
        Ok(manifest)
    }

    /// Durable save: fsyncs the temp file and parent directory. Used on
    /// flush/close checkpoints.
    pub fn save(&self, manifest: &PartitionManifest) -> Result<()> {
        atomic_write(&self.manifest_path(), render(manifest).as_bytes(), true)
    }

    /// Refresh the offset fields, creating the manifest when absent.
    ///
    /// Hot path: rename-atomic but not fsynced. Durability of the log comes
    /// from the segment flush policy; the manifest is advisory and its reader
    /// tolerates a stale copy.
    pub fn update_offsets(&self, next_offset: i64, high_watermark: i64) -> Result<()> {
        let mut manifest = if self.exists() {
            self.load().unwrap_or_default()
        } else {
            PartitionManifest::default()
        };
        manifest.next_offset = next_offset;
        manifest.high_watermark = high_watermark;
        manifest.timestamp_ms = chrono::Utc::now().timestamp_millis();
        atomic_write(&self.manifest_path(), render(&manifest).as_bytes(), false)
    }

    pub fn load_high_water_mark(&self) -> Result<i64> {
        let path = self.high_water_mark_path();
        if !path.exists() {
            return Ok(0);
        }
        let content = fs::read_to_string(&path).map_err(|e| Error::io_at(&path, e))?;
        Ok(content.trim().parse().unwrap_or(0))
    }

    pub fn save_high_water_mark(&self, offset: i64) -> Result<()> {
        atomic_write(
            &self.high_water_mark_path(),
            offset.to_string().as_bytes(),
            false,
        )
    }
}

fn render(manifest: &PartitionManifest) -> String {
    format!(
        "base_offset: {}\nnext_offset: {}\nhigh_watermark: {}\ntimestamp_ms: {}\n",
        manifest.base_offset, manifest.next_offset, manifest.high_watermark, manifest.timestamp_ms
    )
}

fn atomic_write(path: &Path, content: &[u8], durable: bool) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::InvalidArgument(format!("{} has no parent", path.display())))?;
    fs::create_dir_all(parent).map_err(|e| Error::io_at(parent, e))?;

    let tmp = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp).map_err(|e| Error::io_at(&tmp, e))?;
        file.write_all(content).map_err(|e| Error::io_at(&tmp, e))?;
        if durable {
            file.sync_all().map_err(|e| Error::io_at(&tmp, e))?;
        }
    }
    fs::rename(&tmp, path).map_err(|e| Error::io_at(path, e))?;

    if durable {
        // Persist the rename itself.
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn manifest_roundtrip() {
        let dir = tempdir().unwrap();
        let store = ManifestStore::new(dir.path());

        let manifest = PartitionManifest {
            base_offset: 0,
            next_offset: 1500,
            high_watermark: 1500,
            timestamp_ms: 1_700_000_000_000,
        };
        store.save(&manifest).unwrap();
        assert_eq!(store.load().unwrap(), manifest);
    }

    #[test]
    fn update_offsets_creates_manifest() {
        let dir = tempdir().unwrap();
        let store = ManifestStore::new(dir.path().join("nested"));
        assert!(!store.exists());

        store.update_offsets(10, 10).unwrap();
        let manifest = store.load().unwrap();
        assert_eq!(manifest.next_offset, 10);
        assert_eq!(manifest.high_watermark, 10);
        assert!(manifest.timestamp_ms > 0);
    }

    #[test]
    fn high_water_mark_roundtrip() {
        let dir = tempdir().unwrap();
        let store = ManifestStore::new(dir.path());

        assert_eq!(store.load_high_water_mark().unwrap(), 0);
        store.save_high_water_mark(4096).unwrap();
        assert_eq!(store.load_high_water_mark().unwrap(), 4096);
    }

    #[test]
    fn garbage_lines_are_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("MANIFEST");
        fs::write(&path, "nonsense\nnext_offset: 5\nunknown: 1\n").unwrap();

        let store = ManifestStore::new(dir.path());
        let manifest = store.load().unwrap();
        assert_eq!(manifest.next_offset, 5);
        assert_eq!(manifest.base_offset, 0);
    }
}
