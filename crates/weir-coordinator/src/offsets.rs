//! Durable committed-offset checkpoints.
//!
//! The in-memory group table is authoritative; this store batches commits
//! into an atomic JSON checkpoint at `<path>/offsets.json` so a restart
//! resumes from the last flushed state instead of the beginning.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, warn};
use weir_core::{Error, Result};

const OFFSETS_FILE: &str = "offsets.json";

/// group → topic → partition (as string, JSON maps need string keys) → offset
pub type OffsetSnapshot = HashMap<String, HashMap<String, HashMap<String, i64>>>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CheckpointFile {
    offsets: OffsetSnapshot,
}

#[derive(Debug)]
pub struct OffsetStore {
    dir: PathBuf,
}

impl OffsetStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| Error::io_at(&dir, e))?;
        Ok(Self { dir })
    }

    fn path(&self) -> PathBuf {
        self.dir.join(OFFSETS_FILE)
    }

    /// Load the last checkpoint; a missing or unparsable file is an empty
    /// start, not an error.
    pub fn load(&self) -> OffsetSnapshot {
        let path = self.path();
        if !path.exists() {
            return OffsetSnapshot::default();
        }
        match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<CheckpointFile>(&content) {
                Ok(file) => {
                    debug!(groups = file.offsets.len(), "loaded offset checkpoint");
                    file.offsets
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unparsable offset checkpoint");
                    OffsetSnapshot::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable offset checkpoint");
                OffsetSnapshot::default()
            }
        }
    }

    /// Write a checkpoint atomically: temp file, fsync, rename.
    pub fn save(&self, offsets: &OffsetSnapshot) -> Result<()> {
        let path = self.path();
        let tmp = path.with_extension("tmp");

        let json = serde_json::to_string(&CheckpointFile {
            offsets: offsets.clone(),
        })
        .map_err(|e| Error::InvalidArgument(format!("offset serialization failed: {e}")))?;

        {
            let mut file = File::create(&tmp).map_err(|e| Error::io_at(&tmp, e))?;
            file.write_all(json.as_bytes())
                .map_err(|e| Error::io_at(&tmp, e))?;
            file.sync_all().map_err(|e| Error::io_at(&tmp, e))?;
        }
        fs::rename(&tmp, &path).map_err(|e| Error::io_at(&path, e))?;
        if let Ok(dir) = File::open(&self.dir) {
            let _ = dir.sync_all();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn roundtrip() {
        let dir = tempdir().unwrap();
        let store = OffsetStore::new(dir.path()).unwrap();
        assert!(store.load().is_empty());

        let mut offsets = OffsetSnapshot::default();
        offsets
            .entry("g1".into())
            .or_default()
            .entry("orders".into())
            .or_default()
            .insert("0".into(), 1000);
        store.save(&offsets).unwrap();

        let loaded = store.load();
        assert_eq!(loaded["g1"]["orders"]["0"], 1000);
    }

    #[test]
    fn corrupt_checkpoint_starts_empty() {
        let dir = tempdir().unwrap();
        let store = OffsetStore::new(dir.path()).unwrap();
        fs::write(dir.path().join(OFFSETS_FILE), "{not json").unwrap();
        assert!(store.load().is_empty());
    }
}
