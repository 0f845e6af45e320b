//! Segmented log storage: on-disk codec, offset index, partition manifests,
//! and the partition-set directory layout.

pub mod index;
pub mod log_dir;
pub mod manifest;
pub mod segment;

pub use index::{IndexEntry, INDEX_ENTRY_BYTES};
pub use log_dir::LogDir;
pub use manifest::{ManifestStore, PartitionManifest};
pub use segment::{Segment, FRAME_HEADER_BYTES, SEGMENT_HEADER_BYTES, SEGMENT_MAGIC};

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// When segment files are fsynced. Fixed at segment construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushPolicy {
    /// Never fsync; durability rides on the page cache.
    Never,
    /// Fsync when the segment rolls or closes.
    #[default]
    OnRoll,
    /// Fsync the log and index after every append.
    EachBatch,
}

impl fmt::Display for FlushPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushPolicy::Never => write!(f, "never"),
            FlushPolicy::OnRoll => write!(f, "onroll"),
            FlushPolicy::EachBatch => write!(f, "eachbatch"),
        }
    }
}

impl FromStr for FlushPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "never" => Ok(FlushPolicy::Never),
            "onroll" => Ok(FlushPolicy::OnRoll),
            "eachbatch" => Ok(FlushPolicy::EachBatch),
            other => Err(Error::InvalidConfig(format!(
                "unknown flush policy '{other}', expected never|onroll|eachbatch"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_policy_parses() {
        assert_eq!("never".parse::<FlushPolicy>().unwrap(), FlushPolicy::Never);
        assert_eq!("OnRoll".parse::<FlushPolicy>().unwrap(), FlushPolicy::OnRoll);
        assert_eq!(
            "eachbatch".parse::<FlushPolicy>().unwrap(),
            FlushPolicy::EachBatch
        );
        assert!("always".parse::<FlushPolicy>().is_err());
        assert_eq!(FlushPolicy::default(), FlushPolicy::OnRoll);
    }
}
