use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Topic not found: {0}")]
    TopicNotFound(String),

    #[error("Partition not found: {topic}/{partition}")]
    PartitionNotFound { topic: String, partition: i32 },

    #[error("Group not found: {0}")]
    GroupNotFound(String),

    #[error("Member not found: {0}")]
    MemberNotFound(String),

    #[error("Topic already exists: {0}")]
    TopicAlreadyExists(String),

    #[error("Segment is closed")]
    SegmentClosed,

    #[error("Segment full: {needed} bytes needed, {available} available")]
    SegmentFull { needed: u64, available: u64 },

    #[error("Offset {offset} out of range, log end is {log_end}")]
    OffsetOutOfRange { offset: i64, log_end: i64 },

    #[error("Duplicate or stale sequence, last committed offset {last_offset}")]
    IdempotentReplay { last_offset: i64 },

    #[error("Corrupted data: {0}")]
    CorruptedData(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error on {path}: {source}")]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Attach a path to an I/O error so storage failures name the file involved.
    pub fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::IoAt {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
