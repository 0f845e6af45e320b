//! RPC status codes shared by every service response.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    Ok,
    InvalidArgument,
    NotFound,
    AlreadyExists,
    FailedPrecondition,
    OutOfRange,
    ResourceExhausted,
    Internal,
    Unavailable,
    DeadlineExceeded,
    DataLoss,
    IdempotentReplay,
    OffsetOutOfRange,
    Throttled,
    CorruptedData,
    NotLeader,
    ReplicationTimeout,
}

impl ErrorCode {
    /// Codes a client may retry without changing the request. Everything else
    /// is terminal to the call.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorCode::Unavailable
                | ErrorCode::DeadlineExceeded
                | ErrorCode::ResourceExhausted
                | ErrorCode::Throttled
        )
    }

    pub fn is_ok(self) -> bool {
        self == ErrorCode::Ok
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::Ok => "OK",
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::AlreadyExists => "ALREADY_EXISTS",
            ErrorCode::FailedPrecondition => "FAILED_PRECONDITION",
            ErrorCode::OutOfRange => "OUT_OF_RANGE",
            ErrorCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            ErrorCode::Internal => "INTERNAL",
            ErrorCode::Unavailable => "UNAVAILABLE",
            ErrorCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            ErrorCode::DataLoss => "DATA_LOSS",
            ErrorCode::IdempotentReplay => "IDEMPOTENT_REPLAY",
            ErrorCode::OffsetOutOfRange => "OFFSET_OUT_OF_RANGE",
            ErrorCode::Throttled => "THROTTLED",
            ErrorCode::CorruptedData => "CORRUPTED_DATA",
            ErrorCode::NotLeader => "NOT_LEADER",
            ErrorCode::ReplicationTimeout => "REPLICATION_TIMEOUT",
        };
        f.write_str(name)
    }
}

/// Classify a domain error at the service edge.
impl From<&weir_core::Error> for ErrorCode {
    fn from(err: &weir_core::Error) -> Self {
        use weir_core::Error;
        match err {
            Error::TopicNotFound(_)
            | Error::PartitionNotFound { .. }
            | Error::GroupNotFound(_)
            | Error::MemberNotFound(_) => ErrorCode::NotFound,
            Error::TopicAlreadyExists(_) => ErrorCode::AlreadyExists,
            Error::SegmentClosed => ErrorCode::FailedPrecondition,
            Error::SegmentFull { .. } => ErrorCode::ResourceExhausted,
            Error::OffsetOutOfRange { .. } => ErrorCode::OffsetOutOfRange,
            Error::IdempotentReplay { .. } => ErrorCode::IdempotentReplay,
            Error::CorruptedData(_) => ErrorCode::CorruptedData,
            Error::InvalidArgument(_) | Error::InvalidConfig(_) => ErrorCode::InvalidArgument,
            Error::IoAt { .. } | Error::Io(_) => ErrorCode::Internal,
        }
    }
}
