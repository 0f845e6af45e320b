//! Wire messages for the broker, controller, and coordinator services.
//!
//! Requests and responses are bincode-encoded enums carried in length-framed
//! TCP messages (see [`crate::framing`]). Error codes travel in-band in the
//! response payloads.

use crate::codes::ErrorCode;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use weir_core::{Record, RecordBatch};

/// Produce acknowledgement mode. Only latency accounting distinguishes the
/// two until replication lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckMode {
    Leader,
    Quorum,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordData {
    pub key: Bytes,
    pub value: Bytes,
    pub timestamp_ms: i64,
}

impl From<&Record> for RecordData {
    fn from(record: &Record) -> Self {
        Self {
            key: record.key.clone(),
            value: record.value.clone(),
            timestamp_ms: record.timestamp_ms,
        }
    }
}

impl From<RecordData> for Record {
    fn from(data: RecordData) -> Self {
        Record {
            key: data.key,
            value: data.value,
            timestamp_ms: data.timestamp_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchData {
    pub base_offset: i64,
    pub crc32: u32,
    pub records: Vec<RecordData>,
}

impl From<&RecordBatch> for BatchData {
    fn from(batch: &RecordBatch) -> Self {
        Self {
            base_offset: batch.base_offset,
            crc32: batch.crc32,
            records: batch.records.iter().map(RecordData::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionMetadata {
    pub partition: i32,
    pub leader: i32,
    pub replicas: Vec<i32>,
    pub isr: Vec<i32>,
    pub high_watermark: i64,
}

/// One topic's slice of a member's assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicAssignment {
    pub topic: String,
    pub partitions: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedEntry {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    // Broker
    Produce {
        topic: String,
        partition: i32,
        records: Vec<RecordData>,
        ack: AckMode,
        producer_id: String,
        sequence: i64,
    },
    Fetch {
        topic: String,
        partition: i32,
        offset: i64,
        max_bytes: i64,
    },

    // Controller
    CreateTopic {
        topic: String,
        partitions: i32,
        replication_factor: i32,
    },
    DescribeTopic {
        topic: String,
    },
    ListTopics,
    DeleteTopic {
        topic: String,
    },
    FindLeader {
        topic: String,
        partition: i32,
    },

    // Coordinator
    PollAssignment {
        group: String,
        member_id: String,
        topics: Vec<String>,
    },
    LeaveGroup {
        group: String,
        member_id: String,
    },
    Heartbeat {
        group: String,
        member_id: String,
    },
    CommitOffset {
        group: String,
        topic: String,
        partition: i32,
        offset: i64,
    },
    GetCommittedOffset {
        group: String,
        topic: String,
        partition: i32,
    },
    ListGroups,
    DescribeGroup {
        group: String,
    },

    Ping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    Produced {
        base_offset: i64,
        error_code: ErrorCode,
        error_message: String,
    },
    Fetched {
        batches: Vec<BatchData>,
        high_watermark: i64,
        error_code: ErrorCode,
        error_message: String,
    },

    TopicCreated {
        success: bool,
        error_message: String,
    },
    TopicDescribed {
        topic: String,
        partition_metadata: Vec<PartitionMetadata>,
        error_code: ErrorCode,
    },
    Topics {
        topics: Vec<String>,
    },
    TopicDeleted {
        error_code: ErrorCode,
        error_message: String,
    },
    LeaderFound {
        leader_broker_id: i32,
        leader_host: String,
        leader_port: u16,
        error_code: ErrorCode,
    },

    Assignments {
        assignments: Vec<TopicAssignment>,
        heartbeat_interval_ms: i32,
    },
    Left {
        error_code: ErrorCode,
    },
    HeartbeatAck {
        error_code: ErrorCode,
    },
    OffsetCommitted {
        error_code: ErrorCode,
        error_message: String,
    },
    CommittedOffset {
        offset: i64,
        error_code: ErrorCode,
    },
    Groups {
        groups: Vec<String>,
    },
    GroupDescribed {
        group: String,
        members: Vec<String>,
        committed: Vec<CommittedEntry>,
        error_code: ErrorCode,
    },

    Pong,

    /// Catch-all for requests a service cannot satisfy at all (wrong service,
    /// undecodable payload, internal fault before a typed response exists).
    Error {
        error_code: ErrorCode,
        error_message: String,
    },
}

impl Request {
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

impl Response {
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }

    pub fn error(error_code: ErrorCode, error_message: impl Into<String>) -> Self {
        Response::Error {
            error_code,
            error_message: error_message.into(),
        }
    }
}
