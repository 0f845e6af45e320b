//! Framed-TCP clients for the three Weir services.
//!
//! One [`Connection`] per client; requests and responses are matched by the
//! protocol's strict request/response pairing (one response per request, in
//! order).

use crate::error::{Error, Result};
use tokio::net::TcpStream;
use tracing::debug;
use weir_protocol::{
    read_frame, write_frame, AckMode, BatchData, CommittedEntry, ErrorCode, PartitionMetadata,
    RecordData, Request, Response, TopicAssignment,
};

pub struct Connection {
    stream: TcpStream,
}

impl Connection {
    pub async fn connect(addr: &str) -> Result<Self> {
        debug!(%addr, "connecting");
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| Error::Connection(format!("{addr}: {e}")))?;
        Ok(Self { stream })
    }

    pub async fn send(&mut self, request: &Request) -> Result<Response> {
        write_frame(&mut self.stream, &request.to_bytes()?).await?;
        let payload = read_frame(&mut self.stream)
            .await?
            .ok_or_else(|| Error::Connection("server closed the connection".into()))?;
        Ok(Response::from_bytes(&payload)?)
    }

    pub async fn ping(&mut self) -> Result<()> {
        match self.send(&Request::Ping).await? {
            Response::Pong => Ok(()),
            other => Err(Error::UnexpectedResponse(format!("{other:?}"))),
        }
    }
}

/// Outcome of a produce call. `error_code` is surfaced rather than folded
/// into `Err` because `IdempotentReplay` still carries the usable original
/// offset.
#[derive(Debug, Clone)]
pub struct ProduceOutcome {
    pub base_offset: i64,
    pub error_code: ErrorCode,
    pub error_message: String,
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub batches: Vec<BatchData>,
    pub high_watermark: i64,
    pub error_code: ErrorCode,
    pub error_message: String,
}

pub struct BrokerClient {
    conn: Connection,
}

impl BrokerClient {
    pub async fn connect(addr: &str) -> Result<Self> {
        Ok(Self {
            conn: Connection::connect(addr).await?,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn produce(
        &mut self,
        topic: &str,
        partition: i32,
        records: Vec<RecordData>,
        ack: AckMode,
        producer_id: &str,
        sequence: i64,
    ) -> Result<ProduceOutcome> {
        let request = Request::Produce {
            topic: topic.to_string(),
            partition,
            records,
            ack,
            producer_id: producer_id.to_string(),
            sequence,
        };
        match self.conn.send(&request).await? {
            Response::Produced {
                base_offset,
                error_code,
                error_message,
            } => Ok(ProduceOutcome {
                base_offset,
                error_code,
                error_message,
            }),
            Response::Error {
                error_code,
                error_message,
            } => Err(Error::rpc(error_code, error_message)),
            other => Err(Error::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    pub async fn fetch(
        &mut self,
        topic: &str,
        partition: i32,
        offset: i64,
        max_bytes: i64,
    ) -> Result<FetchOutcome> {
        let request = Request::Fetch {
            topic: topic.to_string(),
            partition,
            offset,
            max_bytes,
        };
        match self.conn.send(&request).await? {
            Response::Fetched {
                batches,
                high_watermark,
                error_code,
                error_message,
            } => Ok(FetchOutcome {
                batches,
                high_watermark,
                error_code,
                error_message,
            }),
            Response::Error {
                error_code,
                error_message,
            } => Err(Error::rpc(error_code, error_message)),
            other => Err(Error::UnexpectedResponse(format!("{other:?}"))),
        }
    }
}

pub struct ControllerClient {
    conn: Connection,
}

impl ControllerClient {
    pub async fn connect(addr: &str) -> Result<Self> {
        Ok(Self {
            conn: Connection::connect(addr).await?,
        })
    }

    pub async fn create_topic(
        &mut self,
        topic: &str,
        partitions: i32,
        replication_factor: i32,
    ) -> Result<()> {
        let request = Request::CreateTopic {
            topic: topic.to_string(),
            partitions,
            replication_factor,
        };
        match self.conn.send(&request).await? {
            Response::TopicCreated { success: true, .. } => Ok(()),
            Response::TopicCreated {
                success: false,
                error_message,
            } => Err(Error::rpc(ErrorCode::AlreadyExists, error_message)),
            Response::Error {
                error_code,
                error_message,
            } => Err(Error::rpc(error_code, error_message)),
            other => Err(Error::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    pub async fn describe_topic(&mut self, topic: &str) -> Result<Vec<PartitionMetadata>> {
        let request = Request::DescribeTopic {
            topic: topic.to_string(),
        };
        match self.conn.send(&request).await? {
            Response::TopicDescribed {
                partition_metadata,
                error_code: ErrorCode::Ok,
                ..
            } => Ok(partition_metadata),
            Response::TopicDescribed { error_code, .. } => {
                Err(Error::rpc(error_code, format!("describe {topic} failed")))
            }
            other => Err(Error::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    pub async fn list_topics(&mut self) -> Result<Vec<String>> {
        match self.conn.send(&Request::ListTopics).await? {
            Response::Topics { topics } => Ok(topics),
            other => Err(Error::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    pub async fn delete_topic(&mut self, topic: &str) -> Result<()> {
        let request = Request::DeleteTopic {
            topic: topic.to_string(),
        };
        match self.conn.send(&request).await? {
            Response::TopicDeleted {
                error_code: ErrorCode::Ok,
                ..
            } => Ok(()),
            Response::TopicDeleted {
                error_code,
                error_message,
            } => Err(Error::rpc(error_code, error_message)),
            other => Err(Error::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    pub async fn find_leader(&mut self, topic: &str, partition: i32) -> Result<(i32, String, u16)> {
        let request = Request::FindLeader {
            topic: topic.to_string(),
            partition,
        };
        match self.conn.send(&request).await? {
            Response::LeaderFound {
                leader_broker_id,
                leader_host,
                leader_port,
                error_code: ErrorCode::Ok,
            } => Ok((leader_broker_id, leader_host, leader_port)),
            Response::LeaderFound { error_code, .. } => Err(Error::rpc(
                error_code,
                format!("no leader for {topic}/{partition}"),
            )),
            other => Err(Error::UnexpectedResponse(format!("{other:?}"))),
        }
    }
}

pub struct CoordinatorClient {
    conn: Connection,
}

impl CoordinatorClient {
    pub async fn connect(addr: &str) -> Result<Self> {
        Ok(Self {
            conn: Connection::connect(addr).await?,
        })
    }

    /// Join (or re-announce) a group membership and get back the current
    /// assignment plus the heartbeat cadence the server expects.
    pub async fn poll_assignment(
        &mut self,
        group: &str,
        member_id: &str,
        topics: Vec<String>,
    ) -> Result<(Vec<TopicAssignment>, i32)> {
        let request = Request::PollAssignment {
            group: group.to_string(),
            member_id: member_id.to_string(),
            topics,
        };
        match self.conn.send(&request).await? {
            Response::Assignments {
                assignments,
                heartbeat_interval_ms,
            } => Ok((assignments, heartbeat_interval_ms)),
            Response::Error {
                error_code,
                error_message,
            } => Err(Error::rpc(error_code, error_message)),
            other => Err(Error::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    pub async fn heartbeat(&mut self, group: &str, member_id: &str) -> Result<()> {
        let request = Request::Heartbeat {
            group: group.to_string(),
            member_id: member_id.to_string(),
        };
        match self.conn.send(&request).await? {
            Response::HeartbeatAck {
                error_code: ErrorCode::Ok,
            } => Ok(()),
            Response::HeartbeatAck { error_code } => {
                Err(Error::rpc(error_code, "heartbeat rejected"))
            }
            other => Err(Error::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    pub async fn leave_group(&mut self, group: &str, member_id: &str) -> Result<()> {
        let request = Request::LeaveGroup {
            group: group.to_string(),
            member_id: member_id.to_string(),
        };
        match self.conn.send(&request).await? {
            Response::Left {
                error_code: ErrorCode::Ok,
            } => Ok(()),
            Response::Left { error_code } => Err(Error::rpc(error_code, "leave rejected")),
            other => Err(Error::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    pub async fn commit_offset(
        &mut self,
        group: &str,
        topic: &str,
        partition: i32,
        offset: i64,
    ) -> Result<()> {
        let request = Request::CommitOffset {
            group: group.to_string(),
            topic: topic.to_string(),
            partition,
            offset,
        };
        match self.conn.send(&request).await? {
            Response::OffsetCommitted {
                error_code: ErrorCode::Ok,
                ..
            } => Ok(()),
            Response::OffsetCommitted {
                error_code,
                error_message,
            } => Err(Error::rpc(error_code, error_message)),
            other => Err(Error::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    pub async fn get_committed_offset(
        &mut self,
        group: &str,
        topic: &str,
        partition: i32,
    ) -> Result<i64> {
        let request = Request::GetCommittedOffset {
            group: group.to_string(),
            topic: topic.to_string(),
            partition,
        };
        match self.conn.send(&request).await? {
            Response::CommittedOffset {
                offset,
                error_code: ErrorCode::Ok,
            } => Ok(offset),
            Response::CommittedOffset { error_code, .. } => {
                Err(Error::rpc(error_code, "offset read rejected"))
            }
            other => Err(Error::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    pub async fn list_groups(&mut self) -> Result<Vec<String>> {
        match self.conn.send(&Request::ListGroups).await? {
            Response::Groups { groups } => Ok(groups),
            other => Err(Error::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    pub async fn describe_group(
        &mut self,
        group: &str,
    ) -> Result<(Vec<String>, Vec<CommittedEntry>)> {
        let request = Request::DescribeGroup {
            group: group.to_string(),
        };
        match self.conn.send(&request).await? {
            Response::GroupDescribed {
                members,
                committed,
                error_code: ErrorCode::Ok,
                ..
            } => Ok((members, committed)),
            Response::GroupDescribed { error_code, .. } => {
                Err(Error::rpc(error_code, format!("describe {group} failed")))
            }
            other => Err(Error::UnexpectedResponse(format!("{other:?}"))),
        }
    }
}
