//! Wire-facing controller service.

use crate::registry::TopicRegistry;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;
use weir_protocol::{ErrorCode, PartitionMetadata, Request, RequestHandler, Response};

/// Port arithmetic for the static broker set: broker `n` listens on
/// `broker_base_port + n`.
pub struct ControllerService {
    registry: Arc<TopicRegistry>,
    broker_host: String,
    broker_base_port: u16,
}

impl ControllerService {
    pub fn new(registry: Arc<TopicRegistry>, broker_host: String, broker_base_port: u16) -> Self {
        Self {
            registry,
            broker_host,
            broker_base_port,
        }
    }

    pub fn registry(&self) -> &Arc<TopicRegistry> {
        &self.registry
    }
}

#[async_trait]
impl RequestHandler for ControllerService {
    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::CreateTopic {
                topic,
                partitions,
                replication_factor,
            } => match self
                .registry
                .create_topic(&topic, partitions, replication_factor)
            {
                Ok(()) => Response::TopicCreated {
                    success: true,
                    error_message: String::new(),
                },
                Err(e) => Response::TopicCreated {
                    success: false,
                    error_message: e.to_string(),
                },
            },
            Request::DescribeTopic { topic } => match self.registry.describe_topic(&topic) {
                Ok(info) => Response::TopicDescribed {
                    topic: info.name,
                    partition_metadata: info
                        .partition_infos
                        .into_iter()
                        .map(|p| PartitionMetadata {
                            partition: p.partition,
                            leader: p.leader,
                            replicas: p.replicas,
                            isr: p.isr,
                            high_watermark: p.high_watermark,
                        })
                        .collect(),
                    error_code: ErrorCode::Ok,
                },
                Err(e) => Response::TopicDescribed {
                    topic,
                    partition_metadata: Vec::new(),
                    error_code: ErrorCode::from(&e),
                },
            },
            Request::ListTopics => Response::Topics {
                topics: self.registry.list_topics(),
            },
            Request::DeleteTopic { topic } => match self.registry.delete_topic(&topic) {
                Ok(()) => Response::TopicDeleted {
                    error_code: ErrorCode::Ok,
                    error_message: String::new(),
                },
                Err(e) => Response::TopicDeleted {
                    error_code: ErrorCode::from(&e),
                    error_message: e.to_string(),
                },
            },
            Request::FindLeader { topic, partition } => {
                if topic.is_empty() || partition < 0 {
                    return Response::LeaderFound {
                        leader_broker_id: -1,
                        leader_host: String::new(),
                        leader_port: 0,
                        error_code: ErrorCode::InvalidArgument,
                    };
                }
                match self.registry.get_partition_info(&topic, partition) {
                    Ok(info) => Response::LeaderFound {
                        leader_broker_id: info.leader,
                        leader_host: self.broker_host.clone(),
                        leader_port: self.broker_base_port + info.leader as u16,
                        error_code: ErrorCode::Ok,
                    },
                    Err(e) => Response::LeaderFound {
                        leader_broker_id: -1,
                        leader_host: String::new(),
                        leader_port: 0,
                        error_code: ErrorCode::from(&e),
                    },
                }
            }
            Request::Ping => Response::Pong,
            other => {
                warn!(?other, "request not served by the controller");
                Response::error(
                    ErrorCode::InvalidArgument,
                    "request not served by the controller",
                )
            }
        }
    }
}
