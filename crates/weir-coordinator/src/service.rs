//! Wire-facing coordinator service: maps requests onto the group manager and
//! domain errors onto response codes.

use crate::manager::GroupManager;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;
use weir_protocol::{CommittedEntry, ErrorCode, Request, RequestHandler, Response};

pub struct CoordinatorService {
    manager: Arc<GroupManager>,
}

impl CoordinatorService {
    pub fn new(manager: Arc<GroupManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<GroupManager> {
        &self.manager
    }
}

#[async_trait]
impl RequestHandler for CoordinatorService {
    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::PollAssignment {
                group,
                member_id,
                topics,
            } => {
                if group.is_empty() || member_id.is_empty() {
                    return Response::error(
                        ErrorCode::InvalidArgument,
                        "group and member_id cannot be empty",
                    );
                }
                if let Err(e) = self.manager.join_group(&group, &member_id, topics) {
                    return Response::error(ErrorCode::from(&e), e.to_string());
                }
                Response::Assignments {
                    assignments: self.manager.get_assignments(&group, &member_id),
                    heartbeat_interval_ms: self.manager.heartbeat_interval_ms(),
                }
            }
            Request::LeaveGroup { group, member_id } => {
                match self.manager.leave_group(&group, &member_id) {
                    Ok(()) => Response::Left {
                        error_code: ErrorCode::Ok,
                    },
                    Err(e) => Response::Left {
                        error_code: ErrorCode::from(&e),
                    },
                }
            }
            Request::Heartbeat { group, member_id } => {
                match self.manager.heartbeat(&group, &member_id) {
                    Ok(()) => Response::HeartbeatAck {
                        error_code: ErrorCode::Ok,
                    },
                    Err(e) => Response::HeartbeatAck {
                        error_code: ErrorCode::from(&e),
                    },
                }
            }
            Request::CommitOffset {
                group,
                topic,
                partition,
                offset,
            } => match self.manager.commit_offset(&group, &topic, partition, offset) {
                Ok(()) => Response::OffsetCommitted {
                    error_code: ErrorCode::Ok,
                    error_message: String::new(),
                },
                Err(e) => Response::OffsetCommitted {
                    error_code: ErrorCode::from(&e),
                    error_message: e.to_string(),
                },
            },
            Request::GetCommittedOffset {
                group,
                topic,
                partition,
            } => match self.manager.get_committed_offset(&group, &topic, partition) {
                Ok(offset) => Response::CommittedOffset {
                    offset,
                    error_code: ErrorCode::Ok,
                },
                Err(e) => Response::CommittedOffset {
                    offset: 0,
                    error_code: ErrorCode::from(&e),
                },
            },
            Request::ListGroups => Response::Groups {
                groups: self.manager.list_groups(),
            },
            Request::DescribeGroup { group } => match self.manager.group_snapshot(&group) {
                Ok(snapshot) => Response::GroupDescribed {
                    group: snapshot.group_id,
                    members: snapshot.members,
                    committed: snapshot
                        .committed
                        .into_iter()
                        .map(|((topic, partition), offset)| CommittedEntry {
                            topic,
                            partition,
                            offset,
                        })
                        .collect(),
                    error_code: ErrorCode::Ok,
                },
                Err(e) => Response::GroupDescribed {
                    group,
                    members: Vec::new(),
                    committed: Vec::new(),
                    error_code: ErrorCode::from(&e),
                },
            },
            Request::Ping => Response::Pong,
            other => {
                warn!(?other, "request not served by the coordinator");
                Response::error(
                    ErrorCode::InvalidArgument,
                    "request not served by the coordinator",
                )
            }
        }
    }
}
