//! Consumer group state.

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};
use weir_protocol::TopicAssignment;

#[derive(Debug, Clone)]
pub struct Member {
    pub member_id: String,
    pub subscribed_topics: Vec<String>,
    pub last_heartbeat: Instant,
    pub active: bool,
}

impl Member {
    pub fn new(member_id: impl Into<String>, subscribed_topics: Vec<String>) -> Self {
        Self {
            member_id: member_id.into(),
            subscribed_topics,
            last_heartbeat: Instant::now(),
            active: true,
        }
    }

    pub fn is_active(&self, session_timeout: Duration) -> bool {
        self.active && self.last_heartbeat.elapsed() < session_timeout
    }
}

/// Per-group lifecycle: `Empty` until someone joins, `Stable` when every
/// active member holds an assignment, `Rebalancing` in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    Empty,
    Stable,
    Rebalancing,
}

#[derive(Debug)]
pub struct ConsumerGroup {
    pub group_id: String,
    pub members: Vec<Member>,
    pub assignments: HashMap<String, Vec<TopicAssignment>>,
    /// (topic, partition) → committed offset.
    pub committed: HashMap<(String, i32), i64>,
    pub last_rebalance: Instant,
}

impl ConsumerGroup {
    pub fn new(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            members: Vec::new(),
            assignments: HashMap::new(),
            committed: HashMap::new(),
            last_rebalance: Instant::now(),
        }
    }

    pub fn member_mut(&mut self, member_id: &str) -> Option<&mut Member> {
        self.members.iter_mut().find(|m| m.member_id == member_id)
    }

    pub fn member(&self, member_id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.member_id == member_id)
    }

    /// Union of every member's subscription, sorted for deterministic
    /// assignment order.
    pub fn subscribed_topics(&self) -> Vec<String> {
        let set: BTreeSet<String> = self
            .members
            .iter()
            .flat_map(|m| m.subscribed_topics.iter().cloned())
            .collect();
        set.into_iter().collect()
    }

    pub fn state(&self, session_timeout: Duration) -> GroupState {
        if self.members.is_empty() {
            return GroupState::Empty;
        }
        let stable = self.members.iter().all(|m| {
            m.is_active(session_timeout)
                && self
                    .assignments
                    .get(&m.member_id)
                    .is_some_and(|a| !a.is_empty())
        });
        if stable {
            GroupState::Stable
        } else {
            GroupState::Rebalancing
        }
    }
}
