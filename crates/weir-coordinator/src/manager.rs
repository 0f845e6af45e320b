//! The consumer group state machine.
//!
//! A single mutex over the group table makes Join/Leave/Heartbeat/Commit and
//! the rebalances they trigger linearizable with respect to each other.
//! Offset checkpoints happen outside that lock.

use crate::group::{ConsumerGroup, GroupState, Member};
use crate::offsets::{OffsetSnapshot, OffsetStore};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use weir_core::{Error, Result};
use weir_protocol::TopicAssignment;

/// Commits between durable checkpoints.
const CHECKPOINT_INTERVAL: u32 = 50;

/// The partition count the source hard-codes when no controller is
/// reachable.
pub const FALLBACK_PARTITION_COUNT: i32 = 6;

/// Where the coordinator learns each topic's partition count. Implementations
/// must answer from memory; the group-table mutex is held across calls.
pub trait PartitionCounts: Send + Sync {
    fn partition_count(&self, topic: &str) -> i32;
}

/// The standalone fallback: every topic gets a fixed count.
pub struct FixedPartitionCounts(pub i32);

impl PartitionCounts for FixedPartitionCounts {
    fn partition_count(&self, _topic: &str) -> i32 {
        self.0
    }
}

/// Controller-fed cache. A background refresher fills it from DescribeTopic;
/// lookups never block, missing topics use the fallback count.
#[derive(Default)]
pub struct CachedPartitionCounts {
    cache: RwLock<HashMap<String, i32>>,
}

impl CachedPartitionCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, topic: impl Into<String>, count: i32) {
        self.cache.write().insert(topic.into(), count);
    }

    pub fn replace_all(&self, counts: HashMap<String, i32>) {
        *self.cache.write() = counts;
    }
}

impl PartitionCounts for CachedPartitionCounts {
    fn partition_count(&self, topic: &str) -> i32 {
        self.cache
            .read()
            .get(topic)
            .copied()
            .unwrap_or(FALLBACK_PARTITION_COUNT)
    }
}

pub struct GroupManager {
    heartbeat_interval: Duration,
    session_timeout: Duration,
    partition_counts: Arc<dyn PartitionCounts>,
    groups: Mutex<HashMap<String, ConsumerGroup>>,
    offset_store: Option<OffsetStore>,
    pending_commits: AtomicU32,
}

impl GroupManager {
    pub fn new(
        heartbeat_interval: Duration,
        session_timeout: Duration,
        partition_counts: Arc<dyn PartitionCounts>,
    ) -> Self {
        Self {
            heartbeat_interval,
            session_timeout,
            partition_counts,
            groups: Mutex::new(HashMap::new()),
            offset_store: None,
            pending_commits: AtomicU32::new(0),
        }
    }

    /// Attach durable offset storage, restoring committed offsets from the
    /// last checkpoint. Groups restored this way start with no members.
    pub fn with_offset_store(mut self, store: OffsetStore) -> Self {
        let snapshot = store.load();
        {
            let mut groups = self.groups.lock();
            for (group_id, topics) in snapshot {
                let group = groups
                    .entry(group_id.clone())
                    .or_insert_with(|| ConsumerGroup::new(group_id));
                for (topic, partitions) in topics {
                    for (partition, offset) in partitions {
                        if let Ok(partition) = partition.parse::<i32>() {
                            group.committed.insert((topic.clone(), partition), offset);
                        }
                    }
                }
            }
        }
        self.offset_store = Some(store);
        self
    }

    pub fn heartbeat_interval_ms(&self) -> i32 {
        self.heartbeat_interval.as_millis() as i32
    }

    /// Register or refresh a member. Triggers a rebalance when the change
    /// leaves the group needing one.
    pub fn join_group(&self, group_id: &str, member_id: &str, topics: Vec<String>) -> Result<()> {
        let mut groups = self.groups.lock();
        let group = groups
            .entry(group_id.to_string())
            .or_insert_with(|| ConsumerGroup::new(group_id));

        match group.member_mut(member_id) {
            Some(member) => {
                member.subscribed_topics = topics;
                member.last_heartbeat = Instant::now();
                member.active = true;
            }
            None => {
                info!(group = group_id, member = member_id, "member joined");
                group.members.push(Member::new(member_id, topics));
            }
        }

        if self.needs_rebalancing(group) {
            self.rebalance(group);
        }
        Ok(())
    }

    /// Remove a member. An emptied group keeps its record so committed
    /// offsets survive.
    pub fn leave_group(&self, group_id: &str, member_id: &str) -> Result<()> {
        let mut groups = self.groups.lock();
        let group = groups
            .get_mut(group_id)
            .ok_or_else(|| Error::GroupNotFound(group_id.to_string()))?;

        group.members.retain(|m| m.member_id != member_id);
        group.assignments.remove(member_id);
        info!(group = group_id, member = member_id, "member left");

        if self.needs_rebalancing(group) {
            self.rebalance(group);
        }
        Ok(())
    }

    pub fn heartbeat(&self, group_id: &str, member_id: &str) -> Result<()> {
        let mut groups = self.groups.lock();
        let group = groups
            .get_mut(group_id)
            .ok_or_else(|| Error::GroupNotFound(group_id.to_string()))?;
        let member = group
            .member_mut(member_id)
            .ok_or_else(|| Error::MemberNotFound(member_id.to_string()))?;

        member.last_heartbeat = Instant::now();
        member.active = true;
        Ok(())
    }

    /// The member's current assignment; empty when none.
    pub fn get_assignments(&self, group_id: &str, member_id: &str) -> Vec<TopicAssignment> {
        self.groups
            .lock()
            .get(group_id)
            .and_then(|group| group.assignments.get(member_id))
            .cloned()
            .unwrap_or_default()
    }

    pub fn commit_offset(
        &self,
        group_id: &str,
        topic: &str,
        partition: i32,
        offset: i64,
    ) -> Result<()> {
        if offset < 0 {
            return Err(Error::InvalidArgument(format!(
                "offset must be non-negative, got {offset}"
            )));
        }

        {
            let mut groups = self.groups.lock();
            let group = groups
                .get_mut(group_id)
                .ok_or_else(|| Error::GroupNotFound(group_id.to_string()))?;
            group
                .committed
                .insert((topic.to_string(), partition), offset);
        }

        let pending = self.pending_commits.fetch_add(1, Ordering::Relaxed) + 1;
        if pending >= CHECKPOINT_INTERVAL {
            self.pending_commits.store(0, Ordering::Relaxed);
            self.checkpoint();
        }
        Ok(())
    }

    /// Committed offset for `(group, topic, partition)`; 0 when never
    /// committed.
    pub fn get_committed_offset(&self, group_id: &str, topic: &str, partition: i32) -> Result<i64> {
        let groups = self.groups.lock();
        let group = groups
            .get(group_id)
            .ok_or_else(|| Error::GroupNotFound(group_id.to_string()))?;
        Ok(group
            .committed
            .get(&(topic.to_string(), partition))
            .copied()
            .unwrap_or(0))
    }

    pub fn list_groups(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.groups.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Snapshot for DescribeGroup and tests: member ids, assignments, and
    /// committed offsets.
    pub fn group_snapshot(&self, group_id: &str) -> Result<GroupSnapshot> {
        let groups = self.groups.lock();
        let group = groups
            .get(group_id)
            .ok_or_else(|| Error::GroupNotFound(group_id.to_string()))?;
        Ok(GroupSnapshot {
            group_id: group.group_id.clone(),
            members: group.members.iter().map(|m| m.member_id.clone()).collect(),
            assignments: group.assignments.clone(),
            committed: group.committed.clone(),
            state: group.state(self.session_timeout),
        })
    }

    /// Background sweep: drop stale members everywhere and rebalance any
    /// group the evictions left inconsistent.
    pub fn cleanup_inactive_members(&self) {
        let mut groups = self.groups.lock();
        for group in groups.values_mut() {
            let before = group.members.len();
            let timeout = self.session_timeout;
            group.members.retain(|m| m.is_active(timeout));
            if group.members.len() != before {
                let members = &group.members;
                group
                    .assignments
                    .retain(|member_id, _| members.iter().any(|m| &m.member_id == member_id));
                debug!(
                    group = %group.group_id,
                    evicted = before - group.members.len(),
                    "evicted stale members"
                );
            }
            if self.needs_rebalancing(group) {
                self.rebalance(group);
            }
        }
    }

    /// Persist any pending commits. Call during graceful shutdown.
    pub fn flush_offsets(&self) {
        if self.pending_commits.swap(0, Ordering::Relaxed) > 0 {
            self.checkpoint();
        }
    }

    fn checkpoint(&self) {
        let Some(store) = &self.offset_store else {
            return;
        };
        let snapshot: OffsetSnapshot = {
            let groups = self.groups.lock();
            let mut snapshot = OffsetSnapshot::default();
            for (group_id, group) in groups.iter() {
                for ((topic, partition), offset) in &group.committed {
                    snapshot
                        .entry(group_id.clone())
                        .or_default()
                        .entry(topic.clone())
                        .or_default()
                        .insert(partition.to_string(), *offset);
                }
            }
            snapshot
        };
        if let Err(e) = store.save(&snapshot) {
            warn!(error = %e, "offset checkpoint failed");
        }
    }

    /// A group needs rebalancing iff it has members and either a member went
    /// stale or an active member holds no assignment.
    fn needs_rebalancing(&self, group: &ConsumerGroup) -> bool {
        if group.members.is_empty() {
            return false;
        }
        let timeout = self.session_timeout;
        group.members.iter().any(|m| !m.is_active(timeout))
            || group
                .members
                .iter()
                .any(|m| !group.assignments.contains_key(&m.member_id))
    }

    /// Evict stale members, then hand out every partition of every
    /// subscribed topic round-robin across the survivors.
    fn rebalance(&self, group: &mut ConsumerGroup) {
        let timeout = self.session_timeout;
        group.members.retain(|m| m.is_active(timeout));

        if group.members.is_empty() {
            group.assignments.clear();
            return;
        }

        let topics = group.subscribed_topics();
        let member_count = group.members.len();
        let mut plan: HashMap<String, HashMap<String, Vec<i32>>> = HashMap::new();

        let mut global_index = 0usize;
        for topic in &topics {
            let partitions = self.partition_counts.partition_count(topic).max(0);
            for partition in 0..partitions {
                let member = &group.members[global_index % member_count];
                plan.entry(member.member_id.clone())
                    .or_default()
                    .entry(topic.clone())
                    .or_default()
                    .push(partition);
                global_index += 1;
            }
        }

        group.assignments = plan
            .into_iter()
            .map(|(member_id, topics)| {
                let mut assignments: Vec<TopicAssignment> = topics
                    .into_iter()
                    .map(|(topic, partitions)| TopicAssignment { topic, partitions })
                    .collect();
                assignments.sort_by(|a, b| a.topic.cmp(&b.topic));
                (member_id, assignments)
            })
            .collect();
        group.last_rebalance = Instant::now();

        info!(
            group = %group.group_id,
            members = member_count,
            topics = topics.len(),
            "rebalanced"
        );
    }
}

#[derive(Debug, Clone)]
pub struct GroupSnapshot {
    pub group_id: String,
    pub members: Vec<String>,
    pub assignments: HashMap<String, Vec<TopicAssignment>>,
    pub committed: HashMap<(String, i32), i64>,
    pub state: GroupState,
}
