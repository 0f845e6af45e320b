//! In-memory topic metadata registry.
//!
//! Keyed by topic name under one mutex. Replica placement at creation is a
//! round-robin over a fixed broker set; persistence is out of scope, the
//! registry rebuilds from topic creation calls.

use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::info;
use weir_core::{Error, Result};

/// Size of the static broker set partitions are spread across.
pub const BROKER_SET_SIZE: i32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionInfo {
    pub partition: i32,
    pub leader: i32,
    pub replicas: Vec<i32>,
    pub isr: Vec<i32>,
    pub high_watermark: i64,
}

#[derive(Debug, Clone)]
pub struct TopicInfo {
    pub name: String,
    pub partitions: i32,
    pub replication_factor: i32,
    pub partition_infos: Vec<PartitionInfo>,
}

#[derive(Debug, Default)]
pub struct TopicRegistry {
    topics: Mutex<HashMap<String, TopicInfo>>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_topic(
        &self,
        name: &str,
        partitions: i32,
        replication_factor: i32,
    ) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("topic name cannot be empty".into()));
        }
        if partitions <= 0 {
            return Err(Error::InvalidArgument("partitions must be positive".into()));
        }
        if replication_factor <= 0 {
            return Err(Error::InvalidArgument(
                "replication factor must be positive".into(),
            ));
        }

        let mut topics = self.topics.lock();
        if topics.contains_key(name) {
            return Err(Error::TopicAlreadyExists(name.to_string()));
        }

        let partition_infos = assign_partitions(partitions, replication_factor);
        info!(topic = name, partitions, replication_factor, "created topic");
        topics.insert(
            name.to_string(),
            TopicInfo {
                name: name.to_string(),
                partitions,
                replication_factor,
                partition_infos,
            },
        );
        Ok(())
    }

    pub fn describe_topic(&self, name: &str) -> Result<TopicInfo> {
        self.topics
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::TopicNotFound(name.to_string()))
    }

    pub fn topic_exists(&self, name: &str) -> bool {
        self.topics.lock().contains_key(name)
    }

    pub fn list_topics(&self) -> Vec<String> {
        let mut names: Vec<String> = self.topics.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn delete_topic(&self, name: &str) -> Result<()> {
        self.topics
            .lock()
            .remove(name)
            .map(|_| info!(topic = name, "deleted topic"))
            .ok_or_else(|| Error::TopicNotFound(name.to_string()))
    }

    pub fn update_partition_leader(&self, topic: &str, partition: i32, leader: i32) -> Result<()> {
        self.with_partition_mut(topic, partition, |info| info.leader = leader)
    }

    pub fn update_partition_high_watermark(
        &self,
        topic: &str,
        partition: i32,
        high_watermark: i64,
    ) -> Result<()> {
        self.with_partition_mut(topic, partition, |info| info.high_watermark = high_watermark)
    }

    pub fn get_partition_info(&self, topic: &str, partition: i32) -> Result<PartitionInfo> {
        let topics = self.topics.lock();
        let topic_info = topics
            .get(topic)
            .ok_or_else(|| Error::TopicNotFound(topic.to_string()))?;
        topic_info
            .partition_infos
            .iter()
            .find(|p| p.partition == partition)
            .cloned()
            .ok_or_else(|| Error::PartitionNotFound {
                topic: topic.to_string(),
                partition,
            })
    }

    fn with_partition_mut(
        &self,
        topic: &str,
        partition: i32,
        update: impl FnOnce(&mut PartitionInfo),
    ) -> Result<()> {
        let mut topics = self.topics.lock();
        let topic_info = topics
            .get_mut(topic)
            .ok_or_else(|| Error::TopicNotFound(topic.to_string()))?;
        let partition_info = topic_info
            .partition_infos
            .iter_mut()
            .find(|p| p.partition == partition)
            .ok_or_else(|| Error::PartitionNotFound {
                topic: topic.to_string(),
                partition,
            })?;
        update(partition_info);
        Ok(())
    }
}

/// Replica `j` of partition `i` lands on broker `(i + j) mod set size`, so
/// leaders rotate across the set. Until replication exists the ISR is the
/// full replica list.
fn assign_partitions(partitions: i32, replication_factor: i32) -> Vec<PartitionInfo> {
    (0..partitions)
        .map(|partition| {
            let replicas: Vec<i32> = (0..replication_factor)
                .map(|j| (partition + j) % BROKER_SET_SIZE)
                .collect();
            let leader = replicas[0];
            PartitionInfo {
                partition,
                leader,
                isr: replicas.clone(),
                replicas,
                high_watermark: 0,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_describe() {
        let registry = TopicRegistry::new();
        registry.create_topic("orders", 3, 1).unwrap();

        let info = registry.describe_topic("orders").unwrap();
        assert_eq!(info.partitions, 3);
        assert_eq!(info.partition_infos.len(), 3);
        // Leaders rotate across the broker set.
        assert_eq!(info.partition_infos[0].leader, 0);
        assert_eq!(info.partition_infos[1].leader, 1);
        assert_eq!(info.partition_infos[2].leader, 2);
    }

    #[test]
    fn duplicate_create_fails() {
        let registry = TopicRegistry::new();
        registry.create_topic("orders", 3, 1).unwrap();
        assert!(matches!(
            registry.create_topic("orders", 6, 1),
            Err(Error::TopicAlreadyExists(_))
        ));
    }

    #[test]
    fn invalid_arguments_are_rejected() {
        let registry = TopicRegistry::new();
        assert!(registry.create_topic("", 3, 1).is_err());
        assert!(registry.create_topic("t", 0, 1).is_err());
        assert!(registry.create_topic("t", 3, 0).is_err());
    }

    #[test]
    fn list_is_sorted() {
        let registry = TopicRegistry::new();
        registry.create_topic("zebra", 1, 1).unwrap();
        registry.create_topic("alpha", 1, 1).unwrap();
        assert_eq!(
            registry.list_topics(),
            vec!["alpha".to_string(), "zebra".into()]
        );
    }

    #[test]
    fn delete_topic() {
        let registry = TopicRegistry::new();
        registry.create_topic("gone", 1, 1).unwrap();
        registry.delete_topic("gone").unwrap();
        assert!(!registry.topic_exists("gone"));
        assert!(matches!(
            registry.delete_topic("gone"),
            Err(Error::TopicNotFound(_))
        ));
    }

    #[test]
    fn leader_and_watermark_updates() {
        let registry = TopicRegistry::new();
        registry.create_topic("t", 2, 2).unwrap();

        registry.update_partition_leader("t", 1, 7).unwrap();
        registry
            .update_partition_high_watermark("t", 1, 4096)
            .unwrap();

        let info = registry.get_partition_info("t", 1).unwrap();
        assert_eq!(info.leader, 7);
        assert_eq!(info.high_watermark, 4096);

        assert!(matches!(
            registry.get_partition_info("t", 9),
            Err(Error::PartitionNotFound { .. })
        ));
    }

    #[test]
    fn replication_factor_spreads_replicas() {
        let registry = TopicRegistry::new();
        registry.create_topic("t", 1, 3).unwrap();
        let info = registry.get_partition_info("t", 0).unwrap();
        assert_eq!(info.replicas, vec![0, 1, 2]);
        assert_eq!(info.isr, info.replicas);
    }
}
