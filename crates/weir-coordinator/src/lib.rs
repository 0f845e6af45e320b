//! # weir-coordinator
//!
//! Consumer group coordination: membership with session liveness, round-robin
//! partition assignment, rebalance triggers, and durable offset commits.

pub mod group;
pub mod manager;
pub mod offsets;
pub mod service;

pub use group::{ConsumerGroup, GroupState, Member};
pub use manager::{
    CachedPartitionCounts, FixedPartitionCounts, GroupManager, GroupSnapshot, PartitionCounts,
    FALLBACK_PARTITION_COUNT,
};
pub use offsets::OffsetStore;
pub use service::CoordinatorService;
