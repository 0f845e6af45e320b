//! # weir-core
//!
//! Storage engine and shared domain types for Weir: the segmented log codec,
//! offset index, crash recovery, partition directory layout, the producer
//! idempotency cache, and the daemon configuration types.

pub mod config;
pub mod error;
pub mod idempotency;
pub mod metrics;
pub mod record;
pub mod storage;

pub use config::{load_config, BrokerConfig, ControllerConfig, CoordinatorConfig};
pub use error::{Error, Result};
pub use idempotency::{BoundedIdempotencyTable, IdempotencyTable, ProducerKey, SequenceCache};
pub use record::{Record, RecordBatch, MAX_BATCH_BYTES};
pub use storage::{FlushPolicy, IndexEntry, LogDir, ManifestStore, PartitionManifest, Segment};
