//! Produce and Fetch semantics.
//!
//! The idempotency check, the append, and the sequence-table update for one
//! partition run under that partition's produce guard, so a duplicate retry
//! racing its original cannot both pass validation. Offsets are assigned in
//! commit order behind the active segment's own lock.

use crate::metrics::BrokerMetrics;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use weir_core::metrics::Timer;
use weir_core::{Error, LogDir, ProducerKey, Record, SequenceCache};
use weir_protocol::{
    AckMode, BatchData, ErrorCode, RecordData, Request, RequestHandler, Response,
};

pub struct BrokerService {
    log_dir: Arc<LogDir>,
    sequences: SequenceCache,
    /// One guard per partition, serializing validate → append → update.
    produce_guards: Mutex<HashMap<(String, i32), Arc<tokio::sync::Mutex<()>>>>,
}

impl BrokerService {
    pub fn new(log_dir: Arc<LogDir>, sequences: SequenceCache) -> Self {
        Self {
            log_dir,
            sequences,
            produce_guards: Mutex::new(HashMap::new()),
        }
    }

    pub fn log_dir(&self) -> &Arc<LogDir> {
        &self.log_dir
    }

    fn produce_guard(&self, topic: &str, partition: i32) -> Arc<tokio::sync::Mutex<()>> {
        self.produce_guards
            .lock()
            .entry((topic.to_string(), partition))
            .or_default()
            .clone()
    }

    pub async fn produce(
        &self,
        topic: &str,
        partition: i32,
        records: Vec<RecordData>,
        ack: AckMode,
        producer_id: &str,
        sequence: i64,
    ) -> Response {
        let timer = Timer::new();

        if let Err(message) = validate_produce(topic, partition, &records) {
            return produced_error(ErrorCode::InvalidArgument, message);
        }

        let guard = self.produce_guard(topic, partition);
        let _held = guard.lock().await;

        if !producer_id.is_empty() {
            let key = ProducerKey::new(producer_id, topic, partition);
            if !self.sequences.is_valid_sequence(&key, sequence) {
                let last_offset = self.sequences.get_last_offset(&key);
                debug!(
                    topic,
                    partition,
                    producer_id,
                    sequence,
                    last_offset,
                    "rejected duplicate or out-of-order sequence"
                );
                BrokerMetrics::record_idempotent_replay(topic, partition);
                return Response::Produced {
                    base_offset: last_offset,
                    error_code: ErrorCode::IdempotentReplay,
                    error_message: format!(
                        "sequence {sequence} is not next for producer {producer_id}"
                    ),
                };
            }
        }

        // Zero timestamps get the broker's wall clock before framing.
        let now_ms = chrono::Utc::now().timestamp_millis();
        let records: Vec<Record> = records
            .into_iter()
            .map(|r| {
                let mut record = Record::from(r);
                if record.timestamp_ms == 0 {
                    record.timestamp_ms = now_ms;
                }
                record
            })
            .collect();

        let base_offset = match self.append_with_roll(topic, partition, &records) {
            Ok(offset) => offset,
            Err(e) => {
                warn!(topic, partition, error = %e, "append failed");
                return produced_error(ErrorCode::from(&e), e.to_string());
            }
        };

        if !producer_id.is_empty() {
            let key = ProducerKey::new(producer_id, topic, partition);
            self.sequences.update_sequence(&key, sequence, base_offset);
        }

        let high_watermark = base_offset + records.len() as i64;
        if let Err(e) = self
            .log_dir
            .set_high_watermark(topic, partition, high_watermark)
        {
            warn!(topic, partition, error = %e, "high watermark update failed");
        }

        let bytes: u64 = records.iter().map(|r| r.serialized_size() as u64).sum();
        let ack_label = match ack {
            AckMode::Leader => "leader",
            AckMode::Quorum => "quorum",
        };
        BrokerMetrics::record_produce(topic, partition, ack_label, &timer);
        BrokerMetrics::record_produce_volume(topic, partition, records.len() as u64, bytes);

        debug!(
            topic,
            partition,
            base_offset,
            records = records.len(),
            "produce completed"
        );

        Response::Produced {
            base_offset,
            error_code: ErrorCode::Ok,
            error_message: String::new(),
        }
    }

    /// Append to the active segment; a full segment rolls once and retries.
    fn append_with_roll(
        &self,
        topic: &str,
        partition: i32,
        records: &[Record],
    ) -> weir_core::Result<i64> {
        let segment = self.log_dir.get_or_create_segment(topic, partition)?;
        match segment.append(records) {
            Err(Error::SegmentFull { .. }) => {
                info!(topic, partition, "active segment full, rolling");
                let rolled = self.log_dir.roll_segment(topic, partition)?;
                rolled.append(records)
            }
            other => other,
        }
    }

    pub async fn fetch(
        &self,
        topic: &str,
        partition: i32,
        offset: i64,
        max_bytes: i64,
    ) -> Response {
        let timer = Timer::new();

        if let Err(message) = validate_fetch(topic, partition, offset, max_bytes) {
            return fetched_error(ErrorCode::InvalidArgument, message, 0);
        }

        let segments = self.log_dir.get_segments(topic, partition);
        if segments.is_empty() {
            return Response::Fetched {
                batches: Vec::new(),
                high_watermark: 0,
                error_code: ErrorCode::Ok,
                error_message: String::new(),
            };
        }

        let log_end = segments.last().map(|s| s.end_offset()).unwrap_or(0);
        if offset > log_end {
            return fetched_error(
                ErrorCode::OffsetOutOfRange,
                format!("offset {offset} is past the log end {log_end}"),
                log_end,
            );
        }
        if offset == log_end {
            // Caught-up consumer: empty fetch carrying the current watermark.
            return Response::Fetched {
                batches: Vec::new(),
                high_watermark: log_end,
                error_code: ErrorCode::Ok,
                error_message: String::new(),
            };
        }

        let Some(segment) = segments
            .iter()
            .find(|s| offset >= s.base_offset() && offset < s.end_offset())
        else {
            // Offset sits below the oldest retained segment.
            return fetched_error(
                ErrorCode::OffsetOutOfRange,
                format!("offset {offset} precedes the oldest retained segment"),
                log_end,
            );
        };

        let batches = match segment.read(offset, max_bytes as usize) {
            Ok(batches) => batches,
            Err(e) => {
                warn!(topic, partition, offset, error = %e, "segment read failed");
                return fetched_error(ErrorCode::from(&e), e.to_string(), log_end);
            }
        };

        let batch_data: Vec<BatchData> = batches.iter().map(BatchData::from).collect();
        let bytes_out: u64 = batches.iter().map(|b| b.serialized_size() as u64).sum();
        BrokerMetrics::record_fetch(topic, partition, bytes_out, &timer);

        debug!(
            topic,
            partition,
            offset,
            batches = batch_data.len(),
            bytes_out,
            "fetch completed"
        );

        Response::Fetched {
            batches: batch_data,
            high_watermark: self.log_dir.high_watermark(topic, partition),
            error_code: ErrorCode::Ok,
            error_message: String::new(),
        }
    }
}

fn validate_produce(
    topic: &str,
    partition: i32,
    records: &[RecordData],
) -> Result<(), String> {
    if topic.is_empty() {
        return Err("topic cannot be empty".into());
    }
    if partition < 0 {
        return Err("partition must be non-negative".into());
    }
    if records.is_empty() {
        return Err("records cannot be empty".into());
    }
    Ok(())
}

fn validate_fetch(topic: &str, partition: i32, offset: i64, max_bytes: i64) -> Result<(), String> {
    if topic.is_empty() {
        return Err("topic cannot be empty".into());
    }
    if partition < 0 {
        return Err("partition must be non-negative".into());
    }
    if offset < 0 {
        return Err("offset must be non-negative".into());
    }
    if max_bytes <= 0 {
        return Err("max_bytes must be positive".into());
    }
    Ok(())
}

fn produced_error(error_code: ErrorCode, error_message: String) -> Response {
    Response::Produced {
        base_offset: -1,
        error_code,
        error_message,
    }
}

fn fetched_error(error_code: ErrorCode, error_message: String, high_watermark: i64) -> Response {
    Response::Fetched {
        batches: Vec::new(),
        high_watermark,
        error_code,
        error_message,
    }
}

#[async_trait]
impl RequestHandler for BrokerService {
    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Produce {
                topic,
                partition,
                records,
                ack,
                producer_id,
                sequence,
            } => {
                self.produce(&topic, partition, records, ack, &producer_id, sequence)
                    .await
            }
            Request::Fetch {
                topic,
                partition,
                offset,
                max_bytes,
            } => self.fetch(&topic, partition, offset, max_bytes).await,
            Request::Ping => Response::Pong,
            other => {
                warn!(?other, "request not served by the broker");
                Response::error(
                    ErrorCode::InvalidArgument,
                    "request not served by the broker",
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::tempdir;
    use weir_core::FlushPolicy;

    fn service(dir: &std::path::Path) -> BrokerService {
        let log_dir = Arc::new(LogDir::open(dir, 1 << 20, FlushPolicy::Never).unwrap());
        BrokerService::new(log_dir, SequenceCache::unbounded())
    }

    fn record_data(value: &str) -> RecordData {
        RecordData {
            key: Bytes::new(),
            value: Bytes::from(value.to_string()),
            timestamp_ms: 0,
        }
    }

    async fn produce_one(service: &BrokerService, value: &str) -> Response {
        service
            .produce("t", 0, vec![record_data(value)], AckMode::Leader, "", 0)
            .await
    }

    #[tokio::test]
    async fn produce_assigns_increasing_offsets() {
        let dir = tempdir().unwrap();
        let service = service(dir.path());

        let mut previous = -1;
        for i in 0..5 {
            match produce_one(&service, &format!("v{i}")).await {
                Response::Produced {
                    base_offset,
                    error_code: ErrorCode::Ok,
                    ..
                } => {
                    assert!(base_offset > previous);
                    previous = base_offset;
                }
                other => panic!("unexpected response {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn produce_validates_input() {
        let dir = tempdir().unwrap();
        let service = service(dir.path());

        for (topic, partition, records) in [
            ("", 0, vec![record_data("v")]),
            ("t", -1, vec![record_data("v")]),
            ("t", 0, vec![]),
        ] {
            match service
                .produce(topic, partition, records, AckMode::Leader, "", 0)
                .await
            {
                Response::Produced { error_code, .. } => {
                    assert_eq!(error_code, ErrorCode::InvalidArgument)
                }
                other => panic!("unexpected response {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn zero_timestamps_get_stamped() {
        let dir = tempdir().unwrap();
        let service = service(dir.path());
        produce_one(&service, "v").await;

        match service.fetch("t", 0, 0, 1 << 20).await {
            Response::Fetched { batches, .. } => {
                assert!(batches[0].records[0].timestamp_ms > 0);
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[tokio::test]
    async fn idempotent_replay_returns_cached_offset() {
        let dir = tempdir().unwrap();
        let service = service(dir.path());

        let first = service
            .produce("t", 0, vec![record_data("v")], AckMode::Leader, "p1", 0)
            .await;
        let Response::Produced {
            base_offset: original,
            error_code: ErrorCode::Ok,
            ..
        } = first
        else {
            panic!("first produce failed: {first:?}");
        };
        assert_eq!(original, 0);

        // Identical retry.
        match service
            .produce("t", 0, vec![record_data("v")], AckMode::Leader, "p1", 0)
            .await
        {
            Response::Produced {
                base_offset,
                error_code,
                ..
            } => {
                assert_eq!(error_code, ErrorCode::IdempotentReplay);
                assert_eq!(base_offset, original);
            }
            other => panic!("unexpected response {other:?}"),
        }

        // The log holds exactly one record.
        match service.fetch("t", 0, 0, 1 << 20).await {
            Response::Fetched { batches, .. } => {
                let total: usize = batches.iter().map(|b| b.records.len()).sum();
                assert_eq!(total, 1);
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[tokio::test]
    async fn sequence_gaps_are_rejected() {
        let dir = tempdir().unwrap();
        let service = service(dir.path());

        service
            .produce("t", 0, vec![record_data("a")], AckMode::Leader, "p1", 0)
            .await;
        match service
            .produce("t", 0, vec![record_data("b")], AckMode::Leader, "p1", 2)
            .await
        {
            Response::Produced { error_code, .. } => {
                assert_eq!(error_code, ErrorCode::IdempotentReplay)
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetch_semantics_at_boundaries() {
        let dir = tempdir().unwrap();
        let service = service(dir.path());

        // No segments yet.
        match service.fetch("t", 0, 0, 1024).await {
            Response::Fetched {
                batches,
                high_watermark,
                error_code,
                ..
            } => {
                assert!(batches.is_empty());
                assert_eq!(high_watermark, 0);
                assert_eq!(error_code, ErrorCode::Ok);
            }
            other => panic!("unexpected response {other:?}"),
        }

        for i in 0..3 {
            produce_one(&service, &format!("v{i}")).await;
        }

        // At the log end: empty, not an error.
        match service.fetch("t", 0, 3, 1024).await {
            Response::Fetched {
                batches,
                high_watermark,
                error_code,
                ..
            } => {
                assert!(batches.is_empty());
                assert_eq!(high_watermark, 3);
                assert_eq!(error_code, ErrorCode::Ok);
            }
            other => panic!("unexpected response {other:?}"),
        }

        // Past the log end: out of range, carries the log end.
        match service.fetch("t", 0, 4, 1024).await {
            Response::Fetched {
                high_watermark,
                error_code,
                ..
            } => {
                assert_eq!(error_code, ErrorCode::OffsetOutOfRange);
                assert_eq!(high_watermark, 3);
            }
            other => panic!("unexpected response {other:?}"),
        }

        // max_bytes smaller than the first batch: zero batches.
        match service.fetch("t", 0, 0, 4).await {
            Response::Fetched {
                batches,
                error_code,
                ..
            } => {
                assert!(batches.is_empty());
                assert_eq!(error_code, ErrorCode::Ok);
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[tokio::test]
    async fn high_watermark_tracks_appends() {
        let dir = tempdir().unwrap();
        let service = service(dir.path());

        for i in 0..3 {
            produce_one(&service, &format!("v{i}")).await;
        }
        assert_eq!(service.log_dir().high_watermark("t", 0), 3);

        match service.fetch("t", 0, 0, 1 << 20).await {
            Response::Fetched {
                high_watermark, ..
            } => assert_eq!(high_watermark, 3),
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[tokio::test]
    async fn full_segment_rolls_and_append_succeeds() {
        let dir = tempdir().unwrap();
        let log_dir = Arc::new(LogDir::open(dir.path(), 200, FlushPolicy::Never).unwrap());
        let service = BrokerService::new(log_dir, SequenceCache::unbounded());

        // Enough appends to overflow several 200-byte segments.
        for i in 0..6 {
            match produce_one(&service, &format!("value-{i}")).await {
                Response::Produced {
                    base_offset,
                    error_code: ErrorCode::Ok,
                    ..
                } => assert_eq!(base_offset, i),
                other => panic!("produce {i} failed: {other:?}"),
            }
        }
        assert!(service.log_dir().get_segments("t", 0).len() > 1);
    }
}
