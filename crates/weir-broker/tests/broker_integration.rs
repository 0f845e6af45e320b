//! End-to-end broker tests over the wire: a real server on a random port, a
//! real client, a scratch log directory per test.

use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::broadcast;
use weir_broker::BrokerService;
use weir_client::BrokerClient;
use weir_core::{FlushPolicy, LogDir, SequenceCache};
use weir_protocol::{AckMode, ErrorCode, RecordData, Server};

async fn start_broker(log_dir: Arc<LogDir>) -> (String, broadcast::Sender<()>) {
    let service = Arc::new(BrokerService::new(log_dir, SequenceCache::unbounded()));
    let (shutdown_tx, _) = broadcast::channel(1);
    let server = Server::bind("127.0.0.1:0", service, shutdown_tx.clone())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap().to_string();
    tokio::spawn(server.run());
    (addr, shutdown_tx)
}

fn record(key: &str, value: &str) -> RecordData {
    RecordData {
        key: Bytes::from(key.to_string()),
        value: Bytes::from(value.to_string()),
        timestamp_ms: 0,
    }
}

#[tokio::test]
async fn produce_then_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let log_dir = Arc::new(LogDir::open(dir.path(), 1 << 20, FlushPolicy::OnRoll).unwrap());
    let (addr, shutdown) = start_broker(log_dir).await;

    let mut client = BrokerClient::connect(&addr).await.unwrap();

    let outcome = client
        .produce(
            "t",
            0,
            vec![
                record("k1", "v1"),
                record("k2", "v2"),
                record("k3", "v3"),
            ],
            AckMode::Leader,
            "",
            0,
        )
        .await
        .unwrap();
    assert_eq!(outcome.error_code, ErrorCode::Ok);
    assert_eq!(outcome.base_offset, 0);

    let fetched = client.fetch("t", 0, 0, 1_048_576).await.unwrap();
    assert_eq!(fetched.error_code, ErrorCode::Ok);
    assert_eq!(fetched.high_watermark, 3);
    assert_eq!(fetched.batches.len(), 1);

    let records = &fetched.batches[0].records;
    assert_eq!(records.len(), 3);
    let keys: Vec<&[u8]> = records.iter().map(|r| r.key.as_ref()).collect();
    assert_eq!(keys, vec![&b"k1"[..], b"k2", b"k3"]);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn idempotent_replay_over_the_wire() {
    let dir = tempfile::tempdir().unwrap();
    let log_dir = Arc::new(LogDir::open(dir.path(), 1 << 20, FlushPolicy::OnRoll).unwrap());
    let (addr, shutdown) = start_broker(log_dir).await;

    let mut client = BrokerClient::connect(&addr).await.unwrap();

    let first = client
        .produce("t", 0, vec![record("", "r0")], AckMode::Leader, "p1", 0)
        .await
        .unwrap();
    assert_eq!(first.error_code, ErrorCode::Ok);
    assert_eq!(first.base_offset, 0);

    let retry = client
        .produce("t", 0, vec![record("", "r0")], AckMode::Leader, "p1", 0)
        .await
        .unwrap();
    assert_eq!(retry.error_code, ErrorCode::IdempotentReplay);
    assert_eq!(retry.base_offset, 0, "replay carries the original offset");

    // Exactly one record in the log.
    let fetched = client.fetch("t", 0, 0, 1_048_576).await.unwrap();
    let total: usize = fetched.batches.iter().map(|b| b.records.len()).sum();
    assert_eq!(total, 1);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn different_partitions_have_independent_offsets() {
    let dir = tempfile::tempdir().unwrap();
    let log_dir = Arc::new(LogDir::open(dir.path(), 1 << 20, FlushPolicy::OnRoll).unwrap());
    let (addr, shutdown) = start_broker(log_dir).await;

    let mut client = BrokerClient::connect(&addr).await.unwrap();
    for partition in 0..3 {
        let outcome = client
            .produce(
                "t",
                partition,
                vec![record("", "x")],
                AckMode::Leader,
                "",
                0,
            )
            .await
            .unwrap();
        assert_eq!(outcome.base_offset, 0, "each partition starts at zero");
    }

    let _ = shutdown.send(());
}

#[tokio::test]
async fn crash_truncation_then_resume() {
    let dir = tempfile::tempdir().unwrap();

    // First broker lifetime: five batches, flushed.
    {
        let log_dir =
            Arc::new(LogDir::open(dir.path(), 1 << 20, FlushPolicy::EachBatch).unwrap());
        let service = BrokerService::new(log_dir.clone(), SequenceCache::unbounded());
        for i in 0..5 {
            let response = service
                .produce(
                    "t",
                    0,
                    vec![record("", &format!("v{i}"))],
                    AckMode::Leader,
                    "",
                    0,
                )
                .await;
            match response {
                weir_protocol::Response::Produced {
                    error_code: ErrorCode::Ok,
                    ..
                } => {}
                other => panic!("produce failed: {other:?}"),
            }
        }
        log_dir.close_all().unwrap();
    }

    // Simulate a crash 20 bytes into a 6th frame write. Reopening the
    // segment first trims the preallocated tail so the clean size is the
    // logical end of batch five.
    let log_path = dir.path().join("t").join("0").join("0.log");
    let clean_size = {
        let segment = weir_core::Segment::open(
            &dir.path().join("t").join("0"),
            0,
            1 << 20,
            FlushPolicy::Never,
        )
        .unwrap();
        segment.size()
    };
    {
        use std::io::{Seek, SeekFrom, Write};
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .open(&log_path)
            .unwrap();
        file.set_len(clean_size).unwrap();
        file.seek(SeekFrom::End(0)).unwrap();
        file.write_all(&[0x42; 20]).unwrap();
    }

    // Second broker lifetime: recovery truncates, reads see five batches, and
    // the next produce lands as batch six.
    let log_dir = Arc::new(LogDir::open(dir.path(), 1 << 20, FlushPolicy::OnRoll).unwrap());
    let (addr, shutdown) = start_broker(log_dir).await;
    let mut client = BrokerClient::connect(&addr).await.unwrap();

    let fetched = client.fetch("t", 0, 0, 1_048_576).await.unwrap();
    assert_eq!(fetched.batches.len(), 5);
    assert_eq!(
        std::fs::metadata(&log_path).unwrap().len(),
        clean_size,
        "log truncated at the last valid frame"
    );

    let outcome = client
        .produce("t", 0, vec![record("", "v5")], AckMode::Leader, "", 0)
        .await
        .unwrap();
    assert_eq!(outcome.error_code, ErrorCode::Ok);
    assert_eq!(outcome.base_offset, 5);

    let fetched = client.fetch("t", 0, 0, 1_048_576).await.unwrap();
    assert_eq!(fetched.batches.len(), 6);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn fetch_out_of_range_reports_log_end() {
    let dir = tempfile::tempdir().unwrap();
    let log_dir = Arc::new(LogDir::open(dir.path(), 1 << 20, FlushPolicy::OnRoll).unwrap());
    let (addr, shutdown) = start_broker(log_dir).await;

    let mut client = BrokerClient::connect(&addr).await.unwrap();
    client
        .produce("t", 0, vec![record("", "v")], AckMode::Leader, "", 0)
        .await
        .unwrap();

    let fetched = client.fetch("t", 0, 10, 1024).await.unwrap();
    assert_eq!(fetched.error_code, ErrorCode::OffsetOutOfRange);
    assert_eq!(fetched.high_watermark, 1);
    assert!(fetched.batches.is_empty());

    let _ = shutdown.send(());
}
