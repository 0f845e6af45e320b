//! Broker request metrics, `weir_broker_*` namespace.

use weir_core::metrics::Timer;

pub struct BrokerMetrics;

impl BrokerMetrics {
    pub fn record_produce(topic: &str, partition: i32, ack: &str, timer: &Timer) {
        let labels = [
            ("topic", topic.to_string()),
            ("partition", partition.to_string()),
            ("ack", ack.to_string()),
        ];
        metrics::counter!("weir_broker_produce_requests_total", &labels).increment(1);
        metrics::histogram!("weir_broker_produce_latency_ms", &labels).record(timer.elapsed_ms());
    }

    pub fn record_produce_volume(topic: &str, partition: i32, records: u64, bytes: u64) {
        let labels = [
            ("topic", topic.to_string()),
            ("partition", partition.to_string()),
        ];
        metrics::counter!("weir_broker_produce_records_total", &labels).increment(records);
        metrics::counter!("weir_broker_produce_bytes_total", &labels).increment(bytes);
    }

    pub fn record_fetch(topic: &str, partition: i32, bytes_out: u64, timer: &Timer) {
        let labels = [
            ("topic", topic.to_string()),
            ("partition", partition.to_string()),
        ];
        metrics::counter!("weir_broker_fetch_requests_total", &labels).increment(1);
        metrics::counter!("weir_broker_fetch_bytes_total", &labels).increment(bytes_out);
        metrics::histogram!("weir_broker_fetch_latency_ms", &labels).record(timer.elapsed_ms());
    }

    pub fn record_idempotent_replay(topic: &str, partition: i32) {
        let labels = [
            ("topic", topic.to_string()),
            ("partition", partition.to_string()),
        ];
        metrics::counter!("weir_broker_idempotent_replays_total", &labels).increment(1);
    }
}
