//! Daemon configuration, loaded from YAML files with serde defaults so a
//! missing key falls back to the documented default.

use crate::storage::FlushPolicy;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub log_dir: String,
    pub max_segment_size_bytes: u64,
    pub segment_roll_interval_ms: i64,
    pub max_inflight_bytes: u64,
    pub replication_factor: i32,
    pub min_insync_replicas: i32,
    pub request_timeout_ms: i32,
    pub flush_policy: FlushPolicy,
    /// Per-partition retention budget; `None` disables the retention sweep.
    pub retention_bytes: Option<u64>,
    pub metrics_port: u16,
    pub log_level: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            id: "broker-1".to_string(),
            host: "127.0.0.1".to_string(),
            port: 9092,
            log_dir: "./data".to_string(),
            max_segment_size_bytes: 128 * 1024 * 1024,
            segment_roll_interval_ms: 3_600_000,
            max_inflight_bytes: 100 * 1024 * 1024,
            replication_factor: 1,
            min_insync_replicas: 1,
            request_timeout_ms: 30_000,
            flush_policy: FlushPolicy::OnRoll,
            retention_bytes: None,
            metrics_port: 8080,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub heartbeat_interval_ms: i32,
    pub session_timeout_ms: i32,
    pub metrics_port: u16,
    pub log_level: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            id: "controller-1".to_string(),
            host: "127.0.0.1".to_string(),
            port: 9093,
            heartbeat_interval_ms: 10_000,
            session_timeout_ms: 30_000,
            metrics_port: 8081,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub offset_storage_path: String,
    pub heartbeat_interval_ms: i32,
    pub session_timeout_ms: i32,
    pub rebalance_timeout_ms: i32,
    /// Controller address consulted for partition counts; empty disables the
    /// lookup and the fixed fallback count applies.
    pub controller_addr: String,
    pub metrics_port: u16,
    pub log_level: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            id: "coordinator-1".to_string(),
            host: "127.0.0.1".to_string(),
            port: 9094,
            offset_storage_path: "./offsets".to_string(),
            heartbeat_interval_ms: 10_000,
            session_timeout_ms: 30_000,
            rebalance_timeout_ms: 300_000,
            controller_addr: String::new(),
            metrics_port: 8082,
            log_level: "info".to_string(),
        }
    }
}

pub fn load_config<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| Error::io_at(path, e))?;
    serde_yaml::from_str(&content)
        .map_err(|e| Error::InvalidConfig(format!("{}: {e}", path.display())))
}

macro_rules! listen_addr {
    ($ty:ty) => {
        impl $ty {
            pub fn listen_addr(&self) -> String {
                format!("{}:{}", self.host, self.port)
            }

            pub fn metrics_addr(&self) -> String {
                format!("{}:{}", self.host, self.metrics_port)
            }
        }
    };
}

listen_addr!(BrokerConfig);
listen_addr!(ControllerConfig);
listen_addr!(CoordinatorConfig);

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn broker_defaults() {
        let config = BrokerConfig::default();
        assert_eq!(config.port, 9092);
        assert_eq!(config.max_segment_size_bytes, 128 * 1024 * 1024);
        assert_eq!(config.flush_policy, FlushPolicy::OnRoll);
        assert_eq!(config.min_insync_replicas, 1);
        assert_eq!(config.listen_addr(), "127.0.0.1:9092");
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broker.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "id: broker-7\nport: 19092\nflush_policy: eachbatch").unwrap();

        let config: BrokerConfig = load_config(&path).unwrap();
        assert_eq!(config.id, "broker-7");
        assert_eq!(config.port, 19092);
        assert_eq!(config.flush_policy, FlushPolicy::EachBatch);
        // Untouched keys keep their defaults.
        assert_eq!(config.max_segment_size_bytes, 128 * 1024 * 1024);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn coordinator_defaults() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.port, 9094);
        assert_eq!(config.session_timeout_ms, 30_000);
        assert_eq!(config.rebalance_timeout_ms, 300_000);
        assert!(config.controller_addr.is_empty());
    }

    #[test]
    fn bad_yaml_is_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broker.yaml");
        std::fs::write(&path, "port: not-a-number").unwrap();
        assert!(matches!(
            load_config::<BrokerConfig>(&path),
            Err(Error::InvalidConfig(_))
        ));
    }
}
