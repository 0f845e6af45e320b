//! # weir-broker
//!
//! The data plane: owns the log directory and the producer sequence cache,
//! and serves Produce and Fetch over the shared framed-TCP transport.

pub mod health;
pub mod metrics;
pub mod service;

pub use service::BrokerService;
