//! # weir-client
//!
//! Async clients for the Weir broker (produce/fetch), controller (topic
//! admin), and coordinator (group membership and offsets), all speaking the
//! length-framed bincode protocol from `weir-protocol`.

pub mod client;
pub mod error;

pub use client::{
    BrokerClient, Connection, ControllerClient, CoordinatorClient, FetchOutcome, ProduceOutcome,
};
pub use error::{Error, Result};
