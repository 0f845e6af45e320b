//! # weir-protocol
//!
//! The wire protocol shared by the broker, controller, and coordinator:
//! request/response types, in-band error codes, length-prefixed framing, and
//! the common TCP server loop.

pub mod codes;
pub mod framing;
pub mod messages;
pub mod server;

pub use codes::ErrorCode;
pub use framing::{read_frame, write_frame, FrameError, MAX_FRAME_BYTES};
pub use messages::{
    AckMode, BatchData, CommittedEntry, PartitionMetadata, RecordData, Request, Response,
    TopicAssignment,
};
pub use server::{RequestHandler, Server};
