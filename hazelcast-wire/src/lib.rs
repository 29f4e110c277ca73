//! Wire-level types for the Hazelcast client protocol.
//!
//! Frames and client messages, the `tokio_util` codec, server error codes
//! and the error type shared by the client crates.

#![warn(missing_docs)]

pub mod error;
pub mod protocol;

pub use error::{HazelcastError, RemoteError, Result};
pub use protocol::{ClientMessage, ClientMessageCodec, ErrorCode, Frame};
