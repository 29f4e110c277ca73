//! Hazelcast Open Binary Protocol implementation.
//!
//! This module provides the message envelope used to talk to Hazelcast
//! members: frames, multi-frame client messages, the framed codec and the
//! server error table. Operation payloads are left to higher layers.

mod client_message;
mod codec;
pub mod constants;
mod error_codes;
mod error_holder;
mod frame;

pub use client_message::{compute_partition_hash, ClientMessage};
pub use codec::{ClientMessageCodec, DEFAULT_MAX_MESSAGE_SIZE};
pub use constants::*;
pub use error_codes::ErrorCode;
pub use error_holder::{decode_error, encode_error};
pub use frame::Frame;
