//! Codec implementation for encoding/decoding Hazelcast protocol messages.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use super::constants::*;
use super::frame::{peek_frame_length, Frame};
use super::ClientMessage;
use crate::error::{HazelcastError, Result};

/// Largest message the decoder accepts by default, across all its frames.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Codec for encoding and decoding Hazelcast client messages.
///
/// Implements the `tokio_util::codec::{Encoder, Decoder}` traits for use
/// with tokio's framed I/O. A message ends at the first frame carrying the
/// FINAL flag. Messages larger than the configured maximum are rejected
/// before their frames are buffered.
#[derive(Debug)]
pub struct ClientMessageCodec {
    /// Frames accumulated while decoding a multi-frame message.
    pending_frames: Vec<Frame>,
    pending_size: usize,
    max_message_size: usize,
}

impl ClientMessageCodec {
    /// Creates a new codec instance.
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Creates a codec that rejects messages larger than `max_message_size`.
    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self {
            pending_frames: Vec::new(),
            pending_size: 0,
            max_message_size,
        }
    }
}

impl Default for ClientMessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder<ClientMessage> for ClientMessageCodec {
    type Error = HazelcastError;

    fn encode(&mut self, mut item: ClientMessage, dst: &mut BytesMut) -> Result<()> {
        if item.is_empty() {
            return Err(HazelcastError::Protocol(
                "cannot encode empty message".to_string(),
            ));
        }

        item.write_to(dst);
        Ok(())
    }
}

impl Decoder for ClientMessageCodec {
    type Item = ClientMessage;
    type Error = HazelcastError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            let Some(frame_length) = peek_frame_length(src) else {
                return Ok(None);
            };

            if frame_length < FRAME_HEADER_SIZE {
                return Err(HazelcastError::Protocol(format!(
                    "frame length {} is smaller than the frame header",
                    frame_length
                )));
            }

            let message_size = self.pending_size.saturating_add(frame_length);
            if message_size > self.max_message_size {
                return Err(HazelcastError::Protocol(format!(
                    "message of at least {} bytes exceeds the limit of {} bytes",
                    message_size, self.max_message_size
                )));
            }

            if src.len() < frame_length {
                src.reserve(frame_length - src.len());
                return Ok(None);
            }

            let frame = Frame::read_from(src)
                .ok_or_else(|| HazelcastError::Protocol("failed to read frame".to_string()))?;
            let is_final = frame.is_final_frame();
            self.pending_frames.push(frame);
            self.pending_size = message_size;

            if is_final {
                self.pending_size = 0;
                let frames = std::mem::take(&mut self.pending_frames);
                return Ok(Some(ClientMessage::from_frames(frames)));
            }
        }
    }
}
