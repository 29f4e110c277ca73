//! ClientMessage type for multi-frame Hazelcast protocol messages.

use bytes::{BufMut, BytesMut};

use super::constants::*;
use super::frame::Frame;

/// A client message composed of one or more frames.
///
/// The first frame is the "initial frame" containing the message header
/// (type, correlation ID, and partition ID for requests and events, or the
/// backup-ack count for responses). Additional frames carry the payload,
/// which this crate never interprets beyond error responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientMessage {
    frames: Vec<Frame>,
}

impl ClientMessage {
    /// Creates a new empty client message.
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// Creates a request message with the given type and partition ID.
    ///
    /// The correlation ID is left at zero; it is assigned when the request is
    /// handed to a connection.
    pub fn create_for_encode(message_type: i32, partition_id: i32) -> Self {
        let mut initial_frame = Frame::with_capacity(REQUEST_HEADER_SIZE, UNFRAGMENTED_MESSAGE);
        initial_frame.content.put_i32_le(message_type);
        initial_frame.content.put_i64_le(0);
        initial_frame.content.put_i32_le(partition_id);

        Self {
            frames: vec![initial_frame],
        }
    }

    /// Creates a request message targeting any partition.
    pub fn create_for_encode_any_partition(message_type: i32) -> Self {
        Self::create_for_encode(message_type, PARTITION_ID_ANY)
    }

    /// Creates a response message correlated to the given request.
    pub fn create_response(message_type: i32, correlation_id: i64) -> Self {
        let mut initial_frame = Frame::with_capacity(RESPONSE_HEADER_SIZE, UNFRAGMENTED_MESSAGE);
        initial_frame.content.put_i32_le(message_type);
        initial_frame.content.put_i64_le(correlation_id);
        initial_frame.content.put_u8(0);

        Self {
            frames: vec![initial_frame],
        }
    }

    /// Creates an event message delivered under the given subscription
    /// correlation ID.
    pub fn create_event(message_type: i32, correlation_id: i64, partition_id: i32) -> Self {
        let mut initial_frame =
            Frame::with_capacity(EVENT_HEADER_SIZE, UNFRAGMENTED_MESSAGE | IS_EVENT_FLAG);
        initial_frame.content.put_i32_le(message_type);
        initial_frame.content.put_i64_le(correlation_id);
        initial_frame.content.put_i32_le(partition_id);

        Self {
            frames: vec![initial_frame],
        }
    }

    /// Creates a client message from received frames.
    pub fn from_frames(frames: Vec<Frame>) -> Self {
        Self { frames }
    }

    /// Returns the message type from the initial frame.
    ///
    /// Returns `None` if there is no initial frame or if the frame content
    /// is too short to contain a message type field.
    pub fn message_type(&self) -> Option<i32> {
        self.header_i32(TYPE_FIELD_OFFSET)
    }

    /// Returns the correlation ID from the initial frame.
    ///
    /// Returns `None` if there is no initial frame or if the frame content
    /// is too short to contain a correlation ID field.
    pub fn correlation_id(&self) -> Option<i64> {
        let frame = self.frames.first()?;
        let bytes = frame
            .content
            .get(CORRELATION_ID_OFFSET..CORRELATION_ID_OFFSET + 8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Some(i64::from_le_bytes(raw))
    }

    /// Sets the correlation ID in the initial frame.
    ///
    /// A no-op when the initial frame is too short to hold one.
    pub fn set_correlation_id(&mut self, correlation_id: i64) {
        if let Some(frame) = self.frames.first_mut() {
            if frame.content.len() >= CORRELATION_ID_OFFSET + 8 {
                frame.content[CORRELATION_ID_OFFSET..CORRELATION_ID_OFFSET + 8]
                    .copy_from_slice(&correlation_id.to_le_bytes());
            }
        }
    }

    /// Returns the partition ID from the initial frame (requests and events).
    ///
    /// Returns `None` if there is no initial frame or if the frame content
    /// is too short to contain a partition ID field.
    pub fn partition_id(&self) -> Option<i32> {
        self.header_i32(PARTITION_ID_OFFSET)
    }

    /// Sets the partition ID in the initial frame.
    pub fn set_partition_id(&mut self, partition_id: i32) {
        if let Some(frame) = self.frames.first_mut() {
            if frame.content.len() >= PARTITION_ID_OFFSET + 4 {
                frame.content[PARTITION_ID_OFFSET..PARTITION_ID_OFFSET + 4]
                    .copy_from_slice(&partition_id.to_le_bytes());
            }
        }
    }

    /// Marks the message as a complete unit sent in a single fragment.
    pub fn mark_unfragmented(&mut self) {
        if let Some(frame) = self.frames.first_mut() {
            frame.flags |= UNFRAGMENTED_MESSAGE;
        }
    }

    /// Returns the flags of the initial frame, or zero for an empty message.
    pub fn header_flags(&self) -> u16 {
        self.frames.first().map(|f| f.flags).unwrap_or(DEFAULT_FLAGS)
    }

    /// Adds a frame to the message.
    pub fn add_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    /// Returns a reference to the initial (first) frame, if present.
    pub fn initial_frame(&self) -> Option<&Frame> {
        self.frames.first()
    }

    /// Returns a reference to all frames.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Returns the number of frames in the message.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Returns true if the message has no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Calculates the total size of the message on the wire.
    pub fn wire_size(&self) -> usize {
        self.frames.iter().map(Frame::wire_size).sum()
    }

    /// Writes all frames to the destination buffer.
    ///
    /// Sets the FINAL flag on the last frame before writing.
    pub fn write_to(&mut self, dst: &mut BytesMut) {
        if let Some(last) = self.frames.last_mut() {
            last.flags |= IS_FINAL_FLAG;
        }
        for frame in &self.frames {
            frame.write_to(dst);
        }
    }

    /// Returns true if this message is flagged as an event.
    pub fn is_event(&self) -> bool {
        self.header_flags() & IS_EVENT_FLAG != 0
    }

    /// Returns true if this message is flagged as a backup event.
    pub fn is_backup_event(&self) -> bool {
        self.header_flags() & BACKUP_EVENT_FLAG != 0
    }

    /// Returns true if this message is an error response.
    pub fn is_exception(&self) -> bool {
        self.message_type() == Some(EXCEPTION_MESSAGE_TYPE)
    }

    fn header_i32(&self, offset: usize) -> Option<i32> {
        let frame = self.frames.first()?;
        let bytes = frame.content.get(offset..offset + 4)?;
        Some(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

impl Default for ClientMessage {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes a partition hash for the given key data.
///
/// Uses MurmurHash3 algorithm compatible with Hazelcast.
pub fn compute_partition_hash(key: &[u8]) -> i32 {
    murmur_hash3_x86_32(key, 0x01000193)
}

/// MurmurHash3 x86 32-bit implementation.
fn murmur_hash3_x86_32(data: &[u8], seed: u32) -> i32 {
    const C1: u32 = 0xcc9e2d51;
    const C2: u32 = 0x1b873593;

    let len = data.len();
    let mut h1 = seed;

    let mut blocks = data.chunks_exact(4);
    for block in &mut blocks {
        let mut k1 = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        k1 = k1.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);

        h1 ^= k1;
        h1 = h1.rotate_left(13);
        h1 = h1.wrapping_mul(5).wrapping_add(0xe6546b64);
    }

    let tail = blocks.remainder();
    if !tail.is_empty() {
        let mut k1: u32 = 0;
        for (i, byte) in tail.iter().enumerate() {
            k1 ^= (*byte as u32) << (8 * i);
        }
        k1 = k1.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        h1 ^= k1;
    }

    h1 ^= len as u32;
    h1 ^= h1 >> 16;
    h1 = h1.wrapping_mul(0x85ebca6b);
    h1 ^= h1 >> 13;
    h1 = h1.wrapping_mul(0xc2b2ae35);
    h1 ^= h1 >> 16;

    h1 as i32
}
