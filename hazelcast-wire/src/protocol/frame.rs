//! Frame type for the Hazelcast Open Binary Protocol.

use bytes::{Buf, BufMut, BytesMut};

use super::constants::*;

/// A single frame in the Hazelcast protocol.
///
/// Each frame consists of:
/// - A 4-byte length field (little-endian), counting the whole frame
/// - A 2-byte flags field (little-endian)
/// - Variable-length content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The frame content (payload after flags).
    pub content: BytesMut,
    /// Frame flags indicating frame type and properties.
    pub flags: u16,
}

impl Frame {
    /// Creates a new frame with the given content and flags.
    pub fn new(content: BytesMut, flags: u16) -> Self {
        Self { content, flags }
    }

    /// Creates a new frame with content and default flags.
    pub fn with_content(content: BytesMut) -> Self {
        Self::new(content, DEFAULT_FLAGS)
    }

    /// Creates a new empty frame with the given flags.
    pub fn with_flags(flags: u16) -> Self {
        Self::new(BytesMut::new(), flags)
    }

    /// Creates a new frame with the given capacity and flags.
    pub fn with_capacity(capacity: usize, flags: u16) -> Self {
        Self::new(BytesMut::with_capacity(capacity), flags)
    }

    /// Creates a frame holding a UTF-8 string.
    pub fn new_string_frame(value: &str) -> Self {
        Self::with_content(BytesMut::from(value.as_bytes()))
    }

    /// Creates a frame that opens a nested data structure.
    pub fn new_begin_frame() -> Self {
        Self::with_flags(BEGIN_DATA_STRUCTURE_FLAG)
    }

    /// Creates a frame that closes a nested data structure.
    pub fn new_end_frame() -> Self {
        Self::with_flags(END_DATA_STRUCTURE_FLAG)
    }

    /// Creates a null frame (represents a null value).
    pub fn new_null_frame() -> Self {
        Self::with_flags(IS_NULL_FLAG)
    }

    /// Returns true if this frame opens a nested data structure.
    pub fn is_begin_frame(&self) -> bool {
        self.flags & BEGIN_DATA_STRUCTURE_FLAG != 0
    }

    /// Returns true if this frame closes a nested data structure.
    pub fn is_end_frame(&self) -> bool {
        self.flags & END_DATA_STRUCTURE_FLAG != 0
    }

    /// Returns true if this frame has the NULL flag set.
    pub fn is_null_frame(&self) -> bool {
        self.flags & IS_NULL_FLAG != 0
    }

    /// Returns true if this frame has the FINAL flag set.
    pub fn is_final_frame(&self) -> bool {
        self.flags & IS_FINAL_FLAG != 0
    }

    /// Returns true if this frame has the EVENT flag set.
    pub fn is_event_frame(&self) -> bool {
        self.flags & IS_EVENT_FLAG != 0
    }

    /// Returns true if this frame has the BACKUP_EVENT flag set.
    pub fn is_backup_event_frame(&self) -> bool {
        self.flags & BACKUP_EVENT_FLAG != 0
    }

    /// Returns the size of this frame on the wire, which is also the value
    /// written in its length field.
    pub fn wire_size(&self) -> usize {
        FRAME_HEADER_SIZE + self.content.len()
    }

    /// Writes this frame to the given buffer.
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(self.wire_size());
        dst.put_u32_le(self.wire_size() as u32);
        dst.put_u16_le(self.flags);
        dst.put_slice(&self.content);
    }

    /// Reads a frame from the given buffer.
    ///
    /// Returns `None` if there isn't enough data to read a complete frame, or if
    /// the length field is smaller than the frame header.
    pub fn read_from(src: &mut BytesMut) -> Option<Self> {
        let frame_length = peek_frame_length(src)?;
        if frame_length < FRAME_HEADER_SIZE || src.len() < frame_length {
            return None;
        }

        src.advance(SIZE_OF_FRAME_LENGTH_FIELD);
        let flags = src.get_u16_le();
        let content = src.split_to(frame_length - FRAME_HEADER_SIZE);

        Some(Self::new(content, flags))
    }
}

/// Reads the length field of the next frame without consuming it.
pub(crate) fn peek_frame_length(src: &BytesMut) -> Option<usize> {
    if src.len() < SIZE_OF_FRAME_LENGTH_FIELD {
        return None;
    }
    Some(u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize)
}

impl Default for Frame {
    fn default() -> Self {
        Self::with_flags(DEFAULT_FLAGS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_flags() {
        let begin = Frame::new_begin_frame();
        assert!(begin.is_begin_frame());
        assert!(!begin.is_end_frame());

        let end = Frame::new_end_frame();
        assert!(!end.is_begin_frame());
        assert!(end.is_end_frame());

        assert!(Frame::new_null_frame().is_null_frame());
        assert!(Frame::with_flags(IS_FINAL_FLAG).is_final_frame());
        assert!(Frame::with_flags(IS_EVENT_FLAG).is_event_frame());
        assert!(Frame::with_flags(BACKUP_EVENT_FLAG).is_backup_event_frame());
    }

    #[test]
    fn test_wire_size_counts_header() {
        assert_eq!(Frame::default().wire_size(), 6);

        let with_content = Frame::with_content(BytesMut::from(&[1, 2, 3, 4, 5][..]));
        assert_eq!(with_content.wire_size(), 11);
    }

    #[test]
    fn test_write_and_read_frame() {
        let original = Frame::new(BytesMut::from(&[0xDE, 0xAD, 0xBE, 0xEF][..]), IS_FINAL_FLAG);
        let mut buf = BytesMut::new();
        original.write_to(&mut buf);

        assert_eq!(buf.len(), original.wire_size());
        assert_eq!(&buf[..4], &10u32.to_le_bytes());

        let decoded = Frame::read_from(&mut buf).unwrap();
        assert_eq!(decoded, original);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_read_incomplete_length() {
        let mut buf = BytesMut::from(&[0x01, 0x02][..]);
        assert!(Frame::read_from(&mut buf).is_none());
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_read_incomplete_content() {
        let mut buf = BytesMut::from(&[
            0x0A, 0x00, 0x00, 0x00, // length = 10 (header + 4 bytes content)
            0x00, 0x20, // flags
            0x01, 0x02, // only 2 bytes of content
        ][..]);
        assert!(Frame::read_from(&mut buf).is_none());
        assert_eq!(buf.len(), 8);
    }

    #[test]
    fn test_read_empty_frame() {
        let mut buf = BytesMut::from(&[
            0x06, 0x00, 0x00, 0x00, // length = 6 (just the header)
            0x00, 0x08, // END_DATA_STRUCTURE_FLAG
        ][..]);

        let frame = Frame::read_from(&mut buf).unwrap();
        assert!(frame.is_end_frame());
        assert!(frame.content.is_empty());
    }

    #[test]
    fn test_read_rejects_length_below_header() {
        let mut buf = BytesMut::from(&[0x02, 0x00, 0x00, 0x00, 0x00, 0x00][..]);
        assert!(Frame::read_from(&mut buf).is_none());
    }

    #[test]
    fn test_new_string_frame() {
        let frame = Frame::new_string_frame("dev");
        assert_eq!(&frame.content[..], b"dev");
        assert_eq!(frame.flags, DEFAULT_FLAGS);
    }
}
