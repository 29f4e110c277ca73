//! Decoding of error responses sent by cluster members.
//!
//! After the initial frame an error response carries a list of error
//! holders, outermost cause first. Each holder is a struct of an error code
//! frame, a class name frame, an optional message frame and a nested list of
//! stack trace elements, which is skipped.

use std::slice::Iter;

use bytes::{BufMut, BytesMut};

use super::client_message::ClientMessage;
use super::constants::*;
use super::error_codes::ErrorCode;
use super::frame::Frame;
use crate::error::{HazelcastError, RemoteError, Result};

/// Decodes the outermost error carried by an error response.
pub fn decode_error(message: &ClientMessage) -> Result<RemoteError> {
    let mut frames = message.frames().iter();
    frames
        .next()
        .ok_or_else(|| malformed("missing initial frame"))?;

    let list_begin = next_frame(&mut frames)?;
    if !list_begin.is_begin_frame() {
        return Err(malformed("expected error holder list"));
    }

    let struct_begin = next_frame(&mut frames)?;
    if struct_begin.is_end_frame() {
        return Err(malformed("empty error holder list"));
    }
    if !struct_begin.is_begin_frame() {
        return Err(malformed("expected error holder"));
    }

    let code_frame = next_frame(&mut frames)?;
    let raw_code = code_frame
        .content
        .get(..4)
        .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| malformed("error code frame too short"))?;
    let code = ErrorCode::from_value(raw_code).unwrap_or(ErrorCode::Undefined);

    let class_name = read_string(next_frame(&mut frames)?)?;
    let message_frame = next_frame(&mut frames)?;
    let error_message = if message_frame.is_null_frame() {
        None
    } else {
        Some(read_string(message_frame)?)
    };

    Ok(RemoteError::new(code, class_name, error_message))
}

/// Encodes an error response carrying a single error holder.
pub fn encode_error(correlation_id: i64, error: &RemoteError) -> ClientMessage {
    let mut message = ClientMessage::create_response(EXCEPTION_MESSAGE_TYPE, correlation_id);
    message.add_frame(Frame::new_begin_frame());
    message.add_frame(Frame::new_begin_frame());

    let mut code = BytesMut::with_capacity(4);
    code.put_i32_le(error.code().value());
    message.add_frame(Frame::with_content(code));
    message.add_frame(Frame::new_string_frame(error.class_name()));
    match error.message() {
        Some(text) => message.add_frame(Frame::new_string_frame(text)),
        None => message.add_frame(Frame::new_null_frame()),
    }
    message.add_frame(Frame::new_begin_frame());
    message.add_frame(Frame::new_end_frame());

    message.add_frame(Frame::new_end_frame());
    message.add_frame(Frame::new_end_frame());
    message
}

fn next_frame<'a>(frames: &mut Iter<'a, Frame>) -> Result<&'a Frame> {
    frames
        .next()
        .ok_or_else(|| malformed("error response ended early"))
}

fn read_string(frame: &Frame) -> Result<String> {
    String::from_utf8(frame.content.to_vec())
        .map_err(|e| HazelcastError::Serialization(format!("invalid UTF-8 in error response: {}", e)))
}

fn malformed(reason: &str) -> HazelcastError {
    HazelcastError::Protocol(format!("malformed error response: {}", reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ClientMessageCodec;
    use tokio_util::codec::{Decoder, Encoder};

    #[test]
    fn test_decode_encoded_error() {
        let remote = RemoteError::new(
            ErrorCode::TargetNotMember,
            "com.hazelcast.spi.exception.TargetNotMemberException",
            Some("member left".to_string()),
        );
        let message = encode_error(12, &remote);

        assert!(message.is_exception());
        assert_eq!(message.correlation_id(), Some(12));
        assert_eq!(decode_error(&message).unwrap(), remote);
    }

    #[test]
    fn test_decode_null_message() {
        let remote = RemoteError::new(ErrorCode::IllegalArgument, "IllegalArgumentException", None);
        let decoded = decode_error(&encode_error(1, &remote)).unwrap();
        assert_eq!(decoded.message(), None);
        assert!(!decoded.is_retryable());
    }

    #[test]
    fn test_decode_after_codec() {
        let remote = RemoteError::new(ErrorCode::WrongTarget, "WrongTargetException", None);
        let mut codec = ClientMessageCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(encode_error(3, &remote), &mut buf).unwrap();

        let received = codec.decode(&mut buf).unwrap().unwrap();
        let decoded = decode_error(&received).unwrap();
        assert_eq!(decoded.code(), ErrorCode::WrongTarget);
        assert!(decoded.is_retryable());
    }

    #[test]
    fn test_unknown_code_maps_to_undefined() {
        let mut message = ClientMessage::create_response(EXCEPTION_MESSAGE_TYPE, 1);
        message.add_frame(Frame::new_begin_frame());
        message.add_frame(Frame::new_begin_frame());
        message.add_frame(Frame::with_content(BytesMut::from(&500i32.to_le_bytes()[..])));
        message.add_frame(Frame::new_string_frame("CustomException"));
        message.add_frame(Frame::new_null_frame());

        let decoded = decode_error(&message).unwrap();
        assert_eq!(decoded.code(), ErrorCode::Undefined);
        assert_eq!(decoded.class_name(), "CustomException");
    }

    #[test]
    fn test_truncated_error_is_protocol_error() {
        let mut message = ClientMessage::create_response(EXCEPTION_MESSAGE_TYPE, 1);
        message.add_frame(Frame::new_begin_frame());

        assert!(matches!(decode_error(&message), Err(HazelcastError::Protocol(_))));
    }

    #[test]
    fn test_empty_holder_list() {
        let mut message = ClientMessage::create_response(EXCEPTION_MESSAGE_TYPE, 1);
        message.add_frame(Frame::new_begin_frame());
        message.add_frame(Frame::new_end_frame());

        assert!(decode_error(&message).is_err());
    }
}
