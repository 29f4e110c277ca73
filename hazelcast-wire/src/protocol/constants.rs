//! Protocol constants for the Hazelcast Open Binary Protocol.

/// Bytes written once after the socket connects, selecting the client protocol.
pub const CLIENT_PROTOCOL_PREAMBLE: [u8; 3] = *b"CP2";

/// Size of the frame length field in bytes.
pub const SIZE_OF_FRAME_LENGTH_FIELD: usize = 4;

/// Size of the frame flags field in bytes.
pub const SIZE_OF_FRAME_FLAGS_FIELD: usize = 2;

/// Total frame header size (length + flags).
pub const FRAME_HEADER_SIZE: usize = SIZE_OF_FRAME_LENGTH_FIELD + SIZE_OF_FRAME_FLAGS_FIELD;

/// Marks the first fragment of a message.
pub const BEGIN_FRAGMENT_FLAG: u16 = 1 << 15;

/// Marks the last fragment of a message.
pub const END_FRAGMENT_FLAG: u16 = 1 << 14;

/// Marks the last frame of a message.
pub const IS_FINAL_FLAG: u16 = 1 << 13;

/// Opens a nested data structure (list, struct) within a message.
pub const BEGIN_DATA_STRUCTURE_FLAG: u16 = 1 << 12;

/// Closes a nested data structure within a message.
pub const END_DATA_STRUCTURE_FLAG: u16 = 1 << 11;

/// Null frame flag - indicates a null value.
pub const IS_NULL_FLAG: u16 = 1 << 10;

/// Event flag - the message is a server-pushed event.
pub const IS_EVENT_FLAG: u16 = 1 << 9;

/// The request expects backup acknowledgements.
pub const BACKUP_AWARE_FLAG: u16 = 1 << 8;

/// Backup event flag.
pub const BACKUP_EVENT_FLAG: u16 = 1 << 7;

/// Default frame flags (no special flags set).
pub const DEFAULT_FLAGS: u16 = 0;

/// Initial frame flags of a message that is sent as a single fragment.
pub const UNFRAGMENTED_MESSAGE: u16 = BEGIN_FRAGMENT_FLAG | END_FRAGMENT_FLAG;

/// Offset of message type in initial frame content.
pub const TYPE_FIELD_OFFSET: usize = 0;

/// Offset of correlation ID in initial frame content.
pub const CORRELATION_ID_OFFSET: usize = TYPE_FIELD_OFFSET + 4;

/// Offset of partition ID in request and event initial frames.
pub const PARTITION_ID_OFFSET: usize = CORRELATION_ID_OFFSET + 8;

/// Size of the request initial frame header.
pub const REQUEST_HEADER_SIZE: usize = PARTITION_ID_OFFSET + 4;

/// Offset of backup acks count in response initial frame.
pub const RESPONSE_BACKUP_ACKS_OFFSET: usize = CORRELATION_ID_OFFSET + 8;

/// Size of the response initial frame header.
pub const RESPONSE_HEADER_SIZE: usize = RESPONSE_BACKUP_ACKS_OFFSET + 1;

/// Size of the event initial frame header.
pub const EVENT_HEADER_SIZE: usize = PARTITION_ID_OFFSET + 4;

/// Partition ID indicating no specific partition (-1).
pub const PARTITION_ID_ANY: i32 = -1;

/// Message type of an error response.
pub const EXCEPTION_MESSAGE_TYPE: i32 = 0;

/// Client authentication request.
pub const CLIENT_AUTHENTICATION: i32 = 0x000100;

/// Client authentication response.
pub const CLIENT_AUTHENTICATION_RESPONSE: i32 = 0x000101;

/// Registers the connection for member-view and partition-view events.
pub const CLIENT_ADD_CLUSTER_VIEW_LISTENER: i32 = 0x000300;

/// Response to the cluster view listener registration.
pub const CLIENT_ADD_CLUSTER_VIEW_LISTENER_RESPONSE: i32 = 0x000301;

/// Member-view event pushed to the cluster events connection.
pub const CLIENT_MEMBERS_VIEW_EVENT: i32 = 0x000302;

/// Partition-view event pushed to the cluster events connection.
pub const CLIENT_PARTITIONS_VIEW_EVENT: i32 = 0x000303;

/// Heartbeat ping request.
pub const CLIENT_PING: i32 = 0x000B00;

/// Heartbeat ping response.
pub const CLIENT_PING_RESPONSE: i32 = 0x000B01;

/// Backup acknowledgement event.
pub const CLIENT_BACKUP_EVENT: i32 = 0x000F01;
