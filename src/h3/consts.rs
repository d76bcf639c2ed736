/// Default HTTP/3 settings. The dynamic table stays disabled.
pub const DEFAULT_QPACK_MAX_TABLE_CAPACITY: u64 = 0;
pub const DEFAULT_MAX_FIELD_SECTION_SIZE: u64 = 65_536;
pub const DEFAULT_QPACK_BLOCKED_STREAMS: u64 = 0;

/// Unidirectional stream type identifiers (RFC 9114 §6.2).
pub const CONTROL_STREAM_TYPE: u64 = 0x00;
pub const PUSH_STREAM_TYPE: u64 = 0x01;
pub const QPACK_ENCODER_STREAM_TYPE: u64 = 0x02;
pub const QPACK_DECODER_STREAM_TYPE: u64 = 0x03;

// HTTP/3 Frame Types (RFC 9114 Section 7.2)
pub const DATA_FRAME_TYPE: u64 = 0x0;
pub const HEADERS_FRAME_TYPE: u64 = 0x1;
pub const CANCEL_PUSH_FRAME_TYPE: u64 = 0x3;
pub const SETTINGS_FRAME_TYPE: u64 = 0x4;
pub const PUSH_PROMISE_FRAME_TYPE: u64 = 0x5;
pub const GOAWAY_FRAME_TYPE: u64 = 0x7;
pub const MAX_PUSH_ID_FRAME_TYPE: u64 = 0x0d;

// HTTP/3 Settings Parameters (RFC 9114 Section 7.2.4.1)
pub const SETTINGS_QPACK_MAX_TABLE_CAPACITY: u64 = 0x1;
pub const SETTINGS_MAX_FIELD_SECTION_SIZE: u64 = 0x6;
pub const SETTINGS_QPACK_BLOCKED_STREAMS: u64 = 0x7;

/// Setting identifiers carried over from HTTP/2 that must not appear (RFC 9114 §7.2.4.1).
pub const RESERVED_H2_SETTINGS: std::ops::RangeInclusive<u64> = 0x02..=0x05;

/// Size of the scratch buffer used when draining discarded bytes.
pub const DISCARD_CHUNK_SIZE: usize = 8192;

/// Per-field overhead counted against SETTINGS_MAX_FIELD_SECTION_SIZE (RFC 9114 §4.2.2).
pub const FIELD_LINE_OVERHEAD: u64 = 32;
