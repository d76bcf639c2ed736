use crate::h3::consts::*;
use crate::h3::varint::{encode_varint, varint_len};
use bytes::{BufMut, Bytes, BytesMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Data,        // 0x0
    Headers,     // 0x1
    CancelPush,  // 0x3
    Settings,    // 0x4
    PushPromise, // 0x5
    GoAway,      // 0x7
    MaxPushId,   // 0xd
    Unknown(u64),
}

impl FrameType {
    pub fn value(self) -> u64 {
        match self {
            FrameType::Data => DATA_FRAME_TYPE,
            FrameType::Headers => HEADERS_FRAME_TYPE,
            FrameType::CancelPush => CANCEL_PUSH_FRAME_TYPE,
            FrameType::Settings => SETTINGS_FRAME_TYPE,
            FrameType::PushPromise => PUSH_PROMISE_FRAME_TYPE,
            FrameType::GoAway => GOAWAY_FRAME_TYPE,
            FrameType::MaxPushId => MAX_PUSH_ID_FRAME_TYPE,
            FrameType::Unknown(v) => v,
        }
    }

    pub fn is_known(self) -> bool {
        !matches!(self, FrameType::Unknown(_))
    }
}

impl From<u64> for FrameType {
    fn from(value: u64) -> Self {
        match value {
            DATA_FRAME_TYPE => FrameType::Data,
            HEADERS_FRAME_TYPE => FrameType::Headers,
            CANCEL_PUSH_FRAME_TYPE => FrameType::CancelPush,
            SETTINGS_FRAME_TYPE => FrameType::Settings,
            PUSH_PROMISE_FRAME_TYPE => FrameType::PushPromise,
            GOAWAY_FRAME_TYPE => FrameType::GoAway,
            MAX_PUSH_ID_FRAME_TYPE => FrameType::MaxPushId,
            other => FrameType::Unknown(other),
        }
    }
}

/// Kind of an HTTP/3 stream. Only unidirectional streams carry a type on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    Request,
    Control,
    Push,
    Encoder,
    Decoder,
    Unknown(u64),
}

impl StreamType {
    pub fn from_uni(value: u64) -> Self {
        match value {
            CONTROL_STREAM_TYPE => StreamType::Control,
            PUSH_STREAM_TYPE => StreamType::Push,
            QPACK_ENCODER_STREAM_TYPE => StreamType::Encoder,
            QPACK_DECODER_STREAM_TYPE => StreamType::Decoder,
            other => StreamType::Unknown(other),
        }
    }
}

/// A complete frame held in memory.
#[derive(Debug, Clone)]
pub struct FrameH3 {
    pub frame_type: FrameType,
    pub payload: Bytes,
}

impl FrameH3 {
    pub fn new(frame_type: FrameType, payload: Bytes) -> Self {
        Self {
            frame_type,
            payload,
        }
    }

    pub fn data(payload: Bytes) -> Self {
        Self::new(FrameType::Data, payload)
    }

    pub fn headers(field_section: Bytes) -> Self {
        Self::new(FrameType::Headers, field_section)
    }

    pub fn settings(settings: &[(u64, u64)]) -> Self {
        let mut payload = BytesMut::new();
        for &(id, value) in settings {
            encode_varint(&mut payload, id);
            encode_varint(&mut payload, value);
        }
        Self::new(FrameType::Settings, payload.freeze())
    }

    pub fn goaway(id: u64) -> Self {
        Self::id_frame(FrameType::GoAway, id)
    }

    pub fn cancel_push(push_id: u64) -> Self {
        Self::id_frame(FrameType::CancelPush, push_id)
    }

    pub fn max_push_id(push_id: u64) -> Self {
        Self::id_frame(FrameType::MaxPushId, push_id)
    }

    fn id_frame(frame_type: FrameType, id: u64) -> Self {
        let mut payload = BytesMut::with_capacity(varint_len(id));
        encode_varint(&mut payload, id);
        Self::new(frame_type, payload.freeze())
    }

    pub fn serialize(&self) -> Bytes {
        let kind = self.frame_type.value();
        let len = self.payload.len() as u64;
        let mut out =
            BytesMut::with_capacity(varint_len(kind) + varint_len(len) + self.payload.len());
        encode_varint(&mut out, kind);
        encode_varint(&mut out, len);
        out.put_slice(&self.payload);
        out.freeze()
    }
}
