use crate::h3::consts::*;
use crate::h3::framing::FrameStream;
use crate::h3::varint::varint_len;
use crate::types::{FrameType, Http3Error, ProtocolError};
use std::collections::HashSet;
use tokio::io::AsyncRead;

/// The settings this crate understands. Anything else on the wire is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub qpack_max_table_capacity: u64,
    /// `None` means no limit was announced.
    pub max_field_section_size: Option<u64>,
    pub qpack_blocked_streams: u64,
}

impl Default for Settings {
    /// Values in effect before a peer's SETTINGS arrives (RFC 9114 §7.2.4.2).
    fn default() -> Self {
        Self {
            qpack_max_table_capacity: 0,
            max_field_section_size: None,
            qpack_blocked_streams: 0,
        }
    }
}

impl Settings {
    /// What this endpoint announces.
    pub fn local(max_field_section_size: u64) -> Self {
        Self {
            qpack_max_table_capacity: DEFAULT_QPACK_MAX_TABLE_CAPACITY,
            max_field_section_size: Some(max_field_section_size),
            qpack_blocked_streams: DEFAULT_QPACK_BLOCKED_STREAMS,
        }
    }

    pub fn from_pairs(pairs: &[(u64, u64)]) -> Self {
        let mut settings = Self::default();
        for &(id, value) in pairs {
            settings.apply(id, value);
        }
        settings
    }

    pub fn to_pairs(&self) -> Vec<(u64, u64)> {
        let mut pairs = vec![
            (SETTINGS_QPACK_MAX_TABLE_CAPACITY, self.qpack_max_table_capacity),
            (SETTINGS_QPACK_BLOCKED_STREAMS, self.qpack_blocked_streams),
        ];
        if let Some(size) = self.max_field_section_size {
            pairs.push((SETTINGS_MAX_FIELD_SECTION_SIZE, size));
        }
        pairs
    }

    /// Records one received setting. Unknown identifiers are ignored.
    pub fn apply(&mut self, id: u64, value: u64) {
        match id {
            SETTINGS_QPACK_MAX_TABLE_CAPACITY => self.qpack_max_table_capacity = value,
            SETTINGS_MAX_FIELD_SECTION_SIZE => self.max_field_section_size = Some(value),
            SETTINGS_QPACK_BLOCKED_STREAMS => self.qpack_blocked_streams = value,
            _ => {}
        }
    }
}

/// Buffers a complete SETTINGS frame. The caller flushes.
pub fn write_settings<S>(st: &mut FrameStream<S>, pairs: &[(u64, u64)]) {
    let len: usize = pairs
        .iter()
        .map(|&(id, value)| varint_len(id) + varint_len(value))
        .sum();
    st.write_varint(SETTINGS_FRAME_TYPE);
    st.write_varint(len as u64);
    for &(id, value) in pairs {
        st.write_varint(id);
        st.write_varint(value);
    }
}

/// Reads the SETTINGS frame that must open a control stream, passing each
/// pair to `f` in wire order.
pub async fn read_settings<S, F>(st: &mut FrameStream<S>, mut f: F) -> Result<(), ProtocolError>
where
    S: AsyncRead + Unpin,
    F: FnMut(u64, u64) -> Result<(), ProtocolError>,
{
    match st.read_frame_header().await? {
        Some(FrameType::Settings) => {}
        Some(other) => {
            return Err(ProtocolError::connection(
                Http3Error::MissingSettings,
                format!("control stream opened with frame {:#x}", other.value()),
            ))
        }
        None => {
            return Err(ProtocolError::connection(
                Http3Error::ClosedCriticalStream,
                "control stream closed before SETTINGS",
            ))
        }
    }

    let mut seen = HashSet::new();
    while st.remaining() > 0 {
        let id = st.read_varint().await?;
        let value = st.read_varint().await?;
        if RESERVED_H2_SETTINGS.contains(&id) {
            return Err(ProtocolError::connection(
                Http3Error::SettingsError,
                format!("reserved setting {:#x}", id),
            ));
        }
        if !seen.insert(id) {
            return Err(ProtocolError::connection(
                Http3Error::SettingsError,
                format!("duplicate setting {:#x}", id),
            ));
        }
        f(id, value)?;
    }
    st.end_frame()
}
