use super::prefixed::{read_prefixed_int, read_prefixed_string};
use super::{static_table, DecodeError, IndexType, TableType};
use crate::h3::framing::FrameStream;
use crate::types::ProtocolError;
use bytes::Buf;
use tokio::io::AsyncRead;

/// Decodes the rest of the current HEADERS frame on `st`.
pub async fn decode<S, F>(st: &mut FrameStream<S>, f: F) -> Result<(), ProtocolError>
where
    S: AsyncRead + Unpin,
    F: FnMut(IndexType, String, String) -> Result<(), ProtocolError>,
{
    let payload = st.read_frame_data().await?;
    decode_field_section(&payload, f)
}

/// Decodes one encoded field section, handing each field to `f` in wire
/// order. An error returned by `f` stops decoding and is passed through.
pub fn decode_field_section<F>(mut src: &[u8], mut f: F) -> Result<(), ProtocolError>
where
    F: FnMut(IndexType, String, String) -> Result<(), ProtocolError>,
{
    // Required Insert Count and Delta Base carry no meaning without a
    // dynamic table, but both must be well formed.
    let first = next_byte(&mut src)?;
    read_prefixed_int(&mut src, first, 8)?;
    let first = next_byte(&mut src)?;
    read_prefixed_int(&mut src, first, 7)?;

    while src.has_remaining() {
        let b = next_byte(&mut src)?;
        let (itype, name, value) = if b & 0x80 != 0 {
            // 1 T index(6)
            check_static(b & 0x40 != 0)?;
            let entry = static_table::get(read_prefixed_int(&mut src, b, 6)?)?;
            (IndexType::MayIndex, entry.name.to_string(), entry.value.to_string())
        } else if b & 0x40 != 0 {
            // 0 1 N T index(4)
            check_static(b & 0x10 != 0)?;
            let entry = static_table::get(read_prefixed_int(&mut src, b, 4)?)?;
            let vb = next_byte(&mut src)?;
            let value = read_prefixed_string(&mut src, vb, 7)?;
            (IndexType::from_bit(b & 0x20 != 0), entry.name.to_string(), value)
        } else if b & 0x20 != 0 {
            // 0 0 1 N H name(3)
            let name = read_prefixed_string(&mut src, b, 3)?;
            let vb = next_byte(&mut src)?;
            let value = read_prefixed_string(&mut src, vb, 7)?;
            (IndexType::from_bit(b & 0x10 != 0), name, value)
        } else {
            // Post-Base forms only address the dynamic table.
            return Err(DecodeError::DynamicReference.into());
        };
        f(itype, name, value)?;
    }
    Ok(())
}

fn next_byte(src: &mut &[u8]) -> Result<u8, DecodeError> {
    if src.has_remaining() {
        Ok(src.get_u8())
    } else {
        Err(DecodeError::Truncated)
    }
}

fn check_static(t_bit: bool) -> Result<(), DecodeError> {
    match TableType::from_bit(t_bit) {
        TableType::Static => Ok(()),
        TableType::Dynamic => Err(DecodeError::DynamicReference),
    }
}
