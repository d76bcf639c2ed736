//! QUIC variable-length integers (RFC 9000 §16).

use bytes::BufMut;

pub const MAX_VARINT: u64 = (1 << 62) - 1;

/// Encoded size of `value`.
///
/// Panics if `value` does not fit in 62 bits.
pub fn varint_len(value: u64) -> usize {
    match value {
        0..=63 => 1,
        64..=16_383 => 2,
        16_384..=1_073_741_823 => 4,
        1_073_741_824..=MAX_VARINT => 8,
        _ => panic!("varint value {} out of range", value),
    }
}

pub fn encode_varint<B: BufMut>(buf: &mut B, value: u64) {
    match varint_len(value) {
        1 => buf.put_u8(value as u8),
        2 => buf.put_u16((value as u16) | 0x4000),
        4 => buf.put_u32((value as u32) | 0x8000_0000),
        _ => buf.put_u64(value | 0xc000_0000_0000_0000),
    }
}

/// Decodes a varint from the front of `data`, returning the value and the
/// number of bytes consumed, or `None` if `data` is truncated.
pub fn decode_varint(data: &[u8]) -> Option<(u64, usize)> {
    let first = *data.first()?;
    let len = 1usize << (first >> 6);
    if data.len() < len {
        return None;
    }
    let mut value = (first & 0x3f) as u64;
    for &b in &data[1..len] {
        value = (value << 8) | b as u64;
    }
    Some((value, len))
}
