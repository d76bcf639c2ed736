//! Prefixed integers and strings (RFC 7541 §5.1, §5.2).

use super::huffman;
use super::DecodeError;
use bytes::Buf;

/// Appends `value` with an N-bit prefix. The bits of `first` above the
/// prefix are carried through unchanged.
pub fn append_prefixed_int(dst: &mut Vec<u8>, first: u8, prefix_len: u8, value: u64) {
    let max = (1u64 << prefix_len) - 1;
    if value < max {
        dst.push(first | value as u8);
        return;
    }
    dst.push(first | max as u8);
    let mut rest = value - max;
    while rest >= 0x80 {
        dst.push(0x80 | (rest & 0x7f) as u8);
        rest >>= 7;
    }
    dst.push(rest as u8);
}

/// Appends a string literal; the H flag sits just above the length prefix.
/// Huffman coding is used only when it is strictly shorter.
pub fn append_prefixed_string(dst: &mut Vec<u8>, first: u8, prefix_len: u8, s: &str) {
    let huffman_len = huffman::encoded_len(s.as_bytes());
    if huffman_len < s.len() {
        append_prefixed_int(dst, first | (1 << prefix_len), prefix_len, huffman_len as u64);
        huffman::encode(s.as_bytes(), dst);
    } else {
        append_prefixed_int(dst, first, prefix_len, s.len() as u64);
        dst.extend_from_slice(s.as_bytes());
    }
}

/// Reads a prefixed integer whose first byte `first` was already consumed.
pub fn read_prefixed_int(src: &mut &[u8], first: u8, prefix_len: u8) -> Result<u64, DecodeError> {
    let max = (1u64 << prefix_len) - 1;
    let mut value = first as u64 & max;
    if value != max {
        return Ok(value);
    }
    let mut shift = 0u32;
    loop {
        if !src.has_remaining() {
            return Err(DecodeError::Truncated);
        }
        let b = src.get_u8();
        value = value
            .checked_add(((b & 0x7f) as u64) << shift)
            .filter(|v| *v < 1 << 62)
            .ok_or(DecodeError::IntegerOverflow)?;
        if b & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift > 56 {
            return Err(DecodeError::IntegerOverflow);
        }
    }
}

/// Reads a string literal whose first byte `first` was already consumed.
pub fn read_prefixed_string(
    src: &mut &[u8],
    first: u8,
    prefix_len: u8,
) -> Result<String, DecodeError> {
    let is_huffman = first & (1 << prefix_len) != 0;
    let len = read_prefixed_int(src, first, prefix_len)?;
    if len > src.remaining() as u64 {
        return Err(DecodeError::Truncated);
    }
    let raw = &src[..len as usize];
    let bytes = if is_huffman {
        huffman::decode(raw)?
    } else {
        raw.to_vec()
    };
    src.advance(len as usize);
    String::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)
}
