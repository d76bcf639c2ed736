//! QPACK field compression restricted to the static table (RFC 9204).
//!
//! The dynamic table is never enabled: this side advertises a table capacity
//! of zero, and any field line that references dynamic state is rejected with
//! `QPACK_DECOMPRESSION_FAILED`.

pub mod decoder;
pub mod encoder;
pub mod huffman;
pub mod prefixed;
pub mod static_table;

pub use decoder::{decode, decode_field_section};
pub use encoder::{encode, encode_headers};
pub use huffman::HuffmanError;
pub use static_table::TableEntry;

use crate::types::{Http3Error, ProtocolError};

/// The N bit of a literal field line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    MayIndex,
    NeverIndex,
}

impl IndexType {
    pub(crate) fn from_bit(set: bool) -> Self {
        if set {
            IndexType::NeverIndex
        } else {
            IndexType::MayIndex
        }
    }
}

/// The T bit of an indexed reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableType {
    Static,
    Dynamic,
}

impl TableType {
    pub(crate) fn from_bit(set: bool) -> Self {
        if set {
            TableType::Static
        } else {
            TableType::Dynamic
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("truncated field section")]
    Truncated,
    #[error("prefixed integer overflow")]
    IntegerOverflow,
    #[error(transparent)]
    Huffman(#[from] HuffmanError),
    #[error("field is not valid UTF-8")]
    InvalidUtf8,
    #[error("static table index {0} out of range")]
    InvalidStaticIndex(u64),
    #[error("dynamic table reference")]
    DynamicReference,
}

impl From<DecodeError> for ProtocolError {
    fn from(err: DecodeError) -> Self {
        ProtocolError::connection(Http3Error::QpackDecompressionFailed, err.to_string())
    }
}
