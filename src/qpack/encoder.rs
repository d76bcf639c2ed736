use super::prefixed::{append_prefixed_int, append_prefixed_string};
use super::{static_table, IndexType};
use crate::types::Header;
use bytes::Bytes;

/// Encodes one field section.
///
/// `produce` is handed an emitter and calls it once per field, in order.
/// Output depends only on the emitted fields, so repeated calls with the same
/// fields yield identical bytes.
pub fn encode<F>(produce: F) -> Bytes
where
    F: FnOnce(&mut dyn FnMut(IndexType, &str, &str)),
{
    // Required Insert Count and Delta Base are both zero without a dynamic table.
    let mut buf = vec![0x00, 0x00];
    produce(&mut |itype, name, value| append_field_line(&mut buf, itype, name, value));
    Bytes::from(buf)
}

/// Encodes `headers` in order; headers listed in `never_index` get the N bit.
pub fn encode_headers(headers: &[Header], never_index: &[&str]) -> Bytes {
    encode(|emit| {
        for header in headers {
            let itype = if never_index.iter().any(|n| header.name.eq_ignore_ascii_case(n)) {
                IndexType::NeverIndex
            } else {
                IndexType::MayIndex
            };
            emit(itype, &header.name, &header.value);
        }
    })
}

fn append_field_line(buf: &mut Vec<u8>, itype: IndexType, name: &str, value: &str) {
    let n_bit = match itype {
        IndexType::MayIndex => 0x00,
        IndexType::NeverIndex => 0x20,
    };

    if itype == IndexType::MayIndex {
        if let Some(index) = static_table::find(name, value) {
            // 1 T index(6)
            append_prefixed_int(buf, 0xc0, 6, index);
            return;
        }
    }

    if let Some(index) = static_table::find_name(name) {
        // 0 1 N T index(4), then the value
        append_prefixed_int(buf, 0x50 | n_bit, 4, index);
        append_prefixed_string(buf, 0x00, 7, value);
        return;
    }

    // 0 0 1 N H name(3), then the value
    append_prefixed_string(buf, 0x20 | (n_bit >> 1), 3, name);
    append_prefixed_string(buf, 0x00, 7, value);
}
