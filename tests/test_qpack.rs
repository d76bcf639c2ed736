use bytes::Bytes;
use riph3::qpack::{self, decode_field_section, encode_headers, IndexType};
use riph3::types::{Header, Http3Error, ProtocolError};

fn hex(s: &str) -> Vec<u8> {
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).expect("hex digit"))
        .collect()
}

fn decode_all(src: &[u8]) -> Result<Vec<(IndexType, String, String)>, ProtocolError> {
    let mut out = Vec::new();
    decode_field_section(src, |itype, name, value| {
        out.push((itype, name, value));
        Ok(())
    })?;
    Ok(out)
}

fn encode_one(itype: IndexType, name: &str, value: &str) -> Bytes {
    qpack::encode(|emit| emit(itype, name, value))
}

#[test]
fn indexed_static_entry() {
    let encoded = encode_one(IndexType::MayIndex, ":method", "GET");
    assert_eq!(&encoded[..], &[0x00, 0x00, 0xd1]);
}

#[test]
fn literal_name_vector() {
    let fields = decode_all(&hex("000023666f6f03626172")).expect("decode");
    assert_eq!(
        fields,
        vec![(IndexType::MayIndex, "foo".to_string(), "bar".to_string())]
    );
}

#[test]
fn encode_then_decode_identity() {
    let long_value = "z".repeat(300);
    let cases: Vec<(IndexType, &str, &str)> = vec![
        (IndexType::MayIndex, "foo", "bar"),
        (IndexType::MayIndex, "", ""),
        (IndexType::MayIndex, "x-empty", ""),
        (IndexType::MayIndex, ":path", "/"),
        (IndexType::MayIndex, ":path", "/index.html"),
        (IndexType::MayIndex, "content-type", "application/x-unusual"),
        (IndexType::MayIndex, "x-long", &long_value),
        (IndexType::NeverIndex, "authorization", "Bearer secret"),
        (IndexType::NeverIndex, "x-secret", "hunter2"),
    ];
    for (itype, name, value) in cases {
        let encoded = encode_one(itype, name, value);
        let fields = decode_all(&encoded).expect("decode");
        assert_eq!(fields, vec![(itype, name.to_string(), value.to_string())]);
    }
}

#[test]
fn encoding_is_deterministic() {
    let headers = vec![
        Header::new(":status", "200"),
        Header::new("content-type", "text/plain"),
        Header::new("set-cookie", "id=1"),
    ];
    let a = encode_headers(&headers, &["set-cookie"]);
    let b = encode_headers(&headers, &["set-cookie"]);
    assert_eq!(a, b);

    let fields = decode_all(&a).expect("decode");
    assert_eq!(fields.len(), 3);
    assert_eq!(fields[2].0, IndexType::NeverIndex);
}

#[test]
fn never_indexed_exact_match_uses_name_reference() {
    let encoded = encode_one(IndexType::NeverIndex, ":method", "GET");
    // 0 1 N=1 T=1, index 17 overflows the 4-bit prefix.
    assert_eq!(&encoded[..4], &[0x00, 0x00, 0x7f, 0x02]);
    let fields = decode_all(&encoded).expect("decode");
    assert_eq!(
        fields,
        vec![(IndexType::NeverIndex, ":method".to_string(), "GET".to_string())]
    );
}

#[test]
fn prefix_values_are_tolerated() {
    let fields = decode_all(&hex("0581d1")).expect("decode");
    assert_eq!(
        fields,
        vec![(IndexType::MayIndex, ":method".to_string(), "GET".to_string())]
    );
}

fn assert_decompression_failed(src: &[u8]) {
    let err = decode_all(src).expect_err("decode must fail");
    assert_eq!(err.code(), Some(Http3Error::QpackDecompressionFailed));
    assert!(matches!(err, ProtocolError::Connection(_)));
}

#[test]
fn malformed_sections() {
    // Missing prefix.
    assert_decompression_failed(&[0x00]);
    // Dynamic table indexed line.
    assert_decompression_failed(&[0x00, 0x00, 0x81]);
    // Post-base indexed line.
    assert_decompression_failed(&[0x00, 0x00, 0x10]);
    // Static index 99 is past the end of the table.
    assert_decompression_failed(&[0x00, 0x00, 0xff, 0x24]);
    // Value length runs past the end.
    assert_decompression_failed(&[0x00, 0x00, 0x51, 0x05, b'a']);
    // Huffman value with zero padding.
    assert_decompression_failed(&[0x00, 0x00, 0x51, 0x81, 0x00]);
}

#[test]
fn callback_errors_stop_decoding() {
    let encoded = qpack::encode(|emit| {
        emit(IndexType::MayIndex, "a", "1");
        emit(IndexType::MayIndex, "b", "2");
    });
    let mut seen = 0;
    let err = decode_field_section(&encoded, |_, _, _| {
        seen += 1;
        Err(ProtocolError::stream(Http3Error::MessageError, "stop"))
    })
    .expect_err("callback error");
    assert_eq!(seen, 1);
    assert_eq!(err.code(), Some(Http3Error::MessageError));
}

#[test]
fn static_table_lookups() {
    use riph3::qpack::static_table;

    assert_eq!(static_table::len(), 99);
    assert_eq!(static_table::find(":method", "GET"), Some(17));
    assert_eq!(static_table::find(":status", "200"), Some(25));
    assert_eq!(static_table::find_name(":status"), Some(24));
    assert_eq!(static_table::find("content-type", "text/html; charset=utf-8"), Some(52));
    let entry = static_table::get(31).expect("index 31");
    assert_eq!((entry.name, entry.value), ("accept-encoding", "gzip, deflate, br"));
    assert!(static_table::get(99).is_err());
}
