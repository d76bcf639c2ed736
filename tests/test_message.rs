use bytes::Bytes;
use riph3::h3::framing::FrameStream;
use riph3::h3::message::{
    content_length, encode_request_headers, encode_response_headers, encode_trailers,
    read_field_section, response_content_length, response_has_body, FieldSection,
};
use riph3::qpack::{decode_field_section, encode_headers, IndexType};
use riph3::types::{FrameH3, Header, Http3Error, ProtocolError};
use riph3::utils::parse_target;

fn decode_all(src: &[u8]) -> Vec<(IndexType, String, String)> {
    let mut out = Vec::new();
    decode_field_section(src, |itype, name, value| {
        out.push((itype, name, value));
        Ok(())
    })
    .expect("decode");
    out
}

fn names_values(src: &[u8]) -> Vec<(String, String)> {
    decode_all(src)
        .into_iter()
        .map(|(_, name, value)| (name, value))
        .collect()
}

fn pairs(list: &[(&str, &str)]) -> Vec<(String, String)> {
    list.iter()
        .map(|(n, v)| (n.to_string(), v.to_string()))
        .collect()
}

fn request(
    method: &str,
    url: &str,
    headers: &[Header],
    content_length: Option<u64>,
) -> Result<Vec<(String, String)>, ProtocolError> {
    let target = parse_target(url).expect("target");
    let (section, _) = encode_request_headers(method, &target, headers, content_length, "riph3/test")?;
    Ok(names_values(&section))
}

async fn read_section(section: Bytes, max: u64) -> Result<FieldSection, ProtocolError> {
    let wire = FrameH3::headers(section).serialize();
    let mut st = FrameStream::new(&wire[..]);
    st.read_frame_header().await.expect("frame header");
    read_field_section(&mut st, max).await
}

fn section(list: &[(&str, &str)]) -> FieldSection {
    let mut out = FieldSection::default();
    for (name, value) in list {
        let header = Header::new(*name, *value);
        if header.is_pseudo() {
            out.pseudo.push(header);
        } else {
            out.fields.push(header);
        }
    }
    out
}

fn assert_message_error(err: ProtocolError) {
    assert!(
        matches!(err, ProtocolError::Stream(ref e) if e.code == Http3Error::MessageError),
        "unexpected error: {:?}",
        err
    );
}

#[test]
fn request_pseudo_headers_come_first() {
    let lines = request("GET", "https://example.com/a?b=1", &[], None).expect("encode");
    assert_eq!(
        lines,
        pairs(&[
            (":authority", "example.com"),
            (":method", "GET"),
            (":path", "/a?b=1"),
            (":scheme", "https"),
            ("user-agent", "riph3/test"),
        ])
    );
}

#[test]
fn request_fields_are_filtered() {
    let headers = vec![
        Header::new("Host", "other.example"),
        Header::new("Connection", "close"),
        Header::new("Transfer-Encoding", "chunked"),
        Header::new("TE", "gzip"),
        Header::new("Content-Length", "99"),
        Header::new("X-Custom", "v"),
        Header::new("User-Agent", "custom/1"),
    ];
    let lines = request("GET", "https://example.com:8443/", &headers, None).expect("encode");
    assert_eq!(
        lines,
        pairs(&[
            (":authority", "other.example"),
            (":method", "GET"),
            (":path", "/"),
            (":scheme", "https"),
            ("x-custom", "v"),
            ("user-agent", "custom/1"),
        ])
    );

    let te = vec![Header::new("te", "trailers")];
    let lines = request("GET", "https://example.com/", &te, None).expect("encode");
    assert!(lines.contains(&("te".to_string(), "trailers".to_string())));
}

#[test]
fn request_content_length_rules() {
    let has_length = |lines: &[(String, String)], value: &str| {
        lines.contains(&("content-length".to_string(), value.to_string()))
    };
    let no_length = |lines: &[(String, String)]| lines.iter().all(|(n, _)| n != "content-length");

    let post = request("POST", "https://example.com/", &[], Some(0)).expect("encode");
    assert!(has_length(&post, "0"));

    let get = request("GET", "https://example.com/", &[], Some(0)).expect("encode");
    assert!(no_length(&get));

    let get = request("GET", "https://example.com/", &[], Some(5)).expect("encode");
    assert!(has_length(&get, "5"));

    let put = request("PUT", "https://example.com/", &[], None).expect("encode");
    assert!(no_length(&put));
}

#[test]
fn connect_request_omits_path_and_scheme() {
    let lines = request("CONNECT", "https://proxy.example:8443/", &[], None).expect("encode");
    assert_eq!(
        lines,
        pairs(&[
            (":authority", "proxy.example:8443"),
            (":method", "CONNECT"),
            ("user-agent", "riph3/test"),
        ])
    );
}

#[test]
fn supplied_pseudo_headers_override() {
    let headers = vec![Header::new(":path", "/override"), Header::new(":protocol", "websocket")];
    let lines = request("GET", "https://example.com/orig", &headers, None).expect("encode");
    assert_eq!(&lines[2], &(":path".to_string(), "/override".to_string()));
    assert_eq!(&lines[4], &(":protocol".to_string(), "websocket".to_string()));
}

#[test]
fn sensitive_fields_are_never_indexed() {
    let target = parse_target("https://example.com/").expect("target");
    let headers = vec![Header::new("cookie", "a=1"), Header::new("accept", "*/*")];
    let (section, _) =
        encode_request_headers("GET", &target, &headers, None, "").expect("encode");
    let fields = decode_all(&section);
    let cookie = fields.iter().find(|f| f.1 == "cookie").expect("cookie");
    assert_eq!(cookie.0, IndexType::NeverIndex);
    let accept = fields.iter().find(|f| f.1 == "accept").expect("accept");
    assert_eq!(accept.0, IndexType::MayIndex);
    assert!(fields.iter().all(|f| f.1 != "user-agent"));
}

#[test]
fn invalid_request_fields_fail() {
    let bad_name = vec![Header::new("Bad Name", "v")];
    let err = request("GET", "https://example.com/", &bad_name, None).expect_err("space in name");
    assert!(matches!(err, ProtocolError::RequestFailed(_)));

    let bad_value = vec![Header::new("x-a", "line\r\nbreak")];
    let err = request("GET", "https://example.com/", &bad_value, None).expect_err("CRLF in value");
    assert!(matches!(err, ProtocolError::RequestFailed(_)));
}

#[test]
fn field_section_size_is_counted() {
    let target = parse_target("https://example.com/").expect("target");
    let (_, size) = encode_request_headers("GET", &target, &[], None, "").expect("encode");
    let expected = [
        (":authority", "example.com"),
        (":method", "GET"),
        (":path", "/"),
        (":scheme", "https"),
    ]
    .iter()
    .map(|(n, v)| (n.len() + v.len() + 32) as u64)
    .sum::<u64>();
    assert_eq!(size, expected);
}

#[test]
fn response_and_trailer_encoding() {
    let headers = vec![Header::new("Content-Type", "text/plain"), Header::new("connection", "close")];
    let (section, _) = encode_response_headers(200, &headers, Some(3)).expect("encode");
    assert_eq!(
        names_values(&section),
        pairs(&[(":status", "200"), ("content-type", "text/plain"), ("content-length", "3")])
    );

    let err = encode_response_headers(42, &[], None).expect_err("bad status");
    assert_eq!(err.code(), Some(Http3Error::InternalError));

    let (section, _) = encode_trailers(&[Header::new("X-Checksum", "abc")]).expect("trailers");
    assert_eq!(names_values(&section), pairs(&[("x-checksum", "abc")]));

    let err = encode_trailers(&[Header::new(":status", "200")]).expect_err("pseudo in trailers");
    assert_eq!(err.code(), Some(Http3Error::InternalError));
}

#[test]
fn response_head_validation() {
    let (status, fields) = section(&[(":status", "204"), ("server", "x")])
        .into_response_head()
        .expect("valid head");
    assert_eq!(status, 204);
    assert_eq!(fields, vec![Header::new("server", "x")]);

    assert_message_error(section(&[("server", "x")]).into_response_head().expect_err("missing"));
    assert_message_error(
        section(&[(":status", "200"), (":status", "200")])
            .into_response_head()
            .expect_err("duplicate"),
    );
    assert_message_error(section(&[(":status", "20")]).into_response_head().expect_err("short"));
    assert_message_error(section(&[(":status", "abc")]).into_response_head().expect_err("text"));
    assert_message_error(
        section(&[(":status", "200"), (":path", "/")])
            .into_response_head()
            .expect_err("request pseudo-header"),
    );
}

#[test]
fn request_head_validation() {
    let head = section(&[
        (":method", "GET"),
        (":scheme", "https"),
        (":authority", "example.com"),
        (":path", "/x"),
        ("accept", "*/*"),
    ])
    .into_request_head()
    .expect("valid head");
    assert_eq!(head.method, "GET");
    assert_eq!(head.path.as_deref(), Some("/x"));
    assert_eq!(head.headers.len(), 1);

    let connect = section(&[(":method", "CONNECT"), (":authority", "proxy:443")])
        .into_request_head()
        .expect("valid CONNECT");
    assert_eq!(connect.path, None);

    let invalid: [&[(&str, &str)]; 5] = [
        &[(":scheme", "https"), (":path", "/")],
        &[(":method", "GET"), (":path", "/")],
        &[(":method", "GET"), (":scheme", "https")],
        &[(":method", "CONNECT"), (":authority", "p:1"), (":path", "/")],
        &[(":method", "GET"), (":method", "GET"), (":scheme", "https"), (":path", "/")],
    ];
    for fields in invalid {
        assert_message_error(section(fields).into_request_head().expect_err("invalid head"));
    }
}

#[test]
fn trailers_reject_pseudo_headers() {
    assert_message_error(section(&[(":status", "200")]).into_trailers().expect_err("pseudo"));
    let trailers = section(&[("x-a", "1")]).into_trailers().expect("trailers");
    assert_eq!(trailers, vec![Header::new("x-a", "1")]);
}

#[test]
fn content_length_parsing() {
    let cl = |values: &[&str]| {
        let headers: Vec<Header> = values.iter().map(|v| Header::new("content-length", *v)).collect();
        content_length(&headers)
    };
    assert_eq!(cl(&[]).expect("absent"), None);
    assert_eq!(cl(&["42"]).expect("single"), Some(42));
    assert_eq!(cl(&["5", "5"]).expect("repeated"), Some(5));
    assert_eq!(cl(&["5, 5"]).expect("list"), Some(5));
    assert_message_error(cl(&["5", "6"]).expect_err("conflict"));
    assert_message_error(cl(&["5,6"]).expect_err("conflicting list"));
    assert_message_error(cl(&["-1"]).expect_err("negative"));
    assert_message_error(cl(&["abc"]).expect_err("text"));
}

#[test]
fn response_content_length_depends_on_status() {
    let headers = vec![Header::new("content-length", "10")];
    assert_eq!(response_content_length("GET", 200, &headers).expect("ok"), Some(10));
    assert_eq!(response_content_length("GET", 204, &headers).expect("ok"), None);
    assert_eq!(response_content_length("GET", 103, &headers).expect("ok"), None);
    assert_eq!(response_content_length("CONNECT", 200, &headers).expect("ok"), None);
    assert_eq!(response_content_length("CONNECT", 407, &headers).expect("ok"), Some(10));

    assert!(response_has_body("GET", 200));
    assert!(!response_has_body("HEAD", 200));
    assert!(!response_has_body("GET", 204));
    assert!(!response_has_body("GET", 304));
}

#[tokio::test]
async fn read_joins_cookies() {
    let encoded = encode_headers(
        &[
            Header::new(":status", "200"),
            Header::new("cookie", "a=1"),
            Header::new("x-b", "2"),
            Header::new("cookie", "c=3"),
        ],
        &[],
    );
    let section = read_section(encoded, 65_536).await.expect("section");
    assert_eq!(section.pseudo, vec![Header::new(":status", "200")]);
    assert_eq!(
        section.fields,
        vec![Header::new("cookie", "a=1; c=3"), Header::new("x-b", "2")]
    );
}

#[tokio::test]
async fn read_enforces_size_limit() {
    let encoded = encode_headers(&[Header::new("x-a", "1234567890")], &[]);
    // 3 + 10 + 32 = 45
    read_section(encoded.clone(), 45).await.expect("exactly at limit");
    let err = read_section(encoded, 44).await.expect_err("over limit");
    assert!(matches!(err, ProtocolError::Stream(ref e) if e.code == Http3Error::ExcessiveLoad));
}

#[tokio::test]
async fn read_rejects_oversized_frame_before_buffering() {
    // HEADERS declaring 10_000_000 bytes with only a few present.
    let wire = [0x01, 0x80, 0x98, 0x96, 0x80, 0x00, 0x00, 0x51];
    let mut st = FrameStream::new(&wire[..]);
    st.read_frame_header().await.expect("frame header");
    let err = read_field_section(&mut st, 65_536).await.expect_err("oversized frame");
    assert!(matches!(err, ProtocolError::Stream(ref e) if e.code == Http3Error::ExcessiveLoad));
}

#[tokio::test]
async fn read_rejects_malformed_fields() {
    let late_pseudo = encode_headers(&[Header::new("x-a", "1"), Header::new(":status", "200")], &[]);
    assert_message_error(read_section(late_pseudo, 65_536).await.expect_err("pseudo after field"));

    let upper = encode_headers(&[Header::new("X-Upper", "1")], &[]);
    assert_message_error(read_section(upper, 65_536).await.expect_err("uppercase name"));

    let nul = encode_headers(&[Header::new("x-a", "a\0b")], &[]);
    assert_message_error(read_section(nul, 65_536).await.expect_err("NUL in value"));
}
