use riph3::types::{Http3Error, ProtocolError, StreamError};
use std::io;

#[test]
fn codes_match_the_registry() {
    assert_eq!(Http3Error::NoError.code(), 0x0100);
    assert_eq!(Http3Error::SettingsError.code(), 0x0109);
    assert_eq!(Http3Error::VersionFallback.code(), 0x0110);
    assert_eq!(Http3Error::QpackDecompressionFailed.code(), 0x0200);
    assert_eq!(Http3Error::QpackDecoderStreamError.code(), 0x0202);
}

#[test]
fn codes_convert_both_ways() {
    for code in (0x0100..=0x0110).chain(0x0200..=0x0202) {
        let err = Http3Error::from(code);
        assert!(!matches!(err, Http3Error::Unknown(_)), "{:#x}", code);
        assert_eq!(err.code(), code);
    }
    assert_eq!(Http3Error::from(0x1234), Http3Error::Unknown(0x1234));
}

#[test]
fn display_names() {
    assert_eq!(Http3Error::FrameUnexpected.to_string(), "H3_FRAME_UNEXPECTED");
    assert_eq!(
        Http3Error::QpackEncoderStreamError.to_string(),
        "QPACK_ENCODER_STREAM_ERROR"
    );
    assert_eq!(Http3Error::Unknown(4660).to_string(), "H3_ERROR_4660");

    let err = StreamError::new(Http3Error::MessageError, "bad header");
    assert_eq!(err.to_string(), "HTTP/3 stream error H3_MESSAGE_ERROR: bad header");
}

#[test]
fn protocol_error_tiers() {
    let stream = ProtocolError::stream(Http3Error::RequestCancelled, "gone");
    assert!(matches!(stream, ProtocolError::Stream(_)));
    assert_eq!(stream.code(), Some(Http3Error::RequestCancelled));

    let conn = ProtocolError::connection(Http3Error::IdError, "push");
    assert!(matches!(conn, ProtocolError::Connection(_)));
    assert_eq!(conn.code(), Some(Http3Error::IdError));

    assert_eq!(ProtocolError::Timeout.code(), None);
}

#[test]
fn io_errors() {
    let eof: ProtocolError = io::Error::new(io::ErrorKind::UnexpectedEof, "eof").into();
    assert!(eof.is_eof());

    let other: ProtocolError = io::Error::new(io::ErrorKind::BrokenPipe, "pipe").into();
    assert!(matches!(other, ProtocolError::Io(_)));
}
