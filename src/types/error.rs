use std::fmt;
use std::io;
use std::sync::Arc;

/// HTTP/3 and QPACK application error codes (RFC 9114 §8.1, RFC 9204 §8.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Http3Error {
    NoError,
    GeneralProtocolError,
    InternalError,
    StreamCreationError,
    ClosedCriticalStream,
    FrameUnexpected,
    FrameError,
    ExcessiveLoad,
    IdError,
    SettingsError,
    MissingSettings,
    RequestRejected,
    RequestCancelled,
    RequestIncomplete,
    MessageError,
    ConnectError,
    VersionFallback,
    QpackDecompressionFailed,
    QpackEncoderStreamError,
    QpackDecoderStreamError,
    Unknown(u64),
}

impl Http3Error {
    pub fn code(self) -> u64 {
        match self {
            Http3Error::NoError => 0x0100,
            Http3Error::GeneralProtocolError => 0x0101,
            Http3Error::InternalError => 0x0102,
            Http3Error::StreamCreationError => 0x0103,
            Http3Error::ClosedCriticalStream => 0x0104,
            Http3Error::FrameUnexpected => 0x0105,
            Http3Error::FrameError => 0x0106,
            Http3Error::ExcessiveLoad => 0x0107,
            Http3Error::IdError => 0x0108,
            Http3Error::SettingsError => 0x0109,
            Http3Error::MissingSettings => 0x010a,
            Http3Error::RequestRejected => 0x010b,
            Http3Error::RequestCancelled => 0x010c,
            Http3Error::RequestIncomplete => 0x010d,
            Http3Error::MessageError => 0x010e,
            Http3Error::ConnectError => 0x010f,
            Http3Error::VersionFallback => 0x0110,
            Http3Error::QpackDecompressionFailed => 0x0200,
            Http3Error::QpackEncoderStreamError => 0x0201,
            Http3Error::QpackDecoderStreamError => 0x0202,
            Http3Error::Unknown(code) => code,
        }
    }

    fn name(self) -> Option<&'static str> {
        let name = match self {
            Http3Error::NoError => "H3_NO_ERROR",
            Http3Error::GeneralProtocolError => "H3_GENERAL_PROTOCOL_ERROR",
            Http3Error::InternalError => "H3_INTERNAL_ERROR",
            Http3Error::StreamCreationError => "H3_STREAM_CREATION_ERROR",
            Http3Error::ClosedCriticalStream => "H3_CLOSED_CRITICAL_STREAM",
            Http3Error::FrameUnexpected => "H3_FRAME_UNEXPECTED",
            Http3Error::FrameError => "H3_FRAME_ERROR",
            Http3Error::ExcessiveLoad => "H3_EXCESSIVE_LOAD",
            Http3Error::IdError => "H3_ID_ERROR",
            Http3Error::SettingsError => "H3_SETTINGS_ERROR",
            Http3Error::MissingSettings => "H3_MISSING_SETTINGS",
            Http3Error::RequestRejected => "H3_REQUEST_REJECTED",
            Http3Error::RequestCancelled => "H3_REQUEST_CANCELLED",
            Http3Error::RequestIncomplete => "H3_REQUEST_INCOMPLETE",
            Http3Error::MessageError => "H3_MESSAGE_ERROR",
            Http3Error::ConnectError => "H3_CONNECT_ERROR",
            Http3Error::VersionFallback => "H3_VERSION_FALLBACK",
            Http3Error::QpackDecompressionFailed => "QPACK_DECOMPRESSION_FAILED",
            Http3Error::QpackEncoderStreamError => "QPACK_ENCODER_STREAM_ERROR",
            Http3Error::QpackDecoderStreamError => "QPACK_DECODER_STREAM_ERROR",
            Http3Error::Unknown(_) => return None,
        };
        Some(name)
    }
}

impl From<u64> for Http3Error {
    fn from(code: u64) -> Self {
        match code {
            0x0100 => Http3Error::NoError,
            0x0101 => Http3Error::GeneralProtocolError,
            0x0102 => Http3Error::InternalError,
            0x0103 => Http3Error::StreamCreationError,
            0x0104 => Http3Error::ClosedCriticalStream,
            0x0105 => Http3Error::FrameUnexpected,
            0x0106 => Http3Error::FrameError,
            0x0107 => Http3Error::ExcessiveLoad,
            0x0108 => Http3Error::IdError,
            0x0109 => Http3Error::SettingsError,
            0x010a => Http3Error::MissingSettings,
            0x010b => Http3Error::RequestRejected,
            0x010c => Http3Error::RequestCancelled,
            0x010d => Http3Error::RequestIncomplete,
            0x010e => Http3Error::MessageError,
            0x010f => Http3Error::ConnectError,
            0x0110 => Http3Error::VersionFallback,
            0x0200 => Http3Error::QpackDecompressionFailed,
            0x0201 => Http3Error::QpackEncoderStreamError,
            0x0202 => Http3Error::QpackDecoderStreamError,
            other => Http3Error::Unknown(other),
        }
    }
}

impl fmt::Display for Http3Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "H3_ERROR_{}", self.code()),
        }
    }
}

/// Failure scoped to a single request stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("HTTP/3 stream error {code}: {message}")]
pub struct StreamError {
    pub code: Http3Error,
    pub message: String,
}

impl StreamError {
    pub fn new(code: Http3Error, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Failure that tears down the whole connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("HTTP/3 connection error {code}: {message}")]
pub struct ConnectionError {
    pub code: Http3Error,
    pub message: String,
}

impl ConnectionError {
    pub fn new(code: Http3Error, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error("end of stream")]
    Eof,
    #[error("IO error: {0}")]
    Io(Arc<io::Error>),
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Request failed: {0}")]
    RequestFailed(String),
    #[error("Invalid target: {0}")]
    InvalidTarget(String),
    #[error("Request timeout")]
    Timeout,
    #[error("response body closed")]
    BodyClosed,
}

impl ProtocolError {
    pub fn stream(code: Http3Error, message: impl Into<String>) -> Self {
        ProtocolError::Stream(StreamError::new(code, message))
    }

    pub fn connection(code: Http3Error, message: impl Into<String>) -> Self {
        ProtocolError::Connection(ConnectionError::new(code, message))
    }

    pub fn is_eof(&self) -> bool {
        matches!(self, ProtocolError::Eof)
    }

    /// The wire code carried by a stream or connection error.
    pub fn code(&self) -> Option<Http3Error> {
        match self {
            ProtocolError::Stream(e) => Some(e.code),
            ProtocolError::Connection(e) => Some(e.code),
            _ => None,
        }
    }
}

impl From<io::Error> for ProtocolError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            return ProtocolError::Eof;
        }
        // quinn streams surface connection loss as a wrapped io::Error.
        if let Some(inner) = err.get_ref() {
            if let Some(e) = inner.downcast_ref::<quinn::ReadError>() {
                return e.clone().into();
            }
            if let Some(e) = inner.downcast_ref::<quinn::WriteError>() {
                return e.clone().into();
            }
        }
        ProtocolError::Io(Arc::new(err))
    }
}

impl From<quinn::ConnectionError> for ProtocolError {
    fn from(err: quinn::ConnectionError) -> Self {
        match err {
            quinn::ConnectionError::ApplicationClosed(close) => {
                ProtocolError::Connection(ConnectionError::new(
                    Http3Error::from(close.error_code.into_inner()),
                    String::from_utf8_lossy(&close.reason).into_owned(),
                ))
            }
            other => ProtocolError::ConnectionFailed(other.to_string()),
        }
    }
}

impl From<quinn::WriteError> for ProtocolError {
    fn from(err: quinn::WriteError) -> Self {
        match err {
            quinn::WriteError::ConnectionLost(e) => e.into(),
            quinn::WriteError::Stopped(code) => ProtocolError::stream(
                Http3Error::from(code.into_inner()),
                "stream stopped by peer",
            ),
            other => ProtocolError::Io(Arc::new(io::Error::other(other))),
        }
    }
}

impl From<quinn::ReadError> for ProtocolError {
    fn from(err: quinn::ReadError) -> Self {
        match err {
            quinn::ReadError::ConnectionLost(e) => e.into(),
            quinn::ReadError::Reset(code) => ProtocolError::stream(
                Http3Error::from(code.into_inner()),
                "stream reset by peer",
            ),
            other => ProtocolError::Io(Arc::new(io::Error::other(other))),
        }
    }
}
