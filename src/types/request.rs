use super::cancel::CancelToken;
use super::error::ProtocolError;
use super::{Header, Target};
use crate::utils::parse_target;
use bytes::Bytes;
use std::fmt;
use std::io::Cursor;
use std::time::Duration;
use tokio::io::AsyncRead;

pub type BodyReader = Box<dyn AsyncRead + Send + Unpin>;

pub struct Request {
    pub method: String,
    pub target: Target,
    pub headers: Vec<Header>,
    pub body: Option<BodyReader>,
    /// Declared body length. `None` leaves it unannounced.
    pub content_length: Option<u64>,
    /// Deadline for the whole exchange, response body included.
    pub timeout: Option<Duration>,
    pub cancel: Option<CancelToken>,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("target", &self.target.as_str())
            .field("headers", &self.headers)
            .field("has_body", &self.body.is_some())
            .field("content_length", &self.content_length)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Request {
    pub fn new(target: &str, method: impl Into<String>) -> Result<Self, ProtocolError> {
        Ok(Self::with_target(parse_target(target)?, method))
    }

    pub fn with_target(target: Target, method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            target,
            headers: Vec::new(),
            body: None,
            content_length: None,
            timeout: None,
            cancel: None,
        }
    }

    pub fn with_header(mut self, header: Header) -> Self {
        self.headers.push(header);
        self
    }

    pub fn with_headers(mut self, headers: Vec<Header>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// In-memory body; its length becomes the declared content length.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        self.content_length = Some(body.len() as u64);
        self.body = Some(Box::new(Cursor::new(body)));
        self
    }

    pub fn with_body_reader<R>(mut self, reader: R, content_length: Option<u64>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.body = Some(Box::new(reader));
        self.content_length = content_length;
        self
    }

    /// Overrides the declared length. The body must then match it exactly.
    pub fn with_content_length(mut self, content_length: u64) -> Self {
        self.content_length = Some(content_length);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}
