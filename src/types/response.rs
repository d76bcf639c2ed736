use super::{Header, ProtocolError};
use crate::h3::roundtrip::ResponseBody;
use crate::utils::header_value;
use bytes::Bytes;

/// A final response head with its body still on the stream.
#[derive(Debug)]
pub struct Response {
    pub status: u16,
    pub protocol: String,
    pub headers: Vec<Header>,
    /// Declared Content-Length, where the status allows one.
    pub content_length: Option<u64>,
    pub body: ResponseBody,
}

impl Response {
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }

    pub async fn bytes(&self) -> Result<Bytes, ProtocolError> {
        self.body.bytes().await
    }

    pub async fn text(&self) -> Result<String, ProtocolError> {
        let body = self.bytes().await?;
        Ok(String::from_utf8_lossy(&body).to_string())
    }

    /// Trailers, available once the body has been read to the end.
    pub async fn trailers(&self) -> Option<Vec<Header>> {
        self.body.trailers().await
    }
}
