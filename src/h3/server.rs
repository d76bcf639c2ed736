use crate::h3::body::{BodyState, BodyWriter};
use crate::h3::connection::{run_control_stream, ConnCore, StreamHandler};
use crate::h3::framing::FrameStream;
use crate::h3::message::{
    content_length, encode_response_headers, encode_trailers, read_field_section, RequestHead,
};
use crate::h3::settings::Settings;
use crate::stream::{finish_send, server_config};
use crate::types::{ConnConfig, FrameH3, FrameType, Header, Http3Error, ProtocolError};
use crate::utils::header_value;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use quinn::{Connection, Endpoint, RecvStream, SendStream};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// Application logic answering requests on a server connection.
///
/// The response is finished after `serve` returns unless the handler already
/// did so. An error resets the request stream (or closes the connection, for
/// a connection error).
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn serve(
        &self,
        req: &mut ServerRequest<'_>,
        res: &mut ResponseWriter<'_>,
    ) -> Result<(), ProtocolError>;
}

/// A request head plus its body, still on the stream.
pub struct ServerRequest<'a> {
    pub method: String,
    pub scheme: Option<String>,
    pub authority: Option<String>,
    pub path: Option<String>,
    pub headers: Vec<Header>,
    pub content_length: Option<u64>,
    recv: &'a mut FrameStream<RecvStream>,
    body: BodyState,
}

impl<'a> ServerRequest<'a> {
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }

    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        self.body.read(&mut *self.recv, buf).await
    }

    pub async fn bytes(&mut self) -> Result<Bytes, ProtocolError> {
        let mut out = BytesMut::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                return Ok(out.freeze());
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    pub fn trailers(&self) -> Option<&[Header]> {
        self.body.trailers()
    }
}

/// Response side of a request stream. The HEADERS frame goes out on the
/// first body write, an informational response, or [`ResponseWriter::finish`].
pub struct ResponseWriter<'a> {
    send: &'a mut FrameStream<SendStream>,
    status: u16,
    headers: Vec<Header>,
    content_length: Option<u64>,
    trailers: Option<Vec<Header>>,
    peer_max_field_section_size: Option<u64>,
    body: Option<BodyWriter>,
    finished: bool,
}

impl<'a> ResponseWriter<'a> {
    fn new(send: &'a mut FrameStream<SendStream>, peer_max_field_section_size: Option<u64>) -> Self {
        Self {
            send,
            status: 200,
            headers: Vec::new(),
            content_length: None,
            trailers: None,
            peer_max_field_section_size,
            body: None,
            finished: false,
        }
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push(Header::new(name, value));
    }

    /// Declares the body length. Writing more or fewer bytes is a stream error.
    pub fn set_content_length(&mut self, length: u64) {
        self.content_length = Some(length);
    }

    pub fn set_trailers(&mut self, trailers: Vec<Header>) {
        self.trailers = Some(trailers);
    }

    pub fn headers_sent(&self) -> bool {
        self.body.is_some()
    }

    fn headers_frame(&self, field_section: Bytes, size: u64) -> Result<FrameH3, ProtocolError> {
        match self.peer_max_field_section_size {
            Some(limit) if size > limit => Err(ProtocolError::stream(
                Http3Error::InternalError,
                format!("response fields ({} bytes) exceed the peer's limit of {}", size, limit),
            )),
            _ => Ok(FrameH3::headers(field_section)),
        }
    }

    /// Sends a 1xx response ahead of the final one.
    pub async fn send_informational(&mut self, status: u16, headers: &[Header]) -> Result<(), ProtocolError> {
        if !(100..200).contains(&status) || status == 101 {
            return Err(ProtocolError::stream(
                Http3Error::InternalError,
                format!("{} is not an informational status", status),
            ));
        }
        if self.headers_sent() {
            return Err(ProtocolError::stream(
                Http3Error::InternalError,
                "informational response after final headers",
            ));
        }
        let (section, size) = encode_response_headers(status, headers, None)?;
        let frame = self.headers_frame(section, size)?;
        self.send.write_frame(&frame).await?;
        self.send.flush().await
    }

    /// Sends the final response head if it has not gone out yet.
    pub async fn write_header(&mut self) -> Result<(), ProtocolError> {
        if self.headers_sent() {
            return Ok(());
        }
        let (section, size) = encode_response_headers(self.status, &self.headers, self.content_length)?;
        let frame = self.headers_frame(section, size)?;
        self.send.write_frame(&frame).await?;
        self.body = Some(BodyWriter::new(self.content_length));
        Ok(())
    }

    pub async fn write(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        self.write_header().await?;
        if let Some(body) = self.body.as_mut() {
            body.write(&mut *self.send, data).await?;
        }
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<(), ProtocolError> {
        self.send.flush().await
    }

    /// Sends anything still pending, the trailers, and ends the stream.
    pub async fn finish(&mut self) -> Result<(), ProtocolError> {
        if self.finished {
            return Ok(());
        }
        self.write_header().await?;
        if let Some(short) = self.body.as_ref().and_then(BodyWriter::remaining).filter(|r| *r > 0) {
            return Err(ProtocolError::stream(
                Http3Error::InternalError,
                format!("response body ended {} bytes short of content-length", short),
            ));
        }
        if let Some(trailers) = self.trailers.take() {
            let (section, size) = encode_trailers(&trailers)?;
            let frame = self.headers_frame(section, size)?;
            self.send.write_frame(&frame).await?;
        }
        self.send.flush().await?;
        finish_send(self.send.get_mut())?;
        self.finished = true;
        Ok(())
    }
}

/// Peer-initiated streams as seen by a server.
struct ServerStreams<H> {
    handler: Arc<H>,
    config: Arc<ConnConfig>,
}

impl<H: Handler> ServerStreams<H> {
    async fn read_request_head(
        &self,
        recv: &mut FrameStream<RecvStream>,
    ) -> Result<RequestHead, ProtocolError> {
        loop {
            match recv.read_frame_header().await? {
                Some(FrameType::Headers) => {
                    let section = read_field_section(recv, self.config.max_field_section_size).await?;
                    return section.into_request_head();
                }
                Some(ftype) => recv.discard_unknown_frame(ftype).await?,
                None => {
                    return Err(ProtocolError::stream(
                        Http3Error::RequestIncomplete,
                        "stream ended before request headers",
                    ))
                }
            }
        }
    }
}

#[async_trait]
impl<H: Handler> StreamHandler for ServerStreams<H> {
    async fn handle_control_stream(
        &self,
        core: &ConnCore,
        st: &mut FrameStream<RecvStream>,
    ) -> Result<(), ProtocolError> {
        run_control_stream(core, st, true).await
    }

    async fn handle_push_stream(
        &self,
        _core: &ConnCore,
        _st: &mut FrameStream<RecvStream>,
    ) -> Result<(), ProtocolError> {
        Err(ProtocolError::connection(
            Http3Error::StreamCreationError,
            "client opened a push stream",
        ))
    }

    async fn handle_request_stream(
        &self,
        core: &ConnCore,
        send: &mut FrameStream<SendStream>,
        recv: &mut FrameStream<RecvStream>,
    ) -> Result<(), ProtocolError> {
        let head = self.read_request_head(recv).await?;
        let length = content_length(&head.headers)?;
        debug!(method = %head.method, path = ?head.path, "request received");

        let max = self.config.max_field_section_size;
        let mut req = ServerRequest {
            method: head.method,
            scheme: head.scheme,
            authority: head.authority,
            path: head.path,
            headers: head.headers,
            content_length: length,
            recv,
            body: BodyState::new(length, max, false),
        };
        let mut res = ResponseWriter::new(send, core.peer_settings().max_field_section_size);
        self.handler.serve(&mut req, &mut res).await?;
        res.finish().await
    }
}

/// Server side of one HTTP/3 connection.
pub struct ServerConn;

impl ServerConn {
    /// Serves requests on `conn` until it closes.
    pub async fn serve<H: Handler>(
        conn: Connection,
        handler: Arc<H>,
        config: ConnConfig,
    ) -> Result<(), ProtocolError> {
        let core = Arc::new(ConnCore::new(
            conn,
            Settings::local(config.max_field_section_size),
        ));
        core.open_control_stream().await?;
        let streams = Arc::new(ServerStreams {
            handler,
            config: Arc::new(config),
        });
        core.clone().accept_streams(streams).await;
        let reason = core.closed().await;
        debug!(%reason, "connection closed");
        Ok(())
    }
}

/// Accepts QUIC connections and serves each one in its own task.
pub struct Server<H> {
    endpoint: Endpoint,
    handler: Arc<H>,
    config: ConnConfig,
}

impl<H: Handler> Server<H> {
    pub fn new(endpoint: Endpoint, handler: H) -> Self {
        Self {
            endpoint,
            handler: Arc::new(handler),
            config: ConnConfig::default(),
        }
    }

    /// Binds a QUIC endpoint on `addr` offering ALPN `h3`.
    pub fn bind(
        addr: SocketAddr,
        certs: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
        handler: H,
    ) -> Result<Self, ProtocolError> {
        let endpoint = Endpoint::server(server_config(certs, key)?, addr)?;
        Ok(Self::new(endpoint, handler))
    }

    pub fn with_config(mut self, config: ConnConfig) -> Self {
        self.config = config;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ProtocolError> {
        Ok(self.endpoint.local_addr()?)
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Accepts connections until the endpoint is closed.
    pub async fn serve(&self) -> Result<(), ProtocolError> {
        while let Some(incoming) = self.endpoint.accept().await {
            let handler = self.handler.clone();
            let config = self.config.clone();
            tokio::spawn(async move {
                match incoming.await {
                    Ok(conn) => {
                        debug!(remote = %conn.remote_address(), "connection accepted");
                        if let Err(err) = ServerConn::serve(conn, handler, config).await {
                            debug!(error = %err, "connection failed");
                        }
                    }
                    Err(err) => debug!(error = %err, "handshake failed"),
                }
            });
        }
        Ok(())
    }
}
