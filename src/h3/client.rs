use crate::h3::connection::{run_control_stream, ConnCore, StreamHandler};
use crate::h3::framing::FrameStream;
use crate::h3::roundtrip::round_trip;
use crate::h3::settings::Settings;
use crate::stream::{client_config, create_quic_connection};
use crate::types::{
    ConnConfig, ConnectionError, FrameH3, Http3Error, ProtocolError, Request, Response, Target,
};
use crate::utils::{parse_target, timeout_result};
use async_trait::async_trait;
use quinn::{Connection, RecvStream, SendStream};
use std::sync::Arc;
use tracing::debug;

/// Peer-initiated streams as seen by a client.
struct ClientStreams;

#[async_trait]
impl StreamHandler for ClientStreams {
    async fn handle_control_stream(
        &self,
        core: &ConnCore,
        st: &mut FrameStream<RecvStream>,
    ) -> Result<(), ProtocolError> {
        run_control_stream(core, st, false).await
    }

    async fn handle_push_stream(
        &self,
        _core: &ConnCore,
        _st: &mut FrameStream<RecvStream>,
    ) -> Result<(), ProtocolError> {
        Err(ProtocolError::connection(
            Http3Error::IdError,
            "push stream without MAX_PUSH_ID",
        ))
    }

    async fn handle_request_stream(
        &self,
        _core: &ConnCore,
        _send: &mut FrameStream<SendStream>,
        _recv: &mut FrameStream<RecvStream>,
    ) -> Result<(), ProtocolError> {
        Err(ProtocolError::connection(
            Http3Error::StreamCreationError,
            "server opened a bidirectional stream",
        ))
    }
}

/// Client side of an HTTP/3 connection. Clones share the connection.
#[derive(Clone)]
pub struct ClientConn {
    core: Arc<ConnCore>,
    config: Arc<ConnConfig>,
}

impl ClientConn {
    /// Speaks HTTP/3 over an established QUIC connection.
    pub async fn new(conn: Connection) -> Result<Self, ProtocolError> {
        Self::with_config(conn, ConnConfig::default()).await
    }

    pub async fn with_config(conn: Connection, config: ConnConfig) -> Result<Self, ProtocolError> {
        let core = Arc::new(ConnCore::new(
            conn,
            Settings::local(config.max_field_section_size),
        ));
        core.open_control_stream().await?;
        tokio::spawn(core.clone().accept_streams(Arc::new(ClientStreams)));
        Ok(Self {
            core,
            config: Arc::new(config),
        })
    }

    /// Dials the host of `target` over QUIC.
    pub async fn connect(target: &str) -> Result<Self, ProtocolError> {
        Self::connect_with_config(&parse_target(target)?, ConnConfig::default()).await
    }

    pub async fn connect_with_config(target: &Target, config: ConnConfig) -> Result<Self, ProtocolError> {
        let host = target
            .dial_host()
            .map(str::to_string)
            .ok_or_else(|| ProtocolError::InvalidTarget(format!("Target '{}' is missing a host", target)))?;
        let port = target
            .port()
            .ok_or_else(|| ProtocolError::InvalidTarget(format!("Target '{}' has no known port", target)))?;

        let tls = client_config(config.verify_certificates)?;
        let conn = timeout_result(config.timeouts.connect, async {
            create_quic_connection(&host, port, &host, tls)
                .await
                .map_err(|e| ProtocolError::ConnectionFailed(e.to_string()))
        })
        .await?;
        debug!(remote = %conn.remote_address(), "connected");
        Self::with_config(conn, config).await
    }

    pub async fn round_trip(&self, req: Request) -> Result<Response, ProtocolError> {
        round_trip(self.core.clone(), &self.config, req).await
    }

    pub fn config(&self) -> &ConnConfig {
        &self.config
    }

    pub fn peer_settings(&self) -> Settings {
        self.core.peer_settings()
    }

    pub fn connection(&self) -> &Connection {
        self.core.connection()
    }

    /// Sends GOAWAY and closes the connection with `H3_NO_ERROR`.
    pub async fn close(&self) -> Result<(), ProtocolError> {
        self.core.send_control_frame(&FrameH3::goaway(0)).await?;
        self.core
            .abort(&ConnectionError::new(Http3Error::NoError, "client closing"));
        Ok(())
    }

    /// Resolves when the connection closes, with the reason.
    pub async fn closed(&self) -> ProtocolError {
        self.core.closed().await
    }
}
