use crate::h3::consts::{CONTROL_STREAM_TYPE, DISCARD_CHUNK_SIZE};
use crate::h3::framing::FrameStream;
use crate::h3::settings::{read_settings, write_settings, Settings};
use crate::stream::{error_code, StreamControl};
use crate::types::{ConnectionError, FrameH3, FrameType, Http3Error, ProtocolError, StreamType};
use async_trait::async_trait;
use quinn::{Connection, RecvStream, SendStream};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

const CONTROL_BIT: u8 = 1;
const ENCODER_BIT: u8 = 1 << 1;
const DECODER_BIT: u8 = 1 << 2;

/// Per-role stream logic. The dispatcher in [`ConnCore`] reads stream types
/// and settles outcomes; implementations only speak the protocol.
#[async_trait]
pub trait StreamHandler: Send + Sync + 'static {
    async fn handle_control_stream(
        &self,
        core: &ConnCore,
        st: &mut FrameStream<RecvStream>,
    ) -> Result<(), ProtocolError>;

    async fn handle_push_stream(
        &self,
        core: &ConnCore,
        st: &mut FrameStream<RecvStream>,
    ) -> Result<(), ProtocolError>;

    /// The dynamic table is disabled, so encoder instructions are dropped.
    async fn handle_encoder_stream(
        &self,
        _core: &ConnCore,
        st: &mut FrameStream<RecvStream>,
    ) -> Result<(), ProtocolError> {
        drain(st).await
    }

    async fn handle_decoder_stream(
        &self,
        _core: &ConnCore,
        st: &mut FrameStream<RecvStream>,
    ) -> Result<(), ProtocolError> {
        drain(st).await
    }

    async fn handle_request_stream(
        &self,
        core: &ConnCore,
        send: &mut FrameStream<SendStream>,
        recv: &mut FrameStream<RecvStream>,
    ) -> Result<(), ProtocolError>;
}

async fn drain(st: &mut FrameStream<RecvStream>) -> Result<(), ProtocolError> {
    let mut buf = [0u8; DISCARD_CHUNK_SIZE];
    while st.read(&mut buf).await? > 0 {}
    Ok(())
}

/// State shared by every stream of one HTTP/3 connection.
pub struct ConnCore {
    conn: Connection,
    critical: AtomicU8,
    failure: OnceLock<ConnectionError>,
    local: Settings,
    peer: OnceLock<Settings>,
    control: Mutex<Option<FrameStream<SendStream>>>,
}

impl ConnCore {
    pub fn new(conn: Connection, local: Settings) -> Self {
        Self {
            conn,
            critical: AtomicU8::new(0),
            failure: OnceLock::new(),
            local,
            peer: OnceLock::new(),
            control: Mutex::new(None),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn local_settings(&self) -> Settings {
        self.local
    }

    /// The peer's SETTINGS, or the protocol defaults until they arrive.
    pub fn peer_settings(&self) -> Settings {
        self.peer.get().copied().unwrap_or_default()
    }

    /// Opens this side's control stream and sends SETTINGS on it.
    pub async fn open_control_stream(&self) -> Result<(), ProtocolError> {
        let send = self.conn.open_uni().await?;
        let mut st = FrameStream::new(send);
        st.write_varint(CONTROL_STREAM_TYPE);
        write_settings(&mut st, &self.local.to_pairs());
        st.flush().await?;
        debug!(settings = ?self.local, "control stream opened");
        *self.control.lock().await = Some(st);
        Ok(())
    }

    /// Sends `frame` on the local control stream, if it is open.
    pub async fn send_control_frame(&self, frame: &FrameH3) -> Result<(), ProtocolError> {
        let mut control = self.control.lock().await;
        match control.as_mut() {
            Some(st) => {
                st.write_frame(frame).await?;
                st.flush().await
            }
            None => Ok(()),
        }
    }

    /// Records that the peer opened a critical stream of this type. A second
    /// one is `H3_STREAM_CREATION_ERROR`.
    pub fn claim_critical(&self, stype: StreamType) -> Result<(), ProtocolError> {
        let bit = match stype {
            StreamType::Control => CONTROL_BIT,
            StreamType::Encoder => ENCODER_BIT,
            StreamType::Decoder => DECODER_BIT,
            _ => return Ok(()),
        };
        if self.critical.fetch_or(bit, Ordering::AcqRel) & bit != 0 {
            return Err(ProtocolError::connection(
                Http3Error::StreamCreationError,
                format!("duplicate {:?} stream", stype),
            ));
        }
        Ok(())
    }

    /// Closes the connection with `err`. Only the first call has any effect.
    pub fn abort(&self, err: &ConnectionError) {
        if self.conn.close_reason().is_some() {
            return;
        }
        if self.failure.set(err.clone()).is_err() {
            return;
        }
        if err.code == Http3Error::NoError {
            debug!(message = %err.message, "closing connection");
        } else {
            warn!(code = %err.code, message = %err.message, "aborting connection");
        }
        self.conn.close(error_code(err.code), err.message.as_bytes());
    }

    /// Replaces transport errors caused by a local abort with the error that
    /// triggered it.
    pub fn map_error(&self, err: ProtocolError) -> ProtocolError {
        match (self.failure.get(), err) {
            (_, err @ ProtocolError::Connection(_)) => err,
            (Some(failure), _) => ProtocolError::Connection(failure.clone()),
            (None, err) => err,
        }
    }

    /// Resolves when the connection is closed, with the reason.
    pub async fn closed(&self) -> ProtocolError {
        let err = self.conn.closed().await;
        self.map_error(err.into())
    }

    /// Accepts peer streams until the connection closes, one task per stream.
    pub async fn accept_streams<H: StreamHandler>(self: Arc<Self>, handler: Arc<H>) {
        loop {
            tokio::select! {
                bi = self.conn.accept_bi() => match bi {
                    Ok((send, recv)) => {
                        let core = self.clone();
                        let handler = handler.clone();
                        tokio::spawn(async move { core.handle_bidi(handler, send, recv).await });
                    }
                    Err(e) => {
                        debug!(reason = %e, "stream accept loop finished");
                        break;
                    }
                },
                uni = self.conn.accept_uni() => match uni {
                    Ok(recv) => {
                        let core = self.clone();
                        let handler = handler.clone();
                        tokio::spawn(async move { core.handle_uni(handler, recv).await });
                    }
                    Err(e) => {
                        debug!(reason = %e, "stream accept loop finished");
                        break;
                    }
                },
            }
        }
    }

    async fn handle_bidi<H: StreamHandler>(&self, handler: Arc<H>, send: SendStream, recv: RecvStream) {
        debug!(stream = %send.id(), "request stream accepted");
        let mut send = FrameStream::new(send);
        let mut recv = FrameStream::new(recv);
        let result = handler.handle_request_stream(self, &mut send, &mut recv).await;
        self.settle(result, Some(send.get_mut()), recv.get_mut());
    }

    async fn handle_uni<H: StreamHandler>(&self, handler: Arc<H>, recv: RecvStream) {
        let id = recv.id();
        let mut st = FrameStream::new(recv);
        let stype = match st.read_varint().await {
            Ok(value) => StreamType::from_uni(value),
            Err(ProtocolError::Eof) => {
                trace!(stream = %id, "unidirectional stream closed before its type");
                return;
            }
            Err(e) => {
                self.settle(Err(e), None, st.get_mut());
                return;
            }
        };
        debug!(stream = %id, ?stype, "unidirectional stream accepted");

        let result = match stype {
            StreamType::Control | StreamType::Encoder | StreamType::Decoder => {
                let outcome = match self.claim_critical(stype) {
                    Ok(()) => match stype {
                        StreamType::Control => handler.handle_control_stream(self, &mut st).await,
                        StreamType::Encoder => handler.handle_encoder_stream(self, &mut st).await,
                        _ => handler.handle_decoder_stream(self, &mut st).await,
                    },
                    Err(e) => Err(e),
                };
                Err(critical_stream_closed(outcome))
            }
            StreamType::Push => handler.handle_push_stream(self, &mut st).await,
            StreamType::Request | StreamType::Unknown(_) => {
                trace!(stream = %id, ?stype, "ignoring stream of unknown type");
                st.get_mut().abort(Http3Error::StreamCreationError);
                return;
            }
        };
        self.settle(result, None, st.get_mut());
    }

    /// Applies a handler outcome to the stream it ran on.
    fn settle(
        &self,
        result: Result<(), ProtocolError>,
        send: Option<&mut SendStream>,
        recv: &mut RecvStream,
    ) {
        let code = match result.map_err(|e| self.map_error(e)) {
            Ok(()) => {
                recv.abort(Http3Error::NoError);
                if let Some(send) = send {
                    let _ = send.finish();
                }
                return;
            }
            Err(ProtocolError::Connection(e)) => {
                self.abort(&e);
                return;
            }
            Err(ProtocolError::Stream(e)) => {
                debug!(stream = %recv.id(), code = %e.code, message = %e.message, "resetting stream");
                e.code
            }
            Err(e) => {
                debug!(stream = %recv.id(), error = %e, "stream failed");
                Http3Error::InternalError
            }
        };
        recv.abort(code);
        if let Some(send) = send {
            send.abort(code);
        }
    }
}

/// Any end of a critical stream short of a connection error is
/// `H3_CLOSED_CRITICAL_STREAM`.
fn critical_stream_closed(outcome: Result<(), ProtocolError>) -> ProtocolError {
    match outcome {
        Err(err @ ProtocolError::Connection(_)) => err,
        _ => ProtocolError::connection(Http3Error::ClosedCriticalStream, "critical stream closed"),
    }
}

/// Reads the peer's control stream: SETTINGS first, then frames until the
/// stream ends. `MAX_PUSH_ID` is only valid towards a server.
pub async fn run_control_stream(
    core: &ConnCore,
    st: &mut FrameStream<RecvStream>,
    accept_max_push_id: bool,
) -> Result<(), ProtocolError> {
    let mut settings = Settings::default();
    read_settings(st, |id, value| {
        settings.apply(id, value);
        Ok(())
    })
    .await?;
    debug!(?settings, "peer settings received");
    let _ = core.peer.set(settings);

    while let Some(ftype) = st.read_frame_header().await? {
        match ftype {
            FrameType::CancelPush => {
                return Err(ProtocolError::connection(
                    Http3Error::IdError,
                    "CANCEL_PUSH without any push id",
                ))
            }
            FrameType::GoAway => {
                let id = st.read_varint().await?;
                st.end_frame()?;
                debug!(id, "GOAWAY received");
                return Err(ProtocolError::connection(Http3Error::NoError, "peer sent GOAWAY"));
            }
            FrameType::MaxPushId if accept_max_push_id => {
                let id = st.read_varint().await?;
                st.end_frame()?;
                trace!(id, "MAX_PUSH_ID ignored");
            }
            other => st.discard_unknown_frame(other).await?,
        }
    }
    Ok(())
}
