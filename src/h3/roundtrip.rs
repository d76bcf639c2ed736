use crate::h3::body::{BodyState, BodyWriter};
use crate::h3::connection::ConnCore;
use crate::h3::consts::DISCARD_CHUNK_SIZE;
use crate::h3::framing::FrameStream;
use crate::h3::message::{
    encode_request_headers, read_field_section, response_content_length, response_has_body,
};
use crate::stream::{finish_send, StreamControl};
use crate::types::{
    BodyReader, CancelToken, ClientTimeouts, ConnConfig, FrameH3, FrameType, Header, Http3Error,
    ProtocolError, Request, Response,
};
use crate::utils::{timeout_result, HTTP_VERSION_3_0};
use bytes::{Bytes, BytesMut};
use quinn::{RecvStream, SendStream};
use std::fmt;
use std::future::{pending, Future};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace};

struct RecvHalf {
    st: FrameStream<RecvStream>,
    body: BodyState,
}

/// One request/response exchange on a request stream.
///
/// Every stream operation goes through [`RoundTrip::run`], which races it
/// against the request deadline, the caller's cancel token and local
/// closure. The first error recorded wins and decides how the stream (or
/// the whole connection) is torn down.
pub(crate) struct RoundTrip {
    core: Arc<ConnCore>,
    send: Mutex<FrameStream<SendStream>>,
    recv: Mutex<RecvHalf>,
    failure: OnceLock<ProtocolError>,
    closed: CancelToken,
    complete: AtomicBool,
    deadline: Option<Instant>,
    cancel: Option<CancelToken>,
    timeouts: ClientTimeouts,
}

impl RoundTrip {
    async fn run<T, F>(&self, op_timeout: Option<Duration>, op: F) -> Result<T, ProtocolError>
    where
        F: Future<Output = Result<T, ProtocolError>>,
    {
        if let Some(err) = self.failure.get() {
            return Err(err.clone());
        }
        let user_cancel = async {
            match &self.cancel {
                Some(token) => token.cancelled().await,
                None => pending().await,
            }
        };
        let deadline = async {
            match self.deadline {
                Some(at) => sleep_until(at).await,
                None => pending().await,
            }
        };

        let result = tokio::select! {
            biased;
            _ = self.closed.cancelled() => {
                return Err(self.failure.get().cloned().unwrap_or(ProtocolError::BodyClosed));
            }
            _ = user_cancel => Err(ProtocolError::stream(Http3Error::RequestCancelled, "request cancelled")),
            _ = deadline => Err(ProtocolError::Timeout),
            r = timeout_result(op_timeout, op) => r,
        };
        match result {
            Ok(value) => Ok(value),
            // The peer stopped the stream without an error; nothing to tear down.
            Err(ProtocolError::Stream(e)) if e.code == Http3Error::NoError => {
                Err(ProtocolError::Stream(e))
            }
            Err(err) => Err(self.abort(self.core.map_error(err)).await),
        }
    }

    /// Tears the exchange down with `err`. Later calls return the error
    /// recorded first.
    async fn abort(&self, err: ProtocolError) -> ProtocolError {
        if self.failure.set(err.clone()).is_err() {
            return self.failure.get().cloned().unwrap_or(err);
        }
        self.closed.cancel();

        let code = match &err {
            ProtocolError::Connection(e) => {
                self.core.abort(e);
                return err;
            }
            _ if self.complete.load(Ordering::Acquire) => return err,
            ProtocolError::Stream(e) => e.code,
            ProtocolError::Timeout | ProtocolError::BodyClosed => Http3Error::RequestCancelled,
            _ => Http3Error::InternalError,
        };
        debug!(code = %code, error = %err, "aborting request stream");
        self.recv.lock().await.st.get_mut().abort(code);
        self.send.lock().await.get_mut().abort(code);
        err
    }

    async fn read_head(&self, method: &str) -> Result<(u16, Vec<Header>), ProtocolError> {
        let max = self.core.local_settings().max_field_section_size.unwrap_or(u64::MAX);
        self.run(self.timeouts.read, async {
            let mut guard = self.recv.lock().await;
            let half = &mut *guard;
            loop {
                match half.st.read_frame_header().await? {
                    None => {
                        return Err(ProtocolError::RequestFailed(
                            "stream ended before response headers".to_string(),
                        ))
                    }
                    Some(FrameType::Headers) => {
                        let section = read_field_section(&mut half.st, max).await?;
                        let (status, headers) = section.into_response_head()?;
                        if (100..200).contains(&status) {
                            trace!(status, "informational response skipped");
                            continue;
                        }
                        let length = response_content_length(method, status, &headers)?;
                        let remain = if response_has_body(method, status) { length } else { Some(0) };
                        half.body = BodyState::new(remain, max, true);
                        return Ok((status, headers));
                    }
                    Some(FrameType::PushPromise) => {
                        return Err(ProtocolError::connection(
                            Http3Error::IdError,
                            "PUSH_PROMISE without MAX_PUSH_ID",
                        ))
                    }
                    Some(ftype) => half.st.discard_unknown_frame(ftype).await?,
                }
            }
        })
        .await
    }

    async fn send_body(&self, mut body: BodyReader, content_length: Option<u64>) -> Result<(), ProtocolError> {
        let mut writer = BodyWriter::new(content_length);
        let mut buf = vec![0u8; DISCARD_CHUNK_SIZE];
        loop {
            let n = self
                .run(self.timeouts.write, async { body.read(&mut buf).await.map_err(ProtocolError::from) })
                .await?;
            if n == 0 {
                break;
            }
            let chunk = &buf[..n];
            self.run(self.timeouts.write, async {
                let mut st = self.send.lock().await;
                writer.write(&mut *st, chunk).await?;
                st.flush().await
            })
            .await?;
        }

        if let Some(short) = writer.remaining().filter(|r| *r > 0) {
            let err = ProtocolError::RequestFailed(format!(
                "request body ended {} bytes short of content-length",
                short
            ));
            return Err(self.abort(err).await);
        }
        self.run(self.timeouts.write, async {
            let mut st = self.send.lock().await;
            st.flush().await?;
            finish_send(st.get_mut())
        })
        .await
    }

    async fn read_body(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        self.run(self.timeouts.read, async {
            let mut guard = self.recv.lock().await;
            let half = &mut *guard;
            let n = half.body.read(&mut half.st, buf).await?;
            if half.body.is_done() {
                self.complete.store(true, Ordering::Release);
            }
            Ok::<_, ProtocolError>(n)
        })
        .await
    }
}

/// Sends `req` on a new request stream and waits for the final response
/// head. The response body stays on the stream until read.
pub(crate) async fn round_trip(
    core: Arc<ConnCore>,
    config: &ConnConfig,
    req: Request,
) -> Result<Response, ProtocolError> {
    let Request {
        method,
        target,
        headers,
        body,
        content_length,
        timeout,
        cancel,
    } = req;

    let (field_section, size) =
        encode_request_headers(&method, &target, &headers, content_length, &config.user_agent)?;
    if let Some(limit) = core.peer_settings().max_field_section_size {
        if size > limit {
            return Err(ProtocolError::RequestFailed(format!(
                "request headers ({} bytes) exceed the peer's limit of {}",
                size, limit
            )));
        }
    }

    let deadline = timeout.map(|t| Instant::now() + t);
    let (send, recv) = timeout_result(config.timeouts.connect, async {
        core.connection().open_bi().await.map_err(ProtocolError::from)
    })
    .await
    .map_err(|e| core.map_error(e))?;
    debug!(stream = %send.id(), %method, %target, "request stream opened");

    let rt = Arc::new(RoundTrip {
        core,
        send: Mutex::new(FrameStream::new(send)),
        recv: Mutex::new(RecvHalf {
            st: FrameStream::new(recv),
            body: BodyState::new(None, config.max_field_section_size, true),
        }),
        failure: OnceLock::new(),
        closed: CancelToken::new(),
        complete: AtomicBool::new(false),
        deadline,
        cancel,
        timeouts: config.timeouts.clone(),
    });

    let has_body = body.is_some();
    rt.run(rt.timeouts.write, async {
        let mut st = rt.send.lock().await;
        st.write_frame(&FrameH3::headers(field_section)).await?;
        st.flush().await?;
        if !has_body {
            finish_send(st.get_mut())?;
        }
        Ok::<_, ProtocolError>(())
    })
    .await?;

    if let Some(body) = body {
        let uploader = rt.clone();
        tokio::spawn(async move {
            if let Err(err) = uploader.send_body(body, content_length).await {
                debug!(error = %err, "request body upload failed");
            }
        });
    }

    let (status, headers) = rt.read_head(&method).await?;
    let content_length = response_content_length(&method, status, &headers)?;
    debug!(status, "response received");

    Ok(Response {
        status,
        protocol: HTTP_VERSION_3_0.to_string(),
        headers,
        content_length,
        body: ResponseBody { rt },
    })
}

/// Streaming response content. Reads from concurrent callers are
/// serialized; [`ResponseBody::close`] interrupts a read in progress.
pub struct ResponseBody {
    rt: Arc<RoundTrip>,
}

impl ResponseBody {
    /// Reads body bytes into `buf`, returning 0 at the end of the body.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        self.rt.read_body(buf).await
    }

    /// Reads the rest of the body.
    pub async fn bytes(&self) -> Result<Bytes, ProtocolError> {
        let mut out = BytesMut::new();
        let mut buf = vec![0u8; DISCARD_CHUNK_SIZE];
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                return Ok(out.freeze());
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    /// Trailers received after the body, once it has been read to the end.
    pub async fn trailers(&self) -> Option<Vec<Header>> {
        let half = self.rt.recv.lock().await;
        half.body.trailers().map(<[Header]>::to_vec)
    }

    /// Stops reading. An unfinished exchange is cancelled on the wire.
    pub async fn close(&self) {
        self.rt.abort(ProtocolError::BodyClosed).await;
    }
}

impl Drop for ResponseBody {
    fn drop(&mut self) {
        if self.rt.complete.load(Ordering::Acquire) || self.rt.failure.get().is_some() {
            return;
        }
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let rt = self.rt.clone();
            handle.spawn(async move {
                rt.abort(ProtocolError::BodyClosed).await;
            });
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody")
            .field("complete", &self.rt.complete.load(Ordering::Relaxed))
            .finish()
    }
}
