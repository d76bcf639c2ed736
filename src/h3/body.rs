use crate::h3::consts::DATA_FRAME_TYPE;
use crate::h3::framing::FrameStream;
use crate::h3::message::read_field_section;
use crate::types::{FrameType, Header, Http3Error, ProtocolError};
use tokio::io::{AsyncRead, AsyncWrite};

fn message_error(message: &str) -> ProtocolError {
    ProtocolError::stream(Http3Error::MessageError, message)
}

/// Read side of a message body: DATA frames checked against the declared
/// Content-Length, then optional trailers.
#[derive(Debug)]
pub struct BodyState {
    remain: Option<u64>,
    done: bool,
    trailers: Option<Vec<Header>>,
    max_field_section_size: u64,
    from_server: bool,
}

impl BodyState {
    /// `from_server` marks a response body, where PUSH_PROMISE is an
    /// `H3_ID_ERROR` rather than an unexpected frame.
    pub fn new(content_length: Option<u64>, max_field_section_size: u64, from_server: bool) -> Self {
        Self {
            remain: content_length,
            done: false,
            trailers: None,
            max_field_section_size,
            from_server,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn trailers(&self) -> Option<&[Header]> {
        self.trailers.as_deref()
    }

    /// Reads body bytes into `buf`. Returns 0 once the body has ended.
    pub async fn read<S>(&mut self, st: &mut FrameStream<S>, buf: &mut [u8]) -> Result<usize, ProtocolError>
    where
        S: AsyncRead + Unpin,
    {
        if self.done || buf.is_empty() {
            return Ok(0);
        }
        loop {
            if st.in_frame() {
                if st.remaining() > 0 {
                    let n = st.read(buf).await?;
                    if let Some(remain) = self.remain.as_mut() {
                        *remain -= n as u64;
                    }
                    return Ok(n);
                }
                st.end_frame()?;
            }

            match st.read_frame_header().await? {
                None => {
                    self.finish()?;
                    return Ok(0);
                }
                Some(FrameType::Data) => {
                    if let Some(remain) = self.remain {
                        if st.remaining() as u64 > remain {
                            return Err(message_error("body longer than content-length"));
                        }
                    }
                }
                Some(FrameType::Headers) => {
                    self.finish()?;
                    let section = read_field_section(st, self.max_field_section_size).await?;
                    self.trailers = Some(section.into_trailers()?);
                    Self::drain_after_trailers(st).await?;
                    return Ok(0);
                }
                Some(FrameType::PushPromise) if self.from_server => {
                    return Err(ProtocolError::connection(
                        Http3Error::IdError,
                        "PUSH_PROMISE without MAX_PUSH_ID",
                    ))
                }
                Some(ftype) => st.discard_unknown_frame(ftype).await?,
            }
        }
    }

    fn finish(&mut self) -> Result<(), ProtocolError> {
        if matches!(self.remain, Some(r) if r > 0) {
            return Err(message_error("body shorter than content-length"));
        }
        self.done = true;
        Ok(())
    }

    /// Only unknown frames may follow the trailers.
    async fn drain_after_trailers<S>(st: &mut FrameStream<S>) -> Result<(), ProtocolError>
    where
        S: AsyncRead + Unpin,
    {
        while let Some(ftype) = st.read_frame_header().await? {
            st.discard_unknown_frame(ftype).await?;
        }
        Ok(())
    }
}

/// Write side of a message body. Writes past the declared length fail
/// before anything is sent.
#[derive(Debug)]
pub struct BodyWriter {
    remain: Option<u64>,
}

impl BodyWriter {
    pub fn new(content_length: Option<u64>) -> Self {
        Self {
            remain: content_length,
        }
    }

    /// Declared bytes not yet written, if a length was declared.
    pub fn remaining(&self) -> Option<u64> {
        self.remain
    }

    /// Buffers `data` as one DATA frame.
    pub async fn write<S>(&mut self, st: &mut FrameStream<S>, data: &[u8]) -> Result<(), ProtocolError>
    where
        S: AsyncWrite + Unpin,
    {
        if data.is_empty() {
            return Ok(());
        }
        if let Some(remain) = self.remain.as_mut() {
            if data.len() as u64 > *remain {
                return Err(ProtocolError::stream(
                    Http3Error::InternalError,
                    "body longer than declared content-length",
                ));
            }
            *remain -= data.len() as u64;
        }
        st.write_varint(DATA_FRAME_TYPE);
        st.write_varint(data.len() as u64);
        st.write(data).await
    }
}
