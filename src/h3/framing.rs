use crate::h3::varint::encode_varint;
use crate::types::{FrameH3, FrameType, Http3Error, ProtocolError};
use bytes::{Buf, Bytes, BytesMut};
use std::cmp::min;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

const READ_CHUNK_SIZE: usize = 8192;
const WRITE_BUFFER_SIZE: usize = 16 * 1024;

fn frame_error(message: &str) -> ProtocolError {
    ProtocolError::connection(Http3Error::FrameError, message)
}

/// One HTTP/3 stream half with frame boundary tracking.
///
/// `remaining` counts the unread bytes of the current frame, or is -1 between
/// frames. Reads never cross a frame end: doing so is an `H3_FRAME_ERROR`, as
/// is the peer ending the stream while a frame is still open. Writes are
/// buffered until [`FrameStream::flush`] and are not checked against frame
/// lengths; the caller writes the type, the length, then the payload.
pub struct FrameStream<S> {
    inner: S,
    rbuf: BytesMut,
    wbuf: BytesMut,
    remaining: i64,
}

impl<S> FrameStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            rbuf: BytesMut::new(),
            wbuf: BytesMut::new(),
            remaining: -1,
        }
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Unread bytes in the current frame, or -1 outside a frame.
    pub fn remaining(&self) -> i64 {
        self.remaining
    }

    pub fn in_frame(&self) -> bool {
        self.remaining >= 0
    }

    /// Leaves the current frame. Every byte of it must have been read.
    pub fn end_frame(&mut self) -> Result<(), ProtocolError> {
        if self.remaining != 0 {
            return Err(frame_error("frame ended with unread or missing bytes"));
        }
        self.remaining = -1;
        Ok(())
    }

    pub fn write_varint(&mut self, value: u64) {
        encode_varint(&mut self.wbuf, value);
    }

    fn record_read(&mut self, n: usize) -> Result<(), ProtocolError> {
        if self.remaining < 0 {
            return Ok(());
        }
        if n as i64 > self.remaining {
            return Err(frame_error("read past end of frame"));
        }
        self.remaining -= n as i64;
        Ok(())
    }

    fn eof_error(&self) -> ProtocolError {
        if self.remaining < 0 {
            ProtocolError::Eof
        } else {
            frame_error("stream ended inside frame")
        }
    }
}

impl<S: AsyncRead + Unpin> FrameStream<S> {
    /// Pulls more bytes from the transport. Returns false at end of stream.
    async fn fill(&mut self) -> Result<bool, ProtocolError> {
        self.rbuf.reserve(READ_CHUNK_SIZE);
        let n = self.inner.read_buf(&mut self.rbuf).await?;
        Ok(n > 0)
    }

    /// Reads the next frame's type and length and enters the frame.
    ///
    /// Returns `Ok(None)` if the stream ends cleanly where a frame would start.
    pub async fn read_frame_header(&mut self) -> Result<Option<FrameType>, ProtocolError> {
        if self.remaining >= 0 {
            return Err(frame_error("frame header read inside a frame"));
        }
        let ftype = match self.read_varint().await {
            Ok(v) => FrameType::from(v),
            Err(ProtocolError::Eof) => return Ok(None),
            Err(e) => return Err(e),
        };
        let len = match self.read_varint().await {
            Ok(v) => v,
            Err(ProtocolError::Eof) => return Err(frame_error("stream ended inside frame header")),
            Err(e) => return Err(e),
        };
        trace!(?ftype, len, "frame header");
        self.remaining = len as i64;
        Ok(Some(ftype))
    }

    /// Skips the rest of the current frame.
    pub async fn discard_frame(&mut self) -> Result<(), ProtocolError> {
        if self.remaining < 0 {
            return Err(frame_error("discard outside of a frame"));
        }
        while self.remaining > 0 {
            if self.rbuf.is_empty() && !self.fill().await? {
                return Err(self.eof_error());
            }
            let n = min(self.rbuf.len() as i64, self.remaining) as usize;
            self.rbuf.advance(n);
            self.remaining -= n as i64;
        }
        self.remaining = -1;
        Ok(())
    }

    /// Skips a frame whose type is not handled in the current context.
    /// A known type here is out of place and fails with `H3_FRAME_UNEXPECTED`.
    pub async fn discard_unknown_frame(&mut self, ftype: FrameType) -> Result<(), ProtocolError> {
        if ftype.is_known() {
            return Err(ProtocolError::connection(
                Http3Error::FrameUnexpected,
                format!("unexpected frame type {:#x}", ftype.value()),
            ));
        }
        self.discard_frame().await
    }

    /// Reads the rest of the current frame. The frame is left with zero
    /// bytes remaining; the caller still calls [`FrameStream::end_frame`].
    pub async fn read_frame_data(&mut self) -> Result<Bytes, ProtocolError> {
        if self.remaining < 0 {
            return Err(frame_error("frame data read outside of a frame"));
        }
        let len = self.remaining as usize;
        while self.rbuf.len() < len {
            if !self.fill().await? {
                return Err(self.eof_error());
            }
        }
        self.remaining = 0;
        Ok(self.rbuf.split_to(len).freeze())
    }

    /// Reads up to the end of the current frame. Returns 0 at the frame end,
    /// or at end of stream outside any frame.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        let want = if self.remaining >= 0 {
            min(buf.len() as i64, self.remaining) as usize
        } else {
            buf.len()
        };
        if want == 0 {
            return Ok(0);
        }
        if self.rbuf.is_empty() && !self.fill().await? {
            if self.remaining > 0 {
                return Err(frame_error("stream ended inside frame"));
            }
            return Ok(0);
        }
        let n = min(want, self.rbuf.len());
        self.rbuf.copy_to_slice(&mut buf[..n]);
        self.record_read(n)?;
        Ok(n)
    }

    pub async fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), ProtocolError> {
        self.record_read(buf.len())?;
        let mut filled = 0;
        while filled < buf.len() {
            if self.rbuf.is_empty() && !self.fill().await? {
                return Err(self.eof_error());
            }
            let n = min(buf.len() - filled, self.rbuf.len());
            self.rbuf.copy_to_slice(&mut buf[filled..filled + n]);
            filled += n;
        }
        Ok(())
    }

    pub async fn read_byte(&mut self) -> Result<u8, ProtocolError> {
        self.record_read(1)?;
        if self.rbuf.is_empty() && !self.fill().await? {
            return Err(self.eof_error());
        }
        Ok(self.rbuf.get_u8())
    }

    /// Reads a QUIC varint. End of stream before the first byte is reported
    /// as is; end of stream inside the varint is a framing error.
    pub async fn read_varint(&mut self) -> Result<u64, ProtocolError> {
        let first = self.read_byte().await?;
        let len = 1usize << (first >> 6);
        let mut value = (first & 0x3f) as u64;
        for _ in 1..len {
            let b = match self.read_byte().await {
                Ok(b) => b,
                Err(ProtocolError::Eof) => return Err(frame_error("truncated varint")),
                Err(e) => return Err(e),
            };
            value = (value << 8) | b as u64;
        }
        Ok(value)
    }
}

impl<S: AsyncWrite + Unpin> FrameStream<S> {
    pub async fn write(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        if self.wbuf.len() + data.len() > WRITE_BUFFER_SIZE {
            self.write_buffered().await?;
            if data.len() > WRITE_BUFFER_SIZE {
                self.inner.write_all(data).await?;
                return Ok(());
            }
        }
        self.wbuf.extend_from_slice(data);
        Ok(())
    }

    pub async fn write_frame(&mut self, frame: &FrameH3) -> Result<(), ProtocolError> {
        self.write(&frame.serialize()).await
    }

    async fn write_buffered(&mut self) -> Result<(), ProtocolError> {
        if !self.wbuf.is_empty() {
            self.inner.write_all(&self.wbuf).await?;
            self.wbuf.clear();
        }
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<(), ProtocolError> {
        self.write_buffered().await?;
        self.inner.flush().await?;
        Ok(())
    }
}
