//! Frame channel over a tokio byte stream.
//!
//! The read half buffers everything it receives and only hands out complete
//! frames, so a timed-out or cancelled read never discards the beginning of
//! a frame: the next call continues where the previous one stopped.

use std::io;
use std::time::Duration;

use log::{debug, trace};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

use super::{FrameChannel, FrameRead, FrameWrite, codec};
use crate::config::TransportConfig;
use crate::error::ChannelError;
use crate::frame::Frame;

const READ_CHUNK: usize = 4096;

/// A byte stream (TCP, Unix socket, child stdio pair) framed as 9P2000.
#[derive(Debug)]
pub struct StreamChannel<R, W> {
    reader: StreamReader<R>,
    writer: StreamWriter<W>,
}

impl<S> StreamChannel<ReadHalf<S>, WriteHalf<S>>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Frame a single duplex stream.
    pub fn new(stream: S, config: &TransportConfig) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self::from_parts(reader, writer, config)
    }
}

impl<R, W> StreamChannel<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Frame separate read and write streams.
    pub fn from_parts(reader: R, writer: W, config: &TransportConfig) -> Self {
        let max_size = config.msize as usize;
        Self {
            reader: StreamReader {
                inner: reader,
                buf: Vec::with_capacity(READ_CHUNK),
                max_size,
                read_timeout: config.read_timeout(),
            },
            writer: StreamWriter {
                inner: writer,
                max_size,
            },
        }
    }
}

impl<R, W> FrameChannel for StreamChannel<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    type Reader = StreamReader<R>;
    type Writer = StreamWriter<W>;

    fn split(self) -> (Self::Reader, Self::Writer) {
        (self.reader, self.writer)
    }
}

#[derive(Debug)]
pub struct StreamReader<R> {
    inner: R,
    /// Bytes received but not yet returned as a frame.
    buf: Vec<u8>,
    max_size: usize,
    read_timeout: Option<Duration>,
}

impl<R: AsyncRead + Unpin + Send> StreamReader<R> {
    async fn fill(&mut self) -> Result<(), ChannelError> {
        self.buf.reserve(READ_CHUNK);
        let n = match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, self.inner.read_buf(&mut self.buf))
                .await
                .map_err(|_| {
                    io::Error::new(io::ErrorKind::TimedOut, "timed out waiting for frame data")
                })??,
            None => self.inner.read_buf(&mut self.buf).await?,
        };
        if n == 0 {
            if !self.buf.is_empty() {
                debug!(
                    target: "p9mux::channel::stream",
                    "EOF with {} bytes of an incomplete frame buffered",
                    self.buf.len()
                );
            }
            return Err(ChannelError::Disconnected);
        }
        Ok(())
    }
}

impl<R: AsyncRead + Unpin + Send + 'static> FrameRead for StreamReader<R> {
    async fn read_frame(&mut self) -> Result<Frame, ChannelError> {
        loop {
            let ready = codec::frame_len(&self.buf, self.max_size)?
                .filter(|len| self.buf.len() >= *len);
            if let Some(len) = ready {
                let frame = codec::decode(&self.buf[..len]);
                self.buf.drain(..len);
                if let Ok(frame) = &frame {
                    trace!(
                        target: "p9mux::channel::stream",
                        "read {} tag={} ({} bytes)",
                        frame.ty,
                        frame.tag,
                        len
                    );
                }
                return frame;
            }
            self.fill().await?;
        }
    }
}

#[derive(Debug)]
pub struct StreamWriter<W> {
    inner: W,
    max_size: usize,
}

impl<W: AsyncWrite + Unpin + Send + 'static> FrameWrite for StreamWriter<W> {
    async fn write_frame(&mut self, frame: &Frame) -> Result<(), ChannelError> {
        let bytes = codec::encode(frame, self.max_size)?;
        self.inner.write_all(&bytes).await?;
        self.inner.flush().await?;
        trace!(
            target: "p9mux::channel::stream",
            "wrote {} tag={} ({} bytes)",
            frame.ty,
            frame.tag,
            bytes.len()
        );
        Ok(())
    }
}
