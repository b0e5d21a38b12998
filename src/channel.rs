//! Frame channels: the duplex byte link the transport multiplexes over.
//!
//! A channel is split into one read half and one write half. The transport
//! gives the read half to its reader task and the write half to its
//! coordinator, so neither half is ever used concurrently with itself.
//!
//! # Implementations
//!
//! - [`MemChannel`]: in-process pair of channels exchanging [`Frame`]s
//! - [`StreamChannel`]: 9P2000 framing over any tokio byte stream

use std::future::Future;

use crate::error::ChannelError;
use crate::frame::Frame;

pub mod codec;
mod mem;
mod stream;

pub use mem::{MemChannel, MemReader, MemWriter};
pub use stream::{StreamChannel, StreamReader, StreamWriter};

/// Read half of a frame channel.
pub trait FrameRead: Send + 'static {
    /// Read the next complete frame.
    ///
    /// Must be cancel-safe: the reader task races this future against the
    /// transport's close signal, and a dropped read must not lose bytes that
    /// belong to the next frame.
    fn read_frame(&mut self) -> impl Future<Output = Result<Frame, ChannelError>> + Send;
}

/// Write half of a frame channel.
pub trait FrameWrite: Send + 'static {
    /// Write one complete frame.
    fn write_frame(&mut self, frame: &Frame)
    -> impl Future<Output = Result<(), ChannelError>> + Send;
}

/// A duplex channel that can be split into its two halves.
pub trait FrameChannel {
    type Reader: FrameRead;
    type Writer: FrameWrite;

    fn split(self) -> (Self::Reader, Self::Writer);
}

impl<R: FrameRead, W: FrameWrite> FrameChannel for (R, W) {
    type Reader = R;
    type Writer = W;

    fn split(self) -> (R, W) {
        self
    }
}
