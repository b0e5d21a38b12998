//! In-memory frame channel.
//!
//! Two connected [`MemChannel`]s pass [`Frame`]s through bounded tokio
//! queues without any encoding. Used to run a transport against an
//! in-process peer.

use tokio::sync::mpsc;

use super::{FrameChannel, FrameRead, FrameWrite};
use crate::error::ChannelError;
use crate::frame::Frame;

/// One end of an in-memory channel pair.
#[derive(Debug)]
pub struct MemChannel {
    reader: MemReader,
    writer: MemWriter,
}

impl MemChannel {
    /// Create two connected ends. Frames written on one end are read on the other.
    pub fn pair(capacity: usize) -> (MemChannel, MemChannel) {
        let (a_tx, a_rx) = mpsc::channel(capacity);
        let (b_tx, b_rx) = mpsc::channel(capacity);
        (
            MemChannel {
                reader: MemReader { rx: b_rx },
                writer: MemWriter { tx: a_tx },
            },
            MemChannel {
                reader: MemReader { rx: a_rx },
                writer: MemWriter { tx: b_tx },
            },
        )
    }
}

impl FrameChannel for MemChannel {
    type Reader = MemReader;
    type Writer = MemWriter;

    fn split(self) -> (MemReader, MemWriter) {
        (self.reader, self.writer)
    }
}

#[derive(Debug)]
pub struct MemReader {
    rx: mpsc::Receiver<Frame>,
}

impl FrameRead for MemReader {
    async fn read_frame(&mut self) -> Result<Frame, ChannelError> {
        self.rx.recv().await.ok_or(ChannelError::Disconnected)
    }
}

#[derive(Debug, Clone)]
pub struct MemWriter {
    tx: mpsc::Sender<Frame>,
}

impl FrameWrite for MemWriter {
    async fn write_frame(&mut self, frame: &Frame) -> Result<(), ChannelError> {
        self.tx
            .send(frame.clone())
            .await
            .map_err(|_| ChannelError::Disconnected)
    }
}
