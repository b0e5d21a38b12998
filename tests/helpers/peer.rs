//! Scripted server side of an in-memory channel.

use std::time::Duration;

use p9mux::channel::{MemReader, MemWriter};
use p9mux::{
    Frame, FrameChannel, FrameRead, FrameWrite, MemChannel, Message, Tag, Transport,
    TransportConfig,
};
use tokio_util::sync::CancellationToken;

/// How long a test waits for the transport to produce a frame.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(2);

/// The peer end of a transport under test.
pub struct Peer {
    rx: MemReader,
    tx: MemWriter,
}

impl Peer {
    pub fn new(channel: MemChannel) -> Self {
        let (rx, tx) = channel.split();
        Self { rx, tx }
    }

    /// Wait for the next frame written by the transport.
    pub async fn next_request(&mut self) -> Frame {
        tokio::time::timeout(STEP_TIMEOUT, self.rx.read_frame())
            .await
            .expect("Timed out waiting for a request")
            .expect("Channel closed while waiting for a request")
    }

    /// Assert that nothing is written within `window`.
    pub async fn expect_silence(&mut self, window: Duration) {
        if let Ok(frame) = tokio::time::timeout(window, self.rx.read_frame()).await {
            panic!("Expected no frame, got {:?}", frame);
        }
    }

    /// Read until the transport drops its write half.
    pub async fn expect_disconnect(&mut self) {
        loop {
            match tokio::time::timeout(STEP_TIMEOUT, self.rx.read_frame())
                .await
                .expect("Transport did not release its write half")
            {
                Ok(_) => continue,
                Err(_) => return,
            }
        }
    }

    pub async fn reply(&mut self, tag: Tag, message: Message) {
        self.send_frame(Frame::new(tag, message)).await;
    }

    pub async fn send_frame(&mut self, frame: Frame) {
        self.tx
            .write_frame(&frame)
            .await
            .expect("Transport stopped reading");
    }
}

/// A transport over an in-memory channel plus its scripted peer.
pub fn open(config: TransportConfig) -> (Transport, Peer, CancellationToken) {
    let (client, server) = MemChannel::pair(32);
    let owner = CancellationToken::new();
    let transport = Transport::spawn(client, owner.clone(), config);
    (transport, Peer::new(server), owner)
}

/// Wait for the transport to reach `Closed`, failing the test on a hang.
pub async fn wait_closed(transport: &Transport) {
    tokio::time::timeout(STEP_TIMEOUT, transport.closed())
        .await
        .expect("Transport did not finish closing");
}
