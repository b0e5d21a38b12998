//! Fault-injecting wrappers around the in-memory channel.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use p9mux::channel::{MemReader, MemWriter};
use p9mux::{ChannelError, Frame, FrameChannel, FrameRead, FrameWrite, MemChannel};

#[derive(Default)]
struct Script {
    read_faults: VecDeque<io::ErrorKind>,
    write_failures: usize,
}

/// Faults to inject into a [`FaultyChannel`], shared with the test body.
#[derive(Clone, Default)]
pub struct Faults {
    script: Arc<Mutex<Script>>,
}

impl Faults {
    /// The next read returns an IO error of `kind` before touching the channel.
    pub fn fail_read(&self, kind: io::ErrorKind) {
        self.script.lock().unwrap().read_faults.push_back(kind);
    }

    /// The next `count` writes fail without reaching the peer.
    pub fn fail_writes(&self, count: usize) {
        self.script.lock().unwrap().write_failures += count;
    }

    fn take_read_fault(&self) -> Option<io::ErrorKind> {
        self.script.lock().unwrap().read_faults.pop_front()
    }

    fn take_write_failure(&self) -> bool {
        let mut script = self.script.lock().unwrap();
        if script.write_failures > 0 {
            script.write_failures -= 1;
            true
        } else {
            false
        }
    }
}

/// Split a [`MemChannel`] end into halves whose reads and writes can be made
/// to fail. The pair is itself a [`FrameChannel`](p9mux::FrameChannel).
pub fn faulty(inner: MemChannel, faults: Faults) -> (FaultyReader, FaultyWriter) {
    let (reader, writer) = inner.split();
    (
        FaultyReader {
            inner: reader,
            faults: faults.clone(),
        },
        FaultyWriter {
            inner: writer,
            faults,
        },
    )
}

pub struct FaultyReader {
    inner: MemReader,
    faults: Faults,
}

impl FrameRead for FaultyReader {
    async fn read_frame(&mut self) -> Result<Frame, ChannelError> {
        if let Some(kind) = self.faults.take_read_fault() {
            return Err(io::Error::new(kind, "injected read fault").into());
        }
        self.inner.read_frame().await
    }
}

pub struct FaultyWriter {
    inner: MemWriter,
    faults: Faults,
}

impl FrameWrite for FaultyWriter {
    async fn write_frame(&mut self, frame: &Frame) -> Result<(), ChannelError> {
        if self.faults.take_write_failure() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "injected write fault").into());
        }
        self.inner.write_frame(frame).await
    }
}
