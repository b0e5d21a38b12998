//! Reader task for the read half of a frame channel.
//!
//! The Reader Task:
//! - Runs in a spawned tokio task
//! - Reads one frame at a time and forwards it to the coordinator
//! - Retries transient read faults silently
//! - Closes the transport on any other read error
//! - Stops as soon as the close signal fires, dropping a frame it was
//!   about to forward

use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::lifecycle::{CloseReason, Lifecycle};
use crate::channel::FrameRead;
use crate::frame::Frame;

pub(crate) fn spawn_reader_task<R: FrameRead>(
    reader: R,
    frames: mpsc::Sender<Frame>,
    lifecycle: Arc<Lifecycle>,
) -> JoinHandle<()> {
    tokio::spawn(reader_loop(reader, frames, lifecycle))
}

async fn reader_loop<R: FrameRead>(
    mut reader: R,
    frames: mpsc::Sender<Frame>,
    lifecycle: Arc<Lifecycle>,
) {
    loop {
        let result = tokio::select! {
            _ = lifecycle.closed().cancelled() => {
                debug!(
                    target: "p9mux::transport::reader",
                    "Reader task stopping: transport closed"
                );
                break;
            }
            result = reader.read_frame() => result,
        };

        let frame = match result {
            Ok(frame) => frame,
            Err(e) if e.is_transient() => {
                debug!(
                    target: "p9mux::transport::reader",
                    "Transient read error: {}, retrying",
                    e
                );
                continue;
            }
            Err(e) => {
                warn!(
                    target: "p9mux::transport::reader",
                    "Fatal read error: {}, closing transport",
                    e
                );
                lifecycle.shutdown(CloseReason::ReadFailed(e.to_string()));
                break;
            }
        };

        let (ty, tag) = (frame.ty, frame.tag);
        tokio::select! {
            _ = lifecycle.closed().cancelled() => {
                debug!(
                    target: "p9mux::transport::reader",
                    "Dropping {} for tag {}: transport closed",
                    ty,
                    tag
                );
                break;
            }
            sent = frames.send(frame) => {
                if sent.is_err() {
                    debug!(
                        target: "p9mux::transport::reader",
                        "Coordinator gone, reader exiting"
                    );
                    break;
                }
            }
        }
    }
}
