//! Coordinator task: the single owner of tag allocation and the outstanding table.
//!
//! Every mutation of transport state happens here, one event at a time:
//!
//! - **Submission**: allocate a tag, register the call, write the request
//! - **Frame** from the reader: match it to its slot and deliver it
//! - **Control**: abandon a call whose caller gave up, or flush a tag
//! - **Close signal** or every handle dropped: stop, then fail leftovers
//!
//! Because nothing else touches the table, no lock guards it. The write half
//! of the channel is also used only from here, one frame at a time.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::lifecycle::{CloseReason, Lifecycle};
use super::outstanding::{AckSlot, Completion, FlushTarget, OutstandingTable};
use crate::channel::FrameWrite;
use crate::error::{TransportError, TransportResult};
use crate::frame::{Frame, Message, Tag};

/// A request handed from a caller to the coordinator.
#[derive(Debug)]
pub(crate) struct PendingCall {
    pub(crate) message: Message,
    /// Receives the tag once one is assigned, so the caller can abandon it.
    pub(crate) tag_tx: oneshot::Sender<Tag>,
    /// Receives the terminal outcome of the call.
    pub(crate) reply: oneshot::Sender<TransportResult<Frame>>,
}

/// Requests that manipulate already-registered tags.
#[derive(Debug)]
pub(crate) enum Control {
    /// The caller holding `tag` stopped waiting; flush it best-effort.
    Abandon(Tag),
    /// Explicit flush; `ack` resolves when the peer acknowledges.
    Flush { tag: Tag, ack: AckSlot },
}

pub(crate) struct Coordinator<W> {
    writer: W,
    table: OutstandingTable,
    lifecycle: Arc<Lifecycle>,
    submissions: mpsc::Receiver<PendingCall>,
    frames: mpsc::Receiver<Frame>,
    controls: mpsc::UnboundedReceiver<Control>,
}

impl<W: FrameWrite> Coordinator<W> {
    pub(crate) fn new(
        writer: W,
        lifecycle: Arc<Lifecycle>,
        submissions: mpsc::Receiver<PendingCall>,
        frames: mpsc::Receiver<Frame>,
        controls: mpsc::UnboundedReceiver<Control>,
    ) -> Self {
        Self {
            writer,
            table: OutstandingTable::new(),
            lifecycle,
            submissions,
            frames,
            controls,
        }
    }

    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.lifecycle.closed().cancelled() => break,

                call = self.submissions.recv() => match call {
                    Some(call) => self.dispatch(call).await,
                    None => {
                        debug!(
                            target: "p9mux::transport::coordinator",
                            "All transport handles dropped"
                        );
                        self.lifecycle.shutdown(CloseReason::Dropped);
                        break;
                    }
                },

                Some(frame) = self.frames.recv() => {
                    if let Err(reason) = self.route(frame) {
                        warn!(
                            target: "p9mux::transport::coordinator",
                            "{}, closing transport",
                            reason
                        );
                        self.lifecycle.shutdown(reason);
                        break;
                    }
                }

                Some(control) = self.controls.recv() => self.control(control).await,
            }
        }

        self.finish();
    }

    async fn dispatch(&mut self, call: PendingCall) {
        let PendingCall {
            message,
            tag_tx,
            reply,
        } = call;

        if reply.is_closed() {
            debug!(
                target: "p9mux::transport::coordinator",
                "Dropping {} submitted by a caller that already gave up",
                message.frame_type()
            );
            return;
        }

        let tag = match self.table.allocate(message.uses_notag()) {
            Ok(tag) => tag,
            Err(e) => {
                warn!(
                    target: "p9mux::transport::coordinator",
                    "Cannot send {}: {}",
                    message.frame_type(),
                    e
                );
                let _ = reply.send(Err(e));
                return;
            }
        };

        let _ = tag_tx.send(tag);
        let frame = Frame::new(tag, message);
        self.table.insert_call(tag, reply);

        if let Err(e) = self.write(&frame).await {
            if let Some(reply) = self.table.take_call(tag) {
                let _ = reply.send(Err(e));
            }
            return;
        }

        // The caller may have given up while the frame was being written,
        // before it could learn its tag.
        if self.table.is_abandoned(tag) {
            self.abandon(tag).await;
        }
    }

    fn route(&mut self, frame: Frame) -> Result<(), CloseReason> {
        let (tag, ty) = (frame.tag, frame.ty);
        match self.table.complete(frame) {
            Completion::Delivered | Completion::Discarded => {}
            Completion::Unclaimed => {
                debug!(
                    target: "p9mux::transport::coordinator",
                    "Reply {} for tag {} arrived after its caller left",
                    ty,
                    tag
                );
            }
            Completion::FlushAcknowledged { oldtag } => {
                debug!(
                    target: "p9mux::transport::coordinator",
                    "Flush of tag {} acknowledged",
                    oldtag
                );
            }
            Completion::UnknownTag => return Err(CloseReason::ProtocolViolation { tag, ty }),
        }
        Ok(())
    }

    async fn control(&mut self, control: Control) {
        match control {
            Control::Abandon(tag) => self.abandon(tag).await,
            Control::Flush { tag, ack } => match self.table.flush_target(tag) {
                FlushTarget::Ready => self.flush(tag, Some(ack)).await,
                FlushTarget::InProgress(flush_tag) => self.table.attach_ack(flush_tag, ack),
                FlushTarget::Unknown => {
                    let _ = ack.send(Err(TransportError::UnknownTag(tag)));
                }
            },
        }
    }

    async fn abandon(&mut self, tag: Tag) {
        if self.table.abandon(tag) {
            debug!(
                target: "p9mux::transport::coordinator",
                "Caller abandoned tag {}, flushing",
                tag
            );
            self.flush(tag, None).await;
        }
    }

    async fn flush(&mut self, oldtag: Tag, ack: Option<AckSlot>) {
        let flush_tag = match self.table.allocate(false) {
            Ok(tag) => tag,
            Err(e) => {
                warn!(
                    target: "p9mux::transport::coordinator",
                    "Cannot flush tag {}: {}",
                    oldtag,
                    e
                );
                if let Some(ack) = ack {
                    let _ = ack.send(Err(e));
                }
                return;
            }
        };

        self.table.begin_flush(oldtag, flush_tag, ack);
        let frame = Frame::new(flush_tag, Message::Tflush { oldtag });
        if let Err(e) = self.write(&frame).await {
            warn!(
                target: "p9mux::transport::coordinator",
                "Failed to send flush for tag {}: {}",
                oldtag,
                e
            );
            let mut error = Some(e);
            for ack in self.table.abort_flush(flush_tag) {
                let _ = ack.send(Err(error.take().unwrap_or(TransportError::Closed)));
            }
        }
    }

    /// Write one frame, giving up if the transport closes mid-write.
    async fn write(&mut self, frame: &Frame) -> TransportResult<()> {
        let closed = self.lifecycle.closed().clone();
        tokio::select! {
            biased;
            _ = closed.cancelled() => Err(TransportError::Closed),
            result = self.writer.write_frame(frame) => result.map_err(|e| {
                warn!(
                    target: "p9mux::transport::coordinator",
                    "Write of {} tag={} failed: {}",
                    frame.ty,
                    frame.tag,
                    e
                );
                TransportError::Write(e)
            }),
        }
    }

    /// Fail everything still waiting and mark the transport closed.
    fn finish(mut self) {
        if self.lifecycle.reason().is_none() {
            self.lifecycle.shutdown(CloseReason::Requested);
        }

        self.submissions.close();
        let mut failed = 0;
        while let Ok(call) = self.submissions.try_recv() {
            let _ = call.reply.send(Err(TransportError::Closed));
            failed += 1;
        }
        self.controls.close();
        while let Ok(control) = self.controls.try_recv() {
            if let Control::Flush { ack, .. } = control {
                let _ = ack.send(Err(TransportError::Closed));
            }
        }
        failed += self.table.fail_all();

        info!(
            target: "p9mux::transport::coordinator",
            "Transport closed ({}), released {} outstanding entries",
            self.lifecycle
                .reason()
                .map(|r| r.to_string())
                .unwrap_or_default(),
            failed
        );
        self.lifecycle.mark_finished();
    }
}
