//! Tag-multiplexed request/response transport.
//!
//! A [`Transport`] lets many tasks issue requests over one frame channel at
//! once. Each request gets a tag, the peer may answer in any order, and every
//! reply is routed back to the caller that owns its tag.
//!
//! # Architecture
//!
//! ```text
//! caller ─send─▶ submission queue ─▶ Coordinator ─▶ FrameWrite
//!   ▲                                   │   ▲
//!   └──────────── oneshot reply ────────┘   │
//!                                    frame queue
//!                                           │
//!                       FrameRead ─▶ Reader task
//! ```
//!
//! - [`reader`]: pulls frames off the read half
//! - [`coordinator`]: allocates tags, writes requests, routes replies
//! - [`outstanding`]: the tag table, owned by the coordinator
//! - [`lifecycle`]: close signal, close reason and state

mod coordinator;
mod lifecycle;
mod outstanding;
mod reader;

use std::future::Future;
use std::sync::Arc;

use log::debug;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

pub use lifecycle::{CloseReason, TransportState};

use crate::channel::FrameChannel;
use crate::config::TransportConfig;
use crate::error::{TransportError, TransportResult};
use crate::frame::{Frame, Message, Tag};
use coordinator::{Control, Coordinator, PendingCall};
use lifecycle::Lifecycle;

/// A single request/response exchange.
///
/// Higher protocol layers are written against this trait so they can be
/// exercised without a running transport.
pub trait RoundTrip: Send + Sync {
    /// Send `message` and wait for the matching reply.
    fn send(
        &self,
        cancel: &CancellationToken,
        message: Message,
    ) -> impl Future<Output = TransportResult<Message>> + Send;
}

/// Handle to a running transport.
///
/// Cloning is cheap; all clones share the same connection. Once every clone
/// is dropped the transport closes itself.
#[derive(Debug, Clone)]
pub struct Transport {
    lifecycle: Arc<Lifecycle>,
    submit: mpsc::Sender<PendingCall>,
    controls: mpsc::UnboundedSender<Control>,
    config: Arc<TransportConfig>,
}

impl Transport {
    /// Start the reader and coordinator tasks for `channel`.
    ///
    /// Must be called from within a tokio runtime. The transport closes when
    /// `owner` is cancelled; cancelling the transport never cancels `owner`.
    pub fn spawn<C: FrameChannel>(
        channel: C,
        owner: CancellationToken,
        config: TransportConfig,
    ) -> Self {
        let (reader, writer) = channel.split();
        let lifecycle = Arc::new(Lifecycle::new(owner));
        let (submit, submissions) = mpsc::channel(config.submit_queue.max(1));
        let (frames_tx, frames_rx) = mpsc::channel(config.frame_queue.max(1));
        let (controls, controls_rx) = mpsc::unbounded_channel();

        reader::spawn_reader_task(reader, frames_tx, Arc::clone(&lifecycle));
        Coordinator::new(
            writer,
            Arc::clone(&lifecycle),
            submissions,
            frames_rx,
            controls_rx,
        )
        .spawn();

        debug!(
            target: "p9mux::transport::facade",
            "Transport started (submit_queue={}, frame_queue={})",
            config.submit_queue,
            config.frame_queue
        );

        Self {
            lifecycle,
            submit,
            controls,
            config: Arc::new(config),
        }
    }

    /// Send `message` and wait for its reply.
    ///
    /// Returns early with [`TransportError::Cancelled`] when `cancel` fires,
    /// or [`TransportError::Timeout`] when the configured request timeout
    /// elapses. In both cases, and when the returned future is dropped, the
    /// request is flushed on the peer in the background and its tag stays
    /// reserved until the peer confirms.
    ///
    /// A [`Message::Tflush`] is handled like [`flush`](Self::flush) and
    /// answers [`Message::Rflush`], so the flushed call is retired too.
    pub async fn send(
        &self,
        cancel: &CancellationToken,
        message: Message,
    ) -> TransportResult<Message> {
        if self.lifecycle.is_closed() {
            return Err(TransportError::Closed);
        }

        if let Message::Tflush { oldtag } = message {
            return tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(TransportError::Cancelled),
                result = self.flush(oldtag) => result.map(|()| Message::Rflush),
            };
        }

        let (tag_tx, tag_rx) = oneshot::channel();
        let (reply_tx, reply_rx) = oneshot::channel();
        let call = PendingCall {
            message,
            tag_tx,
            reply: reply_tx,
        };
        let mut guard = CallGuard {
            tag_rx,
            reply_rx: Some(reply_rx),
            controls: &self.controls,
        };

        tokio::select! {
            biased;
            _ = self.lifecycle.closed().cancelled() => return Err(TransportError::Closed),
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            sent = self.submit.send(call) => {
                if sent.is_err() {
                    return Err(TransportError::Closed);
                }
            }
        }

        let Some(reply_rx) = guard.reply_rx.as_mut() else {
            return Err(TransportError::Closed);
        };
        let deadline = self.config.request_timeout();
        let timeout = async {
            match deadline {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending().await,
            }
        };

        let outcome = tokio::select! {
            biased;
            outcome = reply_rx => outcome,
            _ = self.lifecycle.closed().cancelled() => return Err(TransportError::Closed),
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            _ = timeout => {
                debug!(
                    target: "p9mux::transport::facade",
                    "Request timed out after {:?}",
                    deadline
                );
                return Err(TransportError::Timeout);
            }
        };

        guard.settle();
        match outcome {
            Ok(Ok(frame)) => into_reply(frame),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TransportError::Closed),
        }
    }

    /// Ask the peer to abandon the request outstanding under `tag`.
    ///
    /// Resolves once the peer acknowledges. The caller waiting on `tag`, if
    /// any, receives [`TransportError::Flushed`]. Fails with
    /// [`TransportError::UnknownTag`] when nothing is outstanding under
    /// `tag`, and with [`TransportError::FlushTimeout`] when no
    /// acknowledgement arrives in time; the tag then stays reserved.
    pub async fn flush(&self, tag: Tag) -> TransportResult<()> {
        if self.lifecycle.is_closed() {
            return Err(TransportError::Closed);
        }

        let (ack, ack_rx) = oneshot::channel();
        self.controls
            .send(Control::Flush { tag, ack })
            .map_err(|_| TransportError::Closed)?;

        let acknowledged = async { ack_rx.await.unwrap_or(Err(TransportError::Closed)) };
        match self.config.flush_timeout() {
            Some(limit) => tokio::time::timeout(limit, acknowledged)
                .await
                .unwrap_or(Err(TransportError::FlushTimeout(tag))),
            None => acknowledged.await,
        }
    }

    /// Shut the transport down.
    ///
    /// Succeeds only for the call that actually closes it. Later calls return
    /// [`TransportError::Closed`], or [`TransportError::Cancelled`] if the
    /// owning token ended the transport.
    pub fn close(&self) -> TransportResult<()> {
        let result = self.lifecycle.close();
        if result.is_ok() {
            debug!(target: "p9mux::transport::facade", "Transport close requested");
        }
        result
    }

    /// Wait until the transport is fully closed and every outstanding call
    /// has received its outcome.
    pub async fn closed(&self) {
        self.lifecycle.wait_finished().await;
    }

    pub fn state(&self) -> TransportState {
        self.lifecycle.state()
    }

    /// Why the transport closed, or `None` while it is open.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.lifecycle.reason()
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }
}

impl RoundTrip for Transport {
    fn send(
        &self,
        cancel: &CancellationToken,
        message: Message,
    ) -> impl Future<Output = TransportResult<Message>> + Send {
        Transport::send(self, cancel, message)
    }
}

fn into_reply(frame: Frame) -> TransportResult<Message> {
    match frame.message {
        Message::Rerror(e) => Err(TransportError::Remote(e)),
        message if frame.is_error() => {
            Err(TransportError::MalformedErrorReply {
                tag: frame.tag,
                ty: message.frame_type(),
            })
        }
        message => Ok(message),
    }
}

/// Abandons the call unless it reached a terminal outcome.
///
/// Dropping the reply receiver first lets the coordinator notice the
/// abandonment by itself if the tag was not yet assigned.
struct CallGuard<'a> {
    tag_rx: oneshot::Receiver<Tag>,
    reply_rx: Option<oneshot::Receiver<TransportResult<Frame>>>,
    controls: &'a mpsc::UnboundedSender<Control>,
}

impl CallGuard<'_> {
    fn settle(&mut self) {
        self.tag_rx.close();
        self.reply_rx = None;
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        let Some(reply_rx) = self.reply_rx.take() else {
            return;
        };
        drop(reply_rx);
        if let Ok(tag) = self.tag_rx.try_recv() {
            debug!(
                target: "p9mux::transport::facade",
                "Caller gave up on tag {}",
                tag
            );
            let _ = self.controls.send(Control::Abandon(tag));
        }
    }
}
