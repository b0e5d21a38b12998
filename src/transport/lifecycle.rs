//! Shared shutdown signalling for one transport.
//!
//! The close signal is a child of the owner's token, so cancelling the owner
//! closes the transport without any task having to notice first. The first
//! recorded [`CloseReason`] wins; later shutdown attempts only observe it.

use std::sync::OnceLock;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::error::{TransportError, TransportResult};
use crate::frame::{FrameType, Tag};

/// Why a transport stopped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CloseReason {
    #[error("closed by request")]
    Requested,

    #[error("owning context cancelled")]
    OwnerCancelled,

    #[error("fatal read error: {0}")]
    ReadFailed(String),

    /// The peer answered a tag that has no outstanding request.
    #[error("protocol violation: unsolicited {ty} for tag {tag}")]
    ProtocolViolation { tag: Tag, ty: FrameType },

    #[error("all transport handles dropped")]
    Dropped,
}

/// Externally visible lifecycle of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Open,
    /// The close signal fired; the coordinator is still failing leftover calls.
    Closing,
    /// Every outstanding call has received its outcome and both tasks stopped.
    Closed,
}

#[derive(Debug)]
pub(crate) struct Lifecycle {
    owner: CancellationToken,
    closed: CancellationToken,
    finished: CancellationToken,
    reason: OnceLock<CloseReason>,
}

impl Lifecycle {
    pub(crate) fn new(owner: CancellationToken) -> Self {
        Self {
            closed: owner.child_token(),
            owner,
            finished: CancellationToken::new(),
            reason: OnceLock::new(),
        }
    }

    /// Token cancelled once the transport starts closing.
    pub(crate) fn closed(&self) -> &CancellationToken {
        &self.closed
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Record `reason` (unless another reason was recorded first) and fire
    /// the close signal. Returns `true` if this call recorded the reason.
    pub(crate) fn shutdown(&self, reason: CloseReason) -> bool {
        let first = self.reason.set(reason).is_ok();
        self.closed.cancel();
        first
    }

    /// Explicit close: succeeds exactly once.
    pub(crate) fn close(&self) -> TransportResult<()> {
        if self.owner.is_cancelled() {
            let _ = self.reason.set(CloseReason::OwnerCancelled);
        }
        if self.reason.set(CloseReason::Requested).is_ok() {
            self.closed.cancel();
            return Ok(());
        }
        match self.reason.get() {
            Some(CloseReason::OwnerCancelled) => Err(TransportError::Cancelled),
            _ => Err(TransportError::Closed),
        }
    }

    pub(crate) fn reason(&self) -> Option<CloseReason> {
        match self.reason.get() {
            Some(reason) => Some(reason.clone()),
            None if self.owner.is_cancelled() => Some(CloseReason::OwnerCancelled),
            None => None,
        }
    }

    pub(crate) fn state(&self) -> TransportState {
        if self.finished.is_cancelled() {
            TransportState::Closed
        } else if self.closed.is_cancelled() {
            TransportState::Closing
        } else {
            TransportState::Open
        }
    }

    pub(crate) fn mark_finished(&self) {
        self.finished.cancel();
    }

    pub(crate) async fn wait_finished(&self) {
        self.finished.cancelled().await;
    }
}
