//! Error types for p9mux
//!
//! This module provides the errors surfaced to callers of the transport and
//! the errors reported by frame channels.

use std::io;

use thiserror::Error;

use crate::frame::{FrameType, Rerror, Tag};

/// Errors returned to a caller of [`Transport`](crate::Transport).
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport is shut down (explicitly, by a fatal read error, a
    /// protocol violation, or cancellation of the owning token).
    #[error("transport closed")]
    Closed,

    /// The caller's own cancellation token fired.
    #[error("request cancelled")]
    Cancelled,

    /// The configured request timeout elapsed before a reply arrived.
    #[error("request timed out")]
    Timeout,

    /// Writing the request frame failed. Only the triggering call sees this.
    #[error("failed to write request: {0}")]
    Write(#[source] ChannelError),

    /// The server answered with an error reply.
    #[error(transparent)]
    Remote(#[from] Rerror),

    /// The reply was tagged as an error but its body is not an error message.
    #[error("invalid error response: tag {tag}, payload {ty}")]
    MalformedErrorReply { tag: Tag, ty: FrameType },

    /// Every tag is occupied by an outstanding or not yet retired call.
    #[error("no free tags")]
    TagsExhausted,

    /// A reserved tag (`NOTAG` for version negotiation) is already in use.
    #[error("tag {0} already in use")]
    TagInUse(Tag),

    /// No outstanding call holds this tag.
    #[error("unknown tag {0}")]
    UnknownTag(Tag),

    /// The call was cancelled on the server by an acknowledged flush.
    #[error("request flushed (tag {0})")]
    Flushed(Tag),

    /// The server did not acknowledge a flush in time.
    #[error("flush of tag {0} not acknowledged")]
    FlushTimeout(Tag),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors reported by a [`FrameRead`](crate::channel::FrameRead) or
/// [`FrameWrite`](crate::channel::FrameWrite).
#[derive(Debug, Error)]
pub enum ChannelError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The peer went away (EOF, or the other half of an in-memory pair dropped).
    #[error("channel disconnected")]
    Disconnected,

    /// Frame size header exceeds the negotiated limit.
    #[error("frame of {size} bytes exceeds limit of {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// Frame size header is smaller than the fixed envelope.
    #[error("frame of {0} bytes is shorter than its header")]
    FrameTooShort(usize),

    /// The body of a known message type could not be decoded.
    #[error("cannot decode {ty}: {reason}")]
    Decode { ty: FrameType, reason: String },
}

impl ChannelError {
    /// Whether the read may simply be retried.
    ///
    /// Timeouts and interruptions are transient. Channels must only report
    /// them when no part of a frame has been lost, which the stream channel
    /// guarantees by buffering partial reads.
    pub fn is_transient(&self) -> bool {
        match self {
            ChannelError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    pub(crate) fn decode(ty: FrameType, reason: impl Into<String>) -> Self {
        ChannelError::Decode {
            ty,
            reason: reason.into(),
        }
    }
}
