//! Tag allocation and the outstanding-request table.
//!
//! The table is owned by the coordinator task and never shared, so it needs
//! no locking. A tag is free exactly when it has no slot here: tags are only
//! recycled once their call is fully retired (reply received, write failed,
//! or flush acknowledged by the peer).
//!
//! # Slot lifecycle
//!
//! ```text
//! Call ──reply──────────────────────────────▶ (free)
//!  │  └─flush written─▶ Call{flush} ──reply─▶ Orphaned{flush}
//!  └─caller gone────▶ Orphaned ──Rflush on flush tag──▶ (free)
//! ```

use std::collections::HashMap;

use log::{debug, warn};
use tokio::sync::oneshot;

use crate::error::{TransportError, TransportResult};
use crate::frame::{Frame, FrameType, Tag};

/// Where the coordinator delivers a call's outcome.
pub(crate) type ReplySlot = oneshot::Sender<TransportResult<Frame>>;

/// Where the coordinator reports the outcome of an explicit flush.
pub(crate) type AckSlot = oneshot::Sender<TransportResult<()>>;

/// Number of tags available to ordinary calls (`0..=0xFFFE`).
const RING_SIZE: u32 = 0xFFFF;

#[derive(Debug)]
pub(crate) enum Slot {
    /// A caller is waiting for this tag's reply.
    ///
    /// `flush` is the tag of a `Tflush` written for this call, if any.
    Call { reply: ReplySlot, flush: Option<Tag> },
    /// The caller is gone but the peer may still answer; the tag stays
    /// reserved until the flush is acknowledged or, when no flush was
    /// written, until the late reply arrives.
    Orphaned { flush: Option<Tag> },
    /// An internal `Tflush` request for `oldtag`.
    Flush { oldtag: Tag, acks: Vec<AckSlot> },
}

/// What happened to an incoming frame.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Completion {
    /// Handed to the waiting caller.
    Delivered,
    /// The call was still registered but its caller stopped listening.
    Unclaimed,
    /// Reply for an orphaned tag, dropped.
    Discarded,
    /// The peer acknowledged a flush; both tags are free again.
    FlushAcknowledged { oldtag: Tag },
    /// No slot holds this tag: the peer violated the protocol.
    UnknownTag,
}

/// Whether a tag can be flushed right now.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum FlushTarget {
    /// No flush is in flight for the tag yet.
    Ready,
    /// A flush is already in flight under the given tag.
    InProgress(Tag),
    /// The tag is free or belongs to a flush request.
    Unknown,
}

#[derive(Debug)]
pub(crate) struct OutstandingTable {
    slots: HashMap<Tag, Slot>,
    /// Next candidate for ring allocation.
    cursor: u16,
}

impl OutstandingTable {
    pub(crate) fn new() -> Self {
        Self {
            slots: HashMap::new(),
            cursor: 1,
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn contains(&self, tag: Tag) -> bool {
        self.slots.contains_key(&tag)
    }

    /// Reserve a tag for a new request.
    ///
    /// Version negotiation always gets [`Tag::NOTAG`]; every other request
    /// gets the next free tag from the ring, starting after the most
    /// recently assigned one. The tag is reserved once a slot is inserted.
    pub(crate) fn allocate(&mut self, notag: bool) -> TransportResult<Tag> {
        if notag {
            return if self.contains(Tag::NOTAG) {
                Err(TransportError::TagInUse(Tag::NOTAG))
            } else {
                Ok(Tag::NOTAG)
            };
        }

        for _ in 0..RING_SIZE {
            let candidate = Tag::new(self.cursor);
            self.cursor = ((u32::from(self.cursor) + 1) % RING_SIZE) as u16;
            if !self.slots.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
        Err(TransportError::TagsExhausted)
    }

    pub(crate) fn insert_call(&mut self, tag: Tag, reply: ReplySlot) {
        let previous = self.slots.insert(tag, Slot::Call { reply, flush: None });
        debug_assert!(previous.is_none(), "tag {} allocated twice", tag);
    }

    /// Remove a call whose request never reached the peer.
    pub(crate) fn take_call(&mut self, tag: Tag) -> Option<ReplySlot> {
        match self.slots.remove(&tag) {
            Some(Slot::Call { reply, .. }) => Some(reply),
            Some(other) => {
                self.slots.insert(tag, other);
                None
            }
            None => None,
        }
    }

    /// Whether `tag` holds a call whose caller stopped waiting.
    pub(crate) fn is_abandoned(&self, tag: Tag) -> bool {
        matches!(self.slots.get(&tag), Some(Slot::Call { reply, .. }) if reply.is_closed())
    }

    /// Turn an abandoned call into an orphan.
    ///
    /// Only acts when the call's receiver is gone, so a stale request for a
    /// tag that has since been reused by a live call is ignored. Returns
    /// `true` when the orphan still needs a flush. Version negotiation
    /// cannot be flushed; its orphan waits for the `Rversion`.
    pub(crate) fn abandon(&mut self, tag: Tag) -> bool {
        if !self.is_abandoned(tag) {
            return false;
        }
        let Some(Slot::Call { flush, .. }) = self.slots.remove(&tag) else {
            return false;
        };
        self.slots.insert(tag, Slot::Orphaned { flush });
        flush.is_none() && tag != Tag::NOTAG
    }

    pub(crate) fn flush_target(&self, tag: Tag) -> FlushTarget {
        if tag == Tag::NOTAG {
            return FlushTarget::Unknown;
        }
        match self.slots.get(&tag) {
            Some(Slot::Call { flush: None, .. } | Slot::Orphaned { flush: None }) => {
                FlushTarget::Ready
            }
            Some(Slot::Call { flush: Some(f), .. } | Slot::Orphaned { flush: Some(f) }) => {
                FlushTarget::InProgress(*f)
            }
            Some(Slot::Flush { .. }) | None => FlushTarget::Unknown,
        }
    }

    /// Register a flush request for `oldtag` under `flush_tag`.
    pub(crate) fn begin_flush(&mut self, oldtag: Tag, flush_tag: Tag, ack: Option<AckSlot>) {
        match self.slots.get_mut(&oldtag) {
            Some(Slot::Call { flush, .. } | Slot::Orphaned { flush }) => *flush = Some(flush_tag),
            _ => return,
        }
        self.slots.insert(
            flush_tag,
            Slot::Flush {
                oldtag,
                acks: ack.into_iter().collect(),
            },
        );
    }

    /// Attach another waiter to a flush already in flight.
    pub(crate) fn attach_ack(&mut self, flush_tag: Tag, ack: AckSlot) {
        match self.slots.get_mut(&flush_tag) {
            Some(Slot::Flush { acks, .. }) => acks.push(ack),
            _ => {
                let _ = ack.send(Err(TransportError::UnknownTag(flush_tag)));
            }
        }
    }

    /// Undo [`begin_flush`](Self::begin_flush) after the `Tflush` could not
    /// be written. The old tag stays reserved without a flush.
    pub(crate) fn abort_flush(&mut self, flush_tag: Tag) -> Vec<AckSlot> {
        let Some(Slot::Flush { oldtag, acks }) = self.slots.remove(&flush_tag) else {
            return Vec::new();
        };
        if let Some(Slot::Call { flush, .. } | Slot::Orphaned { flush }) =
            self.slots.get_mut(&oldtag)
        {
            *flush = None;
        }
        acks
    }

    /// Match an incoming frame against the table.
    pub(crate) fn complete(&mut self, frame: Frame) -> Completion {
        let tag = frame.tag;
        let Some(slot) = self.slots.remove(&tag) else {
            return Completion::UnknownTag;
        };

        match slot {
            Slot::Call { reply, flush } => {
                if let Some(flush) = flush {
                    // The request finished despite the flush; the tag is
                    // only free again once the peer answers the flush.
                    self.slots.insert(tag, Slot::Orphaned { flush: Some(flush) });
                }
                match reply.send(Ok(frame)) {
                    Ok(()) => Completion::Delivered,
                    Err(_) => Completion::Unclaimed,
                }
            }
            Slot::Orphaned { flush: Some(flush) } => {
                debug!(
                    target: "p9mux::transport::outstanding",
                    "Discarding {} for tag {} (flush pending on tag {})",
                    frame.ty,
                    tag,
                    flush
                );
                self.slots.insert(tag, Slot::Orphaned { flush: Some(flush) });
                Completion::Discarded
            }
            Slot::Orphaned { flush: None } => {
                debug!(
                    target: "p9mux::transport::outstanding",
                    "Discarding {} for abandoned tag {}",
                    frame.ty,
                    tag
                );
                Completion::Discarded
            }
            Slot::Flush { oldtag, acks } => {
                if frame.ty != FrameType::RFLUSH {
                    warn!(
                        target: "p9mux::transport::outstanding",
                        "Flush of tag {} answered with {}, retiring it anyway",
                        oldtag,
                        frame.ty
                    );
                }
                if let Some(Slot::Call { reply, .. }) = self.slots.remove(&oldtag) {
                    let _ = reply.send(Err(TransportError::Flushed(oldtag)));
                }
                for ack in acks {
                    let _ = ack.send(Ok(()));
                }
                Completion::FlushAcknowledged { oldtag }
            }
        }
    }

    /// Fail every remaining waiter with [`TransportError::Closed`] and empty
    /// the table. Returns the number of slots released.
    pub(crate) fn fail_all(&mut self) -> usize {
        let count = self.slots.len();
        for (_, slot) in self.slots.drain() {
            match slot {
                Slot::Call { reply, .. } => {
                    let _ = reply.send(Err(TransportError::Closed));
                }
                Slot::Flush { acks, .. } => {
                    for ack in acks {
                        let _ = ack.send(Err(TransportError::Closed));
                    }
                }
                Slot::Orphaned { .. } => {}
            }
        }
        count
    }
}
