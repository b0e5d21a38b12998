//! Frame envelope and the small message catalog the multiplexer understands.
//!
//! The transport only needs to tell replies apart by tag and to recognise a
//! handful of control messages (version negotiation, flush, error). Every
//! other message travels as an opaque body under its 9P type byte.

use std::fmt;

use thiserror::Error;

/// Protocol correlation identifier for one in-flight request.
///
/// Wraps `u16` so tags can't be confused with type bytes, sizes or counters
/// in function signatures and as `HashMap` keys in the outstanding table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(u16);

impl Tag {
    /// Reserved tag carried by version negotiation.
    pub const NOTAG: Tag = Tag(0xFFFF);

    #[inline]
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }

    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl From<u16> for Tag {
    fn from(tag: u16) -> Self {
        Self(tag)
    }
}

impl From<Tag> for u16 {
    fn from(tag: Tag) -> Self {
        tag.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Tag::NOTAG {
            f.write_str("NOTAG")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// 9P message type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameType(u8);

impl FrameType {
    pub const TVERSION: FrameType = FrameType(100);
    pub const RVERSION: FrameType = FrameType(101);
    pub const TAUTH: FrameType = FrameType(102);
    pub const RAUTH: FrameType = FrameType(103);
    pub const TATTACH: FrameType = FrameType(104);
    pub const RATTACH: FrameType = FrameType(105);
    pub const RERROR: FrameType = FrameType(107);
    pub const TFLUSH: FrameType = FrameType(108);
    pub const RFLUSH: FrameType = FrameType(109);
    pub const TWALK: FrameType = FrameType(110);
    pub const RWALK: FrameType = FrameType(111);
    pub const TOPEN: FrameType = FrameType(112);
    pub const ROPEN: FrameType = FrameType(113);
    pub const TCREATE: FrameType = FrameType(114);
    pub const RCREATE: FrameType = FrameType(115);
    pub const TREAD: FrameType = FrameType(116);
    pub const RREAD: FrameType = FrameType(117);
    pub const TWRITE: FrameType = FrameType(118);
    pub const RWRITE: FrameType = FrameType(119);
    pub const TCLUNK: FrameType = FrameType(120);
    pub const RCLUNK: FrameType = FrameType(121);
    pub const TREMOVE: FrameType = FrameType(122);
    pub const RREMOVE: FrameType = FrameType(123);
    pub const TSTAT: FrameType = FrameType(124);
    pub const RSTAT: FrameType = FrameType(125);
    pub const TWSTAT: FrameType = FrameType(126);
    pub const RWSTAT: FrameType = FrameType(127);

    #[inline]
    pub const fn new(ty: u8) -> Self {
        Self(ty)
    }

    #[inline]
    pub const fn as_u8(self) -> u8 {
        self.0
    }

    /// Human readable name for the well-known types, used in logs and errors.
    pub fn name(self) -> Option<&'static str> {
        let name = match self.0 {
            100 => "Tversion",
            101 => "Rversion",
            102 => "Tauth",
            103 => "Rauth",
            104 => "Tattach",
            105 => "Rattach",
            107 => "Rerror",
            108 => "Tflush",
            109 => "Rflush",
            110 => "Twalk",
            111 => "Rwalk",
            112 => "Topen",
            113 => "Ropen",
            114 => "Tcreate",
            115 => "Rcreate",
            116 => "Tread",
            117 => "Rread",
            118 => "Twrite",
            119 => "Rwrite",
            120 => "Tclunk",
            121 => "Rclunk",
            122 => "Tremove",
            123 => "Rremove",
            124 => "Tstat",
            125 => "Rstat",
            126 => "Twstat",
            127 => "Rwstat",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "type({})", self.0),
        }
    }
}

/// Body of `Tversion` / `Rversion`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub msize: u32,
    pub version: String,
}

/// Error reply sent by the server, surfaced to callers as an application error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{ename}")]
pub struct Rerror {
    pub ename: String,
}

impl Rerror {
    pub fn new(ename: impl Into<String>) -> Self {
        Self {
            ename: ename.into(),
        }
    }
}

/// Protocol message payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Tversion(Version),
    Rversion(Version),
    Tflush {
        /// Tag of the request being cancelled.
        oldtag: Tag,
    },
    Rflush,
    Rerror(Rerror),
    /// Any other message, carried as its type byte and encoded body.
    ///
    /// The transport never looks inside `body`; higher layers own its layout.
    Opaque { ty: FrameType, body: Vec<u8> },
}

impl Message {
    /// Type byte this message is framed under.
    pub fn frame_type(&self) -> FrameType {
        match self {
            Message::Tversion(_) => FrameType::TVERSION,
            Message::Rversion(_) => FrameType::RVERSION,
            Message::Tflush { .. } => FrameType::TFLUSH,
            Message::Rflush => FrameType::RFLUSH,
            Message::Rerror(_) => FrameType::RERROR,
            Message::Opaque { ty, .. } => *ty,
        }
    }

    /// Version negotiation always travels under [`Tag::NOTAG`].
    pub fn uses_notag(&self) -> bool {
        matches!(self, Message::Tversion(_) | Message::Rversion(_))
    }
}

/// One decoded protocol envelope.
///
/// `ty` normally matches `message.frame_type()`. The two can disagree when a
/// peer sends an `Rerror` whose body does not parse; the codec then keeps the
/// raw body as [`Message::Opaque`] under the `RERROR` type so the caller sees
/// a malformed error reply instead of a dead connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub ty: FrameType,
    pub tag: Tag,
    pub message: Message,
}

impl Frame {
    pub fn new(tag: Tag, message: Message) -> Self {
        Self {
            ty: message.frame_type(),
            tag,
            message,
        }
    }

    pub fn is_error(&self) -> bool {
        self.ty == FrameType::RERROR
    }
}
