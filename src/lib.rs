//! Tag-multiplexed request/response transport for 9P-style protocols.
//!
//! See [`Transport`] for the entry point and [`channel`] for the frame
//! channels a transport can run over.

pub mod channel;
pub mod config;
pub mod error;
pub mod frame;
pub mod transport;

pub use channel::{FrameChannel, FrameRead, FrameWrite, MemChannel, StreamChannel};
pub use config::{ConfigError, TransportConfig};
pub use error::{ChannelError, TransportError, TransportResult};
pub use frame::{Frame, FrameType, Message, Rerror, Tag, Version};
pub use transport::{CloseReason, RoundTrip, Transport, TransportState};
