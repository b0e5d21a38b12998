//! Shared test helpers for transport integration tests.
//!
//! Note: We use `helpers/mod.rs` instead of the modern `helpers.rs` + `helpers/` pattern
//! because Cargo auto-discovers top-level `.rs` files in `tests/` as integration tests.

#![allow(dead_code)]

pub mod faults;
pub mod peer;

use p9mux::{FrameType, Message};

/// An opaque request of type `ty` with a small body.
pub fn request(ty: FrameType) -> Message {
    Message::Opaque {
        ty,
        body: vec![0xAB, 0xCD],
    }
}

/// The successful reply matching a request type (9P: `R = T + 1`).
pub fn reply_for(ty: FrameType, body: &[u8]) -> Message {
    Message::Opaque {
        ty: FrameType::new(ty.as_u8() + 1),
        body: body.to_vec(),
    }
}
