//! Signaling client (spec.md §4.2, C2) and room supervisor (§4.11, C11).

mod client;
mod error;
mod room;

pub use client::{ConnectionStatus, SignalingClient};
pub use error::SignalingError;
pub use room::{RoomEvent, RoomSupervisor};
