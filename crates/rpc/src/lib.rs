//! Line-delimited JSON-RPC-style framer (spec.md §4.1, C1).
//!
//! One frame per line: request `{id, method, params}`, response
//! `{id, result|error}`, or notification `{method, params}`. This is a
//! single generic implementation shared by the signaling, transcription,
//! and token-stream clients -- each of those is a thin typed wrapper
//! around an [`RpcPeer`] rather than its own copy of the framing logic.

mod error;
mod frame;
mod peer;

pub use error::RpcError;
pub use frame::{Frame, RpcId};
pub use peer::{Handler, RequestHandler, RpcPeer};
