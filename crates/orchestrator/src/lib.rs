//! Conversation orchestrator (spec.md §4.12, C12): the top-level controller
//! that wires one room, one token-stream client, and per-peer
//! {calibrator, segmenter, synthetic track, data-channel RPC}, enforces the
//! interruption policy, and tears everything down when the last peer leaves.

mod conversation;
mod peer;

pub use conversation::{ConversationOrchestrator, OrchestratorConfig};
pub use peer::PeerHandle;
