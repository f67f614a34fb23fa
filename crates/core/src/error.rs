//! Crate-wide error type. Each subsystem crate owns a narrower error enum
//! and bridges it into [`OrchestratorError`] at the orchestrator boundary,
//! mirroring the per-crate `XError` + `From<YError>` convention used
//! throughout this codebase.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rpc call to '{method}' timed out after {timeout_ms}ms")]
    RpcTimeout { method: String, timeout_ms: u64 },

    #[error("peer negotiation failed for peer {peer_id}: {reason}")]
    PeerNegotiation { peer_id: String, reason: String },

    #[error("upstream service '{service}' unavailable: {reason}")]
    UpstreamUnavailable { service: String, reason: String },

    #[error("policy violation: {0}")]
    Policy(String),

    #[error("programmer error: {0}")]
    Programmer(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl OrchestratorError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn policy(msg: impl Into<String>) -> Self {
        Self::Policy(msg.into())
    }

    /// Programmer errors indicate a contract violation (e.g. subscribing to
    /// an unknown event name). They are never recoverable and should fail
    /// loudly rather than be silently swallowed by a caller.
    pub fn programmer(msg: impl Into<String>) -> Self {
        Self::Programmer(msg.into())
    }
}
