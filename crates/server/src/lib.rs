//! Admission HTTP surface for the voice conversation orchestrator
//! (spec.md §6): `GET /health`, `POST /invite-agent`. Everything this
//! process bridges to on admission -- the signaling room, the token-stream
//! and transcription clients, the per-peer audio/speech pipelines -- lives
//! in `voice-agent-orchestrator` and the crates underneath it.

pub mod http;
pub mod state;

pub use http::create_router;
pub use state::AppState;

use thiserror::Error;

/// Errors surfaced at the admission boundary. Subsystem errors
/// (`voice_agent_core::OrchestratorError`) are logged in full by
/// `http::invite_agent` and collapsed to one of these variants -- the client
/// only ever needs a status code and a short reason.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("at capacity: {0} sessions admitted")]
    AtCapacity(usize),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServerError> for axum::http::StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::AtCapacity(_) => axum::http::StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Internal(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl axum::response::IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let status = axum::http::StatusCode::from(self);
        status.into_response()
    }
}
