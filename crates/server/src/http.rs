//! Admission HTTP surface (spec.md §6): `GET /health` and `POST
//! /invite-agent`. Everything else -- the room, the token-stream and
//! transcription clients, the per-peer pipelines -- is wired by
//! [`voice_agent_orchestrator::ConversationOrchestrator::initialize`] once
//! a session is admitted here.

use axum::{
    extract::State,
    http::{header, HeaderMap},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use voice_agent_config::constants::endpoints;
use voice_agent_orchestrator::{ConversationOrchestrator, OrchestratorConfig};
use voice_agent_speech::TtsConfig;
use voice_agent_transport::{IceServer, WebRtcConfig};

use crate::state::AppState;
use crate::ServerError;

/// Builds the admission router. Kept deliberately small: the out-of-scope
/// collaborators in spec.md §1 (signaling server, upstream ASR/TTS/LLM,
/// ICE/DTLS/SRTP transport) are reached by the orchestrator, not by HTTP
/// routes on this process.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/invite-agent", post(invite_agent))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// `GET /health` (spec.md §6) -> `{status:"ok"}`.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Debug, Deserialize)]
struct InviteAgentRequest {
    context_id: String,
}

#[derive(Debug, Serialize)]
struct InviteAgentResponse {
    message: &'static str,
}

/// `POST /invite-agent` (spec.md §6). The `Authorization` header is an
/// opaque bearer token forwarded verbatim to the token-stream service's
/// `connect_to_context` call (spec.md §9 Open Question); this endpoint
/// performs no authentication of its own.
async fn invite_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<InviteAgentRequest>,
) -> Result<Json<InviteAgentResponse>, ServerError> {
    if state.at_capacity() {
        let count = state.session_count();
        tracing::warn!(max_sessions = state.settings.server.max_sessions, "admission rejected: at capacity");
        return Err(ServerError::AtCapacity(count));
    }

    let auth_token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string);

    let ice_servers = state
        .settings
        .ice_servers
        .iter()
        .map(|server| IceServer {
            urls: server.urls.clone(),
            username: server.username.clone(),
            credential: server.credential.clone(),
        })
        .collect();

    let config = OrchestratorConfig {
        context_id: body.context_id.clone(),
        auth_token,
        allows_interruptions: state.settings.allows_interruptions,
        signaling_url: state.settings.endpoints.signaling_url.clone(),
        transcription_url: state.settings.endpoints.transcription_url.clone(),
        token_stream_url: state.settings.endpoints.token_stream_url.clone(),
        ice_config: WebRtcConfig { ice_servers },
        trivial_rejections: state.settings.trivial_rejections.clone(),
        tts: TtsConfig {
            base_url: endpoints::tts_default(),
            api_key: state.settings.endpoints.elevenlabs_api_key.clone(),
            sample_rate: 48_000,
        },
    };

    tracing::info!(context_id = %body.context_id, "admitting conversation");

    match ConversationOrchestrator::initialize(config).await {
        Ok(orchestrator) => {
            let context_id = body.context_id.clone();
            let cleanup_state = state.clone();
            orchestrator.on_closed(move || cleanup_state.remove(&context_id));
            state.insert(body.context_id, orchestrator);
            Ok(Json(InviteAgentResponse {
                message: "Initializing agent",
            }))
        }
        Err(err) => {
            tracing::error!(error = %err, "conversation orchestrator initialization failed");
            Err(ServerError::Internal(err.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_agent_config::Settings;

    #[test]
    fn router_builds() {
        let state = AppState::new(Settings::default());
        let _ = create_router(state);
    }

    #[tokio::test]
    async fn health_check_reports_ok() {
        let Json(body) = health_check().await;
        assert_eq!(body.status, "ok");
    }
}
