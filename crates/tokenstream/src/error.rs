use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenStreamError {
    #[error("token-stream connect failed: {0}")]
    Connect(String),

    #[error("token-stream transport closed")]
    Closed,

    #[error("connect_to_context rejected by token-stream service")]
    ContextRejected,

    #[error(transparent)]
    Rpc(#[from] voice_agent_rpc::RpcError),
}

impl From<TokenStreamError> for voice_agent_core::OrchestratorError {
    fn from(err: TokenStreamError) -> Self {
        voice_agent_core::OrchestratorError::UpstreamUnavailable {
            service: "token_stream".to_string(),
            reason: err.to_string(),
        }
    }
}
