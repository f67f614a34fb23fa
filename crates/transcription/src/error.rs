use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("transcription connect failed: {0}")]
    Connect(String),

    #[error("transcription transport closed")]
    Closed,

    #[error(transparent)]
    Rpc(#[from] voice_agent_rpc::RpcError),
}

impl From<TranscriptionError> for voice_agent_core::OrchestratorError {
    fn from(err: TranscriptionError) -> Self {
        match err {
            TranscriptionError::Rpc(voice_agent_rpc::RpcError::Timeout { method, timeout_ms }) => {
                voice_agent_core::OrchestratorError::RpcTimeout { method, timeout_ms }
            }
            other => voice_agent_core::OrchestratorError::UpstreamUnavailable {
                service: "transcription".to_string(),
                reason: other.to_string(),
            },
        }
    }
}
