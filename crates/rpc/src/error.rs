use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("call to '{method}' timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },

    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("no handler registered for method '{0}'")]
    NoHandler(String),

    #[error("peer transport closed")]
    Closed,

    #[error("remote returned an error for '{method}': {message}")]
    Remote { method: String, message: String },

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

impl From<RpcError> for voice_agent_core::OrchestratorError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Timeout { method, timeout_ms } => {
                voice_agent_core::OrchestratorError::RpcTimeout { method, timeout_ms }
            }
            RpcError::NoHandler(method) => {
                voice_agent_core::OrchestratorError::programmer(format!(
                    "on() called for unknown method '{method}'"
                ))
            }
            other => voice_agent_core::OrchestratorError::transport(other.to_string()),
        }
    }
}
