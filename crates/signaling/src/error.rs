use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("signaling connect failed: {0}")]
    Connect(String),

    #[error("signaling transport closed")]
    Closed,

    #[error("peer {0} not found after trickle-ICE wait timeout")]
    PeerNotFound(uuid::Uuid),

    #[error(transparent)]
    Rpc(#[from] voice_agent_rpc::RpcError),
}

impl From<SignalingError> for voice_agent_core::OrchestratorError {
    fn from(err: SignalingError) -> Self {
        match err {
            SignalingError::PeerNotFound(id) => {
                voice_agent_core::OrchestratorError::transport(format!(
                    "dropping ICE candidate: peer {id} never appeared"
                ))
            }
            other => voice_agent_core::OrchestratorError::transport(other.to_string()),
        }
    }
}
