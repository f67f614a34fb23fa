use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("media error: {0}")]
    Media(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("session already closed")]
    SessionClosed,

    #[error("data channel not open")]
    DataChannelNotOpen,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<audiopus::Error> for TransportError {
    fn from(e: audiopus::Error) -> Self {
        TransportError::Codec(e.to_string())
    }
}

impl From<webrtc::Error> for TransportError {
    fn from(e: webrtc::Error) -> Self {
        TransportError::ConnectionFailed(e.to_string())
    }
}

impl From<TransportError> for voice_agent_core::OrchestratorError {
    fn from(err: TransportError) -> Self {
        voice_agent_core::OrchestratorError::transport(err.to_string())
    }
}
