use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("tts request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("tts stream ended with a non-success status: {0}")]
    Status(u16),
}

impl From<SpeechError> for voice_agent_core::OrchestratorError {
    fn from(err: SpeechError) -> Self {
        voice_agent_core::OrchestratorError::UpstreamUnavailable {
            service: "tts".to_string(),
            reason: err.to_string(),
        }
    }
}
