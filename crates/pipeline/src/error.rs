use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Transcription(#[from] voice_agent_transcription::TranscriptionError),
}

impl From<PipelineError> for voice_agent_core::OrchestratorError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Transcription(e) => e.into(),
        }
    }
}
