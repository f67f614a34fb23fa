//! Centralized constants for the voice agent orchestrator.
//!
//! Domain-agnostic by design: endpoint defaults only. Timeouts and audio
//! framing constants live in `voice_agent_core::constants`, shared by every
//! crate that needs them.

/// Service endpoints (env var with a sensible local default).
pub mod endpoints {
    /// Signaling room server (env: SIGNALING_SERVER_URL).
    pub fn signaling_default() -> String {
        std::env::var("SIGNALING_SERVER_URL")
            .unwrap_or_else(|_| "ws://127.0.0.1:7880".to_string())
    }

    /// Token-streaming (LLM) server (env: TOKEN_STREAMING_SERVER_URL).
    pub fn token_stream_default() -> String {
        std::env::var("TOKEN_STREAMING_SERVER_URL")
            .unwrap_or_else(|_| "ws://127.0.0.1:7881".to_string())
    }

    /// Transcription (STT) server (env: TRANSCRIPTION_SERVER_URL).
    pub fn transcription_default() -> String {
        std::env::var("TRANSCRIPTION_SERVER_URL")
            .unwrap_or_else(|_| "ws://127.0.0.1:7882".to_string())
    }

    /// ElevenLabs streaming TTS endpoint (credential: `ELEVENLABS_API_KEY`).
    pub fn tts_default() -> String {
        "https://api.elevenlabs.io/v1/text-to-speech/stream".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_defaults_fall_back_without_env() {
        assert!(endpoints::signaling_default().starts_with("ws://"));
    }
}
