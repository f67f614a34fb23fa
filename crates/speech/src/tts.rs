//! External TTS streaming client used by the speech producer (spec.md
//! §4.10). The upstream is expected to emit raw 48kHz stereo int16 PCM over
//! a chunked HTTP response body; `voice_id` comes from the token-stream
//! service's `connect_to_context` agent profile (§4.8).

use futures::{Stream, StreamExt};
use std::time::Duration;

use crate::error::SpeechError;

#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub base_url: String,
    pub api_key: String,
    pub sample_rate: u32,
}

pub struct TtsClient {
    http: reqwest::Client,
    config: TtsConfig,
}

impl TtsClient {
    pub fn new(config: TtsConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client builder should never fail with default settings");
        Self { http, config }
    }

    /// Streams synthesized PCM16 samples for `text` in the given voice,
    /// chunk by chunk as the upstream delivers bytes.
    pub async fn synthesize_stream(
        &self,
        text: &str,
        voice_id: Option<&str>,
    ) -> Result<impl Stream<Item = Result<Vec<i16>, SpeechError>>, SpeechError> {
        let response = self
            .http
            .post(&self.config.base_url)
            .header("xi-api-key", &self.config.api_key)
            .json(&serde_json::json!({
                "text": text,
                "voice_id": voice_id,
                "output_format": "pcm_48000_stereo",
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SpeechError::Status(response.status().as_u16()));
        }

        let mut leftover = Vec::new();
        let byte_stream = response.bytes_stream();

        Ok(byte_stream.map(move |chunk| {
            let chunk = chunk?;
            let mut bytes = std::mem::take(&mut leftover);
            bytes.extend_from_slice(&chunk);

            let usable_len = bytes.len() - (bytes.len() % 2);
            leftover = bytes[usable_len..].to_vec();

            let samples = bytes[..usable_len]
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]]))
                .collect();
            Ok(samples)
        }))
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }
}
