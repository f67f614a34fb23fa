//! VAD-gated segmenter (spec.md §4.6, C6). One instance per peer: runs the
//! energy-based VAD test on every chunk, drives the speaking/silence state
//! machine, and forwards/finalizes utterances against the transcription
//! client (C7).

use std::sync::Arc;

use voice_agent_core::constants::audio;
use voice_agent_core::model::{SpeakingState, UtteranceId};
use voice_agent_transcription::TranscriptionClient;

/// `Σ s_i^2 > N · MAX² · θ` (spec.md §4.6).
pub fn vad_test(chunk: &[i16], threshold: f64) -> bool {
    let energy: f64 = chunk.iter().map(|&s| (s as f64) * (s as f64)).sum();
    let n = chunk.len() as f64;
    let max_sq = (audio::PCM16_MAX) * (audio::PCM16_MAX);
    energy > n * max_sq * threshold
}

fn is_trivial(text: &str, rejections: &[String]) -> bool {
    text.is_empty() || rejections.iter().any(|r| r == text)
}

pub type SpeechDetectedHandler = Arc<dyn Fn(String) + Send + Sync>;

pub struct Segmenter {
    state: SpeakingState,
    vad_threshold: f64,
    silence_duration_ms: u64,
    trivial_rejections: Vec<String>,
    transcription: Arc<TranscriptionClient>,
    on_speech_detected: Option<SpeechDetectedHandler>,
}

impl Segmenter {
    pub fn new(transcription: Arc<TranscriptionClient>, trivial_rejections: Vec<String>) -> Self {
        Self {
            state: SpeakingState::default(),
            vad_threshold: audio::VAD_THRESHOLD_DEFAULT,
            silence_duration_ms: audio::SILENCE_DURATION_MS_DEFAULT,
            trivial_rejections,
            transcription,
            on_speech_detected: None,
        }
    }

    /// Set once by calibration (spec.md §4.12); later calls are the
    /// caller's responsibility to guard (the orchestrator only calls this
    /// before `has_calibrated` flips).
    pub fn set_vad_threshold(&mut self, threshold: f64) {
        self.vad_threshold = threshold;
    }

    pub fn on_speech_detected(&mut self, handler: SpeechDetectedHandler) {
        self.on_speech_detected = Some(handler);
    }

    pub fn utterance_id(&self) -> Option<UtteranceId> {
        self.state.utterance_id
    }

    /// Whether this peer's segmenter currently considers itself mid-utterance,
    /// forwarded by the orchestrator as `is_speaking_status` (spec.md §4.12).
    pub fn is_speaking(&self) -> bool {
        self.state.speaking
    }

    /// Runs one `add_audio(chunk, sample_rate)` step of the state machine
    /// (spec.md §4.6).
    pub fn add_audio(&mut self, chunk: &[i16], sample_rate: u32) {
        let vad = vad_test(chunk, self.vad_threshold);

        if vad {
            if !self.state.speaking {
                self.state.speaking = true;
                self.state.utterance_id = Some(uuid::Uuid::new_v4());
                self.state.t_start = Some(std::time::Instant::now());
            }
            self.state.silence_samples = 0;
            if let Some(id) = self.state.utterance_id {
                self.transcription.audio_data(id, chunk);
            }
        } else if self.state.speaking {
            if let Some(id) = self.state.utterance_id {
                self.transcription.audio_data(id, chunk);
            }
            self.state.silence_samples += chunk.len() as u64;
            let silence_threshold = self.silence_duration_ms * (sample_rate as u64) / 1000;
            if self.state.silence_samples >= silence_threshold {
                self.finalize(sample_rate);
                self.state.reset();
                return;
            }
        }

        if self.state.speaking {
            self.state.vad_history.push(vad);
        }
    }

    fn finalize(&self, sample_rate: u32) {
        let Some(utterance_id) = self.state.utterance_id else {
            return;
        };
        let mean_vad = self.state.mean_vad();
        let transcription = Arc::clone(&self.transcription);
        let trivial_rejections = self.trivial_rejections.clone();
        let handler = self.on_speech_detected.clone();

        if mean_vad > audio::SPEECH_ACCEPT_VAD_MEAN {
            tokio::spawn(async move {
                match tokio::time::timeout(
                    std::time::Duration::from_millis(
                        voice_agent_core::constants::timeouts::TRANSCRIBE_MS,
                    ),
                    transcription.transcribe(utterance_id, sample_rate),
                )
                .await
                {
                    Ok(Ok(text)) => {
                        if !is_trivial(&text, &trivial_rejections) {
                            if let Some(handler) = handler {
                                handler(text);
                            }
                        }
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(error = %e, %utterance_id, "transcription finalize failed");
                    }
                    Err(_) => {
                        tracing::warn!(%utterance_id, "transcription timed out, discarding utterance");
                    }
                }
            });
        } else {
            transcription.cancel_transcription(utterance_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vad_false_on_silence_for_any_positive_threshold() {
        let chunk = vec![0i16; 960];
        assert!(!vad_test(&chunk, 0.0001));
        assert!(!vad_test(&chunk, 1e-9));
    }

    #[test]
    fn vad_true_on_loud_chunk() {
        let chunk = vec![20_000i16; 960];
        assert!(vad_test(&chunk, 0.0001));
    }

    #[test]
    fn trivial_rejection_set_matches_exact_strings() {
        let rejections = vec![
            "".to_string(),
            ".".to_string(),
            "Thank you.".to_string(),
            ".  .  .  .".to_string(),
        ];
        assert!(is_trivial("", &rejections));
        assert!(is_trivial("Thank you.", &rejections));
        assert!(!is_trivial("Hello there.", &rejections));
    }
}
