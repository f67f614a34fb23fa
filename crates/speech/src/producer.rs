//! Speech producer (spec.md §4.10, C10). Single-consumer loop: pulls
//! sentences off the sink, assigns `sentence_id`, broadcasts `ai_sentence`
//! to every peer's data channel, then streams TTS audio into every live
//! peer's synthetic track. Sentences are processed strictly sequentially.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;

use crate::sink::SentenceSink;
use crate::tts::TtsClient;

/// The orchestrator-owned surface the speech producer drives. Kept
/// independent of `voice-agent-transport`/`voice-agent-signaling` types so
/// this crate doesn't need to depend on either -- the orchestrator supplies
/// the concrete fan-out.
#[async_trait::async_trait]
pub trait SpeechTarget: Send + Sync {
    /// Broadcasts `ai_sentence{sentence, sentence_id}` to every connected peer.
    fn broadcast_ai_sentence(&self, sentence: &str, sentence_id: u64);

    /// Enqueues one PCM chunk tagged with `sentence_id` onto every live
    /// peer's synthetic track.
    fn enqueue_audio(&self, chunk: &[i16], sentence_id: u64);

    /// The voice to synthesize with, set once the token-stream service's
    /// `connect_to_context` response arrives (spec.md §4.8).
    fn voice_id(&self) -> Option<String>;

    /// Next monotonically increasing `sentence_id` (spec.md §4.10, §5).
    fn next_sentence_id(&self) -> u64;
}

pub struct SpeechProducer {
    tts: Arc<TtsClient>,
}

impl SpeechProducer {
    pub fn new(tts: Arc<TtsClient>) -> Self {
        Self { tts }
    }

    /// Drains `tokens` until the channel closes, producing sentences and
    /// synthesizing each one in turn before starting the next.
    pub async fn run(self, mut tokens: mpsc::UnboundedReceiver<String>, target: Arc<dyn SpeechTarget>) {
        let mut sink = SentenceSink::new();

        while let Some(token) = tokens.recv().await {
            for sentence in sink.push_token(&token) {
                self.produce_sentence(&sentence, target.as_ref()).await;
            }
        }

        if let Some(tail) = sink.flush() {
            self.produce_sentence(&tail, target.as_ref()).await;
        }
    }

    async fn produce_sentence(&self, sentence: &str, target: &dyn SpeechTarget) {
        let sentence_id = target.next_sentence_id();
        target.broadcast_ai_sentence(sentence, sentence_id);

        let voice_id = target.voice_id();
        let stream = match self.tts.synthesize_stream(sentence, voice_id.as_deref()).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, sentence_id, "tts synthesis failed, dropping sentence");
                return;
            }
        };

        tokio::pin!(stream);
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(samples) if !samples.is_empty() => target.enqueue_audio(&samples, sentence_id),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, sentence_id, "tts stream error, stopping sentence early");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct RecordingTarget {
        sentences: Mutex<Vec<(String, u64)>>,
        counter: AtomicU64,
    }

    #[async_trait::async_trait]
    impl SpeechTarget for RecordingTarget {
        fn broadcast_ai_sentence(&self, sentence: &str, sentence_id: u64) {
            self.sentences.lock().push((sentence.to_string(), sentence_id));
        }
        fn enqueue_audio(&self, _chunk: &[i16], _sentence_id: u64) {}
        fn voice_id(&self) -> Option<String> {
            None
        }
        fn next_sentence_id(&self) -> u64 {
            self.counter.fetch_add(1, Ordering::SeqCst)
        }
    }

    #[test]
    fn sentence_ids_strictly_increase_per_target() {
        let target = RecordingTarget {
            sentences: Mutex::new(Vec::new()),
            counter: AtomicU64::new(0),
        };
        let a = target.next_sentence_id();
        let b = target.next_sentence_id();
        assert!(b > a);
    }
}
