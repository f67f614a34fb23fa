//! Sentence sink (spec.md §4.9, C9) and speech producer (§4.10, C10).

mod error;
mod producer;
mod sink;
mod tts;

pub use error::SpeechError;
pub use producer::{SpeechProducer, SpeechTarget};
pub use sink::SentenceSink;
pub use tts::{TtsClient, TtsConfig};
