//! Sound calibrator (spec.md §4.5, C5) and VAD-gated segmenter (§4.6, C6).

mod calibrator;
mod error;
mod segmenter;

pub use calibrator::{MeasurementHandler, SoundCalibrator};
pub use error::PipelineError;
pub use segmenter::{vad_test, Segmenter, SpeechDetectedHandler};
