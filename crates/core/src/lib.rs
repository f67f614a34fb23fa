//! Shared types for the voice agent orchestrator: errors, constants, audio
//! framing, and the session/peer data model used by every other crate.

pub mod audio;
pub mod constants;
pub mod error;
pub mod model;

pub use audio::{AudioFrame, Channels, SampleRate};
pub use error::{OrchestratorError, Result};
pub use model::{
    CalibrationWindow, Candidate, PeerId, PeerRuntime, SentenceSegment, Session, SessionId,
    SpeakingState, UtteranceId,
};
