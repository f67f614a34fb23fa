//! The session/peer data model (spec.md §3): `Session`, `PeerRuntime`,
//! `Candidate`, `SentenceSegment`, `CalibrationWindow`, `SpeakingState`, and
//! their invariants.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type SessionId = String;
pub type PeerId = Uuid;
pub type UtteranceId = Uuid;

/// ICE candidate component id (RTP vs RTCP).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    Rtp = 1,
    Rtcp = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateProtocol {
    Udp,
    Tcp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateType {
    Host,
    Srflx,
    Prflx,
    Relay,
}

/// A parsed trickle-ICE candidate (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub foundation: String,
    pub component: Component,
    pub protocol: CandidateProtocol,
    pub priority: u32,
    pub ip: String,
    pub port: u16,
    #[serde(rename = "type")]
    pub candidate_type: CandidateType,
    #[serde(rename = "sdpMid")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
}

/// `{sentence_id, text, samples}` (spec.md §3). `sentence_id` is globally
/// unique within a session and strictly increasing in production order.
#[derive(Debug, Clone)]
pub struct SentenceSegment {
    pub sentence_id: u64,
    pub text: String,
    /// Interleaved int16 stereo @ 48kHz.
    pub samples: Vec<i16>,
}

/// Accumulates chunk-energy readings; emits the mean on overflow and
/// resets. Energy of a chunk is `sum(s_i^2)`.
pub struct CalibrationWindow {
    capacity: usize,
    samples: Vec<f64>,
}

impl CalibrationWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: Vec::with_capacity(capacity),
        }
    }

    /// Pushes a chunk-energy reading. Returns `Some(mean)` and resets the
    /// window when capacity is reached; otherwise `None`.
    pub fn push(&mut self, energy: f64) -> Option<f64> {
        self.samples.push(energy);
        if self.samples.len() >= self.capacity {
            let mean = self.samples.iter().sum::<f64>() / self.samples.len() as f64;
            self.samples.clear();
            Some(mean)
        } else {
            None
        }
    }
}

/// Segmenter state (spec.md §3). Initial `(false, 0, none, [], none)`.
#[derive(Debug, Clone)]
pub struct SpeakingState {
    pub speaking: bool,
    pub silence_samples: u64,
    pub utterance_id: Option<UtteranceId>,
    pub vad_history: Vec<bool>,
    pub t_start: Option<Instant>,
}

impl Default for SpeakingState {
    fn default() -> Self {
        Self {
            speaking: false,
            silence_samples: 0,
            utterance_id: None,
            vad_history: Vec::new(),
            t_start: None,
        }
    }
}

impl SpeakingState {
    pub fn mean_vad(&self) -> f64 {
        if self.vad_history.is_empty() {
            return 0.0;
        }
        let positives = self.vad_history.iter().filter(|&&b| b).count();
        positives as f64 / self.vad_history.len() as f64
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// One entry per connected participant (spec.md §3). Field handles
/// (session, track, calibrator, segmenter, per-peer RPC framer) are owned
/// by the crates that implement C3/C4/C5/C6/C1 respectively; this struct
/// only tracks the bookkeeping the orchestrator needs to reach them and to
/// uphold the "created before negotiation, released exactly once on
/// disconnect" invariant.
pub struct PeerRuntime {
    pub peer_id: PeerId,
    pub joined_at: Instant,
    released: std::sync::atomic::AtomicBool,
}

impl PeerRuntime {
    pub fn new(peer_id: PeerId) -> Self {
        Self {
            peer_id,
            joined_at: Instant::now(),
            released: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Marks this peer as released. Returns `true` the first time it is
    /// called, `false` on any subsequent call -- enforcing the
    /// released-exactly-once invariant.
    pub fn release(&self) -> bool {
        !self.released.swap(true, Ordering::SeqCst)
    }
}

/// The ambient context for one conversation (spec.md §3), identified by
/// `context_id`. Created on admission, destroyed when the room has zero
/// peers.
pub struct Session {
    pub context_id: String,
    pub auth_token: Option<String>,
    pub allows_interruptions: bool,
    sentence_counter: AtomicU64,
    has_calibrated: std::sync::atomic::AtomicBool,
    pub vad_threshold: RwLock<f64>,
    peer_order: RwLock<VecDeque<PeerId>>,
    /// Populated once C8's `connect_to_context` response arrives; read by
    /// C10 on every sentence to select the TTS voice (SPEC_FULL.md §3).
    voice_id: RwLock<Option<String>>,
}

impl Session {
    pub fn new(context_id: impl Into<String>, auth_token: Option<String>, allows_interruptions: bool) -> Self {
        Self {
            context_id: context_id.into(),
            auth_token,
            allows_interruptions,
            sentence_counter: AtomicU64::new(0),
            has_calibrated: std::sync::atomic::AtomicBool::new(false),
            vad_threshold: RwLock::new(crate::constants::audio::VAD_THRESHOLD_DEFAULT),
            peer_order: RwLock::new(VecDeque::new()),
            voice_id: RwLock::new(None),
        }
    }

    pub fn set_voice_id(&self, voice_id: Option<String>) {
        *self.voice_id.write() = voice_id;
    }

    pub fn voice_id(&self) -> Option<String> {
        self.voice_id.read().clone()
    }

    /// Next monotonically increasing sentence id for this session.
    pub fn next_sentence_id(&self) -> u64 {
        self.sentence_counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Freezes the VAD threshold on first calibration measurement. Returns
    /// `true` if this call performed the freeze (false->true transition),
    /// `false` if calibration had already completed -- enforcing the
    /// "transitions false->true exactly once" invariant.
    pub fn try_calibrate(&self, measured_threshold: f64) -> bool {
        if self
            .has_calibrated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            *self.vad_threshold.write() = measured_threshold;
            true
        } else {
            false
        }
    }

    pub fn has_calibrated(&self) -> bool {
        self.has_calibrated.load(Ordering::SeqCst)
    }

    pub fn add_peer(&self, peer_id: PeerId) {
        self.peer_order.write().push_back(peer_id);
    }

    pub fn remove_peer(&self, peer_id: PeerId) {
        self.peer_order.write().retain(|p| *p != peer_id);
    }

    pub fn peer_count(&self) -> usize {
        self.peer_order.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peer_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calibration_freezes_exactly_once() {
        let session = Session::new("ctx-1", None, true);
        assert!(session.try_calibrate(0.0005));
        assert!(!session.try_calibrate(0.0009));
        assert_eq!(*session.vad_threshold.read(), 0.0005);
    }

    #[test]
    fn calibration_window_emits_on_overflow() {
        let mut window = CalibrationWindow::new(3);
        assert!(window.push(1.0).is_none());
        assert!(window.push(2.0).is_none());
        let mean = window.push(3.0).unwrap();
        assert!((mean - 2.0).abs() < 1e-9);
        // window reset after emit
        assert!(window.push(10.0).is_none());
    }

    #[test]
    fn peer_release_is_exactly_once() {
        let peer = PeerRuntime::new(Uuid::new_v4());
        assert!(peer.release());
        assert!(!peer.release());
    }

    #[test]
    fn session_tracks_peer_membership() {
        let session = Session::new("ctx-1", None, false);
        let peer = Uuid::new_v4();
        assert!(session.is_empty());
        session.add_peer(peer);
        assert_eq!(session.peer_count(), 1);
        session.remove_peer(peer);
        assert!(session.is_empty());
    }

    #[test]
    fn speaking_state_mean_vad() {
        let mut state = SpeakingState::default();
        state.vad_history = vec![true, true, false, false, false];
        assert!((state.mean_vad() - 0.4).abs() < 1e-9);
        state.reset();
        assert_eq!(state.mean_vad(), 0.0);
    }
}
