//! Centralized constants for the voice agent orchestrator.
//!
//! This module holds only generic, domain-agnostic operational parameters:
//! audio framing, calibration, VAD defaults, and network timeouts. There is
//! no business-rule layer in this crate to configure.

/// Audio framing and VAD defaults
pub mod audio {
    /// Synthetic track / peer audio sample rate (Hz)
    pub const SAMPLE_RATE: u32 = 48_000;

    /// Synthetic track channel count
    pub const CHANNELS: u32 = 2;

    /// Frame duration (ms), matching a 960-sample frame at 48kHz stereo
    pub const FRAME_MS: u32 = 20;

    /// Samples per channel per 20ms frame at 48kHz
    pub const FRAME_SIZE: usize = 960;

    /// int16 full-scale magnitude used by the energy-based VAD formula
    pub const PCM16_MAX: f64 = 32767.0;

    /// Default VAD energy threshold (theta in Sum(s_i^2) > N * MAX^2 * theta)
    pub const VAD_THRESHOLD_DEFAULT: f64 = 0.0001;

    /// Default silence duration that finalizes an utterance (ms)
    pub const SILENCE_DURATION_MS_DEFAULT: u64 = 1000;

    /// Mean-VAD-history threshold above which a finalized utterance is
    /// accepted rather than silently cancelled.
    pub const SPEECH_ACCEPT_VAD_MEAN: f64 = 0.2;
}

/// Calibration window defaults (C5)
pub mod calibration {
    /// Number of chunk-energy samples accumulated before a measurement is
    /// emitted and the window resets.
    pub const WINDOW_CHUNKS: usize = 250;

    /// Factor applied to the normalized ambient energy measurement
    /// (`energy / MAX^2`) to derive the session's frozen VAD threshold.
    pub const THRESHOLD_FACTOR: f64 = 0.4;
}

/// Synthetic track pacing and interruption defaults
pub mod track {
    /// Debounce duration before firing `stopped_speaking` after the queue
    /// drains (ms).
    pub const STOP_SPEAKING_DEBOUNCE_MS: u64 = 1000;

    /// Bounded sample/sentence-id queue capacity, approximating 2s of audio
    /// at 48kHz stereo 20ms frames (100 frames/s * 2s).
    pub const MAX_QUEUED_FRAMES: usize = 200;
}

/// Timeouts (milliseconds unless noted)
pub mod timeouts {
    /// RPC call default timeout (ms) when a caller doesn't specify one.
    pub const RPC_DEFAULT_MS: u64 = 5_000;

    /// Transcription finalize timeout (ms)
    pub const TRANSCRIBE_MS: u64 = 10_000;

    /// Trickle-ICE-before-peer-exists wait loop total budget (seconds)
    pub const ICE_TRICKLE_WAIT_SECS: u64 = 5;

    /// Trickle-ICE wait loop poll interval (ms)
    pub const ICE_TRICKLE_POLL_MS: u64 = 50;

    /// WebRTC ICE gathering completion timeout (seconds)
    pub const ICE_GATHER_SECS: u64 = 10;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_size_matches_frame_ms_at_sample_rate() {
        let expected = (audio::SAMPLE_RATE as u64 * audio::FRAME_MS as u64 / 1000) as usize;
        assert_eq!(expected, audio::FRAME_SIZE);
    }

    #[test]
    fn vad_threshold_in_unit_range() {
        assert!(audio::VAD_THRESHOLD_DEFAULT > 0.0 && audio::VAD_THRESHOLD_DEFAULT < 1.0);
        assert!(audio::SPEECH_ACCEPT_VAD_MEAN > 0.0 && audio::SPEECH_ACCEPT_VAD_MEAN < 1.0);
    }

    #[test]
    fn timeouts_positive() {
        assert!(timeouts::RPC_DEFAULT_MS > 0);
        assert!(timeouts::TRANSCRIBE_MS > 0);
    }
}
