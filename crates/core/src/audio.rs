//! Audio framing types shared between the transport, pipeline, and speech
//! crates.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sample rates in use across the pipeline. The synthetic track and peer
/// taps run at 48kHz; the transcription upstream expects 16kHz, so the
/// webrtc-facing code resamples before handing frames to C6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleRate {
    Hz16000,
    Hz48000,
}

impl SampleRate {
    pub fn as_u32(self) -> u32 {
        match self {
            SampleRate::Hz16000 => 16_000,
            SampleRate::Hz48000 => 48_000,
        }
    }

    pub fn samples_per_ms(self) -> u32 {
        self.as_u32() / 1000
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channels {
    Mono,
    Stereo,
}

impl Channels {
    pub fn count(self) -> u32 {
        match self {
            Channels::Mono => 1,
            Channels::Stereo => 2,
        }
    }
}

/// A decoded PCM audio frame moving through the pipeline. `samples` is
/// interleaved per `channels`. Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AudioFrame {
    pub samples: Arc<[i16]>,
    pub sample_rate: SampleRate,
    pub channels: Channels,
    pub sequence: u64,
    pub captured_at: Instant,
    pub duration: Duration,
}

impl std::fmt::Debug for AudioFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioFrame")
            .field("len", &self.samples.len())
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("sequence", &self.sequence)
            .field("duration", &self.duration)
            .finish()
    }
}

impl AudioFrame {
    pub fn new(
        samples: impl Into<Arc<[i16]>>,
        sample_rate: SampleRate,
        channels: Channels,
        sequence: u64,
    ) -> Self {
        let samples = samples.into();
        let duration = Duration::from_secs_f64(
            samples.len() as f64 / channels.count() as f64 / sample_rate.as_u32() as f64,
        );
        Self {
            samples,
            sample_rate,
            channels,
            sequence,
            captured_at: Instant::now(),
            duration,
        }
    }

    /// Sum of squared samples, used by the energy-based VAD and calibrator.
    pub fn energy(&self) -> f64 {
        self.samples.iter().map(|&s| (s as f64) * (s as f64)).sum()
    }

    /// Extracts a single channel (stride `channels.count()` starting at
    /// `index`) as mono samples, used to tap the left channel off a stereo
    /// peer track.
    pub fn extract_channel(&self, index: usize) -> Vec<i16> {
        let stride = self.channels.count() as usize;
        self.samples
            .iter()
            .skip(index)
            .step_by(stride)
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn energy_of_silence_is_zero() {
        let frame = AudioFrame::new(vec![0i16; 960], SampleRate::Hz48000, Channels::Mono, 0);
        assert_eq!(frame.energy(), 0.0);
    }

    #[test]
    fn extract_left_channel_from_stereo() {
        let interleaved: Vec<i16> = vec![1, -1, 2, -2, 3, -3];
        let frame = AudioFrame::new(interleaved, SampleRate::Hz48000, Channels::Stereo, 0);
        assert_eq!(frame.extract_channel(0), vec![1, 2, 3]);
        assert_eq!(frame.extract_channel(1), vec![-1, -2, -3]);
    }

    #[test]
    fn duration_matches_frame_size_at_48khz_stereo() {
        let frame = AudioFrame::new(vec![0i16; 1920], SampleRate::Hz48000, Channels::Stereo, 0);
        assert_eq!(frame.duration.as_millis(), 20);
    }
}
