//! Sound calibrator (spec.md §4.5, C5): a windowed ambient-energy estimator.
//! Grounded directly on the original `SoundCalibrator` -- accumulate
//! per-chunk energy into a fixed window, emit the mean once full, clear.

use voice_agent_core::audio::AudioFrame;
use voice_agent_core::constants::calibration;
use voice_agent_core::model::CalibrationWindow;

/// A single measurement callback fired once the window fills.
pub type MeasurementHandler = Box<dyn FnMut(f64) + Send>;

pub struct SoundCalibrator {
    window: CalibrationWindow,
    on_measurement: Option<MeasurementHandler>,
}

impl SoundCalibrator {
    pub fn new() -> Self {
        Self {
            window: CalibrationWindow::new(calibration::WINDOW_CHUNKS),
            on_measurement: None,
        }
    }

    /// Mirrors the original's `on("measurement", callback)` registration.
    pub fn on_measurement(&mut self, handler: MeasurementHandler) {
        self.on_measurement = Some(handler);
    }

    /// Pushes one chunk's energy; fires the registered handler and clears
    /// the window when it fills. No state persists across emits.
    pub fn add_audio_data(&mut self, frame: &AudioFrame) {
        if let Some(mean) = self.window.push(frame.energy()) {
            if let Some(handler) = self.on_measurement.as_mut() {
                handler(mean);
            }
        }
    }
}

impl Default for SoundCalibrator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use voice_agent_core::audio::{Channels, SampleRate};

    fn silent_frame_of_energy(energy_per_sample: f64, len: usize) -> AudioFrame {
        // Build a frame whose per-sample magnitude squares to energy_per_sample.
        let magnitude = energy_per_sample.sqrt().round() as i16;
        let samples: Vec<i16> = std::iter::repeat(magnitude).take(len).collect();
        AudioFrame::new(samples, SampleRate::Hz48000, Channels::Mono, 0)
    }

    #[test]
    fn emits_mean_after_window_chunks_of_constant_energy() {
        let mut calibrator = SoundCalibrator::new();
        let measured = Arc::new(AtomicU32::new(0));
        let flag = Arc::clone(&measured);
        calibrator.on_measurement(Box::new(move |mean| {
            flag.store(mean.round() as u32, Ordering::SeqCst);
        }));

        // 1 sample of magnitude 1000 -> energy 1_000_000 per chunk.
        let frame = silent_frame_of_energy(1_000_000.0, 1);
        for _ in 0..calibration::WINDOW_CHUNKS {
            calibrator.add_audio_data(&frame);
        }

        assert_eq!(measured.load(Ordering::SeqCst), 1_000_000);
    }

    #[test]
    fn no_emission_before_window_fills() {
        let mut calibrator = SoundCalibrator::new();
        let fired = Arc::new(AtomicU32::new(0));
        let flag = Arc::clone(&fired);
        calibrator.on_measurement(Box::new(move |_| {
            flag.store(1, Ordering::SeqCst);
        }));
        let frame = silent_frame_of_energy(1.0, 1);
        for _ in 0..calibration::WINDOW_CHUNKS - 1 {
            calibrator.add_audio_data(&frame);
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
