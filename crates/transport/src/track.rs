//! Synthetic audio track (spec.md §4.4, C4): a real-time producer paced to
//! wall clock that the transport pulls samples from, grounded in the
//! original's `SyntheticAudioTrack` (48kHz stereo, 960-sample frames, time
//! base 1/48000, sentence-boundary and stop-speaking telemetry).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use voice_agent_core::constants::{audio, track as track_constants};

use crate::codec::OpusEncoder;
use crate::error::TransportError;

const FRAME_SAMPLES: usize = audio::FRAME_SIZE * 2; // stereo

#[derive(Debug, Clone)]
pub enum TrackEvent {
    IsSpeakingSentence(u64),
    StoppedSpeaking,
}

struct Queues {
    samples: VecDeque<i16>,
    sentence_ids: VecDeque<Option<u64>>,
}

/// Paced producer of 20ms stereo int16 frames (spec.md §4.4). `enqueue`
/// appends samples (and a parallel sentence id per sample); an internal
/// pump task pulls 1920-sample frames at wall-clock cadence and writes
/// them, Opus-encoded, onto the underlying WebRTC track.
pub struct SyntheticAudioTrack {
    local_track: Arc<TrackLocalStaticSample>,
    encoder: OpusEncoder,
    queues: Mutex<Queues>,
    pts: AtomicU64,
    start_time: Instant,
    was_speaking: AtomicBool,
    stop_speaking_inflight: AtomicBool,
    last_reported_sentence: Mutex<Option<u64>>,
    event_tx: mpsc::UnboundedSender<TrackEvent>,
}

impl SyntheticAudioTrack {
    pub fn new(session_id: String) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<TrackEvent>), TransportError> {
        let local_track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: "audio/opus".to_string(),
                clock_rate: audio::SAMPLE_RATE,
                channels: audio::CHANNELS as u16,
                sdp_fmtp_line: "minptime=10;useinbandfec=1".to_string(),
                rtcp_feedback: vec![],
            },
            "audio".to_string(),
            session_id,
        ));
        let encoder = OpusEncoder::new(audio::SAMPLE_RATE, audio::CHANNELS)?;
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let this = Arc::new(Self {
            local_track,
            encoder,
            queues: Mutex::new(Queues {
                samples: VecDeque::new(),
                sentence_ids: VecDeque::new(),
            }),
            pts: AtomicU64::new(0),
            start_time: Instant::now(),
            was_speaking: AtomicBool::new(false),
            stop_speaking_inflight: AtomicBool::new(false),
            last_reported_sentence: Mutex::new(None),
            event_tx,
        });
        Ok((this, event_rx))
    }

    pub fn local_track(&self) -> Arc<TrackLocalStaticSample> {
        Arc::clone(&self.local_track)
    }

    /// Appends interleaved int16 samples; if `sentence_id` is present, tags
    /// each sample with it in a parallel queue so dequeue-time telemetry
    /// stays exactly aligned with the audio it describes. Drops the oldest
    /// queued frame (with a warning) rather than growing unboundedly if the
    /// queue exceeds its real-time budget.
    pub fn enqueue(&self, samples: &[i16], sentence_id: Option<u64>) {
        let mut q = self.queues.lock();
        for &s in samples {
            q.samples.push_back(s);
            q.sentence_ids.push_back(sentence_id);
        }
        let max_len = track_constants::MAX_QUEUED_FRAMES * FRAME_SAMPLES;
        while q.samples.len() > max_len {
            q.samples.pop_front();
            q.sentence_ids.pop_front();
            tracing::warn!("synthetic track queue overflow, dropping oldest sample");
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.queues.lock().samples.len() > FRAME_SAMPLES
    }

    /// Spawns the pacing pump. Call once per track; the returned handle can
    /// be aborted on session close.
    pub fn spawn_pump(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run_pump().await })
    }

    async fn run_pump(self: Arc<Self>) {
        let time_base = Duration::from_secs_f64(1.0 / audio::SAMPLE_RATE as f64);
        loop {
            let pts = self.pts.load(Ordering::SeqCst);
            let expected = self.start_time + time_base * (pts as u32);
            let now = Instant::now();
            if expected > now {
                tokio::time::sleep(expected - now).await;
            }

            let (frame, sentence_ids, is_silent) = self.dequeue_frame();

            if let Some(last_id) = sentence_ids.iter().rev().find_map(|id| *id) {
                let mut last_reported = self.last_reported_sentence.lock();
                if *last_reported != Some(last_id) {
                    *last_reported = Some(last_id);
                    let _ = self.event_tx.send(TrackEvent::IsSpeakingSentence(last_id));
                }
            }

            self.update_stop_speaking_telemetry(is_silent);

            match self.encoder.encode(&frame) {
                Ok(opus_data) => {
                    let sample = Sample {
                        data: opus_data.into(),
                        duration: Duration::from_millis(audio::FRAME_MS as u64),
                        ..Default::default()
                    };
                    if self.local_track.write_sample(&sample).await.is_err() {
                        tracing::info!("synthetic track write failed, stopping pump");
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to encode synthetic frame, skipping");
                }
            }

            self.pts.fetch_add(audio::FRAME_SIZE as u64, Ordering::SeqCst);
        }
    }

    fn dequeue_frame(&self) -> (Vec<i16>, Vec<Option<u64>>, bool) {
        let mut q = self.queues.lock();
        if q.samples.len() < FRAME_SAMPLES {
            return (vec![0i16; FRAME_SAMPLES], Vec::new(), true);
        }
        let frame: Vec<i16> = q.samples.drain(..FRAME_SAMPLES).collect();
        let ids: Vec<Option<u64>> = q.sentence_ids.drain(..FRAME_SAMPLES).collect();
        (frame, ids, false)
    }

    fn update_stop_speaking_telemetry(self: &Arc<Self>, is_silent: bool) {
        let was_speaking = self.was_speaking.swap(!is_silent, Ordering::SeqCst);
        if was_speaking && is_silent {
            if self
                .stop_speaking_inflight
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                let this = Arc::clone(self);
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(
                        track_constants::STOP_SPEAKING_DEBOUNCE_MS,
                    ))
                    .await;
                    if !this.is_speaking() {
                        let _ = this.event_tx.send(TrackEvent::StoppedSpeaking);
                    }
                    this.stop_speaking_inflight.store(false, Ordering::SeqCst);
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn is_speaking_reflects_queue_depth() {
        let (track, _rx) = SyntheticAudioTrack::new("test".to_string()).unwrap();
        assert!(!track.is_speaking());
        track.enqueue(&vec![100i16; FRAME_SAMPLES], None);
        assert!(!track.is_speaking(), "exactly one queued frame is not yet \"speaking\"");
        track.enqueue(&vec![100i16; 1], None);
        assert!(track.is_speaking());
    }

    #[tokio::test]
    async fn enqueue_tags_samples_with_sentence_id() {
        let (track, _rx) = SyntheticAudioTrack::new("test".to_string()).unwrap();
        track.enqueue(&vec![1i16; 10], Some(42));
        let q = track.queues.lock();
        assert!(q.sentence_ids.iter().all(|id| *id == Some(42)));
    }

    #[tokio::test]
    async fn overflow_drops_oldest() {
        let (track, _rx) = SyntheticAudioTrack::new("test".to_string()).unwrap();
        let max_len = track_constants::MAX_QUEUED_FRAMES * FRAME_SAMPLES;
        track.enqueue(&vec![1i16; max_len + FRAME_SAMPLES], None);
        let q = track.queues.lock();
        assert!(q.samples.len() <= max_len);
    }
}
