//! Integration test for the synthetic track's sentence-boundary pacing
//! (spec.md §4.4, C4 / C9): as the pacing pump drains queued samples one
//! 960-sample stereo frame at a time, it must emit `IsSpeakingSentence(id)`
//! exactly once per sentence transition, followed by `StoppedSpeaking` once
//! the queue runs dry and the debounce window elapses.

use std::time::Duration;

use voice_agent_transport::{SyntheticAudioTrack, TrackEvent};

const FRAME_SAMPLES: usize = 960 * 2; // stereo

#[tokio::test]
async fn sentence_boundaries_and_stop_speaking_are_reported_in_order() {
    let (track, mut events) = SyntheticAudioTrack::new("pacing-test".to_string()).unwrap();
    let _pump = track.spawn_pump();

    track.enqueue(&vec![500i16; FRAME_SAMPLES * 2], Some(1));
    track.enqueue(&vec![500i16; FRAME_SAMPLES * 2], Some(2));

    let first = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("sentence event within one second")
        .expect("event channel open");
    assert!(matches!(first, TrackEvent::IsSpeakingSentence(1)));

    let second = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("second sentence event within one second")
        .expect("event channel open");
    assert!(matches!(second, TrackEvent::IsSpeakingSentence(2)));

    // Queue now drains to silence; the debounce fires StoppedSpeaking once
    // is_speaking() has been false for STOP_SPEAKING_DEBOUNCE_MS.
    let stopped = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("stop-speaking event within the debounce window")
        .expect("event channel open");
    assert!(matches!(stopped, TrackEvent::StoppedSpeaking));
}
