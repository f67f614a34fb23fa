use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use voice_agent_core::audio::{AudioFrame, Channels, SampleRate};
use voice_agent_core::constants::{calibration, timeouts};
use voice_agent_core::model::{PeerId, Session};
use voice_agent_core::{OrchestratorError, Result};
use voice_agent_pipeline::{Segmenter, SoundCalibrator};
use voice_agent_rpc::RpcPeer;
use voice_agent_signaling::{RoomEvent, RoomSupervisor};
use voice_agent_speech::{SpeechProducer, SpeechTarget, TtsClient, TtsConfig};
use voice_agent_tokenstream::TokenStreamClient;
use voice_agent_transcription::TranscriptionClient;
use voice_agent_transport::{PeerEvent, PeerSessionState, Transport, WebRtcConfig, WebRtcPeerSession};

use crate::peer::PeerHandle;

/// The per-session parameters `initialize` needs beyond what
/// `voice_agent_config::Settings` already carries: the context this session
/// was invited into (spec.md §6 `POST /invite-agent`) and the endpoints /
/// policy it should run with.
pub struct OrchestratorConfig {
    pub context_id: String,
    pub auth_token: Option<String>,
    pub allows_interruptions: bool,
    pub signaling_url: String,
    pub transcription_url: String,
    pub token_stream_url: String,
    pub ice_config: WebRtcConfig,
    pub trivial_rejections: Vec<String>,
    pub tts: TtsConfig,
}

/// Top-level controller (spec.md §4.12, C12). One instance per admitted
/// conversation; destroyed once the room has zero peers.
pub struct ConversationOrchestrator {
    session: Arc<Session>,
    trivial_rejections: Vec<String>,
    peers: DashMap<PeerId, Arc<PeerHandle>>,
    room: Arc<RoomSupervisor>,
    transcription: Arc<TranscriptionClient>,
    token_stream: Arc<TokenStreamClient>,
    token_tx: mpsc::UnboundedSender<String>,
    /// Background tasks this session owns (room-event pump, speech producer,
    /// per-peer event-drain loops); aborted by `close()` as part of session
    /// teardown.
    tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Fired once by `close()`, after every background task has been
    /// aborted, so the admission HTTP layer can drop its own `Arc` to this
    /// session (spec.md §3: "destroyed when the room has zero peers").
    on_closed: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl ConversationOrchestrator {
    /// Connects every upstream collaborator, joins the room, and starts the
    /// background loops. Mirrors the original's `ConversationOrchestrator.
    /// initialize()` sequencing: token stream first (its `connect_to_context`
    /// answer carries the voice id C10 needs), then transcription, then the
    /// room.
    pub async fn initialize(config: OrchestratorConfig) -> Result<Arc<Self>> {
        let token_stream = TokenStreamClient::connect(&config.token_stream_url).await?;

        let access_token = config.auth_token.clone().unwrap_or_default();
        let outcome = token_stream
            .connect_to_context(&config.context_id, &access_token)
            .await?;
        if !outcome.success {
            return Err(OrchestratorError::UpstreamUnavailable {
                service: "token_stream".to_string(),
                reason: "connect_to_context rejected".to_string(),
            });
        }

        let session = Arc::new(Session::new(
            config.context_id.clone(),
            config.auth_token.clone(),
            config.allows_interruptions,
        ));
        session.set_voice_id(outcome.agent.voice_id);

        let transcription = TranscriptionClient::connect(&config.transcription_url).await?;

        let (room, room_events_rx) = RoomSupervisor::new(config.signaling_url.clone(), config.ice_config.clone());

        let (token_tx, token_rx) = mpsc::unbounded_channel();

        let this = Arc::new(Self {
            session,
            trivial_rejections: config.trivial_rejections,
            peers: DashMap::new(),
            room: Arc::clone(&room),
            transcription: Arc::clone(&transcription),
            token_stream: Arc::clone(&token_stream),
            token_tx,
            tasks: Mutex::new(Vec::new()),
            on_closed: Mutex::new(None),
        });

        this.wire_token_stream();
        this.wire_transcription_status();
        this.spawn_room_event_loop(room_events_rx);
        this.spawn_speech_producer(token_rx, config.tts);

        room.connect().await?;
        room.join(&config.context_id, "agent", config.auth_token.as_deref()).await?;

        Ok(this)
    }

    fn wire_token_stream(self: &Arc<Self>) {
        let this = Arc::clone(self);
        self.token_stream.on_token(Arc::new(move |token, _response_id| {
            let _ = this.token_tx.send(token);
        }));

        let this = Arc::clone(self);
        self.token_stream.on_tool_call(Arc::new(move |tool_id, tool_name, tool_input| {
            this.broadcast(
                "tool_call",
                serde_json::json!({"tool_id": tool_id, "tool_name": tool_name, "tool_input": tool_input}),
            );
        }));

        let this = Arc::clone(self);
        self.token_stream
            .on_tool_response(Arc::new(move |tool_id, tool_name, tool_output| {
                this.broadcast(
                    "tool_response",
                    serde_json::json!({"tool_id": tool_id, "tool_name": tool_name, "tool_output": tool_output}),
                );
            }));

        let this = Arc::clone(self);
        self.token_stream.on_connection_status(Arc::new(move |status| {
            this.broadcast(
                "token_streaming_service_connection_status",
                serde_json::json!({"status": format!("{status:?}").to_lowercase()}),
            );
        }));
    }

    fn wire_transcription_status(self: &Arc<Self>) {
        let this = Arc::clone(self);
        self.transcription.on_connection_status(Arc::new(move |status| {
            this.broadcast(
                "transcription_service_connection_status",
                serde_json::json!({"status": format!("{status:?}").to_lowercase()}),
            );
        }));
    }

    fn spawn_room_event_loop(self: &Arc<Self>, mut rx: mpsc::UnboundedReceiver<RoomEvent>) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    RoomEvent::PeerCreated { peer_id, session, events } => {
                        this.add_peer(peer_id, session, events).await;
                    }
                    RoomEvent::RoomConnectionStatus(status) => {
                        this.broadcast(
                            "room_connection_status",
                            serde_json::json!({"status": format!("{status:?}").to_lowercase()}),
                        );
                    }
                }
            }
        });
        self.tasks.lock().push(handle);
    }

    fn spawn_speech_producer(self: &Arc<Self>, token_rx: mpsc::UnboundedReceiver<String>, tts_config: TtsConfig) {
        let producer = SpeechProducer::new(Arc::new(TtsClient::new(tts_config)));
        let target: Arc<dyn SpeechTarget> = Arc::clone(self) as Arc<dyn SpeechTarget>;
        let handle = tokio::spawn(async move {
            producer.run(token_rx, target).await;
        });
        self.tasks.lock().push(handle);
    }

    async fn add_peer(
        self: &Arc<Self>,
        peer_id: PeerId,
        peer_session: Arc<WebRtcPeerSession>,
        events: mpsc::UnboundedReceiver<PeerEvent>,
    ) {
        let (data_rpc, mut data_outbound) = RpcPeer::new();
        let pump_session = Arc::clone(&peer_session);
        tokio::spawn(async move {
            while let Some(text) = data_outbound.recv().await {
                pump_session.send_text(&text);
            }
        });

        let mut segmenter = Segmenter::new(Arc::clone(&self.transcription), self.trivial_rejections.clone());
        segmenter.set_vad_threshold(*self.session.vad_threshold.read());

        let this = Arc::clone(self);
        segmenter.on_speech_detected(Arc::new(move |text| {
            let this = Arc::clone(&this);
            tokio::spawn(async move {
                this.on_speech_detected(peer_id, text).await;
            });
        }));

        let mut calibrator = SoundCalibrator::new();
        let this = Arc::clone(self);
        calibrator.on_measurement(Box::new(move |energy| {
            let this = Arc::clone(&this);
            tokio::spawn(async move {
                this.on_calibration_measurement(peer_id, energy).await;
            });
        }));

        let handle = Arc::new(PeerHandle::new(peer_id, peer_session, calibrator, segmenter, data_rpc));

        let already_calibrated = self.session.has_calibrated();
        if already_calibrated {
            handle.segmenter.lock().set_vad_threshold(*self.session.vad_threshold.read());
        }

        self.peers.insert(peer_id, Arc::clone(&handle));
        self.session.add_peer(peer_id);

        Self::notify(
            &handle,
            "calibration_status",
            serde_json::json!({"status": if already_calibrated { "complete" } else { "started" }}),
        );

        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            this.drive_peer_events(peer_id, events).await;
        });
        self.tasks.lock().push(task);
    }

    async fn drive_peer_events(self: Arc<Self>, peer_id: PeerId, mut events: mpsc::UnboundedReceiver<PeerEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                PeerEvent::AudioData { mono_pcm, sample_rate } => {
                    self.on_audio_data(peer_id, &mono_pcm, sample_rate);
                }
                PeerEvent::DataChannelStatus(open) => {
                    self.notify_peer(peer_id, "data_channel_connection_status", serde_json::json!({"connected": open}));
                }
                PeerEvent::DataChannelMessage(text) => {
                    if let Some(peer) = self.peers.get(&peer_id) {
                        peer.data_rpc.handle_message(&text);
                    }
                }
                PeerEvent::ConnectionStatus(state) => {
                    self.notify_peer(
                        peer_id,
                        "connection_status",
                        serde_json::json!({"state": format!("{state:?}").to_lowercase()}),
                    );
                    if matches!(state, PeerSessionState::Disconnected | PeerSessionState::Failed) {
                        self.handle_peer_disconnected(peer_id).await;
                    }
                }
                PeerEvent::IceCandidate(_) => {
                    // Already relayed to the remote peer by the room supervisor.
                }
                PeerEvent::IsSpeakingSentence(sentence_id) => {
                    self.notify_peer(peer_id, "is_speaking_sentence", serde_json::json!({"sentence_id": sentence_id}));
                }
                PeerEvent::StoppedSpeaking => {
                    self.notify_peer(peer_id, "stoped_speaking", serde_json::json!({}));
                }
            }
        }
    }

    /// `on_audio_data(peer_id, pcm, sr)` gating exactly as spec.md §4.12:
    /// always feed C5; stop if not calibrated; stop if interruptions are
    /// disabled and this peer's track is draining; otherwise feed C6.
    fn on_audio_data(&self, peer_id: PeerId, mono_pcm: &[i16], sample_rate: u32) {
        let Some(peer) = self.peers.get(&peer_id) else {
            return;
        };

        let rate = match sample_rate {
            16_000 => SampleRate::Hz16000,
            _ => SampleRate::Hz48000,
        };
        let frame = AudioFrame::new(mono_pcm.to_vec(), rate, Channels::Mono, 0);
        peer.calibrator.lock().add_audio_data(&frame);

        if !self.session.has_calibrated() {
            return;
        }
        if !self.session.allows_interruptions && peer.session.synthetic_track().is_speaking() {
            return;
        }

        let mut segmenter = peer.segmenter.lock();
        segmenter.add_audio(mono_pcm, sample_rate);
        let speaking = segmenter.is_speaking();
        drop(segmenter);

        if peer.speaking.swap(speaking, Ordering::SeqCst) != speaking {
            Self::notify(&peer, "is_speaking_status", serde_json::json!({"speaking": speaking}));
        }
    }

    /// `on_calibration_measurement(peer_id, energy)` (spec.md §4.12): the
    /// first peer to report a measurement freezes the session-wide VAD
    /// threshold; later peers inherit the frozen value at creation time
    /// (see `add_peer`).
    async fn on_calibration_measurement(&self, peer_id: PeerId, energy: f64) {
        if self.session.has_calibrated() {
            return;
        }
        let threshold = derive_vad_threshold(energy);

        if self.session.try_calibrate(threshold) {
            if let Some(peer) = self.peers.get(&peer_id) {
                peer.segmenter.lock().set_vad_threshold(threshold);
                Self::notify(&peer, "calibration_status", serde_json::json!({"status": "complete"}));
            }
        }
    }

    async fn on_speech_detected(&self, peer_id: PeerId, text: String) {
        self.notify_peer(peer_id, "speech_detected", serde_json::json!({"text": text}));
        self.token_stream.add_message(&text);
    }

    async fn handle_peer_disconnected(self: &Arc<Self>, peer_id: PeerId) {
        let Some((_, peer)) = self.peers.remove(&peer_id) else {
            return;
        };
        if !peer.core.release() {
            return;
        }

        peer.session.close().await;
        self.session.remove_peer(peer_id);
        self.room.remove_peer(peer_id);

        if self.session.is_empty() {
            self.room.close().await;
            self.token_stream.close();
            self.transcription.close();
            self.close();
        }
    }

    /// Registers a callback fired once by `close()`. Must be set before the
    /// last peer can disconnect -- callers register it immediately after
    /// `initialize` returns.
    pub fn on_closed(&self, handler: impl FnOnce() + Send + 'static) {
        *self.on_closed.lock() = Some(Box::new(handler));
    }

    /// Session teardown (spec.md §5): aborts every background task this
    /// session owns -- the room-event pump, the speech producer, and every
    /// peer's event-drain loop -- then fires the registered close callback.
    fn close(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        if let Some(handler) = self.on_closed.lock().take() {
            handler();
        }
    }

    fn notify(peer: &Arc<PeerHandle>, method: &'static str, params: Value) {
        let rpc = Arc::clone(&peer.data_rpc);
        tokio::spawn(async move {
            let _ = rpc
                .call(method, params, false, Duration::from_millis(timeouts::RPC_DEFAULT_MS))
                .await;
        });
    }

    fn notify_peer(&self, peer_id: PeerId, method: &'static str, params: Value) {
        if let Some(peer) = self.peers.get(&peer_id) {
            Self::notify(&peer, method, params);
        }
    }

    fn broadcast(&self, method: &'static str, params: Value) {
        for entry in self.peers.iter() {
            Self::notify(entry.value(), method, params.clone());
        }
    }
}

/// `(energy / MAX^2) * THRESHOLD_FACTOR` (spec.md §4.12): converts the
/// ambient-energy mean C5 reports into the frozen VAD threshold passed to
/// every peer's segmenter.
fn derive_vad_threshold(energy: f64) -> f64 {
    let max_sq = voice_agent_core::constants::audio::PCM16_MAX * voice_agent_core::constants::audio::PCM16_MAX;
    (energy / max_sq) * calibration::THRESHOLD_FACTOR
}

#[async_trait::async_trait]
impl SpeechTarget for ConversationOrchestrator {
    fn broadcast_ai_sentence(&self, sentence: &str, sentence_id: u64) {
        self.broadcast("ai_sentence", serde_json::json!({"sentence": sentence, "sentence_id": sentence_id}));
    }

    fn enqueue_audio(&self, chunk: &[i16], sentence_id: u64) {
        for entry in self.peers.iter() {
            entry.value().session.synthetic_track().enqueue(chunk, Some(sentence_id));
        }
    }

    fn voice_id(&self) -> Option<String> {
        self.session.voice_id()
    }

    fn next_sentence_id(&self) -> u64 {
        self.session.next_sentence_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_threshold_scales_linearly_with_energy() {
        let low = derive_vad_threshold(1_000_000.0);
        let high = derive_vad_threshold(2_000_000.0);
        assert!((high - 2.0 * low).abs() < 1e-12);
    }

    #[test]
    fn derived_threshold_of_zero_energy_is_zero() {
        assert_eq!(derive_vad_threshold(0.0), 0.0);
    }

    #[test]
    fn session_calibration_freeze_matches_derived_threshold() {
        let session = Session::new("ctx-1", None, true);
        let measured = derive_vad_threshold(4_000_000.0);
        assert!(session.try_calibrate(measured));
        assert_eq!(*session.vad_threshold.read(), measured);
        // A later peer joining after freeze must read back the same value
        // `add_peer` would push into its segmenter.
        assert!(!session.try_calibrate(derive_vad_threshold(1.0)));
        assert_eq!(*session.vad_threshold.read(), measured);
    }
}
