//! Peer session (spec.md §4.3, C3): offer/answer/ICE negotiation, the audio
//! tap that extracts mono PCM off a remote stereo track, and the data
//! channel used for `send_text`/`data_channel_message`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use voice_agent_core::constants::{audio, timeouts};
use voice_agent_core::model::{Candidate, CandidateProtocol, CandidateType, Component};
use voice_agent_core::{AudioFrame, Channels, SampleRate};

use crate::codec::OpusDecoder;
use crate::error::TransportError;
use crate::track::{SyntheticAudioTrack, TrackEvent};
use crate::Transport;

#[derive(Debug, Clone)]
pub struct IceServer {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl Default for IceServer {
    fn default() -> Self {
        Self {
            urls: vec!["stun:stun.l.google.com:19302".to_string()],
            username: None,
            credential: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebRtcConfig {
    pub ice_servers: Vec<IceServer>,
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServer::default()],
        }
    }
}

/// State machine (spec.md §4.3): `new -> negotiating -> connected ->
/// {disconnected|failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerSessionState {
    New,
    Negotiating,
    Connected,
    Disconnected,
    Failed,
}

#[derive(Debug, Clone)]
pub enum PeerEvent {
    AudioData {
        mono_pcm: Vec<i16>,
        sample_rate: u32,
    },
    DataChannelStatus(bool),
    DataChannelMessage(String),
    ConnectionStatus(PeerSessionState),
    IceCandidate(Candidate),
    IsSpeakingSentence(u64),
    StoppedSpeaking,
}

/// `Transport`-generic handle used by the orchestrator to avoid depending
/// on the concrete WebRTC type directly.
pub type PeerSession = WebRtcPeerSession;

pub struct WebRtcPeerSession {
    peer_id: uuid::Uuid,
    config: WebRtcConfig,
    state: Arc<RwLock<PeerSessionState>>,
    peer_connection: RwLock<Option<Arc<RTCPeerConnection>>>,
    data_channel: RwLock<Option<Arc<RTCDataChannel>>>,
    data_channel_open: Arc<AtomicBool>,
    synthetic_track: Arc<SyntheticAudioTrack>,
    local_candidates: Arc<RwLock<Vec<Candidate>>>,
    event_tx: mpsc::UnboundedSender<PeerEvent>,
}

impl WebRtcPeerSession {
    pub async fn new(
        peer_id: uuid::Uuid,
        config: WebRtcConfig,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<PeerEvent>), TransportError> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (synthetic_track, mut track_events) =
            SyntheticAudioTrack::new(peer_id.to_string())?;
        synthetic_track.spawn_pump();

        let this = Arc::new(Self {
            peer_id,
            config,
            state: Arc::new(RwLock::new(PeerSessionState::New)),
            peer_connection: RwLock::new(None),
            data_channel: RwLock::new(None),
            data_channel_open: Arc::new(AtomicBool::new(false)),
            synthetic_track,
            local_candidates: Arc::new(RwLock::new(Vec::new())),
            event_tx: event_tx.clone(),
        });

        let forward = Arc::clone(&this);
        tokio::spawn(async move {
            while let Some(ev) = track_events.recv().await {
                let mapped = match ev {
                    TrackEvent::IsSpeakingSentence(id) => PeerEvent::IsSpeakingSentence(id),
                    TrackEvent::StoppedSpeaking => PeerEvent::StoppedSpeaking,
                };
                let _ = forward.event_tx.send(mapped);
            }
        });

        this.ensure_peer_connection().await?;
        Ok((this, event_rx))
    }

    pub fn synthetic_track(&self) -> Arc<SyntheticAudioTrack> {
        Arc::clone(&self.synthetic_track)
    }

    pub fn peer_id(&self) -> uuid::Uuid {
        self.peer_id
    }

    async fn build_api() -> Result<webrtc::api::API, TransportError> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_codec(
                RTCRtpCodecParameters {
                    capability: RTCRtpCodecCapability {
                        mime_type: "audio/opus".to_string(),
                        clock_rate: audio::SAMPLE_RATE,
                        channels: audio::CHANNELS as u16,
                        sdp_fmtp_line: "minptime=10;useinbandfec=1".to_string(),
                        rtcp_feedback: vec![],
                    },
                    payload_type: 111,
                    stats_id: String::new(),
                },
                RTPCodecType::Audio,
            )
            .map_err(|e| TransportError::Internal(e.to_string()))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| TransportError::Internal(e.to_string()))?;

        let setting_engine = SettingEngine::default();

        Ok(webrtc::api::APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .with_setting_engine(setting_engine)
            .build())
    }

    fn rtc_config(&self) -> RTCConfiguration {
        let ice_servers = self
            .config
            .ice_servers
            .iter()
            .map(|s| RTCIceServer {
                urls: s.urls.clone(),
                username: s.username.clone().unwrap_or_default(),
                credential: s.credential.clone().unwrap_or_default(),
                ..Default::default()
            })
            .collect();
        RTCConfiguration {
            ice_servers,
            ..Default::default()
        }
    }

    async fn ensure_peer_connection(self: &Arc<Self>) -> Result<(), TransportError> {
        if self.peer_connection.read().is_some() {
            return Ok(());
        }
        let api = Self::build_api().await?;
        let pc = Arc::new(api.new_peer_connection(self.rtc_config()).await?);

        pc.add_track(
            self.synthetic_track.local_track() as Arc<dyn TrackLocal + Send + Sync>
        )
        .await
        .map_err(|e| TransportError::Media(e.to_string()))?;

        self.wire_connection_state(&pc);
        self.wire_incoming_track(&pc);
        self.wire_ice_candidates(&pc);
        self.wire_data_channel_accept(&pc);

        *self.peer_connection.write() = Some(pc);
        Ok(())
    }

    fn wire_connection_state(self: &Arc<Self>, pc: &Arc<RTCPeerConnection>) {
        let state_ref = Arc::clone(&self.state);
        let event_tx = self.event_tx.clone();
        pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
            let mapped = match s {
                RTCPeerConnectionState::Connected => PeerSessionState::Connected,
                RTCPeerConnectionState::Disconnected => PeerSessionState::Disconnected,
                RTCPeerConnectionState::Failed => PeerSessionState::Failed,
                RTCPeerConnectionState::Closed => PeerSessionState::Disconnected,
                _ => return Box::pin(async {}),
            };
            *state_ref.write() = mapped;
            let _ = event_tx.send(PeerEvent::ConnectionStatus(mapped));
            Box::pin(async {})
        }));
    }

    fn wire_incoming_track(self: &Arc<Self>, pc: &Arc<RTCPeerConnection>) {
        let event_tx = self.event_tx.clone();
        pc.on_track(Box::new(move |track: Arc<TrackRemote>, _, _| {
            let event_tx = event_tx.clone();
            Box::pin(async move {
                let decoder = match OpusDecoder::new(audio::SAMPLE_RATE, audio::CHANNELS) {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to build opus decoder for remote track");
                        return;
                    }
                };
                loop {
                    match track.read_rtp().await {
                        Ok((packet, _)) => {
                            if packet.payload.is_empty() {
                                continue;
                            }
                            let stereo = match decoder.decode(&packet.payload) {
                                Ok(s) => s,
                                Err(_) => match decoder.decode_plc() {
                                    Ok(s) => s,
                                    Err(_) => continue,
                                },
                            };
                            // Audio tap: extract left channel.
                            let mono = AudioFrame::new(stereo, SampleRate::Hz48000, Channels::Stereo, 0)
                                .extract_channel(0);
                            if event_tx
                                .send(PeerEvent::AudioData {
                                    mono_pcm: mono,
                                    sample_rate: audio::SAMPLE_RATE,
                                })
                                .is_err()
                            {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::debug!(error = %e, "remote track recv error, ending tap");
                            break;
                        }
                    }
                }
            })
        }));
    }

    fn wire_ice_candidates(self: &Arc<Self>, pc: &Arc<RTCPeerConnection>) {
        let local_candidates = Arc::clone(&self.local_candidates);
        let event_tx = self.event_tx.clone();
        pc.on_ice_candidate(Box::new(move |candidate| {
            let local_candidates = Arc::clone(&local_candidates);
            let event_tx = event_tx.clone();
            Box::pin(async move {
                if let Some(c) = candidate {
                    if let Some(parsed) = parse_candidate(&c.to_string(), None) {
                        local_candidates.write().push(parsed.clone());
                        let _ = event_tx.send(PeerEvent::IceCandidate(parsed));
                    }
                }
            })
        }));
    }

    fn wire_data_channel_accept(self: &Arc<Self>, pc: &Arc<RTCPeerConnection>) {
        let this = Arc::clone(self);
        pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            let this = Arc::clone(&this);
            Box::pin(async move { this.bind_data_channel(dc).await })
        }));
    }

    async fn bind_data_channel(self: Arc<Self>, dc: Arc<RTCDataChannel>) {
        let flag = Arc::clone(&self.data_channel_open);
        let event_tx = self.event_tx.clone();
        let flag_open = Arc::clone(&flag);
        let tx_open = event_tx.clone();
        dc.on_open(Box::new(move || {
            flag_open.store(true, Ordering::SeqCst);
            let _ = tx_open.send(PeerEvent::DataChannelStatus(true));
            Box::pin(async {})
        }));
        let flag_close = Arc::clone(&flag);
        let tx_close = event_tx.clone();
        dc.on_close(Box::new(move || {
            flag_close.store(false, Ordering::SeqCst);
            let _ = tx_close.send(PeerEvent::DataChannelStatus(false));
            Box::pin(async {})
        }));
        let tx_message = event_tx.clone();
        dc.on_message(Box::new(move |msg: DataChannelMessage| {
            let tx_message = tx_message.clone();
            Box::pin(async move {
                if let Ok(text) = String::from_utf8(msg.data.to_vec()) {
                    let _ = tx_message.send(PeerEvent::DataChannelMessage(text));
                }
            })
        }));
        *self.data_channel.write() = Some(dc);
    }
}

#[async_trait]
impl Transport for WebRtcPeerSession {
    async fn create_offer(&self) -> Result<(String, String), TransportError> {
        *self.state.write() = PeerSessionState::Negotiating;
        let pc = self.peer_connection.read().clone().ok_or_else(|| {
            TransportError::Internal("peer connection not initialized".to_string())
        })?;

        if self.data_channel.read().is_none() {
            let dc = pc
                .create_data_channel("data", None)
                .await
                .map_err(|e| TransportError::Internal(e.to_string()))?;
            self.clone_and_bind(dc).await;
        }

        let offer = pc
            .create_offer(None)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        self.set_local_and_wait_gathering(&pc, offer.clone()).await?;
        let final_desc = pc.local_description().await.unwrap_or(offer);
        Ok((final_desc.sdp, "offer".to_string()))
    }

    async fn set_remote_description(&self, sdp: String, sdp_type: String) -> Result<(), TransportError> {
        let pc = self.peer_connection.read().clone().ok_or_else(|| {
            TransportError::Internal("peer connection not initialized".to_string())
        })?;
        let desc = if sdp_type == "offer" {
            RTCSessionDescription::offer(sdp)
        } else {
            RTCSessionDescription::answer(sdp)
        }
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        pc.set_remote_description(desc)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        Ok(())
    }

    async fn create_answer(&self) -> Result<(String, String), TransportError> {
        *self.state.write() = PeerSessionState::Negotiating;
        let pc = self.peer_connection.read().clone().ok_or_else(|| {
            TransportError::Internal("peer connection not initialized".to_string())
        })?;
        let answer = pc
            .create_answer(None)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        self.set_local_and_wait_gathering(&pc, answer.clone()).await?;
        let final_desc = pc.local_description().await.unwrap_or(answer);
        Ok((final_desc.sdp, "answer".to_string()))
    }

    async fn add_ice_candidate(&self, candidate: Option<Candidate>) -> Result<(), TransportError> {
        let pc = self.peer_connection.read().clone().ok_or_else(|| {
            TransportError::Internal("peer connection not initialized".to_string())
        })?;
        let Some(candidate) = candidate else {
            return Ok(()); // null candidate = end-of-candidates, nothing to add
        };
        let init = RTCIceCandidateInit {
            candidate: format!(
                "candidate:{} {} {} {} {} {} typ {}",
                candidate.foundation,
                candidate.component as u8,
                match candidate.protocol {
                    CandidateProtocol::Udp => "udp",
                    CandidateProtocol::Tcp => "tcp",
                },
                candidate.priority,
                candidate.ip,
                candidate.port,
                match candidate.candidate_type {
                    CandidateType::Host => "host",
                    CandidateType::Srflx => "srflx",
                    CandidateType::Prflx => "prflx",
                    CandidateType::Relay => "relay",
                }
            ),
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: None,
        };
        pc.add_ice_candidate(init)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))
    }

    fn send_text(&self, msg: &str) {
        if !self.data_channel_open.load(Ordering::SeqCst) {
            tracing::warn!(peer_id = %self.peer_id, "dropping send_text: data channel not open");
            return;
        }
        let Some(dc) = self.data_channel.read().clone() else {
            tracing::warn!(peer_id = %self.peer_id, "dropping send_text: no data channel bound");
            return;
        };
        let payload = bytes::Bytes::copy_from_slice(msg.as_bytes());
        tokio::spawn(async move {
            if let Err(e) = dc.send(&payload).await {
                tracing::warn!(error = %e, "failed to send data channel message");
            }
        });
    }

    async fn close(&self) {
        if let Some(pc) = self.peer_connection.write().take() {
            let _ = pc.close().await;
        }
        *self.state.write() = PeerSessionState::Disconnected;
    }

    fn state(&self) -> PeerSessionState {
        *self.state.read()
    }
}

impl WebRtcPeerSession {
    async fn clone_and_bind(self: &Arc<Self>, dc: Arc<RTCDataChannel>) {
        let this = Arc::clone(self);
        this.bind_data_channel(dc).await;
    }

    async fn set_local_and_wait_gathering(
        &self,
        pc: &Arc<RTCPeerConnection>,
        desc: RTCSessionDescription,
    ) -> Result<(), TransportError> {
        let (tx, rx) = oneshot::channel::<()>();
        let tx = Arc::new(parking_lot::Mutex::new(Some(tx)));
        pc.on_ice_gathering_state_change(Box::new(move |state: RTCIceGathererState| {
            if state == RTCIceGathererState::Complete {
                if let Some(tx) = tx.lock().take() {
                    let _ = tx.send(());
                }
            }
            Box::pin(async {})
        }));

        pc.set_local_description(desc)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let _ = tokio::time::timeout(
            std::time::Duration::from_secs(timeouts::ICE_GATHER_SECS),
            rx,
        )
        .await;
        Ok(())
    }
}

/// Parses a raw `a=candidate` attribute string into the typed [`Candidate`]
/// spec.md §3 describes. webrtc-rs's own `RTCIceCandidate` doesn't carry
/// sdpMid/sdpMLineIndex context, so those are threaded in separately by the
/// caller when known.
fn parse_candidate(raw: &str, _hint: Option<String>) -> Option<Candidate> {
    let raw = raw.strip_prefix("candidate:").unwrap_or(raw);
    let parts: Vec<&str> = raw.split_whitespace().collect();
    if parts.len() < 8 {
        return None;
    }
    let protocol = match parts[2].to_lowercase().as_str() {
        "udp" => CandidateProtocol::Udp,
        "tcp" => CandidateProtocol::Tcp,
        _ => return None,
    };
    let component = match parts[1] {
        "1" => Component::Rtp,
        "2" => Component::Rtcp,
        _ => return None,
    };
    let candidate_type = match parts[7] {
        "host" => CandidateType::Host,
        "srflx" => CandidateType::Srflx,
        "prflx" => CandidateType::Prflx,
        "relay" => CandidateType::Relay,
        _ => return None,
    };
    Some(Candidate {
        foundation: parts[0].to_string(),
        component,
        protocol,
        priority: parts[3].parse().ok()?,
        ip: parts[4].to_string(),
        port: parts[5].parse().ok()?,
        candidate_type,
        sdp_mid: Some("audio".to_string()),
        sdp_mline_index: Some(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_candidate() {
        let raw = "candidate:1 1 udp 2130706431 192.168.1.1 54321 typ host";
        let c = parse_candidate(raw, None).unwrap();
        assert_eq!(c.foundation, "1");
        assert_eq!(c.ip, "192.168.1.1");
        assert_eq!(c.port, 54321);
        assert!(matches!(c.candidate_type, CandidateType::Host));
    }

    #[test]
    fn rejects_malformed_candidate() {
        assert!(parse_candidate("garbage", None).is_none());
    }

    #[test]
    fn default_config_has_stun_server() {
        let config = WebRtcConfig::default();
        assert!(!config.ice_servers.is_empty());
    }
}
