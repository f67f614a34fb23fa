//! Peer session (spec.md §4.3, C3) and synthetic audio track (§4.4, C4).

mod codec;
mod error;
mod peer_session;
mod track;

pub use codec::{OpusDecoder, OpusEncoder};
pub use error::TransportError;
pub use peer_session::{
    IceServer, PeerEvent, PeerSession, PeerSessionState, WebRtcConfig, WebRtcPeerSession,
};
pub use track::{SyntheticAudioTrack, TrackEvent};

use voice_agent_core::model::Candidate;

/// A handle any orchestrator-level code can use to talk to a live peer
/// session without depending on the concrete WebRTC implementation type.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn create_offer(&self) -> Result<(String, String), TransportError>;
    async fn set_remote_description(&self, sdp: String, sdp_type: String) -> Result<(), TransportError>;
    async fn create_answer(&self) -> Result<(String, String), TransportError>;
    async fn add_ice_candidate(&self, candidate: Option<Candidate>) -> Result<(), TransportError>;
    fn send_text(&self, msg: &str);
    async fn close(&self);
    fn state(&self) -> PeerSessionState;
}
