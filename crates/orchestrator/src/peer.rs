//! Per-peer runtime bookkeeping (spec.md §3 `PeerRuntime`). Owns the pieces
//! the orchestrator's event loop needs to reach one connected participant:
//! its WebRTC session (C3/C4), its calibrator (C5), its segmenter (C6), and
//! its data-channel RPC framer (C1).

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::Mutex;

use voice_agent_core::model::{PeerId, PeerRuntime};
use voice_agent_pipeline::{Segmenter, SoundCalibrator};
use voice_agent_rpc::RpcPeer;
use voice_agent_transport::WebRtcPeerSession;

pub struct PeerHandle {
    pub peer_id: PeerId,
    pub session: Arc<WebRtcPeerSession>,
    pub core: PeerRuntime,
    pub calibrator: Mutex<SoundCalibrator>,
    pub segmenter: Mutex<Segmenter>,
    pub data_rpc: Arc<RpcPeer>,
    /// Last `is_speaking_status` value forwarded to the peer's data channel,
    /// so the orchestrator only notifies on a change rather than every chunk.
    pub speaking: AtomicBool,
}

impl PeerHandle {
    pub fn new(
        peer_id: PeerId,
        session: Arc<WebRtcPeerSession>,
        calibrator: SoundCalibrator,
        segmenter: Segmenter,
        data_rpc: Arc<RpcPeer>,
    ) -> Self {
        Self {
            peer_id,
            session,
            core: PeerRuntime::new(peer_id),
            calibrator: Mutex::new(calibrator),
            segmenter: Mutex::new(segmenter),
            data_rpc,
            speaking: AtomicBool::new(false),
        }
    }
}
