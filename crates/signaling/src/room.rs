//! Room supervisor (spec.md §4.11, C11): consumes signaling notifications,
//! drives offer/answer negotiation and trickle-ICE relay, and hands freshly
//! built peer sessions off to the orchestrator.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use voice_agent_core::constants::timeouts;
use voice_agent_core::model::{Candidate, PeerId};
use voice_agent_rpc::RpcPeer;
use voice_agent_transport::{PeerEvent, Transport, WebRtcConfig, WebRtcPeerSession};

use crate::client::{ConnectionStatus, SignalingClient};
use crate::error::SignalingError;

/// Events the room supervisor hands to the orchestrator. Peer-scoped
/// telemetry (is_speaking_sentence, stopped_speaking, data channel status,
/// connection status) travels on the per-peer `events` receiver handed back
/// at creation time, per the "pure forwarding" design in spec.md §4.12.
pub enum RoomEvent {
    PeerCreated {
        peer_id: PeerId,
        session: Arc<WebRtcPeerSession>,
        events: mpsc::UnboundedReceiver<PeerEvent>,
    },
    RoomConnectionStatus(ConnectionStatus),
}

pub struct RoomSupervisor {
    signaling: Arc<SignalingClient>,
    rpc: Arc<RpcPeer>,
    ice_config: WebRtcConfig,
    room_events: mpsc::UnboundedSender<RoomEvent>,
    peers: Mutex<HashMap<PeerId, Arc<WebRtcPeerSession>>>,
}

impl RoomSupervisor {
    pub fn new(
        signaling_url: impl Into<String>,
        ice_config: WebRtcConfig,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<RoomEvent>) {
        let signaling = SignalingClient::new(signaling_url);
        let (rpc, mut outbound) = RpcPeer::new();
        let (room_events, room_events_rx) = mpsc::unbounded_channel();

        let this = Arc::new(Self {
            signaling: Arc::clone(&signaling),
            rpc,
            ice_config,
            room_events,
            peers: Mutex::new(HashMap::new()),
        });

        // Pump the rpc peer's outgoing frames onto the signaling socket.
        let signaling_for_pump = Arc::clone(&signaling);
        tokio::spawn(async move {
            while let Some(text) = outbound.recv().await {
                if let Err(e) = signaling_for_pump.send(text) {
                    tracing::warn!(error = %e, "failed to send signaling frame");
                }
            }
        });

        // Feed inbound signaling frames into the rpc peer.
        let rpc_for_recv = Arc::clone(&this.rpc);
        signaling.on_message(Arc::new(move |text| {
            rpc_for_recv.handle_message(&text);
        }));

        let events_for_status = this.room_events.clone();
        signaling.on_connection_status(Arc::new(move |status| {
            let _ = events_for_status.send(RoomEvent::RoomConnectionStatus(status));
        }));

        this.register_handlers();
        (this, room_events_rx)
    }

    fn register_handlers(self: &Arc<Self>) {
        let this = Arc::clone(self);
        self.rpc.on(
            "peer_added",
            Arc::new(move |params| {
                let this = Arc::clone(&this);
                Box::pin(async move { this.handle_peer_added(params).await })
            }),
        );

        let this = Arc::clone(self);
        self.rpc.on_request(
            "connection_request",
            Arc::new(move |params| {
                let this = Arc::clone(&this);
                Box::pin(async move { this.handle_connection_request(params).await })
            }),
        );

        let this = Arc::clone(self);
        self.rpc.on(
            "add_ice_candidate",
            Arc::new(move |params| {
                let this = Arc::clone(&this);
                Box::pin(async move { this.handle_add_ice_candidate(params).await })
            }),
        );
    }

    pub async fn connect(self: &Arc<Self>) -> Result<(), SignalingError> {
        self.signaling.connect().await
    }

    /// Issued at `connect()` time (spec.md §4.11); `auth_token` is forwarded
    /// as an opaque field rather than a transport header, since the
    /// signaling transport here is a frame stream, not raw HTTP.
    pub async fn join(
        &self,
        room_id: &str,
        self_description: &str,
        auth_token: Option<&str>,
    ) -> Result<(), SignalingError> {
        self.rpc
            .call(
                "join",
                serde_json::json!({
                    "room_id": room_id,
                    "self_description": self_description,
                    "auth_token": auth_token,
                }),
                false,
                Duration::from_millis(timeouts::RPC_DEFAULT_MS),
            )
            .await?;
        Ok(())
    }

    async fn build_peer(self: &Arc<Self>, peer_id: PeerId) -> Result<Arc<WebRtcPeerSession>, SignalingError> {
        let (session, raw_events) = WebRtcPeerSession::new(peer_id, self.ice_config.clone())
            .await
            .map_err(|e| SignalingError::Connect(e.to_string()))?;

        self.peers.lock().insert(peer_id, Arc::clone(&session));

        let (forward_tx, forward_rx) = mpsc::unbounded_channel();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.pump_peer_events(peer_id, raw_events, forward_tx).await;
        });

        let _ = self.room_events.send(RoomEvent::PeerCreated {
            peer_id,
            session: Arc::clone(&session),
            events: forward_rx,
        });

        Ok(session)
    }

    /// Intercepts locally-generated ICE candidates for relay to the remote
    /// peer via the signaling channel; everything else passes through
    /// untouched to the orchestrator.
    async fn pump_peer_events(
        self: Arc<Self>,
        peer_id: PeerId,
        mut raw_events: mpsc::UnboundedReceiver<PeerEvent>,
        forward_tx: mpsc::UnboundedSender<PeerEvent>,
    ) {
        while let Some(event) = raw_events.recv().await {
            if let PeerEvent::IceCandidate(ref candidate) = event {
                self.relay_ice_candidate(peer_id, candidate).await;
            }
            if forward_tx.send(event).is_err() {
                break;
            }
        }
        self.peers.lock().remove(&peer_id);
    }

    async fn relay_ice_candidate(&self, peer_id: PeerId, candidate: &Candidate) {
        let _ = self
            .rpc
            .call(
                "relay_ice_candidate",
                serde_json::json!({"peer_id": peer_id, "candidate": candidate}),
                false,
                Duration::from_millis(timeouts::RPC_DEFAULT_MS),
            )
            .await;
    }

    async fn handle_peer_added(self: Arc<Self>, params: Value) {
        let Some(peer_id) = parse_peer_id(&params) else {
            tracing::warn!("peer_added missing valid peer_id");
            return;
        };
        let session = match self.build_peer(peer_id).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "failed to build peer runtime for peer_added");
                return;
            }
        };

        let (sdp, sdp_type) = match session.create_offer().await {
            Ok(o) => o,
            Err(e) => {
                tracing::warn!(error = %e, "failed to create offer");
                return;
            }
        };

        let self_description = params
            .get("self_description")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let response = self
            .rpc
            .call(
                "request_connection",
                serde_json::json!({
                    "peer_id": peer_id,
                    "self_description": self_description,
                    "offer": {"sdp": sdp, "type": sdp_type},
                }),
                true,
                Duration::from_secs(timeouts::ICE_GATHER_SECS),
            )
            .await;

        match response {
            Ok(Some(answer)) => {
                let answer_sdp = answer
                    .get("sdp")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let answer_type = answer
                    .get("type")
                    .and_then(|v| v.as_str())
                    .unwrap_or("answer")
                    .to_string();
                if let Err(e) = session.set_remote_description(answer_sdp, answer_type).await {
                    tracing::warn!(error = %e, "failed to set remote description from answer");
                }
            }
            Ok(None) => tracing::warn!("request_connection returned no answer"),
            Err(e) => tracing::warn!(error = %e, "request_connection failed"),
        }
    }

    async fn handle_connection_request(self: Arc<Self>, params: Value) -> Result<Value, String> {
        let peer_id = parse_peer_id(&params).ok_or_else(|| "missing peer_id".to_string())?;
        let offer_sdp = params
            .pointer("/offer/sdp")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "missing offer.sdp".to_string())?
            .to_string();
        let offer_type = params
            .pointer("/offer/type")
            .and_then(|v| v.as_str())
            .unwrap_or("offer")
            .to_string();

        let session = self
            .build_peer(peer_id)
            .await
            .map_err(|e| e.to_string())?;

        session
            .set_remote_description(offer_sdp, offer_type)
            .await
            .map_err(|e| e.to_string())?;

        let (answer_sdp, answer_type) = session
            .create_answer()
            .await
            .map_err(|e| e.to_string())?;

        Ok(serde_json::json!({"sdp": answer_sdp, "type": answer_type}))
    }

    async fn handle_add_ice_candidate(self: Arc<Self>, params: Value) {
        let Some(peer_id) = parse_peer_id(&params) else {
            tracing::warn!("add_ice_candidate missing valid peer_id");
            return;
        };
        let candidate: Option<Candidate> = params
            .get("candidate")
            .and_then(|v| serde_json::from_value(v.clone()).ok());

        let deadline = Duration::from_secs(timeouts::ICE_TRICKLE_WAIT_SECS);
        let poll = Duration::from_millis(timeouts::ICE_TRICKLE_POLL_MS);
        let start = tokio::time::Instant::now();
        loop {
            if let Some(session) = self.peers.lock().get(&peer_id).cloned() {
                if let Err(e) = session.add_ice_candidate(candidate).await {
                    tracing::warn!(error = %e, "failed to add ice candidate");
                }
                return;
            }
            if start.elapsed() >= deadline {
                tracing::warn!(%peer_id, "dropping ice candidate: peer never appeared");
                return;
            }
            tokio::time::sleep(poll).await;
        }
    }

    pub fn remove_peer(&self, peer_id: PeerId) {
        self.peers.lock().remove(&peer_id);
    }

    /// Tears down every peer session in the room and closes the underlying
    /// signaling socket. Idempotent: closing an already-closed peer or
    /// signaling connection is a no-op on both.
    pub async fn close(&self) {
        let sessions: Vec<_> = self.peers.lock().drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.close().await;
        }
        self.signaling.close();
    }
}

fn parse_peer_id(params: &Value) -> Option<PeerId> {
    params
        .get("peer_id")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_peer_id_from_params() {
        let peer_id = Uuid::new_v4();
        let params = serde_json::json!({"peer_id": peer_id.to_string()});
        assert_eq!(parse_peer_id(&params), Some(peer_id));
    }

    #[test]
    fn missing_peer_id_is_none() {
        let params = serde_json::json!({});
        assert_eq!(parse_peer_id(&params), None);
    }
}
