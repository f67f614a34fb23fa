//! Integration test for the room supervisor's trickle-ICE ordering
//! tolerance (spec.md §4.11, C11): `handle_add_ice_candidate` polls for a
//! peer that hasn't been created yet rather than dropping the candidate
//! outright, since a candidate can legitimately arrive over the signaling
//! channel before the `peer_added` notification that creates its peer.
//!
//! Drives `RoomSupervisor` against a local mock signaling server speaking
//! the same line-delimited JSON-RPC frames as the real one (voice_agent_rpc).

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use voice_agent_signaling::{RoomEvent, RoomSupervisor};
use voice_agent_transport::WebRtcConfig;

#[tokio::test]
async fn ice_candidate_before_peer_is_retried_not_dropped() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let peer_id = Uuid::new_v4();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        // Candidate arrives first, naming a peer that doesn't exist yet.
        let candidate_notification = serde_json::json!({
            "method": "add_ice_candidate",
            "params": {"peer_id": peer_id.to_string(), "candidate": null},
        });
        ws.send(Message::Text(candidate_notification.to_string())).await.unwrap();

        // Well inside the poll-and-wait window (ICE_TRICKLE_WAIT_SECS = 5).
        tokio::time::sleep(Duration::from_millis(200)).await;

        let peer_added = serde_json::json!({
            "method": "peer_added",
            "params": {"peer_id": peer_id.to_string(), "self_description": "caller"},
        });
        ws.send(Message::Text(peer_added.to_string())).await.unwrap();

        // Hold the socket open long enough for the client to react to both frames.
        tokio::time::sleep(Duration::from_secs(3)).await;
    });

    let (supervisor, mut room_events) =
        RoomSupervisor::new(format!("ws://{addr}"), WebRtcConfig::default());
    supervisor.connect().await.expect("signaling connect");

    let created_peer_id = loop {
        let event = tokio::time::timeout(Duration::from_secs(4), room_events.recv())
            .await
            .expect("a room event before the deadline")
            .expect("room events channel stays open");
        if let RoomEvent::PeerCreated { peer_id, .. } = event {
            break peer_id;
        }
    };

    assert_eq!(created_peer_id, peer_id, "peer_added must still build the peer the early candidate named");

    server.abort();
}
