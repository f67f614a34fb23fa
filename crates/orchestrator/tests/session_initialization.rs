//! Integration test for the happy-path session bring-up (spec.md §4.12,
//! §8 "happy path, single speaker"): `ConversationOrchestrator::initialize`
//! connects to the token-stream service first (its `connect_to_context`
//! answer carries the voice id), then transcription, then joins the
//! signaling room -- against local mock servers speaking each client's
//! real wire protocol, matching the original's end-to-end bring-up
//! sequencing without needing a live upstream deployment.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use voice_agent_orchestrator::{ConversationOrchestrator, OrchestratorConfig};
use voice_agent_speech::TtsConfig;
use voice_agent_transport::WebRtcConfig;

/// Accepts one websocket connection and hands the caller the stream to
/// drive; used for the transcription and signaling mocks, which the
/// orchestrator only needs to connect to for this scenario.
async fn accept_one(listener: TcpListener) -> String {
    let (stream, _) = listener.accept().await.unwrap();
    let _ws = tokio_tungstenite::accept_async(stream).await.unwrap();
    std::future::pending::<()>().await;
    unreachable!()
}

async fn local_url(listener: &TcpListener) -> String {
    format!("ws://{}", listener.local_addr().unwrap())
}

#[tokio::test]
async fn initialize_connects_token_stream_transcription_and_signaling() {
    let token_stream_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let transcription_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let signaling_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

    let token_stream_url = local_url(&token_stream_listener).await;
    let transcription_url = local_url(&transcription_listener).await;
    let signaling_url = local_url(&signaling_listener).await;

    let token_stream_server = tokio::spawn(async move {
        let (stream, _) = token_stream_listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let request = ws.next().await.expect("connect_to_context frame").unwrap();
        let request: serde_json::Value = serde_json::from_str(request.to_text().unwrap()).unwrap();
        assert_eq!(request["method"], "connect_to_context");
        let id = request["id"].clone();

        let response = serde_json::json!({
            "id": id,
            "result": {"success": true, "agent": {"voice_id": "voice-1"}},
        });
        ws.send(Message::Text(response.to_string())).await.unwrap();

        std::future::pending::<()>().await;
        unreachable!()
    });

    let transcription_server = tokio::spawn(accept_one(transcription_listener));
    let signaling_server = tokio::spawn(accept_one(signaling_listener));

    let config = OrchestratorConfig {
        context_id: "ctx-happy-path".to_string(),
        auth_token: Some("token".to_string()),
        allows_interruptions: true,
        signaling_url,
        transcription_url,
        token_stream_url,
        ice_config: WebRtcConfig::default(),
        trivial_rejections: vec![".".to_string()],
        tts: TtsConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            api_key: "unused".to_string(),
            sample_rate: 48_000,
        },
    };

    let orchestrator = tokio::time::timeout(Duration::from_secs(5), ConversationOrchestrator::initialize(config))
        .await
        .expect("initialize completes within five seconds")
        .expect("initialize succeeds against well-behaved mock upstreams");

    let closed = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let closed_flag = closed.clone();
    orchestrator.on_closed(move || closed_flag.store(true, std::sync::atomic::Ordering::SeqCst));

    // Session is alive with no peers yet; teardown only fires once a peer
    // that actually joined later leaves (spec.md §3), not from admission
    // alone, so the callback must still be unfired here.
    assert!(!closed.load(std::sync::atomic::Ordering::SeqCst));

    token_stream_server.abort();
    transcription_server.abort();
    signaling_server.abort();
}
