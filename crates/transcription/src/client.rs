//! Transcription service client (spec.md §4.7, C7). Thin typed wrapper over
//! an [`RpcPeer`]: `audio_data`/`cancel_transcription` are fire-and-forget,
//! `transcribe` is a request awaited with a fixed timeout.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use voice_agent_core::constants::timeouts;
use voice_agent_rpc::RpcPeer;

use crate::error::TranscriptionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    Failed,
}

type StatusHandler = Arc<dyn Fn(ConnectionStatus) + Send + Sync>;

pub struct TranscriptionClient {
    rpc: Arc<RpcPeer>,
    write_task: Mutex<Option<JoinHandle<()>>>,
    recv_task: Mutex<Option<JoinHandle<()>>>,
    status_handler: Mutex<Option<StatusHandler>>,
}

impl TranscriptionClient {
    /// Dials `url` and returns a client whose `rpc` is already wired to the
    /// socket; the caller registers handlers before traffic starts flowing.
    pub async fn connect(url: &str) -> Result<Arc<Self>, TranscriptionError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TranscriptionError::Connect(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let (rpc, mut outbound) = RpcPeer::new();

        let write_task = tokio::spawn(async move {
            while let Some(text) = outbound.recv().await {
                if write.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        });

        let client = Arc::new(Self {
            rpc,
            write_task: Mutex::new(Some(write_task)),
            recv_task: Mutex::new(None),
            status_handler: Mutex::new(None),
        });

        let rpc_for_recv = Arc::clone(&client.rpc);
        let client_for_recv = Arc::clone(&client);
        let recv_task = tokio::spawn(async move {
            loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => rpc_for_recv.handle_message(&text),
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!("transcription connection closed");
                        client_for_recv.emit_status(ConnectionStatus::Disconnected);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "transcription connection error");
                        client_for_recv.emit_status(ConnectionStatus::Failed);
                        break;
                    }
                }
            }
        });
        *client.recv_task.lock() = Some(recv_task);
        client.emit_status(ConnectionStatus::Connected);

        Ok(client)
    }

    /// Registers the single handler invoked on connection status changes.
    pub fn on_connection_status(&self, handler: StatusHandler) {
        *self.status_handler.lock() = Some(handler);
    }

    fn emit_status(&self, status: ConnectionStatus) {
        if let Some(handler) = self.status_handler.lock().clone() {
            handler(status);
        }
    }

    /// Idempotent. Aborts the read/write pump tasks.
    pub fn close(&self) {
        if let Some(task) = self.recv_task.lock().take() {
            task.abort();
        }
        if let Some(task) = self.write_task.lock().take() {
            task.abort();
        }
    }

    /// `audio_data(id, samples[])` -- fire-and-forget chunk forwarding.
    pub fn audio_data(&self, utterance_id: Uuid, samples: &[i16]) {
        let rpc = Arc::clone(&self.rpc);
        let params = serde_json::json!({"id": utterance_id, "data": samples});
        tokio::spawn(async move {
            let _ = rpc
                .call("audio_data", params, false, Duration::from_millis(timeouts::RPC_DEFAULT_MS))
                .await;
        });
    }

    /// `cancel_transcription(id)` -- fire-and-forget.
    pub fn cancel_transcription(&self, utterance_id: Uuid) {
        let rpc = Arc::clone(&self.rpc);
        let params = serde_json::json!({"id": utterance_id});
        tokio::spawn(async move {
            let _ = rpc
                .call("cancel_transcription", params, false, Duration::from_millis(timeouts::RPC_DEFAULT_MS))
                .await;
        });
    }

    /// `transcribe(id, sample_rate) -> {text}`, awaited up to the 10s
    /// transcription timeout (spec.md §4.7).
    pub async fn transcribe(&self, utterance_id: Uuid, sample_rate: u32) -> Result<String, TranscriptionError> {
        let result = self
            .rpc
            .call(
                "transcribe",
                serde_json::json!({"id": utterance_id, "sample_rate": sample_rate}),
                true,
                Duration::from_millis(timeouts::TRANSCRIBE_MS),
            )
            .await?;
        let text = result
            .and_then(|v| v.get("text").and_then(|t| t.as_str()).map(str::to_string))
            .unwrap_or_default();
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transcribe_times_out_without_server() {
        let (rpc, _rx) = RpcPeer::new();
        let client = TranscriptionClient {
            rpc,
            write_task: Mutex::new(None),
            recv_task: Mutex::new(None),
            status_handler: Mutex::new(None),
        };
        let err = tokio::time::timeout(
            Duration::from_millis(50),
            client.transcribe(Uuid::new_v4(), 48_000),
        )
        .await;
        // Either our own 10s internal timeout hasn't fired yet (outer timeout
        // wins) or it already errored -- both demonstrate no response hangs forever.
        assert!(err.is_err() || err.unwrap().is_err());
    }
}
