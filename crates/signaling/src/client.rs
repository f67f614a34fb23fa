use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::error::SignalingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    Failed,
}

type MessageHandler = Arc<dyn Fn(String) + Send + Sync>;
type StatusHandler = Arc<dyn Fn(ConnectionStatus) + Send + Sync>;

/// Wraps a duplex text channel to the signaling server (spec.md §4.2). The
/// receive task loops over inbound frames, delivering each to the single
/// registered message handler; connection status changes go to the single
/// registered status handler.
pub struct SignalingClient {
    url: String,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    recv_task: Mutex<Option<JoinHandle<()>>>,
    message_handler: Mutex<Option<MessageHandler>>,
    status_handler: Mutex<Option<StatusHandler>>,
}

impl SignalingClient {
    pub fn new(url: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            url: url.into(),
            outbound: Mutex::new(None),
            recv_task: Mutex::new(None),
            message_handler: Mutex::new(None),
            status_handler: Mutex::new(None),
        })
    }

    /// Registers the single handler invoked for every inbound frame.
    pub fn on_message(&self, handler: MessageHandler) {
        *self.message_handler.lock() = Some(handler);
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

    pub async fn connect(self: &Arc<Self>) -> Result<(), SignalingError> {
        self.emit_status(ConnectionStatus::Connecting);
        let (ws_stream, _) = tokio_tungstenite::connect_async(&self.url)
            .await
            .map_err(|e| SignalingError::Connect(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        *self.outbound.lock() = Some(tx);

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if write.send(msg).await.is_err() {
                    break;
                }
            }
        });

        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(handler) = this.message_handler.lock().clone() {
                            handler(text);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!("signaling connection closed");
                        this.emit_status(ConnectionStatus::Disconnected);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "signaling connection error");
                        this.emit_status(ConnectionStatus::Failed);
                        break;
                    }
                }
            }
        });
        *self.recv_task.lock() = Some(task);
        self.emit_status(ConnectionStatus::Connected);
        Ok(())
    }

    pub fn send(&self, text: String) -> Result<(), SignalingError> {
        let guard = self.outbound.lock();
        match guard.as_ref() {
            Some(tx) => tx
                .send(Message::Text(text))
                .map_err(|_| SignalingError::Closed),
            None => Err(SignalingError::Closed),
        }
    }

    /// Idempotent. Aborts the receive loop and drops the outbound sender.
    pub fn close(&self) {
        if let Some(task) = self.recv_task.lock().take() {
            task.abort();
        }
        *self.outbound.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_before_connect_is_closed_error() {
        let client = SignalingClient::new("ws://localhost:0");
        let err = client.send("hi".into()).unwrap_err();
        assert!(matches!(err, SignalingError::Closed));
    }

    #[test]
    fn close_is_idempotent() {
        let client = SignalingClient::new("ws://localhost:0");
        client.close();
        client.close();
    }
}
