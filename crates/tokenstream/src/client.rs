//! Token-stream (language-model) service client (spec.md §4.8, C8).
//! Single-peer RPC: `connect_to_context` is awaited once at connect time,
//! after which `on_token`/`on_tool_call`/`on_tool_response` notifications
//! arrive asynchronously and `add_message` is the sole outbound call.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use voice_agent_core::constants::timeouts;
use voice_agent_rpc::RpcPeer;

use crate::error::TokenStreamError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    Failed,
}

#[derive(Debug, Clone)]
pub struct AgentProfile {
    pub voice_id: Option<String>,
}

pub struct ConnectOutcome {
    pub success: bool,
    pub agent: AgentProfile,
}

type TokenHandler = Arc<dyn Fn(String, Value) + Send + Sync>;
type ToolCallHandler = Arc<dyn Fn(Value, Value, Value) + Send + Sync>;
type ToolResponseHandler = Arc<dyn Fn(Value, Value, Value) + Send + Sync>;
type StatusHandler = Arc<dyn Fn(ConnectionStatus) + Send + Sync>;

pub struct TokenStreamClient {
    rpc: Arc<RpcPeer>,
    token_handler: Arc<Mutex<Option<TokenHandler>>>,
    tool_call_handler: Arc<Mutex<Option<ToolCallHandler>>>,
    tool_response_handler: Arc<Mutex<Option<ToolResponseHandler>>>,
    status_handler: Mutex<Option<StatusHandler>>,
    write_task: Mutex<Option<JoinHandle<()>>>,
    recv_task: Mutex<Option<JoinHandle<()>>>,
}

impl TokenStreamClient {
    pub async fn connect(url: &str) -> Result<Arc<Self>, TokenStreamError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TokenStreamError::Connect(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let (rpc, mut outbound) = RpcPeer::new();
        let write_task = tokio::spawn(async move {
            while let Some(text) = outbound.recv().await {
                if write.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        });

        let this = Arc::new(Self {
            rpc: Arc::clone(&rpc),
            token_handler: Arc::new(Mutex::new(None)),
            tool_call_handler: Arc::new(Mutex::new(None)),
            tool_response_handler: Arc::new(Mutex::new(None)),
            status_handler: Mutex::new(None),
            write_task: Mutex::new(Some(write_task)),
            recv_task: Mutex::new(None),
        });

        this.register_handlers();

        let rpc_for_recv = Arc::clone(&rpc);
        let this_for_recv = Arc::clone(&this);
        let recv_task = tokio::spawn(async move {
            loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => rpc_for_recv.handle_message(&text),
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!("token stream connection closed");
                        this_for_recv.emit_status(ConnectionStatus::Disconnected);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "token stream connection error");
                        this_for_recv.emit_status(ConnectionStatus::Failed);
                        break;
                    }
                }
            }
        });
        *this.recv_task.lock() = Some(recv_task);
        this.emit_status(ConnectionStatus::Connected);

        Ok(this)
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

    fn register_handlers(self: &Arc<Self>) {
        let handler = Arc::clone(&self.token_handler);
        self.rpc.on(
            "on_token",
            Arc::new(move |params| {
                let handler = Arc::clone(&handler);
                Box::pin(async move {
                    let token = params
                        .get("token")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    let response_id = params.get("response_id").cloned().unwrap_or(Value::Null);
                    if let Some(h) = handler.lock().clone() {
                        h(token, response_id);
                    }
                })
            }),
        );

        let handler = Arc::clone(&self.tool_call_handler);
        self.rpc.on(
            "on_tool_call",
            Arc::new(move |params| {
                let handler = Arc::clone(&handler);
                Box::pin(async move {
                    if let Some(h) = handler.lock().clone() {
                        h(
                            params.get("tool_id").cloned().unwrap_or(Value::Null),
                            params.get("tool_name").cloned().unwrap_or(Value::Null),
                            params.get("tool_input").cloned().unwrap_or(Value::Null),
                        );
                    }
                })
            }),
        );

        let handler = Arc::clone(&self.tool_response_handler);
        self.rpc.on(
            "on_tool_response",
            Arc::new(move |params| {
                let handler = Arc::clone(&handler);
                Box::pin(async move {
                    if let Some(h) = handler.lock().clone() {
                        h(
                            params.get("tool_id").cloned().unwrap_or(Value::Null),
                            params.get("tool_name").cloned().unwrap_or(Value::Null),
                            params.get("tool_output").cloned().unwrap_or(Value::Null),
                        );
                    }
                })
            }),
        );
    }

    pub fn on_token(&self, handler: TokenHandler) {
        *self.token_handler.lock() = Some(handler);
    }

    pub fn on_tool_call(&self, handler: ToolCallHandler) {
        *self.tool_call_handler.lock() = Some(handler);
    }

    pub fn on_tool_response(&self, handler: ToolResponseHandler) {
        *self.tool_response_handler.lock() = Some(handler);
    }

    /// `connect_to_context(context_id, access_token) -> {success, agent}`,
    /// awaited once, at session start (spec.md §4.8).
    pub async fn connect_to_context(
        &self,
        context_id: &str,
        access_token: &str,
    ) -> Result<ConnectOutcome, TokenStreamError> {
        let result = self
            .rpc
            .call(
                "connect_to_context",
                serde_json::json!({"context_id": context_id, "access_token": access_token}),
                true,
                Duration::from_millis(timeouts::RPC_DEFAULT_MS),
            )
            .await?
            .unwrap_or(Value::Null);

        let success = result.get("success").and_then(|v| v.as_bool()).unwrap_or(false);
        let voice_id = result
            .pointer("/agent/voice_id")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        Ok(ConnectOutcome {
            success,
            agent: AgentProfile { voice_id },
        })
    }

    /// `add_message(text)` -- fire-and-forget, issued once per finalized
    /// utterance (spec.md §4.12).
    pub fn add_message(&self, text: &str) {
        let rpc = Arc::clone(&self.rpc);
        let params = serde_json::json!({"message": text});
        tokio::spawn(async move {
            let _ = rpc
                .call("add_message", params, false, Duration::from_millis(timeouts::RPC_DEFAULT_MS))
                .await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn on_token_handler_receives_notification() {
        let (rpc, _outbound) = RpcPeer::new();
        let client = Arc::new(TokenStreamClient {
            rpc,
            token_handler: Arc::new(Mutex::new(None)),
            tool_call_handler: Arc::new(Mutex::new(None)),
            tool_response_handler: Arc::new(Mutex::new(None)),
            status_handler: Mutex::new(None),
            write_task: Mutex::new(None),
            recv_task: Mutex::new(None),
        });
        client.register_handlers();

        let received = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&received);
        client.on_token(Arc::new(move |token, _| {
            assert_eq!(token, "hi");
            flag.store(true, Ordering::SeqCst);
        }));

        client
            .rpc
            .handle_message(r#"{"method":"on_token","params":{"token":"hi","response_id":"r1"}}"#);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(received.load(Ordering::SeqCst));
    }
}
