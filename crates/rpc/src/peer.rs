use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::error::RpcError;
use crate::frame::{Frame, RpcId};

pub type Handler = Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// A handler for an inbound *request* frame, which must produce the
/// `result`/`error` payload sent back as the correlated response.
pub type RequestHandler =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value, String>> + Send>> + Send + Sync>;

/// A single-connection JSON-RPC-style peer. Outgoing frames are serialized
/// and pushed onto `outbound`; the owner of the peer is responsible for
/// forwarding that channel's items onto the actual transport (a WebSocket,
/// a data channel, ...). Incoming text is fed in via [`RpcPeer::handle_message`].
pub struct RpcPeer {
    outbound: mpsc::UnboundedSender<String>,
    next_id: AtomicU64,
    pending: Mutex<HashMap<RpcId, oneshot::Sender<Result<Value, String>>>>,
    handlers: Mutex<HashMap<String, Handler>>,
    request_handlers: Mutex<HashMap<String, RequestHandler>>,
}

impl RpcPeer {
    /// Creates a peer and returns it along with the receiver side of its
    /// outbound channel, which the caller wires up to the real transport.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let peer = Arc::new(Self {
            outbound: tx,
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            handlers: Mutex::new(HashMap::new()),
            request_handlers: Mutex::new(HashMap::new()),
        });
        (peer, rx)
    }

    /// Registers a handler for an incoming notification named `method`.
    /// Re-registering the same method replaces the prior handler.
    pub fn on(&self, method: impl Into<String>, handler: Handler) {
        self.handlers.lock().insert(method.into(), handler);
    }

    /// Registers a handler for an incoming *request* named `method`. Its
    /// return value becomes the `result`/`error` of the response frame sent
    /// back to the remote.
    pub fn on_request(&self, method: impl Into<String>, handler: RequestHandler) {
        self.request_handlers.lock().insert(method.into(), handler);
    }

    /// Sends `method(params)`. When `await_response` is `false` this is a
    /// fire-and-forget notification. When `true`, sends a request frame and
    /// awaits the correlated response up to `timeout`, returning the
    /// `result` payload or an error if the remote replied with `error` or
    /// didn't reply in time.
    pub async fn call(
        &self,
        method: &str,
        params: Value,
        await_response: bool,
        timeout: Duration,
    ) -> Result<Option<Value>, RpcError> {
        if !await_response {
            let frame = Frame::Notification {
                method: method.to_string(),
                params,
            };
            self.send(&frame)?;
            return Ok(None);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let frame = Frame::Request {
            id,
            method: method.to_string(),
            params,
        };
        if let Err(e) = self.send(&frame) {
            self.pending.lock().remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(result))) => Ok(Some(result)),
            Ok(Ok(Err(message))) => Err(RpcError::Remote {
                method: method.to_string(),
                message,
            }),
            Ok(Err(_)) => Err(RpcError::Closed),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(RpcError::Timeout {
                    method: method.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Feeds one line of incoming text through the framer: resolves
    /// pending calls on a matching response, dispatches requests and
    /// notifications to their registered handler, and drops/logs anything
    /// malformed or unrecognized.
    pub fn handle_message(self: &Arc<Self>, text: &str) {
        let frame: Frame = match serde_json::from_str(text) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed rpc frame");
                return;
            }
        };

        match frame {
            Frame::Response { id, result, error } => {
                if let Some(tx) = self.pending.lock().remove(&id) {
                    let outcome = match error {
                        Some(message) => Err(message),
                        None => Ok(result.unwrap_or(Value::Null)),
                    };
                    let _ = tx.send(outcome);
                } else {
                    tracing::debug!(id, "response for unknown or already-resolved call id");
                }
            }
            Frame::Request { id, method, params } => {
                let handler = self.request_handlers.lock().get(&method).cloned();
                match handler {
                    Some(handler) => {
                        let this = Arc::clone(self);
                        tokio::spawn(async move {
                            let outcome = handler(params).await;
                            let response = match outcome {
                                Ok(result) => Frame::Response {
                                    id,
                                    result: Some(result),
                                    error: None,
                                },
                                Err(message) => Frame::Response {
                                    id,
                                    result: None,
                                    error: Some(message),
                                },
                            };
                            let _ = this.send(&response);
                        });
                    }
                    None => {
                        tracing::warn!(method = %method, "no handler for inbound request");
                        let _ = self.send(&Frame::Response {
                            id,
                            result: None,
                            error: Some(format!("no handler for method '{method}'")),
                        });
                    }
                }
            }
            Frame::Notification { method, params } => {
                let handler = self.handlers.lock().get(&method).cloned();
                match handler {
                    Some(handler) => {
                        tokio::spawn(handler(params));
                    }
                    None => {
                        tracing::debug!(method = %method, "no handler for inbound notification");
                    }
                }
            }
        }
    }

    fn send(&self, frame: &Frame) -> Result<(), RpcError> {
        let text = serde_json::to_string(frame)?;
        self.outbound
            .send(text)
            .map_err(|_| RpcError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[tokio::test]
    async fn notification_call_does_not_wait() {
        let (peer, mut rx) = RpcPeer::new();
        peer.call("audio_data", serde_json::json!({"id": "u1"}), false, Duration::from_secs(1))
            .await
            .unwrap();
        let sent = rx.recv().await.unwrap();
        assert!(sent.contains("audio_data"));
    }

    #[tokio::test]
    async fn request_resolves_on_matching_response() {
        let (peer, mut rx) = RpcPeer::new();
        let peer2 = Arc::clone(&peer);
        let call_fut = tokio::spawn(async move {
            peer2
                .call("transcribe", serde_json::json!({"id": "u1"}), true, Duration::from_secs(2))
                .await
        });

        let sent = rx.recv().await.unwrap();
        let frame: Frame = serde_json::from_str(&sent).unwrap();
        let id = match frame {
            Frame::Request { id, .. } => id,
            _ => panic!("expected request"),
        };

        peer.handle_message(
            &serde_json::to_string(&Frame::Response {
                id,
                result: Some(serde_json::json!({"text": "hello"})),
                error: None,
            })
            .unwrap(),
        );

        let result = call_fut.await.unwrap().unwrap().unwrap();
        assert_eq!(result["text"], "hello");
    }

    #[tokio::test]
    async fn request_times_out_without_response() {
        let (peer, _rx) = RpcPeer::new();
        let err = peer
            .call("transcribe", serde_json::json!({}), true, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Timeout { .. }));
    }

    #[tokio::test]
    async fn registered_handler_receives_notification() {
        let (peer, _rx) = RpcPeer::new();
        let received = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&received);
        peer.on(
            "token",
            Arc::new(move |_params| {
                flag.store(true, Ordering::SeqCst);
                Box::pin(async {})
            }),
        );
        peer.handle_message(r#"{"method":"token","params":{"text":"hi"}}"#);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(received.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn request_handler_reply_is_sent_back() {
        let (peer, mut rx) = RpcPeer::new();
        peer.on_request(
            "connection_request",
            Arc::new(|_params| Box::pin(async { Ok(serde_json::json!({"sdp": "v=0"})) })),
        );
        peer.handle_message(r#"{"id":9,"method":"connection_request","params":{}}"#);
        let sent = rx.recv().await.unwrap();
        let frame: Frame = serde_json::from_str(&sent).unwrap();
        match frame {
            Frame::Response { id, result, .. } => {
                assert_eq!(id, 9);
                assert_eq!(result.unwrap()["sdp"], "v=0");
            }
            _ => panic!("expected response"),
        }
    }
}
