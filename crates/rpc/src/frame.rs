use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type RpcId = u64;

/// The three frame shapes a peer can send or receive. Untagged: the shape
/// is inferred from which fields are present, matching the wire format a
/// hand-rolled JSON-RPC-ish peer (rather than a strict JSON-RPC 2.0
/// implementation) actually produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Frame {
    Request {
        id: RpcId,
        method: String,
        #[serde(default)]
        params: Value,
    },
    Response {
        id: RpcId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Notification {
        method: String,
        #[serde(default)]
        params: Value,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_roundtrips() {
        let frame = Frame::Request {
            id: 1,
            method: "audio_data".into(),
            params: serde_json::json!({"id": "u-1", "data": [1, 2, 3]}),
        };
        let text = serde_json::to_string(&frame).unwrap();
        let back: Frame = serde_json::from_str(&text).unwrap();
        match back {
            Frame::Request { id, method, .. } => {
                assert_eq!(id, 1);
                assert_eq!(method, "audio_data");
            }
            _ => panic!("expected request"),
        }
    }

    #[test]
    fn notification_has_no_id() {
        let frame = Frame::Notification {
            method: "cancel_transcription".into(),
            params: serde_json::json!({"id": "u-1"}),
        };
        let text = serde_json::to_string(&frame).unwrap();
        assert!(!text.contains("\"id\":") || text.contains("params"));
        let back: Frame = serde_json::from_str(&text).unwrap();
        assert!(matches!(back, Frame::Notification { .. }));
    }

    #[test]
    fn response_with_error() {
        let frame = Frame::Response {
            id: 7,
            result: None,
            error: Some("boom".into()),
        };
        let text = serde_json::to_string(&frame).unwrap();
        let back: Frame = serde_json::from_str(&text).unwrap();
        match back {
            Frame::Response { id, result, error } => {
                assert_eq!(id, 7);
                assert!(result.is_none());
                assert_eq!(error.as_deref(), Some("boom"));
            }
            _ => panic!("expected response"),
        }
    }
}
