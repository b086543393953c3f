//! Wire Protocol Types
//!
//! The envelope format shared by the tool-serving process and the browser
//! extension. Keep it minimal - three envelope kinds, one closed action set.
//!
//! A response must echo the `id` of the request that caused it; that
//! correlation token is the only thing matching replies to callers, so
//! arrival order carries no meaning.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Error code attached to responses produced from a failed dispatch handler.
pub const HANDLER_ERROR_CODE: &str = "HANDLER_ERROR";

/// Tool actions the extension understands. Closed set - anything else fails
/// to decode and is dropped before it reaches a dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    TakeScreenshot,
    GetConsoleLogs,
    GetActiveTab,
    GetNetworkRequests,
    GetExceptions,
    #[serde(rename = "evaluateJS")]
    EvaluateJs,
    #[serde(rename = "getDOMSnapshot")]
    GetDomSnapshot,
    GetPerformanceMetrics,
    GetStorageData,
    RefreshPage,
}

impl Action {
    /// Wire name, for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::TakeScreenshot => "takeScreenshot",
            Action::GetConsoleLogs => "getConsoleLogs",
            Action::GetActiveTab => "getActiveTab",
            Action::GetNetworkRequests => "getNetworkRequests",
            Action::GetExceptions => "getExceptions",
            Action::EvaluateJs => "evaluateJS",
            Action::GetDomSnapshot => "getDOMSnapshot",
            Action::GetPerformanceMetrics => "getPerformanceMetrics",
            Action::GetStorageData => "getStorageData",
            Action::RefreshPage => "refreshPage",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified envelope (request, response, or status announcement).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    Request(RequestEnvelope),
    Response(ResponseEnvelope),
    Status(StatusEnvelope),
}

/// Request sent from the bridge to the extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub id: String,
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RequestEnvelope {
    /// New request with a fresh correlation ID.
    pub fn new(action: Action, params: Option<Value>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            action,
            params,
        }
    }
}

/// Response from the extension; carries exactly one of `data` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl ResponseEnvelope {
    pub fn ok(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(
        id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            success: false,
            data: None,
            error: Some(ErrorInfo {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// Structured error descriptor surfaced to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

/// Liveness announcement from the extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEnvelope {
    pub connected: bool,
    #[serde(rename = "activeTab", default, skip_serializing_if = "Option::is_none")]
    pub active_tab: Option<TabInfo>,
}

/// Browser tab identity as the extension reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabInfo {
    pub id: i64,
    pub url: String,
    pub title: String,
}

/// Decode one text frame. Malformed JSON, unknown `type`, and unknown
/// `action` values all log a warning and yield `None` - a bad frame must
/// never take down the transport loop.
pub fn decode(text: &str) -> Option<Envelope> {
    match serde_json::from_str(text) {
        Ok(envelope) => Some(envelope),
        Err(err) => {
            tracing::warn!("Dropping malformed envelope: {}", err);
            None
        }
    }
}

/// Encode an envelope to a text frame.
pub fn encode(envelope: &Envelope) -> serde_json::Result<String> {
    serde_json::to_string(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_wire_names_are_exact() {
        for (action, wire) in [
            (Action::TakeScreenshot, "takeScreenshot"),
            (Action::GetConsoleLogs, "getConsoleLogs"),
            (Action::GetActiveTab, "getActiveTab"),
            (Action::GetNetworkRequests, "getNetworkRequests"),
            (Action::GetExceptions, "getExceptions"),
            (Action::EvaluateJs, "evaluateJS"),
            (Action::GetDomSnapshot, "getDOMSnapshot"),
            (Action::GetPerformanceMetrics, "getPerformanceMetrics"),
            (Action::GetStorageData, "getStorageData"),
            (Action::RefreshPage, "refreshPage"),
        ] {
            let encoded = serde_json::to_string(&action).unwrap();
            assert_eq!(encoded, format!("\"{}\"", wire));
            assert_eq!(action.as_str(), wire);
        }
    }

    #[test]
    fn request_roundtrip() {
        let request = RequestEnvelope::new(Action::EvaluateJs, Some(json!({"expression": "1+1"})));
        let text = encode(&Envelope::Request(request.clone())).unwrap();
        assert!(text.contains("\"type\":\"request\""));
        assert!(text.contains("\"evaluateJS\""));

        match decode(&text) {
            Some(Envelope::Request(decoded)) => assert_eq!(decoded, request),
            other => panic!("expected request envelope, got {:?}", other),
        }
    }

    #[test]
    fn fresh_requests_get_unique_ids() {
        let a = RequestEnvelope::new(Action::GetActiveTab, None);
        let b = RequestEnvelope::new(Action::GetActiveTab, None);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn response_carries_exactly_one_of_data_or_error() {
        let ok = ResponseEnvelope::ok("r-1", json!({"value": 2}));
        assert!(ok.success && ok.data.is_some() && ok.error.is_none());

        let err = ResponseEnvelope::err("r-2", "NO_ACTIVE_TAB", "no tab is focused");
        assert!(!err.success && err.data.is_none());
        let info = err.error.unwrap();
        assert_eq!(info.code, "NO_ACTIVE_TAB");
        assert_eq!(info.message, "no tab is focused");
    }

    #[test]
    fn status_omits_absent_tab() {
        let status = StatusEnvelope {
            connected: true,
            active_tab: None,
        };
        let text = encode(&Envelope::Status(status)).unwrap();
        assert_eq!(text, r#"{"type":"status","connected":true}"#);
    }

    #[test]
    fn status_with_tab_uses_camel_case_key() {
        let status = StatusEnvelope {
            connected: true,
            active_tab: Some(TabInfo {
                id: 7,
                url: "https://example.test".into(),
                title: "Example".into(),
            }),
        };
        let text = encode(&Envelope::Status(status)).unwrap();
        assert!(text.contains("\"activeTab\""));
    }

    #[test]
    fn malformed_frames_decode_to_none() {
        assert!(decode("not json").is_none());
        assert!(decode(r#"{"type":"mystery","id":"x"}"#).is_none());
        assert!(decode(r#"{"type":"request","id":"x","action":"selfDestruct"}"#).is_none());
    }
}
