//! Dispatch error taxonomy.
//!
//! Every failure the engine can produce is a `DispatchError`. Each variant can be
//! flattened into a `FailureDetails`, which is what gets recorded on an outcome and
//! returned to callers for display.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::dispatch::models::DispatchOutcome;

/// Which branch of the taxonomy a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Protocol,
    Transport,
    LogicalServer,
    Rendering,
    Batch,
}

/// Structured, display-ready description of a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureDetails {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_details: Option<Value>,
}

/// HTTP-level context attached to transport, logical and rendering failures.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HttpFailure {
    pub message: String,
    pub status: Option<u16>,
    pub status_text: Option<String>,
    pub details: Option<Value>,
}

impl HttpFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

/// The run-terminating failure of a batch: the first failing outcome plus
/// everything recorded before it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchFailure {
    pub message: String,
    pub first_failure: DispatchOutcome,
    pub outcomes: Vec<DispatchOutcome>,
    pub total: usize,
    pub processed: usize,
}

#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("{}", .0.message)]
    Transport(HttpFailure),

    #[error("{}", .0.message)]
    LogicalServer(HttpFailure),

    #[error("{}", .0.message)]
    Rendering(HttpFailure),

    #[error("{}", .0.message)]
    Batch(Box<BatchFailure>),
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::Validation(_) => ErrorKind::Validation,
            DispatchError::Protocol(_) => ErrorKind::Protocol,
            DispatchError::Transport(_) => ErrorKind::Transport,
            DispatchError::LogicalServer(_) => ErrorKind::LogicalServer,
            DispatchError::Rendering(_) => ErrorKind::Rendering,
            DispatchError::Batch(_) => ErrorKind::Batch,
        }
    }

    /// Flattens the error into the shape recorded on outcomes.
    ///
    /// For a batch failure the HTTP context of the first failing outcome is carried up.
    pub fn details(&self) -> FailureDetails {
        let kind = self.kind();
        match self {
            DispatchError::Validation(msg) | DispatchError::Protocol(msg) => FailureDetails {
                kind,
                message: msg.clone(),
                http_status: None,
                http_status_text: None,
                server_details: None,
            },
            DispatchError::Transport(f)
            | DispatchError::LogicalServer(f)
            | DispatchError::Rendering(f) => FailureDetails {
                kind,
                message: f.message.clone(),
                http_status: f.status,
                http_status_text: f.status_text.clone(),
                server_details: f.details.clone(),
            },
            DispatchError::Batch(b) => {
                let first = b.first_failure.error.as_ref();
                FailureDetails {
                    kind,
                    message: b.message.clone(),
                    http_status: first.and_then(|e| e.http_status),
                    http_status_text: first.and_then(|e| e.http_status_text.clone()),
                    server_details: first.and_then(|e| e.server_details.clone()),
                }
            }
        }
    }

    /// True when the error was raised before any network call was attempted.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            DispatchError::Validation(_) | DispatchError::Protocol(_)
        )
    }
}

/// Best-effort parse of a diagnostic body: JSON when it parses, raw text otherwise,
/// nothing for an empty body.
pub fn parse_diagnostic_body(body: &[u8]) -> Option<Value> {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_details_carry_http_context() {
        let err = DispatchError::Transport(HttpFailure {
            message: "Gateway returned HTTP 503 Service Unavailable".to_string(),
            status: Some(503),
            status_text: Some("Service Unavailable".to_string()),
            details: Some(json!({"detail": "printer offline"})),
        });
        let d = err.details();
        assert_eq!(d.kind, ErrorKind::Transport);
        assert_eq!(d.http_status, Some(503));
        assert_eq!(d.server_details, Some(json!({"detail": "printer offline"})));
        assert_eq!(err.to_string(), "Gateway returned HTTP 503 Service Unavailable");
    }

    #[test]
    fn test_validation_is_preflight() {
        assert!(DispatchError::Validation("x".into()).is_preflight());
        assert!(DispatchError::Protocol("x".into()).is_preflight());
        assert!(!DispatchError::Rendering(HttpFailure::new("x")).is_preflight());
    }

    #[test]
    fn test_parse_diagnostic_body_json() {
        assert_eq!(
            parse_diagnostic_body(br#"{"status":"error"}"#),
            Some(json!({"status": "error"}))
        );
    }

    #[test]
    fn test_parse_diagnostic_body_text_and_empty() {
        assert_eq!(
            parse_diagnostic_body(b"ERROR: bad ^FO"),
            Some(Value::String("ERROR: bad ^FO".to_string()))
        );
        assert_eq!(parse_diagnostic_body(b"  \n"), None);
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(ErrorKind::LogicalServer).unwrap(),
            json!("logical_server")
        );
    }
}
