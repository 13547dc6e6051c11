//! Mapping from raw request failures to [`ApiError`].

use serde_json::Value;

use super::ApiError;
use crate::http::transport::TransportError;

/// Raw outcome of a request that did not succeed.
#[derive(Debug, Clone)]
pub enum Failure {
    /// Connectivity was reported down before dispatch.
    Offline,
    /// No response arrived before the deadline.
    TimedOut { timeout_ms: u64 },
    /// No response arrived for any other reason.
    NoResponse { detail: String },
    /// A response arrived with a non-2xx status.
    Response { status: u16, body: String },
}

impl From<TransportError> for Failure {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Timeout { timeout_ms } => Self::TimedOut { timeout_ms },
            other => Self::NoResponse {
                detail: other.to_string(),
            },
        }
    }
}

/// Classify a failure. Pure: no retries, no side effects.
///
/// Priority: offline, then timeout, then any other missing response, then a
/// server-supplied message, then the bare status.
pub fn classify(failure: &Failure) -> ApiError {
    match failure {
        Failure::Offline => ApiError::Offline,
        Failure::TimedOut { timeout_ms } => ApiError::Timeout {
            timeout_ms: *timeout_ms,
        },
        Failure::NoResponse { detail } => ApiError::Unreachable {
            detail: detail.clone(),
        },
        Failure::Response { status, body } => match server_message(body) {
            Some(message) => ApiError::ServerMessage {
                status: Some(*status),
                message,
            },
            None => ApiError::HttpStatus { status: *status },
        },
    }
}

fn server_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    let Ok(value) = serde_json::from_str::<Value>(trimmed) else {
        // Plain-text bodies are shown as-is.
        return Some(trimmed.to_string());
    };
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text),
        Value::Object(map) => ["error", "message"]
            .iter()
            .filter_map(|key| map.get(*key))
            .find_map(message_text),
        _ => None,
    }
}

fn message_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        // `{"error": {"message": "..."}}`
        Value::Object(inner) => inner
            .get("message")
            .and_then(Value::as_str)
            .filter(|text| !text.trim().is_empty())
            .map(str::to_string),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn response(status: u16, body: &str) -> Failure {
        Failure::Response {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn offline_wins_over_everything() {
        assert_eq!(classify(&Failure::Offline), ApiError::Offline);
    }

    #[test]
    fn timeout_without_response() {
        let err = classify(&Failure::TimedOut { timeout_ms: 30_000 });
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn other_missing_response_is_unreachable() {
        let err = classify(&Failure::NoResponse {
            detail: "connection refused".into(),
        });
        assert_eq!(err.kind(), ErrorKind::Unreachable);
    }

    #[test]
    fn error_field_is_used_verbatim() {
        let err = classify(&response(400, r#"{"error":"Household name taken"}"#));
        assert_eq!(
            err,
            ApiError::ServerMessage {
                status: Some(400),
                message: "Household name taken".into()
            }
        );
    }

    #[test]
    fn message_field_is_used_when_error_missing() {
        let err = classify(&response(422, r#"{"success":false,"message":"Invalid OTP"}"#));
        assert_eq!(err.to_string(), "Invalid OTP");
    }

    #[test]
    fn error_field_takes_priority_over_message() {
        let err = classify(&response(409, r#"{"error":"first","message":"second"}"#));
        assert_eq!(err.to_string(), "first");
    }

    #[test]
    fn nested_error_message_is_extracted() {
        let err = classify(&response(400, r#"{"error":{"message":"nested"}}"#));
        assert_eq!(err.to_string(), "nested");
    }

    #[test]
    fn string_body_is_used_verbatim() {
        assert_eq!(
            classify(&response(500, r#""Database unavailable""#)).to_string(),
            "Database unavailable"
        );
        assert_eq!(
            classify(&response(502, "Bad gateway")).to_string(),
            "Bad gateway"
        );
    }

    #[test]
    fn unusable_body_falls_back_to_status() {
        for body in ["", "   ", "{}", r#"{"error":""}"#, r#"{"error":42}"#, "[1,2]"] {
            assert_eq!(
                classify(&response(404, body)),
                ApiError::HttpStatus { status: 404 },
                "body {body:?}"
            );
        }
    }

    #[test]
    fn transport_timeout_maps_to_timed_out() {
        let failure = Failure::from(TransportError::Timeout { timeout_ms: 10 });
        assert!(matches!(failure, Failure::TimedOut { timeout_ms: 10 }));
        let failure = Failure::from(TransportError::Connect("dns".into()));
        assert!(matches!(failure, Failure::NoResponse { .. }));
    }
}
