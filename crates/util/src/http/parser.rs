//! # HTTP Utilities
//!
//! Helpers for turning raw control-plane responses into JSON values and
//! user-facing messages.

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Actionable hint for statuses an operator can fix locally (credentials, permissions, rate limits).
///
/// # Example
/// ```rust
/// use settle_util::http::status_error_message;
///
/// let error_401 = status_error_message(401).unwrap();
/// assert!(error_401.contains("SETTLE_API_TOKEN"));
/// assert!(error_401.contains("Unauthorized"));
///
/// let error_403 = status_error_message(403).unwrap();
/// assert!(error_403.contains("Forbidden"));
///
/// assert!(status_error_message(404).is_none());
/// ```
pub fn status_error_message(status_code: u16) -> Option<String> {
    match status_code {
        401 => Some("Unauthorized (401). Hint: set SETTLE_API_TOKEN=... or add a ~/.netrc entry".into()),
        403 => Some("Forbidden (403). Hint: check the token's permissions for this resource".into()),
        429 => Some("Too Many Requests (429). Hint: increase the poll interval".into()),
        _ => None,
    }
}

/// Decode a response body as JSON.
///
/// # Errors
/// A [`JsonParseError`] naming the HTTP status and carrying a whitespace-collapsed
/// preview of at most 200 characters, so a gateway HTML page is recognizable in logs.
pub fn parse_response_json_strict(text: &str, status: Option<StatusCode>) -> Result<Value, JsonParseError> {
    serde_json::from_str::<Value>(text).map_err(|error| {
        let status_note = status
            .map(|code| format!("status {code}"))
            .unwrap_or_else(|| "status unknown".to_string());
        let preview = truncate_response_preview(text, 200);

        JsonParseError::new(status_note, error, preview)
    })
}

/// Extract a human-readable message from a control-plane error body.
///
/// Recognizes `{"message": ".."}`, `{"error": ".."}`, `{"error": {"message": ".."}}`
/// and `{"messages": [{"message": ".."}, ..]}` (joined with `"; "`).
pub fn extract_error_message(payload: &Value) -> Option<String> {
    let direct = payload
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| payload.get("error").and_then(Value::as_str))
        .or_else(|| payload.pointer("/error/message").and_then(Value::as_str));
    if let Some(message) = direct.map(str::trim).filter(|message| !message.is_empty()) {
        return Some(message.to_string());
    }

    let joined = payload
        .get("messages")?
        .as_array()?
        .iter()
        .filter_map(|entry| entry.get("message").and_then(Value::as_str))
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .collect::<Vec<_>>()
        .join("; ");
    (!joined.is_empty()).then_some(joined)
}

pub(crate) fn truncate_response_preview(text: &str, limit: usize) -> String {
    if text.trim().is_empty() {
        return "<empty>".to_string();
    }

    let mut preview = String::new();
    for ch in text.chars() {
        if preview.len() >= limit {
            preview.push_str("...");
            break;
        }
        match ch {
            '\n' | '\r' | '\t' => {
                if !preview.ends_with(' ') {
                    preview.push(' ');
                }
            }
            _ => preview.push(ch),
        }
    }

    preview.trim().to_string()
}

/// A response body that was not JSON.
#[derive(Debug, Error)]
#[error("response body is not JSON ({status_note}): {source}; body: {body_preview}")]
pub struct JsonParseError {
    status_note: String,
    #[source]
    source: serde_json::Error,
    body_preview: String,
}

impl JsonParseError {
    pub fn new(status_note: String, source: serde_json::Error, body_preview: String) -> Self {
        Self {
            status_note,
            source,
            body_preview,
        }
    }

    /// Collapsed, truncated copy of the offending body.
    pub fn body_preview(&self) -> &str {
        &self.body_preview
    }
}
