//! JSON read helper shared by the status and readiness probes.
//!
//! A read either yields the decoded JSON body or a [`FetchError`] that keeps
//! enough of the HTTP exchange (status code, backend message, body preview) for
//! the caller to classify it.

use std::time::Instant;

use reqwest::{Method, StatusCode};
use serde_json::Value;
use settle_api::ControlPlaneClient;
use thiserror::Error;
use tracing::{debug, warn};

use super::parser::{JsonParseError, extract_error_message, parse_response_json_strict, truncate_response_preview};
use crate::redact_sensitive;

/// Failure of a single JSON read.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The reference could not be turned into a request URL.
    #[error("invalid reference: {0}")]
    Reference(String),
    /// Connection, TLS, or timeout failure before a response arrived.
    #[error("network error: {0}")]
    Network(String),
    /// The server answered with a non-success status.
    #[error("HTTP {status}: {}", status_detail(.message, .body_preview))]
    Status {
        status: StatusCode,
        message: Option<String>,
        body_preview: String,
    },
    /// The body was not valid JSON.
    #[error(transparent)]
    Parse(#[from] JsonParseError),
}

impl FetchError {
    /// HTTP status of the response, if one was received.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }
}

fn status_detail<'a>(message: &'a Option<String>, body_preview: &'a str) -> &'a str {
    message.as_deref().unwrap_or(body_preview)
}

/// Perform a GET against a status or resource reference and decode the JSON body.
///
/// # Returns
/// The parsed payload for a successful response, `Value::Null` for an empty body,
/// or a [`FetchError`] describing what went wrong.
pub async fn fetch_json(client: &ControlPlaneClient, reference: &str) -> Result<Value, FetchError> {
    let start = Instant::now();
    let request = client
        .request(Method::GET, reference)
        .map_err(|error| FetchError::Reference(error.to_string()))?;

    let response = request.send().await.map_err(|error| {
        let message = redact_sensitive(&error.to_string());
        warn!(
            reference = %redact_sensitive(reference),
            duration_ms = start.elapsed().as_millis(),
            error = %message,
            "http read failed before a response arrived"
        );
        FetchError::Network(message)
    })?;

    let status = response.status();
    let body_text = response
        .text()
        .await
        .map_err(|error| FetchError::Network(redact_sensitive(&error.to_string())))?;

    if !status.is_success() {
        let message = serde_json::from_str::<Value>(&body_text)
            .ok()
            .as_ref()
            .and_then(extract_error_message);
        debug!(
            reference = %redact_sensitive(reference),
            status = %status,
            duration_ms = start.elapsed().as_millis(),
            "http read returned a non-success status"
        );
        return Err(FetchError::Status {
            status,
            message,
            body_preview: truncate_response_preview(&body_text, 200),
        });
    }

    if body_text.trim().is_empty() {
        debug!(
            reference = %redact_sensitive(reference),
            status = %status,
            duration_ms = start.elapsed().as_millis(),
            "http read completed with empty response"
        );
        return Ok(Value::Null);
    }

    let parsed = parse_response_json_strict(&body_text, Some(status)).inspect_err(|error| {
        warn!(
            reference = %redact_sensitive(reference),
            status = %status,
            body_len = body_text.len(),
            error = %error,
            "http response JSON parse failed"
        );
    })?;
    debug!(
        reference = %redact_sensitive(reference),
        status = %status,
        duration_ms = start.elapsed().as_millis(),
        "http read completed"
    );
    Ok(parsed)
}
