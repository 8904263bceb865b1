//! Error classification.
//!
//! Every failure a probe can observe is reduced to one [`ClassifiedError`]
//! variant so callers branch on the kind of failure rather than on message
//! text. The functions here are pure; they never log or retry.

use std::time::Duration;

use serde_json::Value;
use settle_util::{
    format_duration,
    http::{FetchError, status_error_message},
};
use thiserror::Error;

/// Message used when the control plane reports a failure without any text.
pub const FALLBACK_FAILURE_MESSAGE: &str = "request failed";

/// Connection or HTTP-layer failure. Never retried by the wait engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    /// HTTP status when a response was received.
    pub status: Option<u16>,
    pub message: String,
}

impl TransportError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

/// A response decoded but lacked (or carried an unusable) status field.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{detail}")]
pub struct MissingMetadata {
    /// JSON pointer of the field that was expected, when known.
    pub field: Option<String>,
    pub detail: String,
}

impl MissingMetadata {
    pub fn new(field: Option<&str>, detail: impl Into<String>) -> Self {
        Self {
            field: field.map(str::to_string),
            detail: detail.into(),
        }
    }
}

/// Fieldless discriminant of [`ClassifiedError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transport,
    MissingMetadata,
    BackendFailure,
    Timeout,
    Cancelled,
    ToleranceExceeded,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::MissingMetadata => "missing_metadata",
            Self::BackendFailure => "backend_failure",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::ToleranceExceeded => "tolerance_exceeded",
        }
    }
}

/// Closed set of failures the wait subsystem reasons about.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClassifiedError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("missing status metadata: {0}")]
    MissingMetadata(#[from] MissingMetadata),

    /// The control plane explicitly reported a terminal failure.
    #[error("backend reported failure: {message}")]
    BackendFailure { message: String },

    /// The deadline passed. The change may still be in progress and complete later.
    #[error(
        "timed out after {} and {attempts} probes; the change may still be in progress",
        display_duration(.after)
    )]
    Timeout { after: Duration, attempts: u32 },

    #[error("wait cancelled after {attempts} probes")]
    Cancelled { attempts: u32 },

    /// Status metadata stayed unavailable for more consecutive reads than tolerated.
    #[error("status metadata still unavailable after {attempts} consecutive reads: {last}")]
    ToleranceExceeded { attempts: u32, last: MissingMetadata },
}

fn display_duration(duration: &Duration) -> String {
    format_duration(*duration)
}

impl ClassifiedError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) => ErrorKind::Transport,
            Self::MissingMetadata(_) => ErrorKind::MissingMetadata,
            Self::BackendFailure { .. } => ErrorKind::BackendFailure,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::ToleranceExceeded { .. } => ErrorKind::ToleranceExceeded,
        }
    }

    /// `true` for a transport failure whose HTTP status was 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Transport(transport) if transport.is_not_found())
    }

    /// Only missing metadata is absorbed inside a single wait.
    pub fn is_retryable_within_wait(&self) -> bool {
        matches!(self, Self::MissingMetadata(_))
    }
}

/// Classify a failed JSON read.
///
/// Network failures and non-success statuses are transport errors (status
/// preserved). A body that could not be decoded is malformed metadata.
pub fn classify_fetch_error(error: FetchError) -> ClassifiedError {
    match error {
        FetchError::Reference(message) => TransportError::new(None, format!("invalid reference: {message}")).into(),
        FetchError::Network(message) => TransportError::new(None, message).into(),
        FetchError::Status {
            status,
            message,
            body_preview,
        } => {
            let code = status.as_u16();
            let detail = message.unwrap_or(body_preview);
            let rendered = match status_error_message(code) {
                Some(hint) => format!("HTTP {code}: {detail}. {hint}"),
                None => format!("HTTP {code}: {detail}"),
            };
            TransportError::new(Some(code), rendered).into()
        }
        FetchError::Parse(parse_error) => MissingMetadata::new(None, parse_error.to_string()).into(),
    }
}

/// Build a [`ClassifiedError::BackendFailure`], substituting the generic
/// fallback when the backend supplied no usable text.
pub fn classify_backend_failure(message: Option<&str>) -> ClassifiedError {
    let message = message
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .unwrap_or(FALLBACK_FAILURE_MESSAGE);
    ClassifiedError::BackendFailure {
        message: message.to_string(),
    }
}

/// Missing-field error for a JSON pointer that did not resolve to a string.
pub fn missing_field(pointer: &str, payload: &Value) -> ClassifiedError {
    let detail = match payload.pointer(pointer) {
        None => format!("response has no '{pointer}' field"),
        Some(Value::Null) => format!("'{pointer}' is null"),
        Some(other) => format!("'{pointer}' is not a string (found {})", json_type_name(other)),
    };
    MissingMetadata::new(Some(pointer), detail).into()
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
