use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod operation;

pub use operation::{EmptyReferenceError, OperationHandle, OperationKind, OperationStatus, ParseOperationStatusError};

/// Coarse lifecycle label produced by a single probe call.
///
/// `Pending` is the only non-terminal label; every other label ends a wait.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollLabel {
    /// The change has been accepted but has not taken effect yet.
    Pending,
    /// The change has taken effect (operation done, resource available).
    Done,
    /// The control plane reported a terminal failure.
    Failed,
    /// The resource can no longer be read (not found).
    Deleted,
}

impl PollLabel {
    /// Returns `true` for every label except [`PollLabel::Pending`].
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for PollLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one probe call.
///
/// Outcomes are produced fresh on every probe and never mutated; the wait
/// engine only ever replaces the last one it observed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PollOutcome {
    /// Lifecycle label mapped from the fetched status or state.
    pub label: PollLabel,
    /// Backend-provided message, when the response carried one.
    #[serde(default)]
    pub message: Option<String>,
    /// The decoded payload the label was derived from (`Null` when nothing was read).
    #[serde(default)]
    pub raw: Value,
}

impl PollOutcome {
    pub fn new(label: PollLabel) -> Self {
        Self {
            label,
            message: None,
            raw: Value::Null,
        }
    }

    pub fn pending() -> Self {
        Self::new(PollLabel::Pending)
    }

    pub fn done() -> Self {
        Self::new(PollLabel::Done)
    }

    pub fn deleted() -> Self {
        Self::new(PollLabel::Deleted)
    }

    /// Attach a message, ignoring blank text.
    pub fn with_message(mut self, message: Option<impl Into<String>>) -> Self {
        self.message = message.map(Into::into).filter(|text: &String| !text.trim().is_empty());
        self
    }

    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = raw;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.label.is_terminal()
    }
}
