//! Operation handles and the fixed operation-status vocabulary.

use std::{error::Error, fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::PollLabel;

/// Pollable reference to a mutating call the control plane has accepted.
///
/// Created the instant the call is accepted and read-only afterwards. The
/// reference is never empty; [`OperationHandle::new`] refuses blank input so
/// no wait can start against an undefined target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationHandle {
    reference: String,
    poll_interval: Duration,
    timeout: Duration,
}

impl OperationHandle {
    pub fn new(reference: impl Into<String>, poll_interval: Duration, timeout: Duration) -> Result<Self, EmptyReferenceError> {
        let reference = reference.into().trim().to_string();
        if reference.is_empty() {
            return Err(EmptyReferenceError);
        }
        Ok(Self {
            reference,
            poll_interval,
            timeout,
        })
    }

    /// Status URL or resource identifier to poll.
    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmptyReferenceError;

impl fmt::Display for EmptyReferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("operation reference is empty")
    }
}

impl Error for EmptyReferenceError {}

/// Status reported by the operation-status endpoint.
///
/// Parsing is case-sensitive against the fixed vocabulary; anything else is
/// rejected rather than assumed to be still in progress.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum OperationStatus {
    Queued,
    Running,
    Done,
    Failed,
}

impl OperationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }

    /// Lifecycle label this status maps to.
    pub fn label(self) -> PollLabel {
        match self {
            Self::Queued | Self::Running => PollLabel::Pending,
            Self::Done => PollLabel::Done,
            Self::Failed => PollLabel::Failed,
        }
    }
}

impl FromStr for OperationStatus {
    type Err = ParseOperationStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QUEUED" => Ok(Self::Queued),
            "RUNNING" => Ok(Self::Running),
            "DONE" => Ok(Self::Done),
            "FAILED" => Ok(Self::Failed),
            other => Err(ParseOperationStatusError(other.to_string())),
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOperationStatusError(pub String);

impl fmt::Display for ParseOperationStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unrecognized operation status '{}'; expected one of QUEUED, RUNNING, DONE, FAILED",
            self.0
        )
    }
}

impl Error for ParseOperationStatusError {}

/// Lifecycle operation a wait belongs to. Each kind carries its own timeout budget.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Read,
    Update,
    Delete,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
