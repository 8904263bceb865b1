use serde::Serialize;
use settle_engine::{PollLabel, WaitOutcome, WaitResult};

/// JSON summary of a finished wait, printed on stdout.
#[derive(Debug, Serialize, PartialEq)]
pub struct WaitReport {
    pub status: &'static str,
    pub label: Option<PollLabel>,
    pub message: Option<String>,
    pub attempts: u32,
    pub elapsed_ms: u64,
    pub error_kind: Option<&'static str>,
    pub error: Option<String>,
}

impl From<&WaitResult> for WaitReport {
    fn from(result: &WaitResult) -> Self {
        let (status, last) = match &result.outcome {
            WaitOutcome::Settled(outcome) => ("settled", Some(outcome)),
            WaitOutcome::TimedOut { last } => ("timed_out", last.as_ref()),
            WaitOutcome::Cancelled => ("cancelled", None),
            WaitOutcome::Aborted => ("failed", None),
        };
        Self {
            status,
            label: last.map(|outcome| outcome.label),
            message: last.and_then(|outcome| outcome.message.clone()),
            attempts: result.attempts,
            elapsed_ms: u64::try_from(result.elapsed.as_millis()).unwrap_or(u64::MAX),
            error_kind: result.error.as_ref().map(|error| error.kind().as_str()),
            error: result.error.as_ref().map(ToString::to_string),
        }
    }
}
