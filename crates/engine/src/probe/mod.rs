//! Probes: one fetch, one coarse label.
//!
//! A [`Probe`] is what the wait engine drives. Two flavors exist: the
//! operation-status probe reads a status endpoint, and the readiness probe
//! reads the resource itself. Both fetch through a [`ControlPlaneReader`] so
//! they can be exercised without a network.

use serde_json::Value;
use settle_api::ControlPlaneClient;
use settle_types::PollOutcome;
use settle_util::http::fetch_json;

use crate::classify::{ClassifiedError, classify_fetch_error};

pub mod operation;
pub mod readiness;

pub use operation::OperationStatusProbe;
pub use readiness::{DeletionProbe, ReadinessProbe};

/// A single-fetch status check the wait engine can call repeatedly.
#[async_trait::async_trait]
pub trait Probe: Send + Sync {
    /// Perform one fetch and map it to a lifecycle label.
    async fn probe(&self) -> Result<PollOutcome, ClassifiedError>;

    /// Short description used in log events.
    fn describe(&self) -> String;
}

/// Read access to the control plane, returning decoded JSON or a classified failure.
#[async_trait::async_trait]
pub trait ControlPlaneReader: Send + Sync {
    async fn read(&self, reference: &str) -> Result<Value, ClassifiedError>;
}

#[async_trait::async_trait]
impl ControlPlaneReader for ControlPlaneClient {
    async fn read(&self, reference: &str) -> Result<Value, ClassifiedError> {
        fetch_json(self, reference).await.map_err(classify_fetch_error)
    }
}

/// Read a string at `pointer`, treating blank text as absent.
pub(crate) fn string_at<'a>(payload: &'a Value, pointer: &str) -> Option<&'a str> {
    payload
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
}
