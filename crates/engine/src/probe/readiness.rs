//! Resource readiness and deletion checks.
//!
//! Both checks share one fetch of the resource representation. Readiness
//! compares the state field against the ready state; deletion only asks
//! whether the read came back not-found.

use settle_types::{PollLabel, PollOutcome};
use tracing::debug;

use super::{ControlPlaneReader, Probe, string_at};
use crate::{
    classify::{ClassifiedError, MissingMetadata, classify_backend_failure, missing_field},
    settings::{StateFields, WaitSettings},
};

/// Reads a resource and reports whether it reached its ready state.
///
/// Implements [`Probe`] for readiness waits; [`ReadinessProbe::until_deleted`]
/// gives the deletion flavor over the same resource.
pub struct ReadinessProbe<'a, R: ?Sized> {
    reader: &'a R,
    path: String,
    fields: StateFields,
    ready_state: String,
    failure_states: Vec<String>,
}

impl<'a, R: ControlPlaneReader + ?Sized> ReadinessProbe<'a, R> {
    /// Build a probe for `path` using the state pointers and vocabularies in `settings`.
    pub fn new(reader: &'a R, path: impl Into<String>, settings: &WaitSettings) -> Self {
        Self {
            reader,
            path: path.into(),
            fields: settings.state_fields.clone(),
            ready_state: settings.ready_state.clone(),
            failure_states: settings.failure_states.clone(),
        }
    }

    /// Replace the ready state, e.g. `ACTIVE` for resources that never report `AVAILABLE`.
    pub fn with_ready_state(mut self, ready_state: impl Into<String>) -> Self {
        self.ready_state = ready_state.into();
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Fetch the resource once and map its state to a label.
    ///
    /// A not-found read right after creation is an eventual-consistency gap, so
    /// it is reported as missing metadata rather than a transport failure.
    pub async fn observe(&self) -> Result<PollOutcome, ClassifiedError> {
        let payload = match self.reader.read(&self.path).await {
            Ok(payload) => payload,
            Err(error) if error.is_not_found() => {
                return Err(MissingMetadata::new(None, format!("{} is not readable yet (not found)", self.path)).into());
            }
            Err(error) => return Err(error),
        };

        let Some(state) = string_at(&payload, &self.fields.state) else {
            return Err(missing_field(&self.fields.state, &payload));
        };
        let message = string_at(&payload, &self.fields.message).map(str::to_string);

        if self.is_failure_state(state) {
            return Err(classify_backend_failure(message.as_deref().or(Some(state))));
        }
        let label = if state.eq_ignore_ascii_case(self.ready_state.trim()) {
            PollLabel::Done
        } else {
            PollLabel::Pending
        };
        debug!(path = %self.path, state, label = %label, "observed resource state");
        Ok(PollOutcome::new(label).with_message(message).with_raw(payload))
    }

    /// One readiness check: `Ok(true)` once the resource reports its ready state.
    pub async fn check_ready(&self) -> Result<bool, ClassifiedError> {
        Ok(self.observe().await?.label == PollLabel::Done)
    }

    /// One deletion check: `Ok(true)` when the read is not-found.
    ///
    /// Any other failure is returned as-is and never read as deletion.
    pub async fn check_deleted(&self) -> Result<bool, ClassifiedError> {
        match self.reader.read(&self.path).await {
            Ok(_) => Ok(false),
            Err(error) if error.is_not_found() => Ok(true),
            Err(error) => Err(error),
        }
    }

    /// Deletion flavor of this probe for the wait engine.
    pub fn until_deleted(&self) -> DeletionProbe<'_, 'a, R> {
        DeletionProbe { inner: self }
    }

    fn is_failure_state(&self, state: &str) -> bool {
        self.failure_states
            .iter()
            .any(|sentinel| sentinel.trim().eq_ignore_ascii_case(state))
    }
}

#[async_trait::async_trait]
impl<'a, R: ControlPlaneReader + ?Sized> Probe for ReadinessProbe<'a, R> {
    async fn probe(&self) -> Result<PollOutcome, ClassifiedError> {
        self.observe().await
    }

    fn describe(&self) -> String {
        format!("readiness of {}", self.path)
    }
}

/// Reports [`PollLabel::Deleted`] once the resource read is not-found and
/// [`PollLabel::Pending`] while it is still readable.
pub struct DeletionProbe<'p, 'a, R: ?Sized> {
    inner: &'p ReadinessProbe<'a, R>,
}

#[async_trait::async_trait]
impl<'p, 'a, R: ControlPlaneReader + ?Sized> Probe for DeletionProbe<'p, 'a, R> {
    async fn probe(&self) -> Result<PollOutcome, ClassifiedError> {
        let probe = self.inner;
        let payload = match probe.reader.read(&probe.path).await {
            Ok(payload) => payload,
            Err(error) if error.is_not_found() => return Ok(PollOutcome::deleted()),
            Err(error) => return Err(error),
        };

        let state = string_at(&payload, &probe.fields.state).map(str::to_string);
        let message = string_at(&payload, &probe.fields.message).map(str::to_string);
        if let Some(state) = state.as_deref()
            && probe.is_failure_state(state)
        {
            return Err(classify_backend_failure(message.as_deref().or(Some(state))));
        }
        Ok(PollOutcome::pending().with_message(message.or(state)).with_raw(payload))
    }

    fn describe(&self) -> String {
        format!("deletion of {}", self.inner.path)
    }
}
