//! Call-site helpers for create, update and delete handlers.
//!
//! Each helper wires a probe to the wait engine with the right label sets and
//! the timeout budget for the operation kind, and collapses the result into a
//! `Result` so handlers can branch on [`ClassifiedError::kind`].

use settle_types::{OperationKind, PollLabel, PollOutcome};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    classify::ClassifiedError,
    probe::{ControlPlaneReader, OperationStatusProbe, ReadinessProbe},
    reference::{MutationResponse, resolve},
    settings::WaitSettings,
    wait::{WaitPolicy, wait},
};

const PENDING: &[PollLabel] = &[PollLabel::Pending];
const DONE: &[PollLabel] = &[PollLabel::Done];
const DELETED: &[PollLabel] = &[PollLabel::Deleted];

/// Wait for the operation a mutating call started.
///
/// The reference is resolved before any polling; a response without one fails
/// with [`ClassifiedError::MissingMetadata`] and no probe is made.
pub async fn await_operation<R: ControlPlaneReader + ?Sized>(
    reader: &R,
    response: Option<&MutationResponse>,
    kind: OperationKind,
    settings: &WaitSettings,
    cancel: &CancellationToken,
) -> Result<PollOutcome, ClassifiedError> {
    let handle = resolve(response, kind, settings)?;
    let probe = OperationStatusProbe::for_handle(reader, &handle, settings.status_fields.clone());
    let policy = WaitPolicy::from_handle(&handle, settings.missing_metadata_tolerance);
    info!(reference = handle.reference(), kind = %kind, "waiting for operation");
    wait(&probe, PENDING, DONE, policy, cancel).await.into_result()
}

/// Wait until the resource at `path` reports its ready state.
pub async fn await_ready<R: ControlPlaneReader + ?Sized>(
    reader: &R,
    path: &str,
    kind: OperationKind,
    settings: &WaitSettings,
    cancel: &CancellationToken,
) -> Result<PollOutcome, ClassifiedError> {
    let probe = ReadinessProbe::new(reader, path, settings);
    info!(path, kind = %kind, ready_state = %settings.ready_state, "waiting for resource readiness");
    wait(&probe, PENDING, DONE, settings.policy_for(kind), cancel).await.into_result()
}

/// Wait until a read of `path` returns not-found. Uses the delete timeout.
pub async fn await_deleted<R: ControlPlaneReader + ?Sized>(
    reader: &R,
    path: &str,
    settings: &WaitSettings,
    cancel: &CancellationToken,
) -> Result<PollOutcome, ClassifiedError> {
    let probe = ReadinessProbe::new(reader, path, settings);
    info!(path, "waiting for resource deletion");
    wait(
        &probe.until_deleted(),
        PENDING,
        DELETED,
        settings.policy_for(OperationKind::Delete),
        cancel,
    )
    .await
    .into_result()
}
