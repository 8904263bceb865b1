use settle_types::{OperationHandle, OperationStatus, PollOutcome};

use super::{ControlPlaneReader, Probe, string_at};
use crate::{
    classify::{ClassifiedError, MissingMetadata, classify_backend_failure, missing_field},
    settings::StatusFields,
};

/// Probe for an operation-status endpoint (`QUEUED`/`RUNNING`/`DONE`/`FAILED`).
///
/// `FAILED` is returned as a [`ClassifiedError::BackendFailure`] carrying the
/// backend message, or the generic fallback when the response has none.
/// Missing or unrecognized statuses are [`ClassifiedError::MissingMetadata`].
pub struct OperationStatusProbe<'a, R: ?Sized> {
    reader: &'a R,
    reference: String,
    fields: StatusFields,
}

impl<'a, R: ControlPlaneReader + ?Sized> OperationStatusProbe<'a, R> {
    pub fn new(reader: &'a R, reference: impl Into<String>, fields: StatusFields) -> Self {
        Self {
            reader,
            reference: reference.into(),
            fields,
        }
    }

    pub fn for_handle(reader: &'a R, handle: &OperationHandle, fields: StatusFields) -> Self {
        Self::new(reader, handle.reference(), fields)
    }

    /// Fetch the status once and map it.
    pub async fn check(&self) -> Result<PollOutcome, ClassifiedError> {
        let payload = self.reader.read(&self.reference).await?;
        let Some(raw_status) = string_at(&payload, &self.fields.status) else {
            return Err(missing_field(&self.fields.status, &payload));
        };
        let status: OperationStatus = raw_status
            .parse()
            .map_err(|error: settle_types::ParseOperationStatusError| MissingMetadata::new(Some(&self.fields.status), error.to_string()))?;

        let message = string_at(&payload, &self.fields.message).map(str::to_string);
        if status == OperationStatus::Failed {
            return Err(classify_backend_failure(message.as_deref()));
        }
        Ok(PollOutcome::new(status.label()).with_message(message).with_raw(payload))
    }
}

#[async_trait::async_trait]
impl<'a, R: ControlPlaneReader + ?Sized> Probe for OperationStatusProbe<'a, R> {
    async fn probe(&self) -> Result<PollOutcome, ClassifiedError> {
        self.check().await
    }

    fn describe(&self) -> String {
        format!("operation {}", self.reference)
    }
}
