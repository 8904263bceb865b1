//! Operation reference resolution.
//!
//! A mutating call accepted by the control plane answers with a pointer to
//! something pollable: a `Location` header or an href in the body. This module
//! turns that response into an [`OperationHandle`] and refuses to proceed when
//! no reference is present.

use reqwest::{Response, header::HeaderName};
use serde_json::Value;
use settle_types::{OperationHandle, OperationKind};
use tracing::debug;

use crate::{
    classify::{ClassifiedError, MissingMetadata},
    settings::{ReferenceLookup, WaitSettings},
};

/// The parts of a mutating call's response the resolver looks at.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationResponse {
    pub status: u16,
    /// Value of the reference header, when present.
    pub location: Option<String>,
    pub body: Value,
}

impl MutationResponse {
    pub fn new(status: u16, location: Option<String>, body: Value) -> Self {
        Self { status, location, body }
    }

    /// Capture a `reqwest` response, consuming its body.
    ///
    /// A body that is empty or not JSON is kept as `Value::Null`; the header may
    /// still carry the reference.
    pub async fn from_response(response: Response, lookup: &ReferenceLookup) -> Result<Self, reqwest::Error> {
        let status = response.status().as_u16();
        let location = HeaderName::from_bytes(lookup.header.as_bytes())
            .ok()
            .and_then(|name| response.headers().get(name))
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let text = response.text().await?;
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        Ok(Self { status, location, body })
    }

    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Extract a pollable handle from a mutating call's response.
///
/// The handle's poll interval comes from `settings`; its timeout is the budget
/// for `kind`.
///
/// # Errors
/// [`ClassifiedError::MissingMetadata`] when there is no response, the call did
/// not succeed, or no reference could be found. This is checked before any
/// polling starts.
pub fn resolve(
    response: Option<&MutationResponse>,
    kind: OperationKind,
    settings: &WaitSettings,
) -> Result<OperationHandle, ClassifiedError> {
    let Some(response) = response else {
        return Err(MissingMetadata::new(None, "no response to resolve an operation reference from").into());
    };
    if !response.is_success() {
        return Err(MissingMetadata::new(
            None,
            format!("mutating call returned HTTP {}; no operation to track", response.status),
        )
        .into());
    }

    let lookup = &settings.reference_lookup;
    let reference = non_blank(response.location.as_deref())
        .or_else(|| {
            lookup
                .pointers
                .iter()
                .find_map(|pointer| non_blank(response.body.pointer(pointer).and_then(Value::as_str)))
        })
        .ok_or_else(|| {
            MissingMetadata::new(
                None,
                format!(
                    "response carries no operation reference (checked '{}' header and {})",
                    lookup.header,
                    lookup.pointers.join(", ")
                ),
            )
        })?;

    debug!(reference, kind = %kind, "resolved operation reference");
    OperationHandle::new(reference, settings.poll_interval, settings.timeouts.for_kind(kind))
        .map_err(|error| MissingMetadata::new(None, error.to_string()).into())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|text| !text.is_empty())
}
