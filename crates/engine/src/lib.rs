//! # Settle Engine
//!
//! Waits for asynchronous control-plane changes to take effect. After a
//! mutating call is accepted, the engine polls either the operation-status
//! endpoint or the resource itself until the change settles, fails, or runs
//! out of time.
//!
//! ## Key Features
//!
//! - **Error Classifier**: every failure becomes one [`ClassifiedError`] variant
//! - **Reference Resolver**: extracts a pollable [`OperationHandle`] from a mutating call's response
//! - **Probes**: one fetch per call, mapped to a coarse [`PollLabel`]
//! - **Wait Engine**: interval polling with a deadline, cancellation and a missing-metadata tolerance
//!
//! ## Usage
//!
//! ```rust,no_run
//! use settle_api::ControlPlaneClient;
//! use settle_engine::{WaitSettings, await_ready};
//! use settle_types::OperationKind;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let client = ControlPlaneClient::new_from_env()?;
//! let settings = WaitSettings::default();
//! let outcome = await_ready(&client, "/datacenters/dc-1", OperationKind::Create, &settings, &CancellationToken::new()).await?;
//! println!("settled as {}", outcome.label);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **`classify`**: error taxonomy and pure classification functions
//! - **`reference`**: operation reference resolution
//! - **`probe`**: the [`Probe`] trait, operation-status and readiness/deletion probes
//! - **`wait`**: the polling driver
//! - **`settings`**: wait configuration, file loading and env overrides
//! - **`lifecycle`**: create/update/delete call-site helpers

pub mod classify;
pub mod lifecycle;
pub mod probe;
pub mod reference;
pub mod settings;
pub mod wait;

pub use classify::{ClassifiedError, ErrorKind, MissingMetadata, TransportError, classify_backend_failure, classify_fetch_error};
pub use lifecycle::{await_deleted, await_operation, await_ready};
pub use probe::{ControlPlaneReader, DeletionProbe, OperationStatusProbe, Probe, ReadinessProbe};
pub use reference::{MutationResponse, resolve};
pub use settings::{ReferenceLookup, ResourceTimeouts, SettingsError, StateFields, StatusFields, WaitSettings};
pub use settle_types::{OperationHandle, OperationKind, PollLabel, PollOutcome};
pub use wait::{WaitEngine, WaitOutcome, WaitPolicy, WaitResult, wait};
