//! Wait configuration.
//!
//! [`WaitSettings`] carries every knob a wait needs: poll interval, the
//! missing-metadata tolerance, per-operation timeouts, and the JSON pointers
//! the probes read. Settings are plain values; each wait copies what it needs
//! so independent waits never share mutable configuration.

use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use settle_types::OperationKind;
use settle_util::duration::{parse_duration, serde_duration};
use thiserror::Error;
use tracing::debug;

use crate::wait::WaitPolicy;

pub const POLL_INTERVAL_ENV: &str = "SETTLE_POLL_INTERVAL";
pub const MISSING_METADATA_TOLERANCE_ENV: &str = "SETTLE_MISSING_METADATA_TOLERANCE";
pub const TIMEOUT_CREATE_ENV: &str = "SETTLE_TIMEOUT_CREATE";
pub const TIMEOUT_READ_ENV: &str = "SETTLE_TIMEOUT_READ";
pub const TIMEOUT_UPDATE_ENV: &str = "SETTLE_TIMEOUT_UPDATE";
pub const TIMEOUT_DELETE_ENV: &str = "SETTLE_TIMEOUT_DELETE";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Consecutive missing-metadata reads absorbed before a wait gives up.
///
/// Generous on purpose: right after creation a resource can stay unreadable for
/// a long stretch of a long timeout.
pub const DEFAULT_MISSING_METADATA_TOLERANCE: u32 = 100;

pub const DEFAULT_READY_STATE: &str = "AVAILABLE";

/// Errors raised while loading or validating settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML settings {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to parse JSON settings {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value '{value}' for {name}: {reason}")]
    Env { name: &'static str, value: String, reason: String },

    #[error("invalid wait settings: {0}")]
    Invalid(String),
}

/// Timeout budget per lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceTimeouts {
    #[serde(with = "serde_duration")]
    pub create: Duration,
    #[serde(with = "serde_duration")]
    pub read: Duration,
    #[serde(with = "serde_duration")]
    pub update: Duration,
    #[serde(with = "serde_duration")]
    pub delete: Duration,
}

impl Default for ResourceTimeouts {
    fn default() -> Self {
        Self {
            create: Duration::from_secs(60 * 60),
            read: Duration::from_secs(20 * 60),
            update: Duration::from_secs(60 * 60),
            delete: Duration::from_secs(60 * 60),
        }
    }
}

impl ResourceTimeouts {
    pub fn for_kind(&self, kind: OperationKind) -> Duration {
        match kind {
            OperationKind::Create => self.create,
            OperationKind::Read => self.read,
            OperationKind::Update => self.update,
            OperationKind::Delete => self.delete,
        }
    }

    fn set(&mut self, kind: OperationKind, timeout: Duration) {
        match kind {
            OperationKind::Create => self.create = timeout,
            OperationKind::Read => self.read = timeout,
            OperationKind::Update => self.update = timeout,
            OperationKind::Delete => self.delete = timeout,
        }
    }
}

/// Where the operation-status endpoint keeps its status and message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusFields {
    pub status: String,
    pub message: String,
}

impl Default for StatusFields {
    fn default() -> Self {
        Self {
            status: "/metadata/status".into(),
            message: "/metadata/message".into(),
        }
    }
}

/// Where a resource representation keeps its lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateFields {
    pub state: String,
    pub message: String,
}

impl Default for StateFields {
    fn default() -> Self {
        Self {
            state: "/metadata/state".into(),
            message: "/metadata/message".into(),
        }
    }
}

/// How a status reference is located in a mutating call's response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceLookup {
    /// Response header consulted first (case-insensitive).
    pub header: String,
    /// JSON pointers into the response body, tried in order.
    pub pointers: Vec<String>,
}

impl Default for ReferenceLookup {
    fn default() -> Self {
        Self {
            header: "location".into(),
            pointers: vec!["/metadata/href".into(), "/href".into(), "/requestId".into()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitSettings {
    #[serde(with = "serde_duration")]
    pub poll_interval: Duration,
    pub missing_metadata_tolerance: u32,
    pub timeouts: ResourceTimeouts,
    pub status_fields: StatusFields,
    pub state_fields: StateFields,
    pub reference_lookup: ReferenceLookup,
    /// State a resource reports once usable. Compared case-insensitively.
    pub ready_state: String,
    /// States that mean the resource will never become ready. Compared case-insensitively.
    pub failure_states: Vec<String>,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            missing_metadata_tolerance: DEFAULT_MISSING_METADATA_TOLERANCE,
            timeouts: ResourceTimeouts::default(),
            status_fields: StatusFields::default(),
            state_fields: StateFields::default(),
            reference_lookup: ReferenceLookup::default(),
            ready_state: DEFAULT_READY_STATE.into(),
            failure_states: vec!["FAILED".into()],
        }
    }
}

impl WaitSettings {
    /// Load settings from a YAML or JSON file and validate them.
    ///
    /// Files ending in `.json` are parsed as JSON; everything else as YAML.
    /// Fields left out of the file keep their defaults.
    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));
        let settings: Self = if is_json {
            serde_json::from_str(&content).map_err(|source| SettingsError::Json {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            serde_yaml::from_str(&content).map_err(|source| SettingsError::Yaml {
                path: path.to_path_buf(),
                source,
            })?
        };

        settings.validate()?;
        debug!(path = %path.display(), "loaded wait settings");
        Ok(settings)
    }

    /// Apply `SETTLE_*` environment overrides on top of the current values.
    pub fn apply_env_overrides(&mut self) -> Result<(), SettingsError> {
        if let Some(interval) = env_duration(POLL_INTERVAL_ENV)? {
            self.poll_interval = interval;
        }
        if let Ok(raw) = env::var(MISSING_METADATA_TOLERANCE_ENV) {
            self.missing_metadata_tolerance = raw.trim().parse().map_err(|error: std::num::ParseIntError| SettingsError::Env {
                name: MISSING_METADATA_TOLERANCE_ENV,
                value: raw.clone(),
                reason: error.to_string(),
            })?;
        }
        for (name, kind) in [
            (TIMEOUT_CREATE_ENV, OperationKind::Create),
            (TIMEOUT_READ_ENV, OperationKind::Read),
            (TIMEOUT_UPDATE_ENV, OperationKind::Update),
            (TIMEOUT_DELETE_ENV, OperationKind::Delete),
        ] {
            if let Some(timeout) = env_duration(name)? {
                self.timeouts.set(kind, timeout);
            }
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.poll_interval.is_zero() {
            return Err(SettingsError::Invalid("poll_interval must be greater than zero".into()));
        }
        for kind in [OperationKind::Create, OperationKind::Read, OperationKind::Update, OperationKind::Delete] {
            if self.timeouts.for_kind(kind).is_zero() {
                return Err(SettingsError::Invalid(format!("{kind} timeout must be greater than zero")));
            }
        }
        if self.ready_state.trim().is_empty() {
            return Err(SettingsError::Invalid("ready_state must not be empty".into()));
        }

        let pointers = [
            &self.status_fields.status,
            &self.status_fields.message,
            &self.state_fields.state,
            &self.state_fields.message,
        ]
        .into_iter()
        .chain(self.reference_lookup.pointers.iter());
        for pointer in pointers {
            if !pointer.starts_with('/') {
                return Err(SettingsError::Invalid(format!(
                    "'{pointer}' is not a JSON pointer (expected a leading '/')"
                )));
            }
        }
        Ok(())
    }

    /// Interval, timeout and tolerance for one wait of the given kind.
    pub fn policy_for(&self, kind: OperationKind) -> WaitPolicy {
        WaitPolicy {
            poll_interval: self.poll_interval,
            timeout: self.timeouts.for_kind(kind),
            missing_metadata_tolerance: self.missing_metadata_tolerance,
        }
    }

    /// `true` when `state` equals the ready state, ignoring case.
    pub fn is_ready_state(&self, state: &str) -> bool {
        state.trim().eq_ignore_ascii_case(self.ready_state.trim())
    }

    /// `true` when `state` is one of the failure sentinels, ignoring case.
    pub fn is_failure_state(&self, state: &str) -> bool {
        let state = state.trim();
        self.failure_states
            .iter()
            .any(|sentinel| sentinel.trim().eq_ignore_ascii_case(state))
    }
}

fn env_duration(name: &'static str) -> Result<Option<Duration>, SettingsError> {
    let Ok(raw) = env::var(name) else {
        return Ok(None);
    };
    parse_duration(&raw).map(Some).map_err(|error| SettingsError::Env {
        name,
        value: raw.clone(),
        reason: error.to_string(),
    })
}
