//! Error type for resource store operations.

use thiserror::Error;

use crate::backend::ApiError;
use crate::wait::WaitError;

use super::StorageKind;
use super::settings::SettingsError;

/// Errors raised by resource stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Raised when an operation runs before a successful `init`.
    #[error("store used before init")]
    NotInitialised,
    /// Raised when the configuration map is invalid.
    #[error("invalid store configuration: {0}")]
    Config(#[from] SettingsError),
    /// Raised when authentication or client construction fails.
    #[error("failed to connect to the {service} service")]
    Connect {
        /// Service being connected to.
        service: &'static str,
        /// Transport error.
        #[source]
        source: ApiError,
    },
    /// Raised when a single backend call fails.
    #[error("failed to {action} {id}")]
    Operation {
        /// Operation being performed.
        action: &'static str,
        /// Identifier the operation targeted.
        id: String,
        /// Transport error.
        #[source]
        source: ApiError,
    },
    /// Raised when waiting on a resource fails or times out.
    #[error("failed waiting for {action}")]
    Wait {
        /// What was awaited.
        action: &'static str,
        /// Underlying wait failure.
        #[source]
        source: WaitError<ApiError>,
    },
    /// Raised when a step of a multi-step clone fails.
    #[error("clone step '{step}' failed for {id}")]
    CloneStep {
        /// Name of the failing step.
        step: &'static str,
        /// Identifier the step worked on.
        id: String,
        /// Volume created before the failure, which the caller now owns.
        created: Option<String>,
        /// Failure of the step.
        #[source]
        source: Box<StoreError>,
    },
    /// Raised when the originating share exposes no access rule to copy.
    #[error("share {share_id} has no access rules")]
    NoAccessRule {
        /// Share whose rules were listed.
        share_id: String,
    },
    /// Raised when a store does not implement an operation.
    #[error("{operation} is not supported by the {backend} store")]
    Unsupported {
        /// Operation that was requested.
        operation: &'static str,
        /// Store that rejected it.
        backend: StorageKind,
    },
}

impl StoreError {
    pub(crate) const fn operation(action: &'static str, id: String, source: ApiError) -> Self {
        Self::Operation { action, id, source }
    }

    pub(crate) const fn wait(action: &'static str, source: WaitError<ApiError>) -> Self {
        Self::Wait { action, source }
    }

    /// Returns the volume a failed clone left behind, if any.
    #[must_use]
    pub fn orphaned_volume(&self) -> Option<&str> {
        match self {
            Self::CloneStep { created, .. } => created.as_deref(),
            _ => None,
        }
    }

    /// Returns `true` when the failure was a wait that ran out of time.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Wait { source, .. } => source.is_timeout(),
            Self::CloneStep { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}
