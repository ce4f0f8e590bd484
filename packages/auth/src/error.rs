// ABOUTME: Error types for installation credentials, token rotation and provisioning
// ABOUTME: Keeps "nothing happened" failures distinct from failures after an irreversible side effect

use serde::Serialize;
use thiserror::Error;

use crate::installation::orchestrator::ProvisioningStage;
use crate::installation::types::AccessToken;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("No installation found for location: {0}")]
    NotFound(String),

    #[error("Platform rejected token refresh: {0}")]
    UpstreamAuth(String),

    #[error("Platform rejected token exchange: {0}")]
    UpstreamExchange(String),

    #[error("Platform unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Installation already exists for location: {0}")]
    Conflict(String),

    /// The platform rotated the refresh token but the new value was not saved.
    /// `access_token` is still valid for the current call.
    #[error("Token refreshed for location {location_id} but the new refresh token was not saved: {reason}")]
    PersistenceDegraded {
        location_id: String,
        access_token: AccessToken,
        reason: String,
    },

    /// The platform accepted the refresh grant but its answer could not be read.
    /// The stored refresh token is most likely consumed.
    #[error("Token refresh for location {location_id} was not confirmed and the stored refresh token may be spent: {reason}")]
    RotationUnconfirmed { location_id: String, reason: String },

    /// An external resource exists on the platform that no installation record tracks.
    /// `stage` is where the run stopped. A creation call with an unknown
    /// outcome counts as `ExternalResourceCreated`.
    #[error(
        "Provisioning of location {location_id} left untracked platform state at stage {stage} (artifact: {}): {reason}",
        .artifact_id.as_deref().unwrap_or("unknown")
    )]
    PartialSuccess {
        location_id: String,
        company_id: String,
        stage: ProvisioningStage,
        artifact_id: Option<String>,
        reason: String,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Stable, serializable discriminant of [`AuthError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    UpstreamAuth,
    UpstreamExchange,
    UpstreamUnavailable,
    Conflict,
    RotationUnconfirmed,
    PersistenceDegraded,
    PartialSuccess,
    Storage,
    Configuration,
    Internal,
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::UpstreamAuth(_) => ErrorKind::UpstreamAuth,
            Self::UpstreamExchange(_) => ErrorKind::UpstreamExchange,
            Self::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::RotationUnconfirmed { .. } => ErrorKind::RotationUnconfirmed,
            Self::PersistenceDegraded { .. } => ErrorKind::PersistenceDegraded,
            Self::PartialSuccess { .. } => ErrorKind::PartialSuccess,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether repeating the whole operation later can succeed without manual repair
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::UpstreamAuth(_)
                | Self::UpstreamExchange(_)
                | Self::UpstreamUnavailable(_)
                | Self::Storage(_)
        )
    }

    /// Whether something irreversible happened before the failure
    pub fn has_side_effect(&self) -> bool {
        matches!(
            self,
            Self::RotationUnconfirmed { .. }
                | Self::PersistenceDegraded { .. }
                | Self::PartialSuccess { .. }
        )
    }
}
