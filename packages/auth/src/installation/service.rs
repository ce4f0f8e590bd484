// ABOUTME: Inbound operations exposed to the transport layer
// ABOUTME: Runs each operation to completion on its own task and returns a serializable outcome

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tracing::error;

use super::{
    lock::{KeyedLock, LocationLocks},
    orchestrator::{ProvisioningOrchestrator, ProvisioningStage},
    platform::{HttpPlatformClient, PlatformClient},
    registrar::InstallationRegistrar,
    store::{InstallationStore, SqliteInstallationStore},
    token_provider::TokenProvider,
    types::{AccessToken, InstallationRecord, ProvisionEvent, ProvisionOutcome},
};
use crate::config::{AuthConfig, ProvisioningConfig};
use crate::error::{AuthError, AuthResult, ErrorKind};

/// Access token as handed to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenView {
    pub access_token: String,
    pub expires_in: Option<i64>,
}

impl From<AccessToken> for AccessTokenView {
    fn from(token: AccessToken) -> Self {
        Self {
            access_token: token.token,
            expires_in: token.expires_in,
        }
    }
}

/// Registered installation without its credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationView {
    pub location_id: String,
    pub company_id: Option<String>,
    pub provisioning_artifact_id: Option<String>,
}

impl From<InstallationRecord> for InstallationView {
    fn from(record: InstallationRecord) -> Self {
        Self {
            location_id: record.location_id,
            company_id: record.company_id,
            provisioning_artifact_id: record.provisioning_artifact_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
    pub retriable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<String>,
    /// Only set for `partial_success`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<ProvisioningStage>,
    /// Only set for `persistence_degraded`: the token is valid for this call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

impl From<AuthError> for ErrorBody {
    fn from(err: AuthError) -> Self {
        let kind = err.kind();
        let retriable = err.is_retriable();
        let message = err.to_string();

        let mut body = Self {
            kind,
            message,
            retriable,
            location_id: None,
            artifact_id: None,
            stage: None,
            access_token: None,
        };

        match err {
            AuthError::PersistenceDegraded {
                location_id,
                access_token,
                ..
            } => {
                body.location_id = Some(location_id);
                body.access_token = Some(access_token.token);
            }
            AuthError::PartialSuccess {
                location_id,
                stage,
                artifact_id,
                ..
            } => {
                body.location_id = Some(location_id);
                body.stage = Some(stage);
                body.artifact_id = artifact_id;
            }
            AuthError::RotationUnconfirmed { location_id, .. }
            | AuthError::NotFound(location_id)
            | AuthError::Conflict(location_id) => body.location_id = Some(location_id),
            _ => {}
        }

        body
    }
}

/// Result of an inbound operation, tagged by `status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ServiceResponse<T> {
    Ok { data: T },
    Error(ErrorBody),
}

impl<T> ServiceResponse<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Ok { .. } => None,
            Self::Error(body) => Some(body.kind),
        }
    }
}

impl<T, U: Into<T>> From<AuthResult<U>> for ServiceResponse<T> {
    fn from(result: AuthResult<U>) -> Self {
        match result {
            Ok(data) => Self::Ok { data: data.into() },
            Err(e) => Self::Error(e.into()),
        }
    }
}

/// The three inbound operations over one shared store
#[derive(Clone)]
pub struct InstallationService {
    tokens: Arc<TokenProvider>,
    registrar: Arc<InstallationRegistrar>,
    orchestrator: Arc<ProvisioningOrchestrator>,
}

impl InstallationService {
    pub fn new(
        store: Arc<dyn InstallationStore>,
        platform: Arc<dyn PlatformClient>,
        locks: Arc<dyn KeyedLock>,
        provisioning: ProvisioningConfig,
    ) -> Self {
        let tokens = Arc::new(TokenProvider::new(
            store.clone(),
            platform.clone(),
            locks.clone(),
        ));
        let registrar = Arc::new(InstallationRegistrar::new(store.clone()));
        let orchestrator = Arc::new(ProvisioningOrchestrator::new(
            tokens.clone(),
            platform,
            store,
            locks,
            provisioning,
        ));

        Self {
            tokens,
            registrar,
            orchestrator,
        }
    }

    /// Wire the SQLite store, HTTP platform client and per-location locks from configuration
    pub async fn from_config(config: &AuthConfig) -> AuthResult<Self> {
        let store = SqliteInstallationStore::connect(&config.database_url)
            .await
            .map_err(|e| AuthError::Storage(format!("Failed to open installation store: {}", e)))?;
        let platform = HttpPlatformClient::new(config.platform.clone(), config.retry.clone())?;

        Ok(Self::new(
            Arc::new(store),
            Arc::new(platform),
            Arc::new(LocationLocks::new()),
            config.provisioning.clone(),
        ))
    }

    pub fn token_provider(&self) -> &Arc<TokenProvider> {
        &self.tokens
    }

    pub async fn get_access_token(&self, location_id: &str) -> ServiceResponse<AccessTokenView> {
        let tokens = self.tokens.clone();
        let location_id = location_id.to_string();
        run_to_completion(async move { tokens.get_access_token(&location_id).await })
            .await
            .into()
    }

    pub async fn register_installation(
        &self,
        location_id: &str,
        refresh_token: &str,
    ) -> ServiceResponse<InstallationView> {
        let registrar = self.registrar.clone();
        let location_id = location_id.to_string();
        let refresh_token = refresh_token.to_string();
        run_to_completion(async move {
            registrar
                .register_installation(&location_id, &refresh_token)
                .await
        })
        .await
        .into()
    }

    pub async fn provision_location(
        &self,
        location_id: &str,
        company_id: &str,
    ) -> ServiceResponse<ProvisionOutcome> {
        self.handle_event(ProvisionEvent::new(location_id, company_id))
            .await
    }

    /// Provision from a decoded "new location" webhook payload
    pub async fn handle_event(&self, event: ProvisionEvent) -> ServiceResponse<ProvisionOutcome> {
        let orchestrator = self.orchestrator.clone();
        run_to_completion(async move { orchestrator.provision_location(&event).await })
            .await
            .into()
    }
}

/// Drive `operation` on its own task so that dropping the caller's future does
/// not abandon platform calls already issued
async fn run_to_completion<T, F>(operation: F) -> AuthResult<T>
where
    F: Future<Output = AuthResult<T>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(operation).await.map_err(|e| {
        error!("Installation operation task failed: {}", e);
        AuthError::Internal(format!("Operation task failed: {}", e))
    })?
}
