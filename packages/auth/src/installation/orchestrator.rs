// ABOUTME: Provisioning orchestrator onboarding a new location end to end
// ABOUTME: Company token -> location token -> onboarding custom value -> installation record, as a state machine

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::{
    lock::KeyedLock,
    platform::{PlatformClient, PlatformError},
    require_field,
    store::{InstallationStore, StoreError},
    token_provider::TokenProvider,
    types::{
        AccessToken, CreateCustomValueRequest, InstallationRecord, ProvisionEvent,
        ProvisionOutcome,
    },
};
use crate::config::ProvisioningConfig;
use crate::error::{AuthError, AuthResult};

/// Observable position of a provisioning attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningStage {
    Start,
    CompanyTokenObtained,
    LocationTokenObtained,
    ExternalResourceCreated,
    Persisted,
}

impl ProvisioningStage {
    /// From this stage on the platform holds state that cannot be rolled back,
    /// so any failure is a partial success
    pub fn is_partial_failure_capable(self) -> bool {
        matches!(self, Self::ExternalResourceCreated | Self::Persisted)
    }
}

impl fmt::Display for ProvisioningStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Start => "start",
            Self::CompanyTokenObtained => "company_token_obtained",
            Self::LocationTokenObtained => "location_token_obtained",
            Self::ExternalResourceCreated => "external_resource_created",
            Self::Persisted => "persisted",
        };
        f.write_str(label)
    }
}

/// Data carried between stages
enum ProvisioningState {
    Start,
    CompanyTokenObtained {
        company_token: AccessToken,
    },
    LocationTokenObtained {
        access_token: String,
        refresh_token: String,
    },
    ExternalResourceCreated {
        refresh_token: String,
        artifact_id: String,
    },
    Persisted {
        record: InstallationRecord,
    },
}

impl ProvisioningState {
    fn stage(&self) -> ProvisioningStage {
        match self {
            Self::Start => ProvisioningStage::Start,
            Self::CompanyTokenObtained { .. } => ProvisioningStage::CompanyTokenObtained,
            Self::LocationTokenObtained { .. } => ProvisioningStage::LocationTokenObtained,
            Self::ExternalResourceCreated { .. } => ProvisioningStage::ExternalResourceCreated,
            Self::Persisted { .. } => ProvisioningStage::Persisted,
        }
    }
}

/// Per-run bookkeeping
struct Attempt<'a> {
    event: &'a ProvisionEvent,
    company_credential_degraded: bool,
}

pub struct ProvisioningOrchestrator {
    tokens: Arc<TokenProvider>,
    platform: Arc<dyn PlatformClient>,
    store: Arc<dyn InstallationStore>,
    locks: Arc<dyn KeyedLock>,
    config: ProvisioningConfig,
}

impl ProvisioningOrchestrator {
    pub fn new(
        tokens: Arc<TokenProvider>,
        platform: Arc<dyn PlatformClient>,
        store: Arc<dyn InstallationStore>,
        locks: Arc<dyn KeyedLock>,
        config: ProvisioningConfig,
    ) -> Self {
        Self {
            tokens,
            platform,
            store,
            locks,
            config,
        }
    }

    /// Key under which provisioning runs of `location_id` are serialized
    pub fn lock_key(location_id: &str) -> String {
        format!("provision:{}", location_id)
    }

    /// Onboard the location named by `event`
    ///
    /// Runs of the same location are serialized. A location that already has a
    /// provisioned record is reported as such without calling the platform.
    pub async fn provision_location(&self, event: &ProvisionEvent) -> AuthResult<ProvisionOutcome> {
        require_field("location_id", &event.location_id)?;
        require_field("company_id", &event.company_id)?;
        if event.location_id == self.config.company_location_id {
            return Err(AuthError::Validation(format!(
                "{} is reserved for the company installation",
                event.location_id
            )));
        }

        let _guard = self.locks.lock(&Self::lock_key(&event.location_id)).await;

        if let Some(existing) = self.existing_installation(&event.location_id).await? {
            info!(
                "Location {} already provisioned (artifact {:?}); skipping",
                event.location_id, existing.provisioning_artifact_id
            );
            return Ok(ProvisionOutcome {
                location_id: existing.location_id,
                company_id: existing.company_id,
                provisioning_artifact_id: existing.provisioning_artifact_id,
                already_provisioned: true,
                company_credential_degraded: false,
            });
        }

        let mut attempt = Attempt {
            event,
            company_credential_degraded: false,
        };
        let mut state = ProvisioningState::Start;

        let record = loop {
            state = match self.advance(state, &mut attempt).await {
                Ok(ProvisioningState::Persisted { record }) => break record,
                Ok(next) => next,
                Err(e) => {
                    warn!(
                        "Provisioning of {} stopped: {} (kind {:?})",
                        event.location_id,
                        e,
                        e.kind()
                    );
                    return Err(e);
                }
            };
            debug!(
                "Provisioning of {} reached stage {}",
                event.location_id,
                state.stage()
            );
        };

        info!(
            "Installation and onboarding custom value created for location {}",
            record.location_id
        );

        Ok(ProvisionOutcome {
            location_id: record.location_id,
            company_id: record.company_id,
            provisioning_artifact_id: record.provisioning_artifact_id,
            already_provisioned: false,
            company_credential_degraded: attempt.company_credential_degraded,
        })
    }

    /// `Some` when the location was provisioned before; `Conflict` when it is
    /// installed but was not provisioned by this flow
    async fn existing_installation(&self, location_id: &str) -> AuthResult<Option<InstallationRecord>> {
        let existing = self.store.get(location_id).await.map_err(|e| {
            error!("Failed to check existing installation for {}: {}", location_id, e);
            AuthError::Storage(format!("Failed to load installation: {}", e))
        })?;

        match existing {
            Some(record) if record.is_provisioned() => Ok(Some(record)),
            Some(_) => Err(AuthError::Conflict(location_id.to_string())),
            None => Ok(None),
        }
    }

    async fn advance(
        &self,
        state: ProvisioningState,
        attempt: &mut Attempt<'_>,
    ) -> AuthResult<ProvisioningState> {
        let event = attempt.event;

        match state {
            ProvisioningState::Start => {
                let company_token = match self
                    .tokens
                    .get_access_token(&self.config.company_location_id)
                    .await
                {
                    Ok(token) => token,
                    Err(AuthError::PersistenceDegraded { access_token, .. }) => {
                        // Already logged by the provider; the token itself is valid
                        warn!(
                            "Continuing provisioning of {} with a company token whose rotation was not saved",
                            event.location_id
                        );
                        attempt.company_credential_degraded = true;
                        access_token
                    }
                    Err(e) => return Err(e),
                };
                Ok(ProvisioningState::CompanyTokenObtained { company_token })
            }

            ProvisioningState::CompanyTokenObtained { company_token } => {
                let exchange = self
                    .platform
                    .exchange_location_token(
                        &company_token.token,
                        &event.company_id,
                        &event.location_id,
                    )
                    .await
                    .map_err(|e| match e {
                        PlatformError::Transport(message) => AuthError::UpstreamUnavailable(message),
                        other => AuthError::UpstreamExchange(other.description()),
                    })?;

                match exchange.refresh_token {
                    Some(refresh_token)
                        if !exchange.access_token.is_empty() && !refresh_token.is_empty() =>
                    {
                        Ok(ProvisioningState::LocationTokenObtained {
                            access_token: exchange.access_token,
                            refresh_token,
                        })
                    }
                    _ => Err(AuthError::UpstreamExchange(
                        "No access_token or refresh_token received for the location".to_string(),
                    )),
                }
            }

            ProvisioningState::LocationTokenObtained {
                access_token,
                refresh_token,
            } => {
                let request = CreateCustomValueRequest {
                    name: self.config.onboarding_field_name.clone(),
                    value: self.config.onboarding_initial_value.clone(),
                };

                match self
                    .platform
                    .create_custom_value(&access_token, &event.location_id, &request)
                    .await
                {
                    Ok(custom_value) => match custom_value.id.filter(|id| !id.is_empty()) {
                        Some(artifact_id) => Ok(ProvisioningState::ExternalResourceCreated {
                            refresh_token,
                            artifact_id,
                        }),
                        None => Err(self.fail(
                            event,
                            ProvisioningStage::ExternalResourceCreated,
                            None,
                            AuthError::UpstreamExchange(
                                "Custom value was created but the platform returned no id"
                                    .to_string(),
                            ),
                        )),
                    },
                    // A client error means nothing was created
                    Err(PlatformError::Rejected { status, description }) if status < 500 => {
                        Err(self.fail(
                            event,
                            ProvisioningStage::LocationTokenObtained,
                            None,
                            AuthError::UpstreamExchange(format!(
                                "Custom value creation rejected: {}",
                                description
                            )),
                        ))
                    }
                    // No usable answer: the value may exist, so treat it as created
                    Err(e) => Err(self.fail(
                        event,
                        ProvisioningStage::ExternalResourceCreated,
                        None,
                        AuthError::UpstreamUnavailable(format!(
                            "Custom value creation outcome unknown: {}",
                            e
                        )),
                    )),
                }
            }

            ProvisioningState::ExternalResourceCreated {
                refresh_token,
                artifact_id,
            } => {
                let record = InstallationRecord {
                    location_id: event.location_id.clone(),
                    company_id: Some(event.company_id.clone()),
                    refresh_token,
                    provisioning_artifact_id: Some(artifact_id.clone()),
                };

                match self.store.insert(&record).await {
                    Ok(()) => Ok(ProvisioningState::Persisted { record }),
                    Err(StoreError::Duplicate(_)) => Err(self.fail(
                        event,
                        ProvisioningStage::ExternalResourceCreated,
                        Some(artifact_id),
                        AuthError::Conflict(event.location_id.clone()),
                    )),
                    Err(e) => Err(self.fail(
                        event,
                        ProvisioningStage::ExternalResourceCreated,
                        Some(artifact_id),
                        AuthError::Storage(format!("Failed to save installation: {}", e)),
                    )),
                }
            }

            persisted @ ProvisioningState::Persisted { .. } => Ok(persisted),
        }
    }

    /// Classify a failure that stopped the run at `stage`. Once the platform
    /// holds state the failure becomes a partial success.
    fn fail(
        &self,
        event: &ProvisionEvent,
        stage: ProvisioningStage,
        artifact_id: Option<String>,
        cause: AuthError,
    ) -> AuthError {
        if !stage.is_partial_failure_capable() {
            return cause;
        }

        error!(
            "CRITICAL: provisioning of location {} (company {}) stopped at stage {} leaving an \
             untracked custom value (artifact {}); manual reconciliation required: {}",
            event.location_id,
            event.company_id,
            stage,
            artifact_id.as_deref().unwrap_or("unknown"),
            cause
        );

        AuthError::PartialSuccess {
            location_id: event.location_id.clone(),
            company_id: event.company_id.clone(),
            stage,
            artifact_id,
            reason: cause.to_string(),
        }
    }
}
