// ABOUTME: Installation module covering credential storage, token rotation and provisioning
// ABOUTME: Wires the store, platform client and keyed locks into the three inbound operations

pub mod lock;
pub mod orchestrator;
pub mod platform;
pub mod registrar;
pub mod retry;
pub mod service;
pub mod store;
pub mod token_provider;
pub mod types;

pub use lock::{KeyGuard, KeyedLock, LocationLocks, NoopLock};
pub use orchestrator::{ProvisioningOrchestrator, ProvisioningStage};
pub use platform::{HttpPlatformClient, PlatformClient, PlatformError, PlatformResult};
pub use registrar::InstallationRegistrar;
pub use retry::RetryPolicy;
pub use service::{AccessTokenView, ErrorBody, InstallationService, InstallationView, ServiceResponse};
pub use store::{
    InstallationField, InstallationStore, SqliteInstallationStore, StoreError, StoreResult,
};
pub use token_provider::TokenProvider;
pub use types::{
    AccessToken, CreateCustomValueRequest, CustomValue, InstallationRecord, ProvisionEvent,
    ProvisionOutcome, TokenExchangeResult,
};

use crate::error::{AuthError, AuthResult};

/// Reject empty or whitespace-only input before anything is touched
pub(crate) fn require_field(name: &str, value: &str) -> AuthResult<()> {
    if value.trim().is_empty() {
        return Err(AuthError::Validation(format!("{} is required", name)));
    }
    Ok(())
}
