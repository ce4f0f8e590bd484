// ABOUTME: Omnya installation library managing platform OAuth credentials per tenant location
// ABOUTME: Token rotation, installation registration and chained location provisioning

pub mod config;
pub mod error;
pub mod installation;

// Re-export main types
pub use config::{AuthConfig, PlatformConfig, ProvisioningConfig};
pub use error::{AuthError, AuthResult, ErrorKind};
pub use installation::{
    AccessToken, HttpPlatformClient, InstallationRecord, InstallationRegistrar,
    InstallationService, InstallationStore, KeyedLock, LocationLocks, NoopLock, PlatformClient,
    ProvisionEvent, ProvisionOutcome, ProvisioningOrchestrator, ProvisioningStage, RetryPolicy,
    ServiceResponse, SqliteInstallationStore, TokenProvider,
};
