// ABOUTME: Registrar persisting installations delivered by the authorization callback
// ABOUTME: Validates input and maps duplicate locations to a conflict

use std::sync::Arc;

use tracing::{error, info, warn};

use super::{
    require_field,
    store::{InstallationStore, StoreError},
    types::InstallationRecord,
};
use crate::error::{AuthError, AuthResult};

pub struct InstallationRegistrar {
    store: Arc<dyn InstallationStore>,
}

impl InstallationRegistrar {
    pub fn new(store: Arc<dyn InstallationStore>) -> Self {
        Self { store }
    }

    /// Store a new installation. No platform calls are made.
    pub async fn register_installation(
        &self,
        location_id: &str,
        refresh_token: &str,
    ) -> AuthResult<InstallationRecord> {
        require_field("location_id", location_id)?;
        require_field("refresh_token", refresh_token)?;

        let record = InstallationRecord::new(location_id, refresh_token);

        match self.store.insert(&record).await {
            Ok(()) => {
                info!("Registered installation for location {}", location_id);
                Ok(record)
            }
            Err(StoreError::Duplicate(_)) => {
                warn!("Installation for location {} already exists", location_id);
                Err(AuthError::Conflict(location_id.to_string()))
            }
            Err(e) => {
                error!("Failed to register installation for {}: {}", location_id, e);
                Err(AuthError::Storage(format!("Failed to save installation: {}", e)))
            }
        }
    }
}
