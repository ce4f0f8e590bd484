// ABOUTME: Token provider returning a fresh access token for a stored installation
// ABOUTME: Performs the refresh-token grant and persists the rotated refresh token under a per-location lock

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::{
    lock::KeyedLock,
    platform::{PlatformClient, PlatformError},
    require_field,
    store::{InstallationField, InstallationStore},
    types::AccessToken,
};
use crate::error::{AuthError, AuthResult};

/// Hands out access tokens for installed locations
pub struct TokenProvider {
    store: Arc<dyn InstallationStore>,
    platform: Arc<dyn PlatformClient>,
    locks: Arc<dyn KeyedLock>,
}

impl TokenProvider {
    pub fn new(
        store: Arc<dyn InstallationStore>,
        platform: Arc<dyn PlatformClient>,
        locks: Arc<dyn KeyedLock>,
    ) -> Self {
        Self {
            store,
            platform,
            locks,
        }
    }

    /// Key under which rotations of `location_id` are serialized
    pub fn lock_key(location_id: &str) -> String {
        format!("token:{}", location_id)
    }

    /// Get a valid access token for `location_id`
    ///
    /// Every call exchanges the stored refresh token, which the platform then
    /// invalidates, so the whole read-exchange-write sequence runs while holding
    /// the location's lock. Returns [`AuthError::PersistenceDegraded`] (carrying
    /// the usable token) when the rotated refresh token could not be saved.
    pub async fn get_access_token(&self, location_id: &str) -> AuthResult<AccessToken> {
        require_field("location_id", location_id)?;

        let _guard = self.locks.lock(&Self::lock_key(location_id)).await;
        debug!("Acquired rotation lock for location {}", location_id);

        let installation = self
            .store
            .get(location_id)
            .await
            .map_err(|e| {
                error!("Failed to load installation for {}: {}", location_id, e);
                AuthError::Storage(format!("Failed to load installation: {}", e))
            })?
            .ok_or_else(|| AuthError::NotFound(location_id.to_string()))?;

        let exchange = self
            .platform
            .refresh_access_token(&installation.refresh_token)
            .await
            .map_err(|e| refresh_error(location_id, e))?;

        let access_token = AccessToken::from_exchange(&exchange);

        let Some(new_refresh_token) = exchange
            .refresh_token
            .as_deref()
            .filter(|token| !token.is_empty())
        else {
            warn!(
                "Platform returned no new refresh token for {}; keeping the stored one",
                location_id
            );
            return Ok(access_token);
        };

        if let Err(e) = self
            .store
            .update_field(location_id, InstallationField::RefreshToken, new_refresh_token)
            .await
        {
            error!(
                "CRITICAL: refresh token for location {} was rotated upstream but could not be saved; \
                 the next refresh for this location will fail: {}",
                location_id, e
            );
            return Err(AuthError::PersistenceDegraded {
                location_id: location_id.to_string(),
                access_token,
                reason: e.to_string(),
            });
        }

        info!("Refresh token rotated for location {}", location_id);
        Ok(access_token)
    }
}

fn refresh_error(location_id: &str, err: PlatformError) -> AuthError {
    match err {
        PlatformError::Transport(message) => {
            warn!("Token refresh for {} got no answer: {}", location_id, message);
            AuthError::UpstreamUnavailable(message)
        }
        PlatformError::InvalidResponse(message) => {
            // A success status means the grant was processed, so the stored token is spent
            error!(
                "CRITICAL: token refresh for location {} succeeded upstream but the response \
                 was unreadable; the stored refresh token is likely invalid: {}",
                location_id, message
            );
            AuthError::RotationUnconfirmed {
                location_id: location_id.to_string(),
                reason: format!("Unreadable token response: {}", message),
            }
        }
        other => {
            warn!("Token refresh for {} rejected: {}", location_id, other);
            AuthError::UpstreamAuth(other.description())
        }
    }
}
