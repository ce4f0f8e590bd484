// ABOUTME: Core type definitions for installations and platform exchanges
// ABOUTME: Includes the stored installation record, token exchange payloads and provisioning events

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// OAuth credential state of one tenant location, as stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationRecord {
    pub location_id: String,
    pub company_id: Option<String>,
    pub refresh_token: String, // Single-use, rotated on every refresh
    pub provisioning_artifact_id: Option<String>,
}

impl InstallationRecord {
    pub fn new(location_id: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            location_id: location_id.into(),
            company_id: None,
            refresh_token: refresh_token.into(),
            provisioning_artifact_id: None,
        }
    }

    /// Set only for records created by the provisioning flow
    pub fn is_provisioned(&self) -> bool {
        self.provisioning_artifact_id.is_some()
    }
}

/// Token payload returned by both the refresh grant and the location-token exchange
#[derive(Debug, Clone, Deserialize)]
pub struct TokenExchangeResult {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>, // Seconds
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default, rename = "locationId")]
    pub location_id: Option<String>,
    #[serde(default, rename = "userId")]
    pub user_id: Option<String>,
    #[serde(default, rename = "planId")]
    pub plan_id: Option<String>,
}

/// In-memory access token. Never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_in: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_in: Option<i64>) -> Self {
        Self {
            token: token.into(),
            expires_in,
            // Out-of-range lifetimes leave the expiry unknown
            expires_at: expires_in
                .and_then(TimeDelta::try_seconds)
                .and_then(|lifetime| Utc::now().checked_add_signed(lifetime)),
        }
    }

    pub fn from_exchange(result: &TokenExchangeResult) -> Self {
        Self::new(result.access_token.clone(), result.expires_in)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[redacted]")
            .field("expires_in", &self.expires_in)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Form body for `POST /oauth/token`
#[derive(Debug, Serialize)]
pub struct RefreshTokenRequest<'a> {
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub grant_type: &'a str, // "refresh_token"
    pub refresh_token: &'a str,
}

/// Form body for `POST /oauth/locationToken`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationTokenRequest<'a> {
    pub company_id: &'a str,
    pub location_id: &'a str,
}

/// JSON body for `POST /locations/{locationId}/customValues`
#[derive(Debug, Clone, Serialize)]
pub struct CreateCustomValueRequest {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomValue {
    pub id: Option<String>,
    pub name: Option<String>,
    pub field_key: Option<String>,
    pub value: Option<String>,
    pub location_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CustomValueResponse {
    #[serde(rename = "customValue")]
    pub custom_value: CustomValue,
}

/// "New location" event that triggers provisioning
///
/// Accepts the platform webhook shape (`id`, `companyId`) as well as snake_case fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProvisionEvent {
    #[serde(default, alias = "id", alias = "locationId")]
    pub location_id: String,
    #[serde(default, alias = "companyId")]
    pub company_id: String,
}

impl ProvisionEvent {
    pub fn new(location_id: impl Into<String>, company_id: impl Into<String>) -> Self {
        Self {
            location_id: location_id.into(),
            company_id: company_id.into(),
        }
    }
}

/// Confirmation returned by a successful provisioning run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionOutcome {
    pub location_id: String,
    pub company_id: Option<String>,
    pub provisioning_artifact_id: Option<String>,
    /// The location was provisioned by an earlier run; nothing was called upstream
    pub already_provisioned: bool,
    /// The company refresh token rotated but could not be saved during this run
    pub company_credential_degraded: bool,
}
