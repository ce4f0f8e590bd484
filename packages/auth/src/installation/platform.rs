// ABOUTME: Client for the three platform endpoints used by the installation flows
// ABOUTME: Refresh-token grant, company-to-location token exchange and custom value creation

use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use super::retry::{with_retry, RetryPolicy};
use super::types::{
    CreateCustomValueRequest, CustomValue, CustomValueResponse, LocationTokenRequest,
    RefreshTokenRequest, TokenExchangeResult,
};
use crate::config::PlatformConfig;
use crate::error::{AuthError, AuthResult};

#[derive(Error, Debug)]
pub enum PlatformError {
    /// The platform answered with a non-success status
    #[error("Platform responded with status {status}: {description}")]
    Rejected { status: u16, description: String },

    /// No answer was received (connect failure, timeout, reset)
    #[error("Transport error: {0}")]
    Transport(String),

    /// A success status whose body could not be understood
    #[error("Invalid platform response: {0}")]
    InvalidResponse(String),

    #[error("Invalid platform request: {0}")]
    InvalidRequest(String),
}

pub type PlatformResult<T> = Result<T, PlatformError>;

impl PlatformError {
    /// Failures worth retrying without investigation
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Rejected { status, .. } => matches!(status, 429 | 502 | 503 | 504),
            Self::InvalidResponse(_) | Self::InvalidRequest(_) => false,
        }
    }

    /// Human-readable description, preferring the platform's own wording
    pub fn description(&self) -> String {
        match self {
            Self::Rejected { description, .. } => description.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for PlatformError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.without_url().to_string())
    }
}

/// The platform API surface the installation flows depend on
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// `POST /oauth/token` with `grant_type=refresh_token`.
    /// The platform invalidates `refresh_token` once this succeeds.
    async fn refresh_access_token(&self, refresh_token: &str)
        -> PlatformResult<TokenExchangeResult>;

    /// `POST /oauth/locationToken`, authenticated with a company-scoped token
    async fn exchange_location_token(
        &self,
        company_token: &str,
        company_id: &str,
        location_id: &str,
    ) -> PlatformResult<TokenExchangeResult>;

    /// `POST /locations/{location_id}/customValues`, authenticated with a location-scoped token.
    /// Creates platform state that this system cannot remove.
    async fn create_custom_value(
        &self,
        location_token: &str,
        location_id: &str,
        request: &CreateCustomValueRequest,
    ) -> PlatformResult<CustomValue>;
}

/// reqwest-backed [`PlatformClient`]
pub struct HttpPlatformClient {
    client: Client,
    config: PlatformConfig,
    retry: RetryPolicy,
}

impl HttpPlatformClient {
    pub fn new(config: PlatformConfig, retry: RetryPolicy) -> AuthResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AuthError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            retry,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> PlatformResult<Url> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                PlatformError::InvalidRequest(format!(
                    "Base URL cannot carry a path: {}",
                    self.config.base_url
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send_refresh(&self, url: &Url, refresh_token: &str) -> PlatformResult<TokenExchangeResult> {
        let form = RefreshTokenRequest {
            client_id: &self.config.client_id,
            client_secret: &self.config.client_secret,
            grant_type: "refresh_token",
            refresh_token,
        };

        let response = self
            .client
            .post(url.clone())
            .header(header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await?;

        parse_json(response).await
    }

    async fn send_location_token(
        &self,
        url: &Url,
        company_token: &str,
        company_id: &str,
        location_id: &str,
    ) -> PlatformResult<TokenExchangeResult> {
        let form = LocationTokenRequest {
            company_id,
            location_id,
        };

        let response = self
            .client
            .post(url.clone())
            .header(header::ACCEPT, "application/json")
            .header("Version", &self.config.api_version)
            .bearer_auth(company_token)
            .form(&form)
            .send()
            .await?;

        parse_json(response).await
    }
}

#[async_trait]
impl PlatformClient for HttpPlatformClient {
    async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> PlatformResult<TokenExchangeResult> {
        let url = self.endpoint(&["oauth", "token"])?;
        debug!("Requesting refresh-token grant");

        with_retry(&self.retry, "refresh-token grant", || {
            self.send_refresh(&url, refresh_token)
        })
        .await
    }

    async fn exchange_location_token(
        &self,
        company_token: &str,
        company_id: &str,
        location_id: &str,
    ) -> PlatformResult<TokenExchangeResult> {
        let url = self.endpoint(&["oauth", "locationToken"])?;
        debug!("Requesting location token for location {}", location_id);

        with_retry(&self.retry, "location-token exchange", || {
            self.send_location_token(&url, company_token, company_id, location_id)
        })
        .await
    }

    async fn create_custom_value(
        &self,
        location_token: &str,
        location_id: &str,
        request: &CreateCustomValueRequest,
    ) -> PlatformResult<CustomValue> {
        let url = self.endpoint(&["locations", location_id, "customValues"])?;
        debug!("Creating custom value {} for location {}", request.name, location_id);

        // Not retried: a lost response may still have created the value
        let response = self
            .client
            .post(url)
            .header(header::ACCEPT, "application/json")
            .header("Version", &self.config.api_version)
            .bearer_auth(location_token)
            .json(request)
            .send()
            .await?;

        let body: CustomValueResponse = parse_json(response).await?;
        Ok(body.custom_value)
    }
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> PlatformResult<T> {
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let description = describe_rejection(status, &body);
        // Only the platform's description is logged, never the raw body
        error!("Platform request failed with status {}: {}", status, description);
        return Err(PlatformError::Rejected {
            status: status.as_u16(),
            description,
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|e| PlatformError::InvalidResponse(e.without_url().to_string()))
}

/// Pull the most specific error text out of a platform error body
fn describe_rejection(status: StatusCode, body: &str) -> String {
    let fallback = || format!("request failed with status {}", status.as_u16());

    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return fallback();
    };

    for key in ["error_description", "message", "error"] {
        match value.get(key) {
            Some(Value::String(text)) if !text.is_empty() => return text.clone(),
            Some(Value::Array(items)) if !items.is_empty() => {
                return items
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join("; ")
            }
            _ => {}
        }
    }

    fallback()
}
