// ABOUTME: Runtime configuration for the installation service
// ABOUTME: Loads platform credentials, provisioning defaults and retry limits from the environment

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use omnya_config::{constants as env, defaults};
use url::Url;

use crate::error::{AuthError, AuthResult};
use crate::installation::retry::RetryPolicy;

/// Connection settings for the third-party platform
#[derive(Clone)]
pub struct PlatformConfig {
    pub base_url: Url,
    pub client_id: String,
    pub client_secret: String,
    pub api_version: String,
    pub timeout: Duration,
}

impl PlatformConfig {
    pub fn new(
        base_url: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> AuthResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AuthError::Configuration(format!("Invalid platform URL: {}", e)))?;

        Ok(Self {
            base_url,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            api_version: defaults::GHL_API_VERSION.to_string(),
            timeout: Duration::from_secs(defaults::OMNYA_HTTP_TIMEOUT_SECS),
        })
    }
}

impl fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("base_url", &self.base_url.as_str())
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("api_version", &self.api_version)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// What the provisioning flow creates and where it finds the company credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningConfig {
    /// Sentinel location id of the company-level installation
    pub company_location_id: String,
    pub onboarding_field_name: String,
    pub onboarding_initial_value: String,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            company_location_id: defaults::OMNYA_COMPANY_LOCATION_ID.to_string(),
            onboarding_field_name: defaults::OMNYA_ONBOARDING_FIELD_NAME.to_string(),
            onboarding_initial_value: defaults::OMNYA_ONBOARDING_INITIAL_VALUE.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub database_url: String,
    pub platform: PlatformConfig,
    pub provisioning: ProvisioningConfig,
    pub retry: RetryPolicy,
}

impl AuthConfig {
    pub fn from_env() -> AuthResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> AuthResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let require = |name: &str| {
            get(name).ok_or_else(|| AuthError::Configuration(format!("{} is required", name)))
        };

        let mut platform = PlatformConfig::new(
            &get(env::GHL_API_BASE_URL).unwrap_or_else(|| defaults::GHL_API_BASE_URL.to_string()),
            require(env::GHL_CLIENT_ID)?,
            require(env::GHL_CLIENT_SECRET)?,
        )?;
        if let Some(version) = get(env::GHL_API_VERSION) {
            platform.api_version = version;
        }
        platform.timeout = Duration::from_secs(parse_or(
            get(env::OMNYA_HTTP_TIMEOUT_SECS),
            env::OMNYA_HTTP_TIMEOUT_SECS,
            defaults::OMNYA_HTTP_TIMEOUT_SECS,
        )?);

        let provisioning = ProvisioningConfig {
            company_location_id: get(env::OMNYA_COMPANY_LOCATION_ID)
                .unwrap_or_else(|| defaults::OMNYA_COMPANY_LOCATION_ID.to_string()),
            onboarding_field_name: get(env::OMNYA_ONBOARDING_FIELD_NAME)
                .unwrap_or_else(|| defaults::OMNYA_ONBOARDING_FIELD_NAME.to_string()),
            onboarding_initial_value: get(env::OMNYA_ONBOARDING_INITIAL_VALUE)
                .unwrap_or_else(|| defaults::OMNYA_ONBOARDING_INITIAL_VALUE.to_string()),
        };

        let retry = RetryPolicy {
            max_attempts: parse_or(
                get(env::OMNYA_RETRY_MAX_ATTEMPTS),
                env::OMNYA_RETRY_MAX_ATTEMPTS,
                defaults::OMNYA_RETRY_MAX_ATTEMPTS,
            )?,
            max_elapsed: Duration::from_secs(parse_or(
                get(env::OMNYA_RETRY_MAX_ELAPSED_SECS),
                env::OMNYA_RETRY_MAX_ELAPSED_SECS,
                defaults::OMNYA_RETRY_MAX_ELAPSED_SECS,
            )?),
            ..RetryPolicy::default()
        };

        Ok(Self {
            database_url: get(env::OMNYA_DATABASE_URL)
                .unwrap_or_else(|| defaults::OMNYA_DATABASE_URL.to_string()),
            platform,
            provisioning,
            retry,
        })
    }
}

fn parse_or<T: FromStr>(value: Option<String>, name: &str, default: T) -> AuthResult<T> {
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AuthError::Configuration(format!("Invalid {}: {}", name, raw))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_applied() {
        let config = AuthConfig::from_lookup(lookup(&[
            ("GHL_CLIENT_ID", "client"),
            ("GHL_CLIENT_SECRET", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.platform.base_url.as_str(), "https://services.leadconnectorhq.com/");
        assert_eq!(config.platform.api_version, "2021-07-28");
        assert_eq!(config.platform.timeout, Duration::from_secs(30));
        assert_eq!(config.provisioning.company_location_id, "companyOmnya");
        assert_eq!(config.provisioning.onboarding_field_name, "avance_onboarding");
        assert_eq!(config.provisioning.onboarding_initial_value, "0");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.database_url, "sqlite://omnya.db?mode=rwc");
    }

    #[test]
    fn test_overrides() {
        let config = AuthConfig::from_lookup(lookup(&[
            ("GHL_CLIENT_ID", "client"),
            ("GHL_CLIENT_SECRET", "secret"),
            ("GHL_API_BASE_URL", "http://localhost:9000"),
            ("OMNYA_COMPANY_LOCATION_ID", "companyAcme"),
            ("OMNYA_RETRY_MAX_ATTEMPTS", "5"),
            ("OMNYA_HTTP_TIMEOUT_SECS", "7"),
        ]))
        .unwrap();

        assert_eq!(config.platform.base_url.as_str(), "http://localhost:9000/");
        assert_eq!(config.provisioning.company_location_id, "companyAcme");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.platform.timeout, Duration::from_secs(7));
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let result = AuthConfig::from_lookup(lookup(&[("GHL_CLIENT_ID", "client")]));
        match result {
            Err(AuthError::Configuration(message)) => {
                assert!(message.contains("GHL_CLIENT_SECRET"))
            }
            other => panic!("Expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_number_rejected() {
        let result = AuthConfig::from_lookup(lookup(&[
            ("GHL_CLIENT_ID", "client"),
            ("GHL_CLIENT_SECRET", "secret"),
            ("OMNYA_RETRY_MAX_ATTEMPTS", "many"),
        ]));
        assert!(matches!(result, Err(AuthError::Configuration(_))));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = PlatformConfig::new("http://localhost", "client", "hunter2").unwrap();
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}
