// ABOUTME: Environment variable name constants
// ABOUTME: Centralized definitions of all environment variable names used across Omnya

// Platform OAuth client
pub const GHL_CLIENT_ID: &str = "GHL_CLIENT_ID";
pub const GHL_CLIENT_SECRET: &str = "GHL_CLIENT_SECRET";
pub const GHL_API_BASE_URL: &str = "GHL_API_BASE_URL";
pub const GHL_API_VERSION: &str = "GHL_API_VERSION";

// Installation store
pub const OMNYA_DATABASE_URL: &str = "OMNYA_DATABASE_URL";

// Provisioning
pub const OMNYA_COMPANY_LOCATION_ID: &str = "OMNYA_COMPANY_LOCATION_ID";
pub const OMNYA_ONBOARDING_FIELD_NAME: &str = "OMNYA_ONBOARDING_FIELD_NAME";
pub const OMNYA_ONBOARDING_INITIAL_VALUE: &str = "OMNYA_ONBOARDING_INITIAL_VALUE";

// Upstream HTTP behaviour
pub const OMNYA_HTTP_TIMEOUT_SECS: &str = "OMNYA_HTTP_TIMEOUT_SECS";
pub const OMNYA_RETRY_MAX_ATTEMPTS: &str = "OMNYA_RETRY_MAX_ATTEMPTS";
pub const OMNYA_RETRY_MAX_ELAPSED_SECS: &str = "OMNYA_RETRY_MAX_ELAPSED_SECS";

/// Values used when the corresponding variable is unset
pub mod defaults {
    pub const GHL_API_BASE_URL: &str = "https://services.leadconnectorhq.com";
    pub const GHL_API_VERSION: &str = "2021-07-28";
    pub const OMNYA_DATABASE_URL: &str = "sqlite://omnya.db?mode=rwc";

    /// Location id under which the company-level installation is stored
    pub const OMNYA_COMPANY_LOCATION_ID: &str = "companyOmnya";
    pub const OMNYA_ONBOARDING_FIELD_NAME: &str = "avance_onboarding";
    pub const OMNYA_ONBOARDING_INITIAL_VALUE: &str = "0";

    pub const OMNYA_HTTP_TIMEOUT_SECS: u64 = 30;
    pub const OMNYA_RETRY_MAX_ATTEMPTS: u32 = 3;
    pub const OMNYA_RETRY_MAX_ELAPSED_SECS: u64 = 10;
}
