// ABOUTME: Installation record store interface and its SQLite implementation
// ABOUTME: Get / insert / update-by-key semantics with uniqueness enforced on insert

use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};
use thiserror::Error;
use tracing::{debug, error, info};

use super::types::InstallationRecord;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Installation already exists: {0}")]
    Duplicate(String),

    #[error("Installation not found: {0}")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Mutable columns of an installation record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallationField {
    RefreshToken,
    CompanyId,
    ProvisioningArtifactId,
}

impl InstallationField {
    pub fn column(&self) -> &'static str {
        match self {
            Self::RefreshToken => "refresh_token",
            Self::CompanyId => "company_id",
            Self::ProvisioningArtifactId => "onboarding_custom_value_id",
        }
    }
}

/// Keyed record store holding one installation per location
#[async_trait]
pub trait InstallationStore: Send + Sync {
    async fn get(&self, location_id: &str) -> StoreResult<Option<InstallationRecord>>;

    /// Fails with [`StoreError::Duplicate`] when the location already has a record
    async fn insert(&self, record: &InstallationRecord) -> StoreResult<()>;

    /// Fails with [`StoreError::NotFound`] when no record exists for the location
    async fn update_field(
        &self,
        location_id: &str,
        field: InstallationField,
        value: &str,
    ) -> StoreResult<()>;
}

/// SQLite-backed installation store
pub struct SqliteInstallationStore {
    pool: SqlitePool,
}

impl SqliteInstallationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` and apply pending migrations
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| {
                error!("Failed to connect to installation database: {}", e);
                StoreError::Unavailable(format!("Failed to connect to database: {}", e))
            })?;

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        info!("Running installation store migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl InstallationStore for SqliteInstallationStore {
    async fn get(&self, location_id: &str) -> StoreResult<Option<InstallationRecord>> {
        debug!("Fetching installation for location {}", location_id);

        let row = sqlx::query(
            r#"
            SELECT location_id, company_id, refresh_token, onboarding_custom_value_id
            FROM ghl_installations
            WHERE location_id = ?
            "#,
        )
        .bind(location_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(InstallationRecord {
                location_id: row.try_get("location_id")?,
                company_id: row.try_get("company_id")?,
                refresh_token: row.try_get("refresh_token")?,
                provisioning_artifact_id: row.try_get("onboarding_custom_value_id")?,
            })),
            None => {
                debug!("No installation found for location {}", location_id);
                Ok(None)
            }
        }
    }

    async fn insert(&self, record: &InstallationRecord) -> StoreResult<()> {
        debug!("Inserting installation for location {}", record.location_id);

        let result = sqlx::query(
            r#"
            INSERT INTO ghl_installations (
                location_id, company_id, refresh_token, onboarding_custom_value_id,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, unixepoch(), unixepoch())
            "#,
        )
        .bind(&record.location_id)
        .bind(&record.company_id)
        .bind(&record.refresh_token)
        .bind(&record.provisioning_artifact_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) => {
                // SQLITE_CONSTRAINT_PRIMARYKEY / SQLITE_CONSTRAINT_UNIQUE
                if let Some(code) = db_err.code() {
                    if code == "1555" || code == "2067" {
                        return Err(StoreError::Duplicate(record.location_id.clone()));
                    }
                }
                error!("Failed to insert installation: {}", db_err);
                Err(StoreError::Sqlx(sqlx::Error::Database(db_err)))
            }
            Err(e) => {
                error!("Failed to insert installation: {}", e);
                Err(StoreError::Sqlx(e))
            }
        }
    }

    async fn update_field(
        &self,
        location_id: &str,
        field: InstallationField,
        value: &str,
    ) -> StoreResult<()> {
        debug!(
            "Updating {} for location {}",
            field.column(),
            location_id
        );

        // Column names come from a closed enum, never from input
        let statement = format!(
            "UPDATE ghl_installations SET {} = ?, updated_at = unixepoch() WHERE location_id = ?",
            field.column()
        );

        let result = sqlx::query(&statement)
            .bind(value)
            .bind(location_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(location_id.to_string()));
        }

        Ok(())
    }
}
