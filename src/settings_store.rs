//! Persistence for provider and AI connector settings.
//!
//! One row per provider-kind-and-name pair, with the settings value
//! stored as a JSON payload and an `updated_at` stamp. Upserts always
//! re-validate and normalize before writing, and are a single atomic
//! insert-or-replace keyed by `(provider_type, name)`, so concurrent
//! upserts of the same key serialize at the store with last-writer-wins
//! semantics.

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::error::StoreError;
use crate::settings::{AiSettings, ProviderKey, ProviderSettings};

/// Row identity for the singleton AI connector record.
const AI_PROVIDER_TYPE: &str = "ai";

#[derive(Debug, Clone)]
pub struct SettingsStore {
    pool: SqlitePool,
}

impl SettingsStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// All persisted document-provider settings, enabled or not.
    pub async fn list(&self) -> Result<Vec<ProviderSettings>, StoreError> {
        let rows = sqlx::query(
            "SELECT provider_type, name, settings FROM provider_settings \
             WHERE provider_type != ? ORDER BY provider_type, name",
        )
        .bind(AI_PROVIDER_TYPE)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let provider_type: String = row.get("provider_type");
            let name: String = row.get("name");
            let payload: String = row.get("settings");
            let settings: ProviderSettings =
                serde_json::from_str(&payload).map_err(|source| StoreError::Payload {
                    record: format!("{provider_type}:{name}"),
                    source,
                })?;
            out.push(settings);
        }
        Ok(out)
    }

    /// Look up one provider's settings. `Ok(None)` means no record
    /// exists, a valid result rather than an error.
    pub async fn get(&self, key: &ProviderKey) -> Result<Option<ProviderSettings>, StoreError> {
        let row = sqlx::query(
            "SELECT settings FROM provider_settings WHERE provider_type = ? AND name = ?",
        )
        .bind(key.kind.as_str())
        .bind(key.name())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let payload: String = row.get("settings");
                let settings =
                    serde_json::from_str(&payload).map_err(|source| StoreError::Payload {
                        record: key.to_string(),
                        source,
                    })?;
                Ok(Some(settings))
            }
            None => Ok(None),
        }
    }

    /// Validate, normalize, and write a settings value. The store never
    /// holds an unvalidated record.
    pub async fn upsert(
        &self,
        settings: ProviderSettings,
    ) -> Result<ProviderSettings, StoreError> {
        settings.validate()?;
        let settings = settings.normalized();
        let key = settings.key();
        let payload = serde_json::to_string(&settings).map_err(|source| StoreError::Payload {
            record: key.to_string(),
            source,
        })?;

        sqlx::query(
            r#"
            INSERT INTO provider_settings (provider_type, name, settings, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(provider_type, name) DO UPDATE SET
                settings = excluded.settings,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key.kind.as_str())
        .bind(key.name())
        .bind(&payload)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(settings)
    }

    /// Remove a provider's record. Returns whether a row was deleted.
    pub async fn delete(&self, key: &ProviderKey) -> Result<bool, StoreError> {
        let result =
            sqlx::query("DELETE FROM provider_settings WHERE provider_type = ? AND name = ?")
                .bind(key.kind.as_str())
                .bind(key.name())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// The singleton AI connector record, if one has been seeded or set.
    pub async fn get_ai(&self) -> Result<Option<AiSettings>, StoreError> {
        let row = sqlx::query("SELECT settings FROM provider_settings WHERE provider_type = ?")
            .bind(AI_PROVIDER_TYPE)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let payload: String = row.get("settings");
                let settings =
                    serde_json::from_str(&payload).map_err(|source| StoreError::Payload {
                        record: AI_PROVIDER_TYPE.to_string(),
                        source,
                    })?;
                Ok(Some(settings))
            }
            None => Ok(None),
        }
    }

    /// Validate, normalize, and write the AI connector record. Idempotent
    /// upsert keyed by provider type.
    pub async fn upsert_ai(&self, settings: AiSettings) -> Result<AiSettings, StoreError> {
        settings.validate()?;
        let settings = settings.normalized();
        let payload = serde_json::to_string(&settings).map_err(|source| StoreError::Payload {
            record: AI_PROVIDER_TYPE.to_string(),
            source,
        })?;

        sqlx::query(
            r#"
            INSERT INTO provider_settings (provider_type, name, settings, updated_at)
            VALUES (?, '', ?, ?)
            ON CONFLICT(provider_type, name) DO UPDATE SET
                settings = excluded.settings,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(AI_PROVIDER_TYPE)
        .bind(&payload)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(settings)
    }
}
