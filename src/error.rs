//! Error taxonomy for the configuration and sync core.
//!
//! Errors are scoped so that one misbehaving provider can never take the
//! whole service down: validation and construction failures are contained
//! at the snapshot-build boundary, sync failures at the per-provider plan
//! boundary, and store failures at the refresh boundary (the previously
//! published snapshot stays authoritative).

use thiserror::Error;

/// A settings value is malformed or incomplete.
///
/// Fatal to that provider only: the record is rejected at the store
/// boundary, or the provider is excluded from the snapshot.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid settings for '{provider}': {message}")]
pub struct ValidationError {
    /// Identity of the offending provider (e.g. `"object_storage:runbooks"`).
    pub provider: String,
    /// Human-readable description naming the field category at fault.
    pub message: String,
}

impl ValidationError {
    pub fn new(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

/// A fault in the settings backend, distinct from "no record exists"
/// (which is a valid `None` result, not an error).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connectivity or query failure in the SQLite backend.
    #[error("settings backend unavailable: {0}")]
    Backend(#[from] sqlx::Error),

    /// A persisted payload could not be decoded into a settings value.
    #[error("malformed settings payload for '{record}': {source}")]
    Payload {
        record: String,
        #[source]
        source: serde_json::Error,
    },

    /// An upsert was rejected because the value failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// A failure local to one provider instance.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Auth/connection setup failed while constructing the provider.
    /// Reported via the snapshot build callback; the provider is excluded
    /// from the `providers` map and the build continues.
    #[error("failed to construct provider '{provider}': {message}")]
    Construction { provider: String, message: String },

    /// Enumeration or fetch failed mid-plan. Aborts that provider's plan
    /// without affecting other providers.
    #[error("sync failed for provider '{provider}': {message}")]
    Sync { provider: String, message: String },
}

impl ProviderError {
    pub fn construction(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Construction {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn sync(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Sync {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Identity of the provider this error belongs to.
    pub fn provider(&self) -> &str {
        match self {
            Self::Construction { provider, .. } | Self::Sync { provider, .. } => provider,
        }
    }
}
