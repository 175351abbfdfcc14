//! First-run seeding of the AI connector record.
//!
//! The environment surface is read exactly once at process start into an
//! [`EnvDefaults`] value and threaded explicitly into the seeder, with no
//! ad-hoc reads of process-global state later on. Once a record exists,
//! seeding is a no-op forever; manual edits are never overwritten.

use tracing::warn;

use crate::error::StoreError;
use crate::settings::{self, AiSettings};
use crate::settings_store::SettingsStore;

/// Seeding defaults captured from the environment at startup.
#[derive(Debug, Clone, Default)]
pub struct EnvDefaults {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub embed_model: Option<String>,
    pub embed_batch_size: Option<String>,
    pub chat_model_small: Option<String>,
    pub chat_model_large: Option<String>,
    pub max_tokens: Option<String>,
    pub temperature: Option<String>,
    pub refine_system_prompt: Option<String>,
}

impl EnvDefaults {
    /// Capture the `OPENAI_*` variables. Each is optional; missing ones
    /// fall back to the documented defaults at seed time.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok();
        Self {
            api_key: var("OPENAI_API_KEY"),
            base_url: var("OPENAI_BASE_URL"),
            embed_model: var("OPENAI_EMBED_MODEL"),
            embed_batch_size: var("OPENAI_EMBED_BATCH_SIZE"),
            chat_model_small: var("OPENAI_CHAT_MODEL_SMALL"),
            chat_model_large: var("OPENAI_CHAT_MODEL_LARGE"),
            max_tokens: var("OPENAI_MAX_TOKENS"),
            temperature: var("OPENAI_TEMPERATURE"),
            refine_system_prompt: var("OPENAI_REFINE_SYSTEM_PROMPT"),
        }
    }

    fn to_settings(&self) -> AiSettings {
        let api_key = self.api_key.clone().unwrap_or_default();
        AiSettings {
            // A present-but-empty key seeds a disabled record rather
            // than failing startup.
            enabled: !api_key.trim().is_empty(),
            api_key,
            base_url: self
                .base_url
                .clone()
                .unwrap_or_else(settings::default_base_url),
            embed_model: self
                .embed_model
                .clone()
                .unwrap_or_else(settings::default_embed_model),
            embed_batch_size: parse_or_default(
                "OPENAI_EMBED_BATCH_SIZE",
                self.embed_batch_size.as_deref(),
                settings::default_embed_batch_size(),
            ),
            chat_model_small: self
                .chat_model_small
                .clone()
                .unwrap_or_else(settings::default_chat_model_small),
            chat_model_large: self
                .chat_model_large
                .clone()
                .unwrap_or_else(settings::default_chat_model_large),
            max_tokens: parse_or_default(
                "OPENAI_MAX_TOKENS",
                self.max_tokens.as_deref(),
                settings::default_max_tokens(),
            ),
            temperature: parse_or_default(
                "OPENAI_TEMPERATURE",
                self.temperature.as_deref(),
                settings::default_temperature(),
            ),
            refine_system_prompt: self
                .refine_system_prompt
                .clone()
                .unwrap_or_else(settings::default_refine_system_prompt),
        }
    }
}

fn parse_or_default<T: std::str::FromStr>(name: &str, value: Option<&str>, default: T) -> T {
    match value {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(variable = name, value = raw, "unparseable value, using default");
            default
        }),
        None => default,
    }
}

/// What [`seed_ai_settings`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum SeedOutcome {
    /// A record already existed; nothing was written.
    AlreadyPresent,
    /// No record existed; this one was materialized and stored.
    Seeded(AiSettings),
}

/// Materialize the AI connector record from environment defaults when no
/// persisted record exists. Idempotent: a second call performs zero
/// writes.
pub async fn seed_ai_settings(
    store: &SettingsStore,
    defaults: &EnvDefaults,
) -> Result<SeedOutcome, StoreError> {
    if store.get_ai().await?.is_some() {
        return Ok(SeedOutcome::AlreadyPresent);
    }

    let seeded = store.upsert_ai(defaults.to_settings()).await?;
    Ok(SeedOutcome::Seeded(seeded))
}
