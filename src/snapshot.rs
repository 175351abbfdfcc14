//! Immutable point-in-time view of provider configuration.
//!
//! A snapshot pairs every known settings value with the live provider
//! instances that could actually be constructed. It is never mutated
//! after construction; a refresh produces a wholly new snapshot, so
//! readers always observe either the old or the new one in full.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::ProviderError;
use crate::provider::DocumentProvider;
use crate::settings::{ProviderKey, ProviderSettings};

pub struct ProviderSnapshot {
    settings: HashMap<ProviderKey, ProviderSettings>,
    providers: HashMap<ProviderKey, Arc<dyn DocumentProvider>>,
    loaded_at: DateTime<Utc>,
}

impl ProviderSnapshot {
    /// A snapshot with no providers, used before the first refresh.
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            settings: HashMap::new(),
            providers: HashMap::new(),
            loaded_at: now,
        }
    }

    /// Build a snapshot from a settings listing.
    ///
    /// Every settings value lands in the `settings` map unconditionally.
    /// Enabled values are validated and handed to `factory`; a failure
    /// invokes `on_error` exactly once for that provider and the build
    /// continues; one failing provider never aborts the whole build.
    /// A key present in `settings` but absent from `providers` is either
    /// disabled or failed construction.
    pub fn build<F, E>(
        settings_list: Vec<ProviderSettings>,
        factory: F,
        now: DateTime<Utc>,
        mut on_error: E,
    ) -> Self
    where
        F: Fn(&ProviderSettings) -> Result<Arc<dyn DocumentProvider>, ProviderError>,
        E: FnMut(&ProviderSettings, &ProviderError),
    {
        let mut settings = HashMap::with_capacity(settings_list.len());
        let mut providers: HashMap<ProviderKey, Arc<dyn DocumentProvider>> = HashMap::new();

        for value in settings_list {
            let key = value.key();

            if value.enabled() {
                // The store validates on upsert; re-check here so an
                // invalid value can never reach a constructed provider.
                let construction = value
                    .validate()
                    .map_err(|e| ProviderError::construction(key.to_string(), e.message))
                    .and_then(|()| factory(&value));

                match construction {
                    Ok(provider) => {
                        providers.insert(key.clone(), provider);
                    }
                    Err(error) => on_error(&value, &error),
                }
            }

            settings.insert(key, value);
        }

        Self {
            settings,
            providers,
            loaded_at: now,
        }
    }

    /// All known settings, enabled or not.
    pub fn settings(&self) -> &HashMap<ProviderKey, ProviderSettings> {
        &self.settings
    }

    /// Providers that are enabled *and* constructed.
    pub fn providers(&self) -> &HashMap<ProviderKey, Arc<dyn DocumentProvider>> {
        &self.providers
    }

    pub fn setting(&self, key: &ProviderKey) -> Option<&ProviderSettings> {
        self.settings.get(key)
    }

    pub fn provider(&self, key: &ProviderKey) -> Option<Arc<dyn DocumentProvider>> {
        self.providers.get(key).cloned()
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Settings keys in stable display order.
    pub fn sorted_keys(&self) -> Vec<&ProviderKey> {
        let mut keys: Vec<&ProviderKey> = self.settings.keys().collect();
        keys.sort();
        keys
    }
}
