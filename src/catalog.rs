//! Snapshot ownership and the read-only catalog facade.
//!
//! [`ConfigurationService`] holds the current snapshot behind a
//! swap-only lock: the `Arc` is replaced, never mutated in place, so
//! readers that already hold a snapshot keep seeing a fully consistent
//! view and never a torn one. Only `refresh()` excludes itself (via an
//! async mutex) so two rebuilds cannot race to publish.

use std::sync::{Arc, RwLock};

use chrono::Utc;
use tracing::warn;

use crate::error::StoreError;
use crate::provider::{make_provider, DocumentProvider};
use crate::settings::{ProviderKey, ProviderKind};
use crate::settings_store::SettingsStore;
use crate::snapshot::ProviderSnapshot;

/// One provider excluded from the latest snapshot, and why.
#[derive(Debug, Clone)]
pub struct BuildIssue {
    pub key: ProviderKey,
    pub error: String,
}

pub struct ConfigurationService {
    store: SettingsStore,
    current: RwLock<Arc<ProviderSnapshot>>,
    diagnostics: RwLock<Arc<Vec<BuildIssue>>>,
    refresh_gate: tokio::sync::Mutex<()>,
}

impl ConfigurationService {
    /// Start with an empty snapshot; callers refresh explicitly.
    pub fn new(store: SettingsStore) -> Self {
        Self {
            store,
            current: RwLock::new(Arc::new(ProviderSnapshot::empty(Utc::now()))),
            diagnostics: RwLock::new(Arc::new(Vec::new())),
            refresh_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn store(&self) -> &SettingsStore {
        &self.store
    }

    /// The currently published snapshot. A pointer clone; never blocks
    /// on a refresh in progress.
    pub fn snapshot(&self) -> Arc<ProviderSnapshot> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Why providers are missing from the latest snapshot.
    pub fn diagnostics(&self) -> Arc<Vec<BuildIssue>> {
        self.diagnostics
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Re-read all settings, rebuild, and atomically publish the new
    /// snapshot. On a store failure the previous snapshot stays
    /// authoritative.
    pub async fn refresh(&self) -> Result<Arc<ProviderSnapshot>, StoreError> {
        let _gate = self.refresh_gate.lock().await;

        let settings_list = self.store.list().await?;

        let mut issues = Vec::new();
        let snapshot = Arc::new(ProviderSnapshot::build(
            settings_list,
            make_provider,
            Utc::now(),
            |settings, error| {
                warn!(provider = %settings.key(), %error, "provider excluded from snapshot");
                issues.push(BuildIssue {
                    key: settings.key(),
                    error: error.to_string(),
                });
            },
        ));

        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = snapshot.clone();
        *self
            .diagnostics
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::new(issues);

        Ok(snapshot)
    }
}

/// Read-only facade handed to chat/ask/index callers. Hides the refresh
/// mechanics: reads are always single-snapshot reads and never trigger a
/// refresh themselves.
#[derive(Clone)]
pub struct Catalog {
    service: Arc<ConfigurationService>,
}

impl Catalog {
    pub fn new(service: Arc<ConfigurationService>) -> Self {
        Self { service }
    }

    pub fn snapshot(&self) -> Arc<ProviderSnapshot> {
        self.service.snapshot()
    }

    /// All live providers, in stable key order.
    pub fn list_providers(&self) -> Vec<Arc<dyn DocumentProvider>> {
        let snapshot = self.service.snapshot();
        let mut entries: Vec<(ProviderKey, Arc<dyn DocumentProvider>)> = snapshot
            .providers()
            .iter()
            .map(|(k, p)| (k.clone(), p.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.into_iter().map(|(_, p)| p).collect()
    }

    /// Look up one live provider by kind and (case-insensitive) name.
    pub fn find_provider(
        &self,
        kind: ProviderKind,
        name: &str,
    ) -> Option<Arc<dyn DocumentProvider>> {
        self.service
            .snapshot()
            .provider(&ProviderKey::new(kind, name))
    }
}
