//! Incremental sync planning.
//!
//! Per provider and per sync cycle: enumerate the source, load the
//! previously recorded `(address → change token)` pairs from index
//! metadata, and diff the two into an ordered plan of reembed / skip /
//! delete / retain actions. The diff itself ([`plan_provider`]) performs
//! no I/O; [`build_plan`] performs only the enumeration and metadata
//! load. Executing the plan is the indexer's job.

use std::collections::{HashMap, HashSet};

use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::error::ProviderError;
use crate::provider::{DocumentEntry, DocumentProvider};
use crate::settings::ProviderKey;

/// One planned action for one document address.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncAction {
    /// Fetch, chunk, and embed this document (new or changed content,
    /// or a forced full reindex).
    Reembed(DocumentEntry),
    /// Change token matches the recorded one — leave the index alone.
    Skip { address: String },
    /// The source no longer lists this address; remove it from the index.
    Delete { address: String },
    /// The source no longer lists this address, but orphan cleanup is
    /// off — keep the stale entry intentionally.
    Retain { address: String },
}

impl SyncAction {
    pub fn address(&self) -> &str {
        match self {
            Self::Reembed(entry) => &entry.address,
            Self::Skip { address } | Self::Delete { address } | Self::Retain { address } => address,
        }
    }
}

/// Plan-shaping options, straight from the indexing configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    pub cleanup_orphaned_documents: bool,
    pub force_full_reindex: bool,
    pub max_files: Option<usize>,
}

/// The ordered action list for one provider.
#[derive(Debug, Clone)]
pub struct SyncPlan {
    pub key: ProviderKey,
    pub actions: Vec<SyncAction>,
}

impl SyncPlan {
    pub fn reembed_count(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| matches!(a, SyncAction::Reembed(_)))
            .count()
    }

    pub fn skip_count(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| matches!(a, SyncAction::Skip { .. }))
            .count()
    }

    pub fn delete_count(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| matches!(a, SyncAction::Delete { .. }))
            .count()
    }

    pub fn retain_count(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| matches!(a, SyncAction::Retain { .. }))
            .count()
    }
}

/// Diff the current listing against the recorded tokens.
///
/// Pure with respect to I/O. Current entries are processed in address
/// order; orphans follow, also in address order. `max_files` truncates
/// only the reembed set (deterministically, by address order) and never
/// affects skip/delete/retain decisions. The cleanup flag alone governs
/// deletion — `force_full_reindex` has no bearing on orphans, the two
/// address orthogonal concerns.
pub fn plan_provider(
    key: &ProviderKey,
    current: &[DocumentEntry],
    prior: &HashMap<String, String>,
    opts: &SyncOptions,
) -> SyncPlan {
    let mut listed: Vec<&DocumentEntry> = current.iter().collect();
    listed.sort_by(|a, b| a.address.cmp(&b.address));

    let current_addresses: HashSet<&str> =
        listed.iter().map(|e| e.address.as_str()).collect();

    let mut actions = Vec::with_capacity(listed.len());
    let mut reembed_budget = opts.max_files;
    let mut dropped = 0usize;

    for entry in listed {
        let stale = opts.force_full_reindex
            || prior
                .get(&entry.address)
                .map_or(true, |token| *token != entry.change_token);

        if !stale {
            actions.push(SyncAction::Skip {
                address: entry.address.clone(),
            });
            continue;
        }

        match reembed_budget.as_mut() {
            Some(0) => dropped += 1,
            Some(budget) => {
                *budget -= 1;
                actions.push(SyncAction::Reembed(entry.clone()));
            }
            None => actions.push(SyncAction::Reembed(entry.clone())),
        }
    }

    if dropped > 0 {
        debug!(provider = %key, dropped, "max_files cap left documents unplanned this cycle");
    }

    // Orphans: recorded addresses the source no longer lists
    let mut orphans: Vec<&String> = prior
        .keys()
        .filter(|address| !current_addresses.contains(address.as_str()))
        .collect();
    orphans.sort();

    for address in orphans {
        if opts.cleanup_orphaned_documents {
            actions.push(SyncAction::Delete {
                address: address.clone(),
            });
        } else {
            actions.push(SyncAction::Retain {
                address: address.clone(),
            });
        }
    }

    SyncPlan {
        key: key.clone(),
        actions,
    }
}

/// Load the recorded `(address → change token)` pairs for one provider.
pub async fn load_prior_tokens(
    pool: &SqlitePool,
    key: &ProviderKey,
) -> Result<HashMap<String, String>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT address, change_token FROM documents \
         WHERE provider_type = ? AND provider_name = ?",
    )
    .bind(key.kind.as_str())
    .bind(key.name())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| (row.get("address"), row.get("change_token")))
        .collect())
}

/// Steps 1–2 of the sync cycle for one provider: enumerate the source,
/// load recorded tokens, and diff. Enumeration failures abort this
/// provider's plan only.
pub async fn build_plan(
    pool: &SqlitePool,
    provider: &dyn DocumentProvider,
    opts: &SyncOptions,
) -> Result<SyncPlan, ProviderError> {
    let key = provider.key().clone();
    let current = provider.list_documents().await?;
    let prior = load_prior_tokens(pool, &key)
        .await
        .map_err(|e| ProviderError::sync(key.to_string(), e.to_string()))?;
    Ok(plan_provider(&key, &current, &prior, opts))
}
