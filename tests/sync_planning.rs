//! Incremental sync planning and plan execution.

use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
use sqlx::Row;

use docshelf::config::IndexingConfig;
use docshelf::db;
use docshelf::indexer::{execute_plan, CancelFlag};
use docshelf::migrate::run_migrations;
use docshelf::provider::DocumentEntry;
use docshelf::provider_local::LocalProvider;
use docshelf::settings::{LocalSettings, ProviderKey, ProviderKind};
use docshelf::sync_plan::{build_plan, plan_provider, SyncAction, SyncOptions};

fn entry(address: &str, token: &str) -> DocumentEntry {
    DocumentEntry {
        address: address.to_string(),
        change_token: token.to_string(),
        title: None,
        updated_at: Utc::now(),
        size: None,
    }
}

fn prior(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(a, t)| (a.to_string(), t.to_string()))
        .collect()
}

fn key() -> ProviderKey {
    ProviderKey::new(ProviderKind::Local, "docs")
}

fn kinds(plan: &docshelf::sync_plan::SyncPlan) -> Vec<(String, String)> {
    plan.actions
        .iter()
        .map(|a| {
            let kind = match a {
                SyncAction::Reembed(_) => "reembed",
                SyncAction::Skip { .. } => "skip",
                SyncAction::Delete { .. } => "delete",
                SyncAction::Retain { .. } => "retain",
            };
            (kind.to_string(), a.address().to_string())
        })
        .collect()
}

// ─── the planning matrix ──────────────────────────────────────────────

#[test]
fn matching_token_skips_changed_reembeds_orphan_deletes() {
    let current = vec![entry("a", "t1"), entry("c", "t3")];
    let recorded = prior(&[("a", "t1"), ("b", "t2")]);
    let opts = SyncOptions {
        cleanup_orphaned_documents: true,
        force_full_reindex: false,
        max_files: None,
    };

    let plan = plan_provider(&key(), &current, &recorded, &opts);
    assert_eq!(
        kinds(&plan),
        vec![
            ("skip".to_string(), "a".to_string()),
            ("reembed".to_string(), "c".to_string()),
            ("delete".to_string(), "b".to_string()),
        ]
    );
}

#[test]
fn orphans_are_retained_when_cleanup_is_off() {
    let current = vec![entry("a", "t1"), entry("c", "t3")];
    let recorded = prior(&[("a", "t1"), ("b", "t2")]);
    let opts = SyncOptions {
        cleanup_orphaned_documents: false,
        force_full_reindex: false,
        max_files: None,
    };

    let plan = plan_provider(&key(), &current, &recorded, &opts);
    assert_eq!(
        kinds(&plan),
        vec![
            ("skip".to_string(), "a".to_string()),
            ("reembed".to_string(), "c".to_string()),
            ("retain".to_string(), "b".to_string()),
        ]
    );
    assert_eq!(plan.delete_count(), 0);
}

#[test]
fn force_full_reindex_reembeds_matching_tokens_too() {
    let current = vec![entry("a", "t1"), entry("c", "t3")];
    let recorded = prior(&[("a", "t1"), ("b", "t2")]);

    // Cleanup governs the orphan independently of the force flag
    let with_cleanup = plan_provider(
        &key(),
        &current,
        &recorded,
        &SyncOptions {
            cleanup_orphaned_documents: true,
            force_full_reindex: true,
            max_files: None,
        },
    );
    assert_eq!(
        kinds(&with_cleanup),
        vec![
            ("reembed".to_string(), "a".to_string()),
            ("reembed".to_string(), "c".to_string()),
            ("delete".to_string(), "b".to_string()),
        ]
    );

    let without_cleanup = plan_provider(
        &key(),
        &current,
        &recorded,
        &SyncOptions {
            cleanup_orphaned_documents: false,
            force_full_reindex: true,
            max_files: None,
        },
    );
    assert_eq!(
        kinds(&without_cleanup),
        vec![
            ("reembed".to_string(), "a".to_string()),
            ("reembed".to_string(), "c".to_string()),
            ("retain".to_string(), "b".to_string()),
        ]
    );
}

#[test]
fn max_files_truncates_only_the_reembed_set() {
    // All three current docs are new; one prior doc is orphaned
    let current = vec![entry("c", "t3"), entry("a", "t1"), entry("b", "t2")];
    let recorded = prior(&[("a", "old"), ("z", "t9")]);
    let opts = SyncOptions {
        cleanup_orphaned_documents: true,
        force_full_reindex: false,
        max_files: Some(1),
    };

    let plan = plan_provider(&key(), &current, &recorded, &opts);
    // Deterministic by address order: only "a" makes the cut
    assert_eq!(
        kinds(&plan),
        vec![
            ("reembed".to_string(), "a".to_string()),
            ("delete".to_string(), "z".to_string()),
        ]
    );
}

#[test]
fn plan_order_is_deterministic_regardless_of_input_order() {
    let forward = vec![entry("a", "t1"), entry("b", "t2"), entry("c", "t3")];
    let backward = vec![entry("c", "t3"), entry("b", "t2"), entry("a", "t1")];
    let recorded = prior(&[]);
    let opts = SyncOptions {
        cleanup_orphaned_documents: true,
        force_full_reindex: false,
        max_files: None,
    };

    let plan_a = plan_provider(&key(), &forward, &recorded, &opts);
    let plan_b = plan_provider(&key(), &backward, &recorded, &opts);
    assert_eq!(kinds(&plan_a), kinds(&plan_b));
}

#[test]
fn empty_source_with_cleanup_deletes_everything_recorded() {
    let recorded = prior(&[("a", "t1"), ("b", "t2")]);
    let opts = SyncOptions {
        cleanup_orphaned_documents: true,
        force_full_reindex: false,
        max_files: None,
    };

    let plan = plan_provider(&key(), &[], &recorded, &opts);
    assert_eq!(plan.delete_count(), 2);
    assert_eq!(plan.reembed_count(), 0);
}

// ─── execution against a live local provider ──────────────────────────

fn local_settings(root: &std::path::Path) -> LocalSettings {
    LocalSettings {
        name: "docs".to_string(),
        enabled: true,
        file_extensions: BTreeSet::from(["md".to_string()]),
        root: root.to_path_buf(),
        exclude_globs: Vec::new(),
    }
}

fn indexing() -> IndexingConfig {
    IndexingConfig {
        chunk_size: 200,
        chunk_overlap: 40,
        max_files: None,
        cleanup_orphaned_documents: true,
        force_full_reindex: false,
    }
}

#[tokio::test]
async fn sync_cycle_indexes_then_skips_then_reconciles_deletes() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("alpha.md"), "# Alpha\n\nFirst document.").unwrap();
    std::fs::write(dir.path().join("beta.md"), "# Beta\n\nSecond document.").unwrap();

    let pool = db::connect_in_memory().await.unwrap();
    run_migrations(&pool).await.unwrap();

    let provider = LocalProvider::new(local_settings(dir.path())).unwrap();
    let opts = SyncOptions {
        cleanup_orphaned_documents: true,
        force_full_reindex: false,
        max_files: None,
    };
    let cancel = CancelFlag::new();

    // First cycle: everything is new
    let plan = build_plan(&pool, &provider, &opts).await.unwrap();
    assert_eq!(plan.reembed_count(), 2);
    let outcome = execute_plan(&pool, &provider, &plan, None, &indexing(), &cancel)
        .await
        .unwrap();
    assert_eq!(outcome.reembedded, 2);
    assert!(outcome.chunks_written >= 2);

    let doc_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(doc_count, 2);

    // Second cycle: unchanged tokens are skipped, nothing re-embedded
    let plan = build_plan(&pool, &provider, &opts).await.unwrap();
    assert_eq!(plan.reembed_count(), 0);
    assert_eq!(plan.skip_count(), 2);

    // Remove a source file: the orphan is reconciled out of the index
    std::fs::remove_file(dir.path().join("beta.md")).unwrap();
    let plan = build_plan(&pool, &provider, &opts).await.unwrap();
    assert_eq!(plan.delete_count(), 1);
    let outcome = execute_plan(&pool, &provider, &plan, None, &indexing(), &cancel)
        .await
        .unwrap();
    assert_eq!(outcome.deleted, 1);

    let remaining: Vec<String> = sqlx::query("SELECT address FROM documents")
        .fetch_all(&pool)
        .await
        .unwrap()
        .into_iter()
        .map(|row| row.get("address"))
        .collect();
    assert_eq!(remaining, vec!["alpha.md".to_string()]);

    // Chunks for the deleted document are gone too
    let orphan_chunks: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM chunks WHERE document_id NOT IN (SELECT id FROM documents)",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(orphan_chunks, 0);
}

#[tokio::test]
async fn document_ids_are_stable_across_reindexing() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("alpha.md");
    std::fs::write(&file, "original content").unwrap();

    let pool = db::connect_in_memory().await.unwrap();
    run_migrations(&pool).await.unwrap();

    let provider = LocalProvider::new(local_settings(dir.path())).unwrap();
    let opts = SyncOptions {
        cleanup_orphaned_documents: true,
        force_full_reindex: true,
        max_files: None,
    };
    let cancel = CancelFlag::new();

    let plan = build_plan(&pool, &provider, &opts).await.unwrap();
    execute_plan(&pool, &provider, &plan, None, &indexing(), &cancel)
        .await
        .unwrap();
    let first_id: String = sqlx::query_scalar("SELECT id FROM documents")
        .fetch_one(&pool)
        .await
        .unwrap();

    std::fs::write(&file, "rewritten content").unwrap();
    let plan = build_plan(&pool, &provider, &opts).await.unwrap();
    execute_plan(&pool, &provider, &plan, None, &indexing(), &cancel)
        .await
        .unwrap();

    let second_id: String = sqlx::query_scalar("SELECT id FROM documents")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(first_id, second_id);
}

#[tokio::test]
async fn cancellation_stops_between_documents_and_reports_partial_outcome() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("alpha.md"), "content a").unwrap();

    let pool = db::connect_in_memory().await.unwrap();
    run_migrations(&pool).await.unwrap();

    let provider = LocalProvider::new(local_settings(dir.path())).unwrap();
    let opts = SyncOptions {
        cleanup_orphaned_documents: true,
        force_full_reindex: false,
        max_files: None,
    };

    let cancel = CancelFlag::new();
    cancel.cancel();

    let plan = build_plan(&pool, &provider, &opts).await.unwrap();
    let outcome = execute_plan(&pool, &provider, &plan, None, &indexing(), &cancel)
        .await
        .unwrap();

    assert!(outcome.cancelled);
    assert_eq!(outcome.reembedded, 0);

    let doc_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(doc_count, 0, "cancellation must leave the metadata untouched");
}
