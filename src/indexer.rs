//! Sync plan execution: fetch, chunk, embed, upsert/delete.
//!
//! Each document is applied in its own transaction, and the cancel flag
//! is checked between documents; cancellation returns a partial outcome
//! but never leaves a half-written document behind. Embedding is inline
//! and non-fatal: an embedding failure leaves chunks indexed with their
//! vectors pending, it does not fail the document.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::chunk::chunk_text;
use crate::config::IndexingConfig;
use crate::embedding::{vec_to_blob, EmbeddingClient};
use crate::models::Chunk;
use crate::provider::{DocumentEntry, DocumentProvider};
use crate::settings::{AiSettings, ProviderKey};
use crate::sync_plan::{SyncAction, SyncPlan};

/// Cooperative cancellation handle, checked between documents.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Counters from executing one provider's plan.
#[derive(Debug, Clone, Default)]
pub struct IndexOutcome {
    pub reembedded: u64,
    pub skipped: u64,
    pub deleted: u64,
    pub retained: u64,
    pub chunks_written: u64,
    pub embeddings_written: u64,
    pub embeddings_pending: u64,
    pub cancelled: bool,
}

/// Apply a sync plan against the index.
///
/// A fetch failure aborts this provider's remaining plan (other
/// providers are unaffected; the caller isolates per provider).
pub async fn execute_plan(
    pool: &SqlitePool,
    provider: &dyn DocumentProvider,
    plan: &SyncPlan,
    ai: Option<&AiSettings>,
    indexing: &IndexingConfig,
    cancel: &CancelFlag,
) -> Result<IndexOutcome> {
    let embedder = match ai {
        Some(settings) if settings.enabled => match EmbeddingClient::new(settings) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(provider = %plan.key, error = %e, "embedding unavailable, vectors left pending");
                None
            }
        },
        _ => None,
    };

    let mut outcome = IndexOutcome::default();

    for action in &plan.actions {
        if cancel.is_cancelled() {
            outcome.cancelled = true;
            break;
        }

        match action {
            SyncAction::Reembed(entry) => {
                let bytes = provider.fetch(&entry.address).await?;
                let body = String::from_utf8_lossy(&bytes).to_string();

                let (doc_id, chunks) =
                    write_document(pool, &plan.key, entry, &body, indexing).await?;
                outcome.reembedded += 1;
                outcome.chunks_written += chunks.len() as u64;

                if let Some(client) = &embedder {
                    let (written, pending) = embed_chunks(pool, client, &chunks).await;
                    outcome.embeddings_written += written;
                    outcome.embeddings_pending += pending;
                }
                debug!(provider = %plan.key, address = %entry.address, %doc_id, "document reindexed");
            }
            SyncAction::Skip { .. } => {
                outcome.skipped += 1;
            }
            SyncAction::Delete { address } => {
                if delete_document(pool, &plan.key, address).await? {
                    outcome.deleted += 1;
                }
            }
            SyncAction::Retain { address } => {
                debug!(provider = %plan.key, address, "orphaned document retained");
                outcome.retained += 1;
            }
        }
    }

    Ok(outcome)
}

/// Upsert the document row and replace its chunks in one transaction.
async fn write_document(
    pool: &SqlitePool,
    key: &ProviderKey,
    entry: &DocumentEntry,
    body: &str,
    indexing: &IndexingConfig,
) -> Result<(String, Vec<Chunk>)> {
    let mut tx = pool.begin().await?;

    let existing_id: Option<String> = sqlx::query_scalar(
        "SELECT id FROM documents WHERE provider_type = ? AND provider_name = ? AND address = ?",
    )
    .bind(key.kind.as_str())
    .bind(key.name())
    .bind(&entry.address)
    .fetch_optional(&mut *tx)
    .await?;

    let doc_id = existing_id.unwrap_or_else(|| Uuid::new_v4().to_string());

    sqlx::query(
        r#"
        INSERT INTO documents
            (id, provider_type, provider_name, address, change_token, title, content_type, updated_at, indexed_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(provider_type, provider_name, address) DO UPDATE SET
            change_token = excluded.change_token,
            title = excluded.title,
            updated_at = excluded.updated_at,
            indexed_at = excluded.indexed_at
        "#,
    )
    .bind(&doc_id)
    .bind(key.kind.as_str())
    .bind(key.name())
    .bind(&entry.address)
    .bind(&entry.change_token)
    .bind(&entry.title)
    .bind("text/plain")
    .bind(entry.updated_at.timestamp())
    .bind(Utc::now().timestamp())
    .execute(&mut *tx)
    .await?;

    let chunks = chunk_text(&doc_id, body, indexing.chunk_size, indexing.chunk_overlap);

    sqlx::query(
        "DELETE FROM embeddings WHERE chunk_id IN (SELECT id FROM chunks WHERE document_id = ?)",
    )
    .bind(&doc_id)
    .execute(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM chunks WHERE document_id = ?")
        .bind(&doc_id)
        .execute(&mut *tx)
        .await?;

    for chunk in &chunks {
        sqlx::query(
            "INSERT INTO chunks (id, document_id, chunk_index, text, hash) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.text)
        .bind(&chunk.hash)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok((doc_id, chunks))
}

/// Remove a document, its chunks, and its vectors. Returns whether a
/// row existed.
async fn delete_document(pool: &SqlitePool, key: &ProviderKey, address: &str) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let doc_id: Option<String> = sqlx::query_scalar(
        "SELECT id FROM documents WHERE provider_type = ? AND provider_name = ? AND address = ?",
    )
    .bind(key.kind.as_str())
    .bind(key.name())
    .bind(address)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(doc_id) = doc_id else {
        tx.commit().await?;
        return Ok(false);
    };

    sqlx::query(
        "DELETE FROM embeddings WHERE chunk_id IN (SELECT id FROM chunks WHERE document_id = ?)",
    )
    .bind(&doc_id)
    .execute(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM chunks WHERE document_id = ?")
        .bind(&doc_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(&doc_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(true)
}

/// Embed and store vectors for freshly written chunks. Non-fatal:
/// failures leave the vectors pending.
async fn embed_chunks(
    pool: &SqlitePool,
    client: &EmbeddingClient,
    chunks: &[Chunk],
) -> (u64, u64) {
    let embeddable: Vec<&Chunk> = chunks.iter().filter(|c| !c.text.is_empty()).collect();
    if embeddable.is_empty() {
        return (0, 0);
    }

    let texts: Vec<String> = embeddable.iter().map(|c| c.text.clone()).collect();
    let vectors = match client.embed(&texts).await {
        Ok(vectors) => vectors,
        Err(e) => {
            warn!(error = %e, "embedding batch failed, vectors left pending");
            return (0, embeddable.len() as u64);
        }
    };

    let mut written = 0u64;
    for (chunk, vector) in embeddable.iter().zip(vectors.iter()) {
        let result = sqlx::query(
            "INSERT OR REPLACE INTO embeddings (chunk_id, model, dims, embedding) VALUES (?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(client.model())
        .bind(vector.len() as i64)
        .bind(vec_to_blob(vector))
        .execute(pool)
        .await;

        match result {
            Ok(_) => written += 1,
            Err(e) => {
                warn!(chunk_id = %chunk.id, error = %e, "failed to store embedding");
            }
        }
    }

    let pending = embeddable.len() as u64 - written;
    (written, pending)
}
