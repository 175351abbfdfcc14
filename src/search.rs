//! Semantic search over the chunk index.
//!
//! Embeds the query, scores every stored vector by cosine similarity in
//! Rust, and keeps the best-scoring chunk per document.

use anyhow::{bail, Result};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::embedding::{blob_to_vec, cosine_similarity, EmbeddingClient};
use crate::settings::AiSettings;
use crate::settings_store::SettingsStore;

/// A scored retrieval result: the best chunk of one document.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub document_id: String,
    pub provider: String,
    pub address: String,
    pub title: Option<String>,
    pub score: f64,
    /// Full text of the matched chunk.
    pub text: String,
}

pub async fn semantic_search(
    pool: &SqlitePool,
    ai: &AiSettings,
    query: &str,
    limit: usize,
) -> Result<Vec<SearchHit>> {
    let client = EmbeddingClient::new(ai)?;
    let query_vec = client.embed_query(query).await?;

    let rows = sqlx::query(
        r#"
        SELECT c.document_id, c.text, e.embedding,
               d.provider_type, d.provider_name, d.address, d.title
        FROM embeddings e
        JOIN chunks c ON c.id = e.chunk_id
        JOIN documents d ON d.id = c.document_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    // Best chunk per document
    let mut best: HashMap<String, SearchHit> = HashMap::new();
    for row in rows {
        let blob: Vec<u8> = row.get("embedding");
        let vector = blob_to_vec(&blob);
        let score = cosine_similarity(&query_vec, &vector) as f64;

        let document_id: String = row.get("document_id");
        let provider_type: String = row.get("provider_type");
        let provider_name: String = row.get("provider_name");

        let candidate = SearchHit {
            provider: format!("{provider_type}:{provider_name}"),
            address: row.get("address"),
            title: row.get("title"),
            text: row.get("text"),
            score,
            document_id: document_id.clone(),
        };

        match best.get(&document_id) {
            Some(existing) if existing.score >= score => {}
            _ => {
                best.insert(document_id, candidate);
            }
        }
    }

    let mut hits: Vec<SearchHit> = best.into_values().collect();
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.address.cmp(&b.address))
    });
    hits.truncate(limit);
    Ok(hits)
}

/// `shelf search` — print ranked results.
pub async fn run_search(
    pool: &SqlitePool,
    store: &SettingsStore,
    query: &str,
    limit: usize,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let Some(ai) = store.get_ai().await?.filter(|ai| ai.enabled) else {
        bail!("Search requires the AI connector. Set OPENAI_API_KEY and re-run `shelf init`.");
    };

    let hits = semantic_search(pool, &ai, query, limit).await?;
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (rank, hit) in hits.iter().enumerate() {
        let title = hit.title.as_deref().unwrap_or(&hit.address);
        println!(
            "{:>2}. [{:.3}] {} ({} {})",
            rank + 1,
            hit.score,
            title,
            hit.provider,
            hit.address
        );
        println!("    {}", snippet(&hit.text, 200));
    }

    Ok(())
}

/// First `max_chars` characters on one line.
pub fn snippet(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{cut}…")
    }
}
