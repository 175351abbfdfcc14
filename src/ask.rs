//! Question answering over the index: refine → retrieve → answer.

use anyhow::{bail, Result};
use sqlx::SqlitePool;
use tracing::warn;

use crate::llm::{ChatClient, ChatTier};
use crate::search::semantic_search;
use crate::settings_store::SettingsStore;

/// Number of retrieved chunks handed to the answer model.
const CONTEXT_LIMIT: usize = 6;

const ANSWER_SYSTEM_PROMPT: &str = "Answer the question using only the provided context. \
     If the context does not contain the answer, say so. \
     Cite the source addresses you used.";

/// `shelf ask` — answer a question against the indexed corpus.
pub async fn run_ask(pool: &SqlitePool, store: &SettingsStore, question: &str) -> Result<()> {
    if question.trim().is_empty() {
        bail!("Question must not be empty");
    }

    let Some(ai) = store.get_ai().await?.filter(|ai| ai.enabled) else {
        bail!("Ask requires the AI connector. Set OPENAI_API_KEY and re-run `shelf init`.");
    };

    let chat = ChatClient::new(&ai)?;

    // Refinement is best-effort: fall back to the raw question
    let refined = match chat.refine_query(question).await {
        Ok(refined) => refined,
        Err(e) => {
            warn!(error = %e, "query refinement failed, using the raw question");
            question.to_string()
        }
    };

    let hits = semantic_search(pool, &ai, &refined, CONTEXT_LIMIT).await?;

    let context = if hits.is_empty() {
        "(no indexed context matched the question)".to_string()
    } else {
        hits.iter()
            .map(|hit| format!("[{} {}]\n{}", hit.provider, hit.address, hit.text))
            .collect::<Vec<_>>()
            .join("\n\n---\n\n")
    };

    let user = format!("Context:\n\n{context}\n\nQuestion: {question}");
    let answer = chat.complete(ChatTier::Large, ANSWER_SYSTEM_PROMPT, &user).await?;

    println!("{}", answer.trim());

    if !hits.is_empty() {
        println!("\nSources:");
        for hit in &hits {
            println!("  [{:.3}] {} {}", hit.score, hit.provider, hit.address);
        }
    }

    Ok(())
}
