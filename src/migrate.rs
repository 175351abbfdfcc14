use anyhow::Result;
use sqlx::SqlitePool;

/// Create the schema. Idempotent, safe to run on every startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Polymorphic settings records, one row per provider-kind-and-name.
    // The payload is the JSON-serialized settings value.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS provider_settings (
            provider_type TEXT NOT NULL,
            name TEXT NOT NULL,
            settings TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (provider_type, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Index metadata: one row per source document. change_token is the
    // source-supplied revision tag used for incremental sync diffing.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            provider_type TEXT NOT NULL,
            provider_name TEXT NOT NULL,
            address TEXT NOT NULL,
            change_token TEXT NOT NULL,
            title TEXT,
            content_type TEXT NOT NULL DEFAULT 'text/plain',
            updated_at INTEGER NOT NULL,
            indexed_at INTEGER NOT NULL,
            UNIQUE(provider_type, provider_name, address)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            UNIQUE(document_id, chunk_index),
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Embedding vectors stored as little-endian f32 blobs.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS embeddings (
            chunk_id TEXT PRIMARY KEY,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            FOREIGN KEY (chunk_id) REFERENCES chunks(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_provider ON documents(provider_type, provider_name)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_updated_at ON documents(updated_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
