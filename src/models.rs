//! Core data types for the index metadata store.

/// Index metadata for one source document. The body itself is not
/// retained; chunks carry the text.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub provider_type: String,
    pub provider_name: String,
    pub address: String,
    pub change_token: String,
    pub title: Option<String>,
    pub content_type: String,
    pub updated_at: i64,
    pub indexed_at: i64,
}

/// A chunk of a document's body text.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}
