use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Application configuration loaded from TOML.
///
/// Carries the database location and the chunking/indexing options.
/// Provider and AI connector settings live in the database, not here;
/// see [`crate::settings_store`].
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Chunking and sync-plan options.
#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    /// Maximum characters per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Optional cap on re-embedded documents per provider per sync;
    /// a staging/testing bound, not a correctness mechanism.
    #[serde(default)]
    pub max_files: Option<usize>,
    /// Delete index entries whose source no longer lists them. When
    /// false, stale entries are retained intentionally.
    #[serde(default = "default_true")]
    pub cleanup_orphaned_documents: bool,
    /// Bypass change-detection tokens and re-embed everything.
    #[serde(default)]
    pub force_full_reindex: bool,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            max_files: None,
            cleanup_orphaned_documents: true,
            force_full_reindex: false,
        }
    }
}

fn default_chunk_size() -> usize {
    2000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_true() -> bool {
    true
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.indexing.chunk_size == 0 {
        anyhow::bail!("indexing.chunk_size must be > 0");
    }
    if config.indexing.chunk_overlap >= config.indexing.chunk_size {
        anyhow::bail!("indexing.chunk_overlap must be smaller than indexing.chunk_size");
    }
    if config.indexing.max_files == Some(0) {
        anyhow::bail!("indexing.max_files must be >= 1 when set");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let toml = r#"
[db]
path = "data/shelf.sqlite"

[indexing]
chunk_size = 100
chunk_overlap = 100
"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shelf.toml");
        std::fs::write(&path, toml).unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn defaults_apply_when_indexing_section_missing() {
        let toml = "[db]\npath = \"data/shelf.sqlite\"\n";
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shelf.toml");
        std::fs::write(&path, toml).unwrap();
        let config = load_config(&path).unwrap();
        assert!(config.indexing.cleanup_orphaned_documents);
        assert!(!config.indexing.force_full_reindex);
        assert!(config.indexing.chunk_overlap < config.indexing.chunk_size);
    }
}
