use async_trait::async_trait;
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::ProviderError;
use crate::provider::{extension_matches, DocumentEntry, DocumentProvider};
use crate::settings::{LocalSettings, ProviderKey, ProviderKind};

/// Connector for a local filesystem tree.
///
/// The change-detection token is `"{mtime}-{len}"`, which changes
/// whenever the file content is rewritten.
#[derive(Debug)]
pub struct LocalProvider {
    key: ProviderKey,
    settings: LocalSettings,
    exclude_set: GlobSet,
}

impl LocalProvider {
    pub fn new(settings: LocalSettings) -> Result<Self, ProviderError> {
        let key = ProviderKey::new(ProviderKind::Local, &settings.name);

        if !settings.root.is_dir() {
            return Err(ProviderError::construction(
                key.to_string(),
                format!("root does not exist: {}", settings.root.display()),
            ));
        }

        let mut default_excludes = vec![
            "**/.git/**".to_string(),
            "**/target/**".to_string(),
            "**/node_modules/**".to_string(),
        ];
        default_excludes.extend(settings.exclude_globs.clone());
        let exclude_set = build_globset(&default_excludes)
            .map_err(|e| ProviderError::construction(key.to_string(), e.to_string()))?;

        Ok(Self {
            key,
            settings,
            exclude_set,
        })
    }

    fn resolve(&self, address: &str) -> Result<PathBuf, ProviderError> {
        // Addresses come from our own enumeration, but never follow one
        // that escapes the root.
        if Path::new(address)
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(ProviderError::sync(
                self.key.to_string(),
                format!("address escapes provider root: {address}"),
            ));
        }
        Ok(self.settings.root.join(address))
    }
}

#[async_trait]
impl DocumentProvider for LocalProvider {
    fn key(&self) -> &ProviderKey {
        &self.key
    }

    async fn list_documents(&self) -> Result<Vec<DocumentEntry>, ProviderError> {
        let root = &self.settings.root;
        let mut entries = Vec::new();

        for entry in WalkDir::new(root) {
            let entry = entry
                .map_err(|e| ProviderError::sync(self.key.to_string(), e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let address = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if self.exclude_set.is_match(&address) {
                continue;
            }
            if !extension_matches(&self.settings.file_extensions, &address) {
                continue;
            }

            let metadata = entry
                .metadata()
                .map_err(|e| ProviderError::sync(self.key.to_string(), e.to_string()))?;
            let modified = metadata
                .modified()
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            let updated_at: DateTime<Utc> = modified.into();
            let len = metadata.len();

            entries.push(DocumentEntry {
                change_token: format!("{}-{}", updated_at.timestamp(), len),
                title: path.file_name().map(|n| n.to_string_lossy().to_string()),
                updated_at,
                size: Some(len as i64),
                address,
            });
        }

        entries.sort_by(|a, b| a.address.cmp(&b.address));
        Ok(entries)
    }

    async fn fetch(&self, address: &str) -> Result<Vec<u8>, ProviderError> {
        let path = self.resolve(address)?;
        std::fs::read(&path).map_err(|e| {
            ProviderError::sync(
                self.key.to_string(),
                format!("failed to read {}: {e}", path.display()),
            )
        })
    }
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn settings(root: &Path) -> LocalSettings {
        LocalSettings {
            name: "docs".to_string(),
            enabled: true,
            file_extensions: BTreeSet::from(["md".to_string(), "txt".to_string()]),
            root: root.to_path_buf(),
            exclude_globs: vec!["**/drafts/**".to_string()],
        }
    }

    #[tokio::test]
    async fn lists_matching_files_sorted_by_address() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.md"), "beta").unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        std::fs::write(dir.path().join("c.pdf"), "skipped").unwrap();
        std::fs::create_dir_all(dir.path().join("drafts")).unwrap();
        std::fs::write(dir.path().join("drafts/d.md"), "excluded").unwrap();

        let provider = LocalProvider::new(settings(dir.path())).unwrap();
        let entries = provider.list_documents().await.unwrap();

        let addresses: Vec<&str> = entries.iter().map(|e| e.address.as_str()).collect();
        assert_eq!(addresses, vec!["a.txt", "b.md"]);
        assert!(entries.iter().all(|e| !e.change_token.is_empty()));
    }

    #[tokio::test]
    async fn fetch_rejects_escaping_addresses() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalProvider::new(settings(dir.path())).unwrap();
        let err = provider.fetch("../outside.md").await.unwrap_err();
        assert!(err.to_string().contains("escapes"));
    }

    #[test]
    fn construction_fails_for_missing_root() {
        let err = LocalProvider::new(settings(Path::new("/nonexistent/docshelf-root")))
            .unwrap_err();
        assert!(matches!(err, ProviderError::Construction { .. }));
    }
}
