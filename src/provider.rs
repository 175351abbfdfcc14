//! Document source abstraction.
//!
//! A [`DocumentProvider`] is a runtime connector bound to one validated,
//! enabled settings value. Providers live exactly as long as the snapshot
//! that constructed them, are never mutated after construction, and are
//! discarded wholesale on the next snapshot build.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ProviderError;
use crate::provider_drive::DriveProvider;
use crate::provider_local::LocalProvider;
use crate::provider_s3::S3Provider;
use crate::settings::{ProviderKey, ProviderSettings};

/// One document as enumerated at its source.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentEntry {
    /// Source-relative address (path, object key, drive path).
    pub address: String,
    /// Opaque source-supplied token that changes if and only if the
    /// document content changed since last observed.
    pub change_token: String,
    pub title: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub size: Option<i64>,
}

/// A connector to one document source.
///
/// Implementations enumerate and fetch documents; everything downstream
/// (diffing, chunking, embedding) is uniform across backends.
#[async_trait]
pub trait DocumentProvider: Send + Sync {
    /// Identity of the settings value this provider was built from.
    fn key(&self) -> &ProviderKey;

    /// Enumerate all currently-listed documents, sorted by address.
    async fn list_documents(&self) -> Result<Vec<DocumentEntry>, ProviderError>;

    /// Download one document's raw content.
    async fn fetch(&self, address: &str) -> Result<Vec<u8>, ProviderError>;
}

/// Construct the connector matching a settings variant.
///
/// The one place polymorphism over the settings union is resolved. The
/// match is total over all known variants: adding a source kind means
/// extending the union and this match, nothing else.
pub fn make_provider(
    settings: &ProviderSettings,
) -> Result<Arc<dyn DocumentProvider>, ProviderError> {
    match settings {
        ProviderSettings::Local(cfg) => Ok(Arc::new(LocalProvider::new(cfg.clone())?)),
        ProviderSettings::ObjectStorage(cfg) => Ok(Arc::new(S3Provider::new(cfg.clone())?)),
        ProviderSettings::CloudDrive(cfg) => Ok(Arc::new(DriveProvider::new(cfg.clone())?)),
    }
}

/// Case-insensitive extension filter shared by all connectors.
///
/// Extensions may be configured with or without a leading dot.
pub(crate) fn extension_matches(extensions: &BTreeSet<String>, address: &str) -> bool {
    let ext = match address.rsplit('/').next().and_then(|f| f.rsplit_once('.')) {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext.to_lowercase(),
        _ => return false,
    };
    extensions
        .iter()
        .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(&ext))
}
