//! Provider and AI connector settings.
//!
//! Source configurations are a closed tagged union over the three
//! supported backends. Every variant is validated independently; a value
//! that fails [`ProviderSettings::validate`] never reaches a constructed
//! provider. Settings are value-like and immutable: the one permitted
//! normalization (appending a trailing separator to base-URL-like fields)
//! returns a new value instead of mutating in place.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Discriminator for the supported source backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Local,
    ObjectStorage,
    CloudDrive,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::ObjectStorage => "object_storage",
            Self::CloudDrive => "cloud_drive",
        }
    }

    /// Parse a kind from its CLI/storage spelling.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "local" => Some(Self::Local),
            "object_storage" | "s3" => Some(Self::ObjectStorage),
            "cloud_drive" | "drive" => Some(Self::CloudDrive),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one provider instance: `(kind, name)`, case-insensitive
/// on the name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProviderKey {
    pub kind: ProviderKind,
    name: String,
}

impl ProviderKey {
    pub fn new(kind: ProviderKind, name: &str) -> Self {
        Self {
            kind,
            name: name.trim().to_lowercase(),
        }
    }

    /// The lowercased instance name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ProviderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

/// Account tier for cloud-drive sources. Business tenants address a
/// specific drive or site; personal accounts use the default drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveTier {
    #[default]
    Business,
    Personal,
}

/// Settings for a local filesystem source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalSettings {
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub file_extensions: BTreeSet<String>,
    #[serde(default)]
    pub root: PathBuf,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

/// Settings for an S3-compatible object storage source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectStorageSettings {
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub file_extensions: BTreeSet<String>,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    /// Use ambient identity (environment/instance credentials) instead of
    /// an explicit key pair.
    #[serde(default)]
    pub use_instance_profile: bool,
    /// Custom endpoint for S3-compatible services (MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

impl ObjectStorageSettings {
    fn has_credential_pair(&self) -> bool {
        matches!(
            (&self.access_key_id, &self.secret_access_key),
            (Some(id), Some(secret)) if !id.trim().is_empty() && !secret.trim().is_empty()
        )
    }

    fn has_partial_credentials(&self) -> bool {
        let id = self.access_key_id.as_deref().unwrap_or("").trim();
        let secret = self.secret_access_key.as_deref().unwrap_or("").trim();
        (id.is_empty()) != (secret.is_empty())
    }
}

/// Settings for a Microsoft Graph cloud-drive source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudDriveSettings {
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub file_extensions: BTreeSet<String>,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub tier: DriveTier,
    #[serde(default)]
    pub drive_id: Option<String>,
    #[serde(default)]
    pub site_id: Option<String>,
}

/// Validated configuration for one document source.
///
/// A closed union: adding a new source kind means extending this enum and
/// the factory match in [`crate::provider::make_provider`], nothing else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderSettings {
    Local(LocalSettings),
    ObjectStorage(ObjectStorageSettings),
    CloudDrive(CloudDriveSettings),
}

impl ProviderSettings {
    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Local(_) => ProviderKind::Local,
            Self::ObjectStorage(_) => ProviderKind::ObjectStorage,
            Self::CloudDrive(_) => ProviderKind::CloudDrive,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Local(s) => &s.name,
            Self::ObjectStorage(s) => &s.name,
            Self::CloudDrive(s) => &s.name,
        }
    }

    pub fn enabled(&self) -> bool {
        match self {
            Self::Local(s) => s.enabled,
            Self::ObjectStorage(s) => s.enabled,
            Self::CloudDrive(s) => s.enabled,
        }
    }

    pub fn file_extensions(&self) -> &BTreeSet<String> {
        match self {
            Self::Local(s) => &s.file_extensions,
            Self::ObjectStorage(s) => &s.file_extensions,
            Self::CloudDrive(s) => &s.file_extensions,
        }
    }

    pub fn key(&self) -> ProviderKey {
        ProviderKey::new(self.kind(), self.name())
    }

    /// Check this value against its variant's rules.
    ///
    /// Disabled configs are exempt entirely; they may be structurally
    /// incomplete. Enabled configs must carry non-empty identifying
    /// fields, a usable auth path, and at least one file extension.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.enabled() {
            return Ok(());
        }

        let id = self.key().to_string();
        if self.name().trim().is_empty() {
            return Err(ValidationError::new(id, "provider name must not be empty"));
        }
        if self.file_extensions().is_empty() {
            return Err(ValidationError::new(
                id,
                "at least one file extension filter is required",
            ));
        }

        match self {
            Self::Local(s) => {
                if s.root.as_os_str().is_empty() {
                    return Err(ValidationError::new(id, "root path must not be empty"));
                }
            }
            Self::ObjectStorage(s) => {
                if s.bucket.trim().is_empty() {
                    return Err(ValidationError::new(id, "bucket name must not be empty"));
                }
                if s.region.trim().is_empty() {
                    return Err(ValidationError::new(id, "region must not be empty"));
                }
                if s.has_partial_credentials() {
                    return Err(ValidationError::new(
                        id,
                        "credentials must include both access key id and secret",
                    ));
                }
                if !s.has_credential_pair() && !s.use_instance_profile {
                    return Err(ValidationError::new(
                        id,
                        "credentials required: set an access key pair or enable the instance profile",
                    ));
                }
            }
            Self::CloudDrive(s) => {
                if s.tenant_id.trim().is_empty() {
                    return Err(ValidationError::new(id, "tenant id must not be empty"));
                }
                if s.client_id.trim().is_empty() {
                    return Err(ValidationError::new(id, "client id must not be empty"));
                }
                if s.client_secret.trim().is_empty() {
                    return Err(ValidationError::new(id, "client secret must not be empty"));
                }
                if s.tier == DriveTier::Business
                    && s.drive_id.as_deref().unwrap_or("").trim().is_empty()
                    && s.site_id.as_deref().unwrap_or("").trim().is_empty()
                {
                    return Err(ValidationError::new(
                        id,
                        "business-tier drives require a drive id or site id",
                    ));
                }
            }
        }

        Ok(())
    }

    /// Return a copy with base-URL-like fields normalized to end with a
    /// separator so relative paths compose. The only normalization
    /// settings ever undergo.
    pub fn normalized(mut self) -> Self {
        if let Self::ObjectStorage(ref mut s) = self {
            if let Some(ref mut url) = s.endpoint_url {
                normalize_base_url(url);
            }
        }
        self
    }
}

/// Configuration for the language-model connector: one record per
/// deployment, persisted alongside the provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_embed_model")]
    pub embed_model: String,
    #[serde(default = "default_embed_batch_size")]
    pub embed_batch_size: usize,
    #[serde(default = "default_chat_model_small")]
    pub chat_model_small: String,
    #[serde(default = "default_chat_model_large")]
    pub chat_model_large: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_refine_system_prompt")]
    pub refine_system_prompt: String,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            base_url: default_base_url(),
            embed_model: default_embed_model(),
            embed_batch_size: default_embed_batch_size(),
            chat_model_small: default_chat_model_small(),
            chat_model_large: default_chat_model_large(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            refine_system_prompt: default_refine_system_prompt(),
        }
    }
}

pub(crate) fn default_base_url() -> String {
    "https://api.openai.com/v1/".to_string()
}
pub(crate) fn default_embed_model() -> String {
    "text-embedding-3-small".to_string()
}
pub(crate) fn default_embed_batch_size() -> usize {
    64
}
pub(crate) fn default_chat_model_small() -> String {
    "gpt-4o-mini".to_string()
}
pub(crate) fn default_chat_model_large() -> String {
    "gpt-4o".to_string()
}
pub(crate) fn default_max_tokens() -> u32 {
    1024
}
pub(crate) fn default_temperature() -> f32 {
    0.2
}
pub(crate) fn default_refine_system_prompt() -> String {
    "Rewrite the user's question as a concise, self-contained search query. \
     Reply with the query only."
        .to_string()
}

impl AiSettings {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.enabled {
            return Ok(());
        }
        if self.api_key.trim().is_empty() {
            return Err(ValidationError::new("ai", "api key must not be empty"));
        }
        if self.base_url.trim().is_empty() {
            return Err(ValidationError::new("ai", "base url must not be empty"));
        }
        if self.embed_model.trim().is_empty() || self.chat_model_small.trim().is_empty() {
            return Err(ValidationError::new("ai", "model identifiers must not be empty"));
        }
        Ok(())
    }

    /// Return a copy with the base URL guaranteed to end in `/`.
    pub fn normalized(mut self) -> Self {
        normalize_base_url(&mut self.base_url);
        self
    }

    /// Join a relative endpoint path onto the normalized base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn normalize_base_url(url: &mut String) {
    if !url.is_empty() && !url.ends_with('/') {
        url.push('/');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_name_is_case_insensitive() {
        let a = ProviderKey::new(ProviderKind::Local, "Docs");
        let b = ProviderKey::new(ProviderKind::Local, "docs ");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "local:docs");
    }

    #[test]
    fn base_url_gains_trailing_separator() {
        let ai = AiSettings {
            base_url: "https://llm.example.com/v1".to_string(),
            ..AiSettings::default()
        }
        .normalized();
        assert_eq!(ai.base_url, "https://llm.example.com/v1/");
        assert_eq!(
            ai.endpoint("embeddings"),
            "https://llm.example.com/v1/embeddings"
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = AiSettings::default().normalized();
        let twice = once.clone().normalized();
        assert_eq!(once, twice);
    }

    #[test]
    fn endpoint_url_normalized_on_object_storage() {
        let settings = ProviderSettings::ObjectStorage(ObjectStorageSettings {
            name: "minio".to_string(),
            enabled: false,
            file_extensions: BTreeSet::new(),
            bucket: String::new(),
            region: String::new(),
            prefix: String::new(),
            access_key_id: None,
            secret_access_key: None,
            use_instance_profile: false,
            endpoint_url: Some("http://localhost:9000".to_string()),
        })
        .normalized();

        match settings {
            ProviderSettings::ObjectStorage(s) => {
                assert_eq!(s.endpoint_url.as_deref(), Some("http://localhost:9000/"));
            }
            _ => unreachable!(),
        }
    }
}
