//! Microsoft Graph cloud-drive connector.
//!
//! Authenticates with client-credentials OAuth against the tenant,
//! enumerates the drive through the `root/delta` endpoint (which walks
//! the whole tree with `@odata.nextLink` pagination), and downloads
//! content through the `root:/{path}:/content` addressing form.
//!
//! The item's `cTag` is the change-detection token: Graph updates it
//! whenever the file content changes (unlike `eTag`, which also moves on
//! metadata-only edits).

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::ProviderError;
use crate::provider::{extension_matches, DocumentEntry, DocumentProvider};
use crate::settings::{CloudDriveSettings, DriveTier, ProviderKey, ProviderKind};

const GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";
const LOGIN_BASE: &str = "https://login.microsoftonline.com";

struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

pub struct DriveProvider {
    key: ProviderKey,
    settings: CloudDriveSettings,
    client: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl DriveProvider {
    pub fn new(settings: CloudDriveSettings) -> Result<Self, ProviderError> {
        let key = ProviderKey::new(ProviderKind::CloudDrive, &settings.name);
        Ok(Self {
            key,
            settings,
            client: reqwest::Client::new(),
            token: Mutex::new(None),
        })
    }

    /// Graph URL segment addressing the configured drive.
    fn drive_base(&self) -> String {
        match self.settings.tier {
            DriveTier::Business => {
                if let Some(drive_id) = self
                    .settings
                    .drive_id
                    .as_deref()
                    .filter(|id| !id.trim().is_empty())
                {
                    format!("drives/{drive_id}")
                } else {
                    // Validation guarantees a site id when no drive id
                    let site_id = self.settings.site_id.as_deref().unwrap_or_default();
                    format!("sites/{site_id}/drive")
                }
            }
            DriveTier::Personal => "me/drive".to_string(),
        }
    }

    /// Acquire (or reuse) a client-credentials access token.
    async fn access_token(&self) -> Result<String, ProviderError> {
        let mut guard = self.token.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.expires_at > Utc::now() + Duration::seconds(60) {
                return Ok(cached.access_token.clone());
            }
        }

        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            LOGIN_BASE, self.settings.tenant_id
        );
        let params = [
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
            ("scope", "https://graph.microsoft.com/.default"),
            ("grant_type", "client_credentials"),
        ];

        let resp = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|e| self.sync_err(format!("token request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(self.sync_err(format!(
                "token request rejected (HTTP {}): {}",
                status,
                body.chars().take(300).collect::<String>()
            )));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| self.sync_err(e.to_string()))?;
        let access_token = json
            .get("access_token")
            .and_then(|t| t.as_str())
            .ok_or_else(|| self.sync_err("token response missing access_token"))?
            .to_string();
        let expires_in = json
            .get("expires_in")
            .and_then(|v| v.as_i64())
            .unwrap_or(3600);

        *guard = Some(CachedToken {
            access_token: access_token.clone(),
            expires_at: Utc::now() + Duration::seconds(expires_in),
        });

        Ok(access_token)
    }

    async fn get_json(&self, url: &str) -> Result<Value, ProviderError> {
        let token = self.access_token().await?;
        let resp = self
            .client
            .get(url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| self.sync_err(format!("graph request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(self.sync_err(format!(
                "graph request failed (HTTP {}): {}",
                status,
                body.chars().take(300).collect::<String>()
            )));
        }

        resp.json().await.map_err(|e| self.sync_err(e.to_string()))
    }

    fn sync_err(&self, message: impl Into<String>) -> ProviderError {
        ProviderError::sync(self.key.to_string(), message)
    }
}

#[async_trait]
impl DocumentProvider for DriveProvider {
    fn key(&self) -> &ProviderKey {
        &self.key
    }

    async fn list_documents(&self) -> Result<Vec<DocumentEntry>, ProviderError> {
        let mut entries = Vec::new();
        let mut url = format!("{}/{}/root/delta", GRAPH_BASE, self.drive_base());

        loop {
            let page = self.get_json(&url).await?;

            for item in page
                .get("value")
                .and_then(|v| v.as_array())
                .into_iter()
                .flatten()
            {
                // Delta listings include folders and tombstones
                if item.get("file").is_none() || item.get("deleted").is_some() {
                    continue;
                }

                let name = item.get("name").and_then(|n| n.as_str()).unwrap_or("");
                if name.is_empty() {
                    continue;
                }
                let parent_path = item
                    .get("parentReference")
                    .and_then(|p| p.get("path"))
                    .and_then(|p| p.as_str());
                let address = item_address(parent_path, name);

                if !extension_matches(&self.settings.file_extensions, &address) {
                    continue;
                }

                let change_token = item
                    .get("cTag")
                    .or_else(|| item.get("eTag"))
                    .and_then(|t| t.as_str())
                    .unwrap_or_default()
                    .to_string();
                let updated_at = item
                    .get("lastModifiedDateTime")
                    .and_then(|t| t.as_str())
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(Utc::now);
                let size = item.get("size").and_then(|s| s.as_i64());

                entries.push(DocumentEntry {
                    address,
                    change_token,
                    title: Some(name.to_string()),
                    updated_at,
                    size,
                });
            }

            match page.get("@odata.nextLink").and_then(|l| l.as_str()) {
                Some(next) => url = next.to_string(),
                None => break,
            }
        }

        entries.sort_by(|a, b| a.address.cmp(&b.address));
        Ok(entries)
    }

    async fn fetch(&self, address: &str) -> Result<Vec<u8>, ProviderError> {
        let encoded: String = address
            .split('/')
            .map(encode_segment)
            .collect::<Vec<_>>()
            .join("/");
        let url = format!(
            "{}/{}/root:/{}:/content",
            GRAPH_BASE,
            self.drive_base(),
            encoded
        );

        let token = self.access_token().await?;
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| self.sync_err(format!("content download failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(self.sync_err(format!(
                "content download failed (HTTP {}) for '{}'",
                resp.status(),
                address
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| self.sync_err(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Derive a drive-root-relative address from an item's parent path and
/// name. Graph parent paths look like `/drives/{id}/root:/sub/dir`.
fn item_address(parent_path: Option<&str>, name: &str) -> String {
    let dir = parent_path
        .and_then(|p| p.split_once("root:").map(|(_, rest)| rest))
        .unwrap_or("")
        .trim_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Percent-encode one path segment for a Graph `root:/{path}:` address.
fn encode_segment(segment: &str) -> String {
    let mut out = String::new();
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_strips_drive_prefix() {
        assert_eq!(
            item_address(Some("/drives/abc123/root:/reports/2024"), "q1.md"),
            "reports/2024/q1.md"
        );
        assert_eq!(item_address(Some("/drives/abc123/root:"), "top.md"), "top.md");
        assert_eq!(item_address(None, "loose.md"), "loose.md");
    }

    #[test]
    fn segments_are_percent_encoded() {
        assert_eq!(encode_segment("q1 report.md"), "q1%20report.md");
        assert_eq!(encode_segment("plain.md"), "plain.md");
    }
}
