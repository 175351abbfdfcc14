//! S3-compatible object storage connector.
//!
//! Talks to the S3 REST API directly with AWS Signature V4 signing
//! (`hmac` + `sha2`, no C dependencies), paginates `ListObjectsV2` via
//! continuation tokens, and supports custom endpoints for S3-compatible
//! services (MinIO, LocalStack).
//!
//! The object's ETag is the change-detection token: it is recomputed by
//! the storage service whenever the object body changes.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::ProviderError;
use crate::provider::{extension_matches, DocumentEntry, DocumentProvider};
use crate::settings::{ObjectStorageSettings, ProviderKey, ProviderKind};

type HmacSha256 = Hmac<Sha256>;

/// Resolved credentials for one provider instance.
struct S3Credentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl S3Credentials {
    /// Prefer the explicit pair from settings; with
    /// `use_instance_profile`, fall back to the ambient identity exposed
    /// through the standard `AWS_*` variables.
    fn resolve(settings: &ObjectStorageSettings, key: &ProviderKey) -> Result<Self, ProviderError> {
        if let (Some(id), Some(secret)) = (&settings.access_key_id, &settings.secret_access_key) {
            if !id.trim().is_empty() && !secret.trim().is_empty() {
                return Ok(Self {
                    access_key_id: id.clone(),
                    secret_access_key: secret.clone(),
                    session_token: None,
                });
            }
        }

        if settings.use_instance_profile {
            let access_key_id = std::env::var("AWS_ACCESS_KEY_ID").map_err(|_| {
                ProviderError::construction(
                    key.to_string(),
                    "instance profile requested but AWS_ACCESS_KEY_ID is not set",
                )
            })?;
            let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY").map_err(|_| {
                ProviderError::construction(
                    key.to_string(),
                    "instance profile requested but AWS_SECRET_ACCESS_KEY is not set",
                )
            })?;
            return Ok(Self {
                access_key_id,
                secret_access_key,
                session_token: std::env::var("AWS_SESSION_TOKEN").ok(),
            });
        }

        Err(ProviderError::construction(
            key.to_string(),
            "no usable credentials",
        ))
    }
}

pub struct S3Provider {
    key: ProviderKey,
    settings: ObjectStorageSettings,
    creds: S3Credentials,
    client: reqwest::Client,
}

impl S3Provider {
    pub fn new(settings: ObjectStorageSettings) -> Result<Self, ProviderError> {
        let key = ProviderKey::new(ProviderKind::ObjectStorage, &settings.name);
        let creds = S3Credentials::resolve(&settings, &key)?;
        Ok(Self {
            key,
            settings,
            creds,
            client: reqwest::Client::new(),
        })
    }

    /// Scheme and host for the configured bucket. Custom endpoints keep
    /// their scheme (MinIO is often plain http).
    fn endpoint(&self) -> (&'static str, String) {
        match &self.settings.endpoint_url {
            Some(url) => {
                let scheme = if url.starts_with("http://") { "http" } else { "https" };
                let host = url
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .trim_end_matches('/')
                    .to_string();
                (scheme, host)
            }
            None => (
                "https",
                format!(
                    "{}.s3.{}.amazonaws.com",
                    self.settings.bucket, self.settings.region
                ),
            ),
        }
    }

    /// Build a SigV4-signed GET request for `canonical_uri` with the
    /// given query parameters.
    fn signed_get(&self, canonical_uri: &str, query: &[(String, String)]) -> reqwest::RequestBuilder {
        let (scheme, host) = self.endpoint();

        let now = Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let payload_hash = hex_sha256(b"");

        // Canonical query string must be sorted
        let mut sorted = query.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        let canonical_querystring: String = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let mut headers = vec![
            ("host".to_string(), host.clone()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(ref token) = self.creds.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers: String = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();

        let canonical_request = format!(
            "GET\n{}\n{}\n{}\n{}\n{}",
            canonical_uri, canonical_querystring, canonical_headers, signed_headers, payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.settings.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key = derive_signing_key(
            &self.creds.secret_access_key,
            &date_stamp,
            &self.settings.region,
            "s3",
        );
        let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.creds.access_key_id, credential_scope, signed_headers, signature
        );

        let url = if canonical_querystring.is_empty() {
            format!("{}://{}{}", scheme, host, canonical_uri)
        } else {
            format!("{}://{}{}?{}", scheme, host, canonical_uri, canonical_querystring)
        };

        let mut builder = self
            .client
            .get(&url)
            .header("Authorization", authorization)
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &amz_date);

        if let Some(ref token) = self.creds.session_token {
            builder = builder.header("x-amz-security-token", token);
        }

        builder
    }

    /// Object key for a source-relative address.
    fn full_key(&self, address: &str) -> String {
        let prefix = self.settings.prefix.trim_end_matches('/');
        if prefix.is_empty() {
            address.to_string()
        } else {
            format!("{}/{}", prefix, address)
        }
    }

    /// Source-relative address for an object key.
    fn relative_key(&self, key: &str) -> String {
        let prefix = self.settings.prefix.trim_end_matches('/');
        if prefix.is_empty() {
            key.to_string()
        } else {
            key.strip_prefix(prefix)
                .map(|s| s.trim_start_matches('/').to_string())
                .unwrap_or_else(|| key.to_string())
        }
    }

    fn sync_err(&self, message: impl Into<String>) -> ProviderError {
        ProviderError::sync(self.key.to_string(), message)
    }
}

#[async_trait]
impl DocumentProvider for S3Provider {
    fn key(&self) -> &ProviderKey {
        &self.key
    }

    async fn list_documents(&self) -> Result<Vec<DocumentEntry>, ProviderError> {
        let mut entries = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("list-type".to_string(), "2".to_string()),
                ("max-keys".to_string(), "1000".to_string()),
            ];
            if !self.settings.prefix.is_empty() {
                query.push(("prefix".to_string(), self.settings.prefix.clone()));
            }
            if let Some(ref token) = continuation_token {
                query.push(("continuation-token".to_string(), token.clone()));
            }

            let resp = self
                .signed_get("/", &query)
                .send()
                .await
                .map_err(|e| self.sync_err(format!("ListObjectsV2 request failed: {e}")))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(self.sync_err(format!(
                    "ListObjectsV2 failed (HTTP {}): {}",
                    status,
                    body.chars().take(500).collect::<String>()
                )));
            }

            let xml = resp
                .text()
                .await
                .map_err(|e| self.sync_err(e.to_string()))?;
            let (batch, is_truncated, next_token) = parse_list_objects_response(&xml);

            for obj in batch {
                let address = self.relative_key(&obj.key);
                if !extension_matches(&self.settings.file_extensions, &address) {
                    continue;
                }
                entries.push(DocumentEntry {
                    title: Some(obj.key.rsplit('/').next().unwrap_or(&obj.key).to_string()),
                    change_token: obj.etag,
                    updated_at: Utc
                        .timestamp_opt(obj.last_modified, 0)
                        .single()
                        .unwrap_or_else(Utc::now),
                    size: Some(obj.size),
                    address,
                });
            }

            if is_truncated {
                continuation_token = next_token;
            } else {
                break;
            }
        }

        entries.sort_by(|a, b| a.address.cmp(&b.address));
        Ok(entries)
    }

    async fn fetch(&self, address: &str) -> Result<Vec<u8>, ProviderError> {
        let key = self.full_key(address);
        let encoded: String = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        let canonical_uri = format!("/{}", encoded);

        let resp = self
            .signed_get(&canonical_uri, &[])
            .send()
            .await
            .map_err(|e| self.sync_err(format!("GetObject '{key}' failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(self.sync_err(format!(
                "GetObject failed (HTTP {}) for key '{}'",
                resp.status(),
                key
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| self.sync_err(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

// ============ AWS SigV4 helpers ============

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn hex_hmac_sha256(key: &[u8], data: &[u8]) -> String {
    hex::encode(hmac_sha256(key, data))
}

/// kDate → kRegion → kService → kSigning derivation chain.
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 encoding for SigV4 canonical requests: everything but
/// unreserved characters is percent-encoded.
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

// ============ XML parsing (minimal, no extra deps) ============

struct S3Object {
    key: String,
    last_modified: i64,
    etag: String,
    size: i64,
}

fn parse_list_objects_response(xml: &str) -> (Vec<S3Object>, bool, Option<String>) {
    let mut objects = Vec::new();
    let is_truncated = extract_xml_value(xml, "IsTruncated")
        .map(|v| v == "true")
        .unwrap_or(false);
    let next_token = extract_xml_value(xml, "NextContinuationToken");

    let mut remaining = xml;
    while let Some(start) = remaining.find("<Contents>") {
        let block_start = start + "<Contents>".len();
        let Some(end) = remaining[block_start..].find("</Contents>") else {
            break;
        };
        let block = &remaining[block_start..block_start + end];
        remaining = &remaining[block_start + end + "</Contents>".len()..];

        let key = extract_xml_value(block, "Key").unwrap_or_default();
        // Directory markers carry no content
        if key.is_empty() || key.ends_with('/') {
            continue;
        }

        let last_modified = extract_xml_value(block, "LastModified")
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.timestamp())
            .unwrap_or(0);
        let etag = extract_xml_value(block, "ETag")
            .unwrap_or_default()
            .trim_matches('"')
            .to_string();
        let size = extract_xml_value(block, "Size")
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(0);

        objects.push(S3Object {
            key,
            last_modified,
            etag,
            size,
        });
    }

    (objects, is_truncated, next_token)
}

/// Extract the text content of a simple, non-nested XML tag.
fn extract_xml_value(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)?;
    Some(xml[start..start + end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_list_objects_with_pagination_marker() {
        let xml = r#"<?xml version="1.0"?>
<ListBucketResult>
  <IsTruncated>true</IsTruncated>
  <NextContinuationToken>abc123</NextContinuationToken>
  <Contents>
    <Key>docs/readme.md</Key>
    <LastModified>2024-05-01T10:00:00Z</LastModified>
    <ETag>"d41d8cd98f00b204"</ETag>
    <Size>42</Size>
  </Contents>
  <Contents>
    <Key>docs/</Key>
    <LastModified>2024-05-01T10:00:00Z</LastModified>
    <ETag>"ffffffff"</ETag>
    <Size>0</Size>
  </Contents>
</ListBucketResult>"#;

        let (objects, truncated, token) = parse_list_objects_response(xml);
        assert!(truncated);
        assert_eq!(token.as_deref(), Some("abc123"));
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].key, "docs/readme.md");
        assert_eq!(objects[0].etag, "d41d8cd98f00b204");
        assert_eq!(objects[0].size, 42);
    }

    #[test]
    fn uri_encoding_leaves_unreserved_untouched() {
        assert_eq!(uri_encode("a-b_c.d~e"), "a-b_c.d~e");
        assert_eq!(uri_encode("a b/c"), "a%20b%2Fc");
    }
}
