//! Google Cloud Storage backend.
//!
//! Lists and downloads objects through the GCS JSON API using `reqwest`.
//! Implements page-token pagination for listings and supports a custom
//! endpoint for GCS-compatible emulators (fake-gcs-server).
//!
//! # Configuration
//!
//! ```toml
//! [storage]
//! bucket = "thoth-concepts"
//! # endpoint_url = "http://localhost:4443"   # fake-gcs-server
//! # credentials_path = "/secrets/key.json"
//! timeout_secs = 30
//! ```
//!
//! # Environment Variables
//!
//! - `GCS_BUCKET_NAME`: overrides `storage.bucket`
//! - `GOOGLE_APPLICATION_CREDENTIALS`: overrides `storage.credentials_path`
//! - `GOOGLE_OAUTH_ACCESS_TOKEN`: a ready-made bearer token (see [`crate::credentials`])
//!
//! # Requests
//!
//! | Operation | Request |
//! |-----------|---------|
//! | List | `GET {endpoint}/storage/v1/b/{bucket}/o?prefix=…&delimiter=/&pageToken=…` |
//! | Download | `GET {endpoint}/storage/v1/b/{bucket}/o/{encoded key}?alt=media` |
//!
//! Status mapping: `404` → [`StorageError::NotFound`], `401`/`403` →
//! [`StorageError::Unauthorized`], any other non-success →
//! [`StorageError::Http`] with the body truncated to 500 characters.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use super::{ObjectStore, StorageError};
use crate::config::StorageConfig;
use crate::credentials::{TokenProvider, TokenSource};

/// GCS client handle, shared by all request handlers.
pub struct GcsStore {
    bucket: String,
    endpoint: String,
    client: reqwest::Client,
    tokens: TokenProvider,
}

impl GcsStore {
    /// Build a store from configuration, resolving credentials from the
    /// environment.
    ///
    /// Never fails on bad credentials: those surface per request as
    /// [`StorageError::Credentials`].
    pub fn from_config(config: &StorageConfig) -> anyhow::Result<Self> {
        let source = TokenSource::from_env(config.credentials_path.as_deref());
        Self::with_token_source(config, source)
    }

    pub fn with_token_source(config: &StorageConfig, source: TokenSource) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        tracing::info!(
            bucket = %config.bucket,
            endpoint = %config.endpoint_url,
            credentials = source.kind(),
            "configured GCS storage"
        );
        Ok(Self {
            bucket: config.bucket.clone(),
            endpoint: config.endpoint_url.trim_end_matches('/').to_string(),
            tokens: TokenProvider::new(source, client.clone()),
            client,
        })
    }

    fn objects_url(&self) -> String {
        format!(
            "{}/storage/v1/b/{}/o",
            self.endpoint,
            uri_encode(&self.bucket)
        )
    }

    async fn authorized_get(&self, url: &str) -> Result<reqwest::RequestBuilder, StorageError> {
        let mut req = self.client.get(url);
        if let Some(token) = self.tokens.token().await? {
            req = req.bearer_auth(token);
        }
        Ok(req)
    }
}

/// One page of an objects listing. Only the fields this crate reads.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPage {
    #[serde(default)]
    prefixes: Vec<String>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[async_trait]
impl ObjectStore for GcsStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_prefixes(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let url = self.objects_url();
        let mut prefixes = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![("prefix", prefix.to_string()), ("delimiter", "/".to_string())];
            if let Some(ref token) = page_token {
                query.push(("pageToken", token.clone()));
            }

            let resp = self
                .authorized_get(&url)
                .await?
                .query(&query)
                .send()
                .await
                .map_err(|e| {
                    StorageError::Transport(format!(
                        "failed to list gs://{}/{}: {}",
                        self.bucket, prefix, e
                    ))
                })?;

            let resp = check_status(resp, prefix).await?;
            let page: ListPage = resp
                .json()
                .await
                .map_err(|e| StorageError::Decode(format!("objects listing: {}", e)))?;
            prefixes.extend(page.prefixes);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        tracing::debug!(bucket = %self.bucket, prefix, count = prefixes.len(), "listed prefixes");
        Ok(prefixes)
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let url = format!("{}/{}", self.objects_url(), uri_encode(key));
        let resp = self
            .authorized_get(&url)
            .await?
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(|e| {
                StorageError::Transport(format!("failed to get gs://{}/{}: {}", self.bucket, key, e))
            })?;

        let resp = check_status(resp, key).await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| StorageError::Transport(format!("reading gs://{}/{}: {}", self.bucket, key, e)))?;
        tracing::debug!(bucket = %self.bucket, key, bytes = bytes.len(), "downloaded object");
        Ok(bytes.to_vec())
    }
}

async fn check_status(resp: reqwest::Response, key: &str) -> Result<reqwest::Response, StorageError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message: String = body.chars().take(500).collect();
    Err(match status {
        StatusCode::NOT_FOUND => StorageError::NotFound {
            key: key.to_string(),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StorageError::Unauthorized {
            status: status.as_u16(),
            message,
        },
        _ => StorageError::Http {
            status: status.as_u16(),
            message,
        },
    })
}

/// Percent-encode a path segment per RFC 3986.
///
/// Everything except `A-Z a-z 0-9 - _ . ~` is encoded, including `/`, so an
/// object name becomes a single URL path segment as the JSON API requires.
pub fn uri_encode(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_encode_object_names() {
        assert_eq!(
            uri_encode("concepts/content/P5/Term1/Math/concepts/unified_curriculum.json"),
            "concepts%2Fcontent%2FP5%2FTerm1%2FMath%2Fconcepts%2Funified_curriculum.json"
        );
        assert_eq!(uri_encode("Social Studies"), "Social%20Studies");
        assert_eq!(uri_encode("é"), "%C3%A9");
    }

    #[test]
    fn test_list_page_parses_camel_case() {
        let page: ListPage = serde_json::from_str(
            r#"{"kind":"storage#objects","prefixes":["a/P5/"],"nextPageToken":"tok"}"#,
        )
        .unwrap();
        assert_eq!(page.prefixes, vec!["a/P5/".to_string()]);
        assert_eq!(page.next_page_token.as_deref(), Some("tok"));

        let empty: ListPage = serde_json::from_str(r#"{"kind":"storage#objects"}"#).unwrap();
        assert!(empty.prefixes.is_empty());
        assert!(empty.next_page_token.is_none());
    }
}
