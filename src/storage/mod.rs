//! Object-storage abstraction for curriculum content.
//!
//! The [`ObjectStore`] trait covers the two bucket operations the resolver
//! needs: delimiter listing (to discover grades, terms, and subjects) and
//! whole-object download (to fetch concept files). Implementations:
//!
//! | Type | Backend |
//! |------|---------|
//! | [`gcs::GcsStore`] | Google Cloud Storage JSON API over `reqwest` |
//! | [`memory::MemoryStore`] | In-process map, for tests and offline runs |
//!
//! Implementations must be `Send + Sync`; a single handle is shared by all
//! request handlers.

pub mod gcs;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

/// Failure talking to the bucket.
///
/// Every variant is recoverable from the resolver's point of view: it logs
/// the error and moves on to the fallback path.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("storage request unauthorized (HTTP {status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("storage request failed (HTTP {status}): {message}")]
    Http { status: u16, message: String },

    #[error("storage transport error: {0}")]
    Transport(String),

    #[error("storage credentials unavailable: {0}")]
    Credentials(String),

    #[error("unexpected storage response: {0}")]
    Decode(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

/// Read-only access to a bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// The bucket this store reads from.
    fn bucket(&self) -> &str;

    /// List the immediate child prefixes of `prefix` using `/` as the
    /// delimiter. Returned values are full prefixes ending with `/`
    /// (e.g. `concepts/content/P5/`). Order is unspecified.
    async fn list_prefixes(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Download a whole object.
    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError>;
}

/// Last path segment of a delimiter prefix: `a/b/P5/` → `P5`.
pub fn prefix_leaf(prefix: &str) -> Option<&str> {
    prefix
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
}
