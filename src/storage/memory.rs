//! In-memory [`ObjectStore`] for tests and offline runs.
//!
//! Objects live in a `BTreeMap` keyed by object name. Listing derives
//! delimiter prefixes from the stored keys the same way the bucket API does.
//! A store built with [`MemoryStore::unavailable`] fails every call, which
//! is how tests drive the resolver down its fallback path.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;

use super::{ObjectStore, StorageError};

pub struct MemoryStore {
    bucket: String,
    objects: BTreeMap<String, Vec<u8>>,
    unavailable: bool,
}

impl MemoryStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: BTreeMap::new(),
            unavailable: false,
        }
    }

    /// A store whose every request fails with a transport error.
    pub fn unavailable(bucket: impl Into<String>) -> Self {
        Self {
            unavailable: true,
            ..Self::new(bucket)
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.objects.insert(key.into(), body.into());
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_object(mut self, key: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.insert(key, body);
        self
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.unavailable {
            return Err(StorageError::Transport(format!(
                "bucket '{}' is unreachable",
                self.bucket
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_prefixes(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.check_available()?;
        let prefixes: BTreeSet<String> = self
            .objects
            .keys()
            .filter_map(|key| key.strip_prefix(prefix))
            .filter_map(|rest| rest.find('/').map(|idx| &rest[..=idx]))
            .map(|child| format!("{}{}", prefix, child))
            .collect();
        Ok(prefixes.into_iter().collect())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.check_available()?;
        self.objects
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                key: key.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MemoryStore {
        MemoryStore::new("test-bucket")
            .with_object("root/P5/Term1/Math/concepts/unified_curriculum.json", "{}")
            .with_object("root/P5/Term1/Science/notes.pdf", "pdf")
            .with_object("root/P5/Term2/Math/concepts/unified_curriculum.json", "{}")
            .with_object("root/G10/Term1/Physics/concepts/unified_curriculum.json", "{}")
            .with_object("root/readme.txt", "top-level file")
    }

    #[tokio::test]
    async fn test_list_prefixes_returns_direct_children_only() {
        let store = sample();
        let grades = store.list_prefixes("root/").await.unwrap();
        assert_eq!(grades, vec!["root/G10/".to_string(), "root/P5/".to_string()]);

        let subjects = store.list_prefixes("root/P5/Term1/").await.unwrap();
        assert_eq!(
            subjects,
            vec![
                "root/P5/Term1/Math/".to_string(),
                "root/P5/Term1/Science/".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_get_object_missing_is_not_found() {
        let store = sample();
        let err = store.get_object("root/nope.json").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.get_object("root/readme.txt").await.unwrap(), b"top-level file");
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_everything() {
        let store = MemoryStore::unavailable("down");
        assert!(matches!(
            store.list_prefixes("").await,
            Err(StorageError::Transport(_))
        ));
        assert!(matches!(
            store.get_object("a").await,
            Err(StorageError::Transport(_))
        ));
    }
}
