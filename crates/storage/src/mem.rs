//! In-memory bucket used by tests and local development.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;
use std::time::Duration;

use crate::bucket::{Bucket, Result};
use crate::error::StorageError;

/// In-memory [`Bucket`] backed by a sorted map of path to content.
///
/// Besides the plain store it supports two test hooks: per-path `get`
/// failures and a fixed delay applied to every `iter` call, which the scanner
/// tests use to simulate slow or broken object stores.
#[derive(Default)]
pub struct InMemoryBucket {
    objects: RwLock<BTreeMap<String, Bytes>>,
    get_failures: RwLock<HashMap<String, String>>,
    iter_delay: RwLock<Option<Duration>>,
}

impl InMemoryBucket {
    /// Create a new empty bucket.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `get` of `path` fail with `message`.
    pub fn fail_get(&self, path: impl Into<String>, message: impl Into<String>) {
        self.get_failures
            .write()
            .unwrap()
            .insert(path.into(), message.into());
    }

    /// Sleep for `delay` on every subsequent `iter` call.
    pub fn set_iter_delay(&self, delay: Duration) {
        *self.iter_delay.write().unwrap() = Some(delay);
    }

    /// Check if an object exists (synchronous, for tests).
    pub fn contains(&self, path: &str) -> bool {
        self.objects.read().unwrap().contains_key(path)
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.read().unwrap().len()
    }

    /// True when the bucket holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.read().unwrap().is_empty()
    }
}

#[async_trait]
impl Bucket for InMemoryBucket {
    async fn iter(&self, prefix: &str) -> Result<Vec<String>> {
        let delay = *self.iter_delay.read().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let objects = self.objects.read().unwrap();
        let mut children = BTreeSet::new();
        for path in objects.keys() {
            let Some(rest) = path.strip_prefix(prefix) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            match rest.find('/') {
                Some(idx) => children.insert(format!("{}{}", prefix, &rest[..=idx])),
                None => children.insert(path.clone()),
            };
        }
        Ok(children.into_iter().collect())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.objects.read().unwrap().contains_key(path))
    }

    async fn get(&self, path: &str) -> Result<Bytes> {
        if let Some(message) = self.get_failures.read().unwrap().get(path) {
            return Err(StorageError::backend("get", path, message.clone()));
        }
        self.objects
            .read()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::not_found(path))
    }

    async fn upload(&self, path: &str, data: Bytes) -> Result<()> {
        self.objects.write().unwrap().insert(path.to_string(), data);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        // Deleting a prefix removes everything under it, mirroring a
        // filesystem-backed store.
        let mut objects = self.objects.write().unwrap();
        objects.remove(path);
        let dir = format!("{}/", path.trim_end_matches('/'));
        objects.retain(|key, _| !key.starts_with(&dir));
        Ok(())
    }
}
