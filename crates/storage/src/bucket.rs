use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageError;

/// Result type for bucket operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Abstraction over the multi-tenant object store holding blocks.
///
/// Paths are `/`-separated strings relative to the store root
/// (`<tenant>/<block id>/meta.json` and friends). Implementations must be
/// safe to share across tasks.
#[async_trait]
pub trait Bucket: Send + Sync {
    /// List the immediate children of a prefix.
    ///
    /// Returned entries are full paths from the store root; entries that have
    /// further children carry a trailing `/`. The prefix itself must end with
    /// `/` or be empty (the root).
    async fn iter(&self, prefix: &str) -> Result<Vec<String>>;

    /// Check whether an object exists.
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Get the full content of an object.
    ///
    /// Returns [`StorageError::NotFound`] if the object doesn't exist.
    async fn get(&self, path: &str) -> Result<Bytes>;

    /// Write an object, replacing any existing content.
    async fn upload(&self, path: &str, data: Bytes) -> Result<()>;

    /// Delete an object. Deleting a non-existent object is not an error.
    async fn delete(&self, path: &str) -> Result<()>;
}
