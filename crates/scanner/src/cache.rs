//! On-disk cache of fetched block metadata.
//!
//! One subdirectory per tenant, one file per block named by its id, holding
//! the verbatim `meta.json` bytes fetched from the bucket. The cache absorbs
//! repeat scans across process restarts; orphaned entries are garbage
//! collected after each successful scan.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use ulid::Ulid;

use crate::index::TenantIndex;
use crate::meta::{self, BlockMeta};
use storage::{Bucket, StorageError};

/// Errors that occur during cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Fetching the metadata object from the bucket failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The metadata object in the bucket does not parse
    #[error("corrupt metadata for block {block}")]
    CorruptMeta {
        block: Ulid,
        #[source]
        source: serde_json::Error,
    },

    /// The tenant's cache directory could not be created
    #[error("failed to create cache directory '{path}'")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing the cached metadata failed
    #[error("failed to write cached metadata for block {block}")]
    Write {
        block: Ulid,
        #[source]
        source: std::io::Error,
    },
}

/// Disk cache for block metadata, rooted at a configurable directory.
#[derive(Debug)]
pub struct MetaCache {
    root: PathBuf,
}

impl MetaCache {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn tenant_dir(&self, tenant_id: &str) -> PathBuf {
        self.root.join(tenant_id)
    }

    fn block_path(&self, tenant_id: &str, block_id: Ulid) -> PathBuf {
        self.tenant_dir(tenant_id).join(block_id.to_string())
    }

    /// Return the metadata of `block_id`, from cache if possible.
    ///
    /// A cached entry that parses is returned without touching the bucket
    /// (the boolean is `true` on such a hit). Otherwise the metadata object
    /// is fetched, parsed, cached, and returned. `Ok(None)` means the block
    /// has no `meta.json` yet (a partial upload) and should be skipped.
    pub async fn get_or_fetch(
        &self,
        bucket: &dyn Bucket,
        tenant_id: &str,
        block_id: Ulid,
    ) -> Result<Option<(BlockMeta, bool)>, CacheError> {
        let cached = self.block_path(tenant_id, block_id);
        match std::fs::read(&cached) {
            Ok(raw) => match serde_json::from_slice::<BlockMeta>(&raw) {
                Ok(block_meta) => return Ok(Some((block_meta, true))),
                Err(err) => {
                    tracing::debug!(
                        tenant_id,
                        block = %block_id,
                        error = %err,
                        "ignoring corrupt cached block metadata"
                    );
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::debug!(
                    tenant_id,
                    block = %block_id,
                    error = %err,
                    "failed to read cached block metadata"
                );
            }
        }

        let meta_path = meta::meta_path(tenant_id, block_id);
        if !bucket.exists(&meta_path).await? {
            // No meta.json yet: the block upload hasn't completed.
            return Ok(None);
        }

        let raw = match bucket.get(&meta_path).await {
            Ok(raw) => raw,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let block_meta = serde_json::from_slice::<BlockMeta>(&raw)
            .map_err(|source| CacheError::CorruptMeta {
                block: block_id,
                source,
            })?;

        self.store(tenant_id, block_id, &raw)?;
        Ok(Some((block_meta, false)))
    }

    /// Persist the verbatim metadata bytes. The write goes through a tempfile
    /// and rename so a crash can never leave a half-written entry behind.
    fn store(&self, tenant_id: &str, block_id: Ulid, raw: &[u8]) -> Result<(), CacheError> {
        let dir = self.tenant_dir(tenant_id);
        std::fs::create_dir_all(&dir).map_err(|source| CacheError::CreateDir {
            path: dir.clone(),
            source,
        })?;

        let write = |dir: &Path| -> std::io::Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
            tmp.write_all(raw)?;
            tmp.as_file().sync_all()?;
            tmp.persist(self.block_path(tenant_id, block_id))
                .map_err(|err| err.error)?;
            let _ = std::fs::File::open(dir).and_then(|d| d.sync_all());
            Ok(())
        };

        write(&dir).map_err(|source| CacheError::Write {
            block: block_id,
            source,
        })
    }

    /// Drop every cache entry not present in `live`, the tenant set produced
    /// by a completed scan. Removes whole tenant directories for tenants that
    /// disappeared, and stale block files (including leftover tempfiles,
    /// whose names never parse as block ids) for tenants that remain.
    pub fn gc(&self, live: &HashMap<String, Arc<TenantIndex>>) -> std::io::Result<()> {
        let tenant_dirs = match std::fs::read_dir(&self.root) {
            Ok(dirs) => dirs,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err),
        };

        for tenant_dir in tenant_dirs {
            let tenant_dir = tenant_dir?;
            let tenant_id = tenant_dir.file_name().to_string_lossy().into_owned();

            let Some(index) = live.get(&tenant_id) else {
                std::fs::remove_dir_all(tenant_dir.path())?;
                continue;
            };

            for file in std::fs::read_dir(tenant_dir.path())? {
                let file = file?;
                let name = file.file_name().to_string_lossy().into_owned();
                let live_block = Ulid::from_string(&name)
                    .ok()
                    .is_some_and(|id| index.block(id).is_some());
                if !live_block {
                    std::fs::remove_file(file.path())?;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{mock_block_meta, upload_block};
    use storage::InMemoryBucket;

    fn new_cache() -> (MetaCache, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("should create temp dir");
        (MetaCache::new(dir.path().to_path_buf()), dir)
    }

    #[tokio::test]
    async fn test_fetch_then_hit() {
        let (cache, _dir) = new_cache();
        let bucket = InMemoryBucket::new();
        let block = mock_block_meta(1, 10, 20);
        upload_block(&bucket, "user-1", &block).await;

        let (fetched, hit) = cache
            .get_or_fetch(&bucket, "user-1", block.id)
            .await
            .unwrap()
            .unwrap();
        assert!(!hit);
        assert_eq!(fetched.id, block.id);

        // The entry is served from disk now, even if the bucket object is gone.
        bucket
            .delete(&meta::meta_path("user-1", block.id))
            .await
            .unwrap();

        let (fetched, hit) = cache
            .get_or_fetch(&bucket, "user-1", block.id)
            .await
            .unwrap()
            .unwrap();
        assert!(hit);
        assert_eq!(fetched.id, block.id);
        assert_eq!(fetched.min_time, 10);
        assert_eq!(fetched.max_time, 20);
    }

    #[tokio::test]
    async fn test_missing_meta_is_skipped() {
        let (cache, _dir) = new_cache();
        let bucket = InMemoryBucket::new();

        let result = cache
            .get_or_fetch(&bucket, "user-1", Ulid::from_parts(20, 1))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_bucket_meta_fails() {
        let (cache, _dir) = new_cache();
        let bucket = InMemoryBucket::new();
        let id = Ulid::from_parts(20, 1);
        bucket
            .upload(&meta::meta_path("user-1", id), "not json".into())
            .await
            .unwrap();

        let err = cache
            .get_or_fetch(&bucket, "user-1", id)
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::CorruptMeta { .. }));
    }

    #[tokio::test]
    async fn test_corrupt_cache_entry_is_overwritten() {
        let (cache, _dir) = new_cache();
        let bucket = InMemoryBucket::new();
        let block = mock_block_meta(1, 10, 20);
        upload_block(&bucket, "user-1", &block).await;

        // Plant a corrupt cache entry for the block.
        let path = cache.block_path("user-1", block.id);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"garbage").unwrap();

        let (fetched, hit) = cache
            .get_or_fetch(&bucket, "user-1", block.id)
            .await
            .unwrap()
            .unwrap();
        assert!(!hit);
        assert_eq!(fetched.id, block.id);

        // The corrupt entry was replaced by the fetched bytes.
        let raw = std::fs::read(&path).unwrap();
        let reparsed: BlockMeta = serde_json::from_slice(&raw).unwrap();
        assert_eq!(reparsed.id, block.id);
    }

    #[tokio::test]
    async fn test_gc_removes_stale_entries() {
        let (cache, _dir) = new_cache();
        let bucket = InMemoryBucket::new();

        let keep = mock_block_meta(1, 10, 20);
        let stale = mock_block_meta(2, 20, 30);
        upload_block(&bucket, "user-1", &keep).await;
        upload_block(&bucket, "user-1", &stale).await;
        let gone = mock_block_meta(3, 10, 20);
        upload_block(&bucket, "user-2", &gone).await;

        for (tenant, block) in [("user-1", &keep), ("user-1", &stale), ("user-2", &gone)] {
            cache
                .get_or_fetch(&bucket, tenant, block.id)
                .await
                .unwrap()
                .unwrap();
        }

        // user-1 keeps only `keep`; user-2 disappeared entirely.
        let mut live = HashMap::new();
        live.insert(
            "user-1".to_string(),
            Arc::new(TenantIndex::new(vec![keep.clone()], HashMap::new())),
        );
        cache.gc(&live).unwrap();

        assert!(cache.block_path("user-1", keep.id).exists());
        assert!(!cache.block_path("user-1", stale.id).exists());
        assert!(!cache.tenant_dir("user-2").exists());
    }

    #[tokio::test]
    async fn test_gc_on_missing_root_is_noop() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let cache = MetaCache::new(dir.path().join("does-not-exist"));
        cache.gc(&HashMap::new()).unwrap();
    }
}
