//! Tenant enumeration and per-tenant block metadata discovery.

use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use ulid::Ulid;

use crate::cache::MetaCache;
use crate::error::ScanError;
use crate::index::TenantIndex;
use crate::meta::{self, DeletionMark, DELETION_MARK_VERSION_1};
use storage::Bucket;

/// List the tenants present in the bucket, excluding tenants that carry a
/// tenant deletion marker.
pub(crate) async fn list_tenants(bucket: &dyn Bucket) -> Result<Vec<String>, ScanError> {
    let entries = bucket.iter("").await?;

    let mut tenants = Vec::with_capacity(entries.len());
    for entry in entries {
        let tenant_id = entry.trim_end_matches('/');
        if tenant_id.is_empty() || tenant_id.contains('/') {
            continue;
        }
        if bucket
            .exists(&meta::tenant_deletion_mark_path(tenant_id))
            .await?
        {
            tracing::debug!(tenant_id, "skipping tenant marked for deletion");
            continue;
        }
        tenants.push(tenant_id.to_string());
    }

    Ok(tenants)
}

/// Build a fresh index for one tenant.
///
/// Discovers the tenant's block directories, fetches each block's metadata
/// through the cache and its deletion mark from the bucket, with at most
/// `metas_concurrency` blocks in flight. The first error cancels the
/// remaining fetches and fails the tenant. `uploaded_at` is carried forward
/// from `previous` for blocks already known; blocks seen for the first time
/// keep the stamp assigned at parse time.
pub(crate) async fn fetch_tenant_index(
    bucket: &dyn Bucket,
    cache: &MetaCache,
    metas_concurrency: usize,
    tenant_id: &str,
    previous: Option<&TenantIndex>,
) -> Result<TenantIndex, ScanError> {
    let entries = bucket.iter(&format!("{}/", tenant_id)).await?;
    let block_ids: Vec<Ulid> = entries
        .iter()
        .filter_map(|entry| parse_block_id(tenant_id, entry))
        .collect();

    let mut fetches = stream::iter(block_ids.into_iter().map(|block_id| async move {
        let Some((block_meta, _cache_hit)) =
            cache.get_or_fetch(bucket, tenant_id, block_id).await?
        else {
            return Ok(None);
        };
        let mark = fetch_deletion_mark(bucket, tenant_id, block_id).await?;
        Ok::<_, ScanError>(Some((block_meta, mark)))
    }))
    .buffer_unordered(metas_concurrency.max(1));

    let mut blocks = Vec::new();
    let mut marks = HashMap::new();
    while let Some(fetched) = fetches.next().await {
        // `?` drops the stream on error, cancelling in-flight fetches.
        let Some((mut block_meta, mark)) = fetched? else {
            continue;
        };
        if let Some(known) = previous.and_then(|p| p.block(block_meta.id)) {
            block_meta.uploaded_at = known.uploaded_at;
        }
        if let Some(mark) = mark {
            marks.insert(mark.id, mark);
        }
        blocks.push(block_meta);
    }
    drop(fetches);

    Ok(TenantIndex::new(blocks, marks))
}

/// Fetch and validate a block's deletion mark, if any.
async fn fetch_deletion_mark(
    bucket: &dyn Bucket,
    tenant_id: &str,
    block_id: Ulid,
) -> Result<Option<DeletionMark>, ScanError> {
    let mark_path = meta::deletion_mark_path(tenant_id, block_id);
    if !bucket.exists(&mark_path).await? {
        return Ok(None);
    }

    let raw = match bucket.get(&mark_path).await {
        Ok(raw) => raw,
        // The mark was deleted between the existence check and the fetch.
        Err(err) if err.is_not_found() => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    let mark: DeletionMark =
        serde_json::from_slice(&raw).map_err(|source| ScanError::CorruptDeletionMark {
            block: block_id,
            source,
        })?;

    if mark.version != DELETION_MARK_VERSION_1 {
        return Err(ScanError::UnsupportedDeletionMarkVersion {
            block: block_id,
            version: mark.version,
        });
    }

    Ok(Some(mark))
}

/// Parse a tenant listing entry (`<tenant>/<block id>/`) into a block id.
/// Entries that are not ULID-named directories are ignored.
fn parse_block_id(tenant_id: &str, entry: &str) -> Option<Ulid> {
    let rest = entry.strip_prefix(tenant_id)?.strip_prefix('/')?;
    let name = rest.trim_end_matches('/');
    if name.is_empty() || name.contains('/') {
        return None;
    }
    Ulid::from_string(name).ok()
}
