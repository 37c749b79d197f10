//! Helpers for exercising the scanner against an in-memory bucket.

use chrono::Utc;
use ulid::Ulid;

use crate::meta::{
    self, BlockMeta, BlockMetaCompaction, DeletionMark, DELETION_MARK_VERSION_1,
};
use storage::Bucket;

/// Build block metadata covering `[min_time, max_time)`.
///
/// The id's timestamp half is derived from `max_time` and the random half
/// from `seq`, so id order is deterministic and follows block order the way
/// freshly compacted-and-shipped blocks do.
pub fn mock_block_meta(seq: u64, min_time: i64, max_time: i64) -> BlockMeta {
    let id = Ulid::from_parts(max_time as u64, seq as u128);
    BlockMeta {
        version: 1,
        id,
        min_time,
        max_time,
        compaction: BlockMetaCompaction {
            level: 1,
            sources: vec![id],
        },
        other: serde_json::Map::new(),
        uploaded_at: Utc::now(),
    }
}

/// Build a deletion mark for `block`, written one minute ago.
pub fn mock_deletion_mark(block: &BlockMeta) -> DeletionMark {
    DeletionMark {
        id: block.id,
        deletion_time: Utc::now().timestamp() - 60,
        version: DELETION_MARK_VERSION_1,
    }
}

/// Upload `block`'s metadata to its well-known path.
pub async fn upload_block(bucket: &dyn Bucket, tenant_id: &str, block: &BlockMeta) {
    let raw = serde_json::to_vec(block).expect("serialize block meta");
    bucket
        .upload(&meta::meta_path(tenant_id, block.id), raw.into())
        .await
        .expect("upload block meta");
}

/// Upload `mark` to its well-known path.
pub async fn upload_deletion_mark(bucket: &dyn Bucket, tenant_id: &str, mark: &DeletionMark) {
    let raw = serde_json::to_vec(mark).expect("serialize deletion mark");
    bucket
        .upload(&meta::deletion_mark_path(tenant_id, mark.id), raw.into())
        .await
        .expect("upload deletion mark");
}

/// Mark a whole tenant as being deleted.
pub async fn upload_tenant_deletion_mark(bucket: &dyn Bucket, tenant_id: &str) {
    bucket
        .upload(&meta::tenant_deletion_mark_path(tenant_id), "{}".into())
        .await
        .expect("upload tenant deletion mark");
}
