//! Block metadata and deletion mark types plus their bucket paths.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// File holding a block's metadata, under the block directory.
pub const META_FILENAME: &str = "meta.json";

/// File marking a block as scheduled for deletion, under the block directory.
pub const DELETION_MARK_FILENAME: &str = "deletion-mark.json";

/// File marking a whole tenant as being deleted, under the tenant prefix.
pub const TENANT_DELETION_MARK_FILENAME: &str = "tenant-deletion-mark.json";

/// The only recognized deletion mark format version.
pub const DELETION_MARK_VERSION_1: i32 = 1;

/// Metadata of one immutable block.
///
/// The wire form is the block's `meta.json`; fields this service doesn't
/// interpret are kept in `other` so the cached copy round-trips verbatim.
/// `uploaded_at` is not part of the wire form: it is stamped when the scanner
/// first observes the block and carried forward across scans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockMeta {
    pub version: i32,

    #[serde(rename = "ulid")]
    pub id: Ulid,

    /// Start of the covered interval, inclusive, in ms
    #[serde(rename = "minTime")]
    pub min_time: i64,

    /// End of the covered interval, exclusive, in ms
    #[serde(rename = "maxTime")]
    pub max_time: i64,

    #[serde(default)]
    pub compaction: BlockMetaCompaction,

    #[serde(flatten)]
    pub(crate) other: serde_json::Map<String, serde_json::Value>,

    #[serde(skip, default = "Utc::now")]
    pub uploaded_at: DateTime<Utc>,
}

/// Compaction lineage of a block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockMetaCompaction {
    #[serde(default)]
    pub level: i32,

    #[serde(default)]
    pub sources: Vec<Ulid>,
}

/// Marker colocated with a block indicating it is scheduled for deletion.
///
/// The scanner reports every mark it sees; whether a mark actually hides the
/// block is decided by consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletionMark {
    pub id: Ulid,

    /// Unix seconds at which the mark was written
    pub deletion_time: i64,

    pub version: i32,
}

/// Path of a block's `meta.json`.
pub fn meta_path(tenant_id: &str, block_id: Ulid) -> String {
    format!("{}/{}/{}", tenant_id, block_id, META_FILENAME)
}

/// Path of a block's deletion mark.
pub fn deletion_mark_path(tenant_id: &str, block_id: Ulid) -> String {
    format!("{}/{}/{}", tenant_id, block_id, DELETION_MARK_FILENAME)
}

/// Path of a tenant's deletion marker.
pub fn tenant_deletion_mark_path(tenant_id: &str) -> String {
    format!("{}/{}", tenant_id, TENANT_DELETION_MARK_FILENAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let id = Ulid::from_parts(20, 7);
        assert_eq!(meta_path("user-1", id), format!("user-1/{}/meta.json", id));
        assert_eq!(
            deletion_mark_path("user-1", id),
            format!("user-1/{}/deletion-mark.json", id)
        );
        assert_eq!(
            tenant_deletion_mark_path("user-1"),
            "user-1/tenant-deletion-mark.json"
        );
    }

    #[test]
    fn test_block_meta_parses_wire_form() {
        let raw = r#"{
            "version": 1,
            "ulid": "01ARZ3NDEKTSV4RRFFQ69G5FAV",
            "minTime": 10,
            "maxTime": 20,
            "compaction": {"level": 1, "sources": ["01ARZ3NDEKTSV4RRFFQ69G5FAV"]},
            "stats": {"numSeries": 42}
        }"#;

        let meta: BlockMeta = serde_json::from_str(raw).unwrap();
        assert_eq!(meta.version, 1);
        assert_eq!(meta.id.to_string(), "01ARZ3NDEKTSV4RRFFQ69G5FAV");
        assert_eq!(meta.min_time, 10);
        assert_eq!(meta.max_time, 20);
        assert_eq!(meta.compaction.level, 1);
        assert_eq!(meta.compaction.sources, vec![meta.id]);
    }

    #[test]
    fn test_block_meta_preserves_unknown_fields() {
        let raw = r#"{"version":1,"ulid":"01ARZ3NDEKTSV4RRFFQ69G5FAV","minTime":10,"maxTime":20,"stats":{"numSeries":42},"extensions":{"labels":{}}}"#;

        let meta: BlockMeta = serde_json::from_str(raw).unwrap();
        let reencoded = serde_json::to_value(&meta).unwrap();

        assert_eq!(reencoded["stats"]["numSeries"], 42);
        assert!(reencoded["extensions"]["labels"].is_object());
        // uploaded_at is scanner-local state, never serialized
        assert!(reencoded.get("uploaded_at").is_none());
    }

    #[test]
    fn test_deletion_mark_wire_form() {
        let raw = r#"{"id":"01ARZ3NDEKTSV4RRFFQ69G5FAV","deletion_time":1600000000,"version":1}"#;

        let mark: DeletionMark = serde_json::from_str(raw).unwrap();
        assert_eq!(mark.deletion_time, 1600000000);
        assert_eq!(mark.version, DELETION_MARK_VERSION_1);

        let reencoded = serde_json::to_string(&mark).unwrap();
        let reparsed: DeletionMark = serde_json::from_str(&reencoded).unwrap();
        assert_eq!(mark, reparsed);
    }
}
