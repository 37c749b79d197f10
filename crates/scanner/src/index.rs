//! In-memory, per-tenant index of block metadata and deletion marks.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use ulid::Ulid;

use crate::meta::{BlockMeta, DeletionMark};

/// All indexed tenants. Replaced wholesale after each successful scan;
/// readers clone the inner `Arc`s and query without holding any lock.
pub type TenantSet = HashMap<String, Arc<TenantIndex>>;

/// Point-in-time index of one tenant's blocks.
///
/// Blocks are kept sorted by `max_time` descending, ties broken by id
/// descending, so range queries can stop at the first block that ends at or
/// before the queried window. Deletion marks are restricted to blocks that
/// are actually present.
#[derive(Debug, Default)]
pub struct TenantIndex {
    blocks: Vec<BlockMeta>,
    marks: HashMap<Ulid, DeletionMark>,
}

impl TenantIndex {
    pub fn new(mut blocks: Vec<BlockMeta>, mut marks: HashMap<Ulid, DeletionMark>) -> Self {
        blocks.sort_by(|a, b| {
            b.max_time
                .cmp(&a.max_time)
                .then_with(|| b.id.cmp(&a.id))
        });

        let ids: HashSet<Ulid> = blocks.iter().map(|b| b.id).collect();
        marks.retain(|id, _| ids.contains(id));

        Self { blocks, marks }
    }

    /// All blocks, in query order.
    pub fn blocks(&self) -> &[BlockMeta] {
        &self.blocks
    }

    /// Look up a block by id.
    pub fn block(&self, id: Ulid) -> Option<&BlockMeta> {
        self.blocks.iter().find(|b| b.id == id)
    }

    /// All deletion marks, keyed by block id.
    pub fn marks(&self) -> &HashMap<Ulid, DeletionMark> {
        &self.marks
    }

    /// Return the blocks overlapping the window `[min_t, max_t]`, in index
    /// order, together with the deletion marks of exactly those blocks.
    ///
    /// Block intervals are half-open `[min_time, max_time)`: a block ending
    /// exactly at `min_t` does not match, while one starting exactly at
    /// `max_t` does.
    pub fn query(&self, min_t: i64, max_t: i64) -> (Vec<BlockMeta>, HashMap<Ulid, DeletionMark>) {
        let mut blocks = Vec::new();
        for block in &self.blocks {
            // Sorted by max_time descending: nothing further can overlap.
            if block.max_time <= min_t {
                break;
            }
            if block.min_time <= max_t {
                blocks.push(block.clone());
            }
        }

        let marks = blocks
            .iter()
            .filter_map(|b| self.marks.get(&b.id).map(|m| (b.id, m.clone())))
            .collect();

        (blocks, marks)
    }
}
