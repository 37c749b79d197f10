//! Background service maintaining an in-memory, queryable index of the
//! immutable time-series blocks stored in a multi-tenant object store.
//!
//! The scanner periodically synchronizes block metadata and deletion marks
//! from the bucket into per-tenant, time-sorted indexes, caching fetched
//! metadata on disk so repeat scans (and restarts) stay cheap. Queries
//! enumerate the blocks overlapping a time window without touching the
//! bucket.

mod fetcher;

pub mod cache;
pub mod error;
pub mod index;
pub mod meta;
pub mod metrics;
pub mod scanner;
pub mod testutil;

// Re-exports for convenience
pub use error::{ScanError, ScannerError};
pub use index::{TenantIndex, TenantSet};
pub use meta::{BlockMeta, BlockMetaCompaction, DeletionMark};
pub use metrics::ScannerMetrics;
pub use scanner::{BlocksScanner, ScannerState};
