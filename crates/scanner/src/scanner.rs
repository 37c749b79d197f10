//! The blocks scanner service: lifecycle, scan loop, and query path.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use prometheus::Registry;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use ulid::Ulid;

use crate::cache::MetaCache;
use crate::error::{ScanError, ScannerError};
use crate::fetcher;
use crate::index::TenantSet;
use crate::meta::{BlockMeta, DeletionMark};
use crate::metrics::ScannerMetrics;
use config::ScannerConfig;
use storage::Bucket;

/// Lifecycle state of the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannerState {
    New,
    Starting,
    Running,
    Stopping,
    /// The initial scan failed; the scanner will never serve queries.
    Failed,
    Terminated,
}

/// Long-lived service keeping an in-memory index of the blocks stored in a
/// multi-tenant bucket.
///
/// `start` runs one full scan synchronously and only then declares the
/// scanner running; after that a background task re-scans every
/// `scan_interval`. Queries read point-in-time snapshots: the tenant set is
/// replaced wholesale after each successful scan, so a reader never observes
/// a partially built index, and a failed periodic scan leaves the previous
/// snapshot in place.
pub struct BlocksScanner {
    cfg: ScannerConfig,
    bucket: Arc<dyn Bucket>,
    cache: MetaCache,
    metrics: ScannerMetrics,
    state: RwLock<ScannerState>,
    tenants: RwLock<Arc<TenantSet>>,
    shutdown: CancellationToken,
    scan_loop: Mutex<Option<JoinHandle<()>>>,
}

impl BlocksScanner {
    /// Create a new scanner. Metrics are registered into `registry` up
    /// front; the bucket is not touched until `start`.
    pub fn new(
        cfg: ScannerConfig,
        bucket: Arc<dyn Bucket>,
        registry: &Registry,
    ) -> Result<Self, prometheus::Error> {
        let metrics = ScannerMetrics::new(registry)?;
        metrics.consistency_delay_seconds.set(0.0);

        Ok(Self {
            cache: MetaCache::new(PathBuf::from(&cfg.cache_dir)),
            cfg,
            bucket,
            metrics,
            state: RwLock::new(ScannerState::New),
            tenants: RwLock::new(Arc::new(TenantSet::new())),
            shutdown: CancellationToken::new(),
            scan_loop: Mutex::new(None),
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ScannerState {
        *self.state.read().unwrap()
    }

    /// Run the initial scan and, on success, spawn the periodic scan loop.
    ///
    /// A failed initial scan moves the scanner to [`ScannerState::Failed`]
    /// permanently. A `stop` issued while the initial scan is still running
    /// interrupts it and returns [`ScannerError::Stopped`].
    pub async fn start(self: &Arc<Self>) -> Result<(), ScannerError> {
        {
            let mut state = self.state.write().unwrap();
            if *state != ScannerState::New {
                return Err(ScannerError::AlreadyStarted);
            }
            *state = ScannerState::Starting;
        }

        tracing::info!("starting blocks scanner, running initial scan");

        let initial = tokio::select! {
            _ = self.shutdown.cancelled() => {
                *self.state.write().unwrap() = ScannerState::Terminated;
                return Err(ScannerError::Stopped);
            }
            scanned = self.scan() => scanned,
        };

        if let Err(err) = initial {
            *self.state.write().unwrap() = ScannerState::Failed;
            tracing::error!(error = %err, "initial blocks scan failed");
            return Err(ScannerError::InitialScan(err));
        }

        *self.state.write().unwrap() = ScannerState::Running;

        let scanner = Arc::clone(self);
        *self.scan_loop.lock().unwrap() = Some(tokio::spawn(scanner.run_scan_loop()));

        tracing::info!(
            scan_interval = ?self.cfg.scan_interval(),
            "blocks scanner running"
        );
        Ok(())
    }

    /// Stop the scanner, cancelling any scan in flight. Returns once the
    /// scan loop has exited.
    pub async fn stop(&self) {
        {
            let mut state = self.state.write().unwrap();
            if matches!(
                *state,
                ScannerState::New | ScannerState::Starting | ScannerState::Running
            ) {
                *state = ScannerState::Stopping;
            }
        }

        tracing::info!("stopping blocks scanner");
        self.shutdown.cancel();

        let scan_loop = self.scan_loop.lock().unwrap().take();
        if let Some(scan_loop) = scan_loop {
            if let Err(err) = scan_loop.await {
                if !err.is_cancelled() {
                    tracing::error!(error = %err, "blocks scan loop task failed");
                }
            }
        }

        let mut state = self.state.write().unwrap();
        if *state != ScannerState::Failed {
            *state = ScannerState::Terminated;
        }
        tracing::info!("blocks scanner stopped");
    }

    /// Return the blocks of `tenant_id` overlapping `[min_t, max_t]`
    /// together with the deletion marks of those blocks.
    ///
    /// Blocks come sorted by `max_time` descending, ties broken by id
    /// descending. An unknown tenant yields empty results; a scanner that is
    /// not running yields [`ScannerError::NotRunning`].
    pub fn get_blocks(
        &self,
        tenant_id: &str,
        min_t: i64,
        max_t: i64,
    ) -> Result<(Vec<BlockMeta>, HashMap<Ulid, DeletionMark>), ScannerError> {
        if *self.state.read().unwrap() != ScannerState::Running {
            return Err(ScannerError::NotRunning);
        }

        let tenants = Arc::clone(&*self.tenants.read().unwrap());
        let Some(index) = tenants.get(tenant_id) else {
            return Ok((Vec::new(), HashMap::new()));
        };
        Ok(index.query(min_t, max_t))
    }

    async fn run_scan_loop(self: Arc<Self>) {
        let period = self.cfg.scan_interval();
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                scanned = self.scan() => {
                    if let Err(err) = scanned {
                        // Keep serving the previous snapshot.
                        tracing::error!(error = %err, "periodic blocks scan failed");
                    }
                }
            }
        }
    }

    /// Run one full scan attempt, updating the sync metrics.
    pub(crate) async fn scan(&self) -> Result<(), ScanError> {
        self.metrics.syncs_total.inc();
        let started = Instant::now();

        let scanned = self.scan_bucket().await;
        self.metrics
            .scan_duration_seconds
            .observe(started.elapsed().as_secs_f64());

        match scanned {
            Ok(()) => {
                self.metrics
                    .last_successful_scan_timestamp_seconds
                    .set(Utc::now().timestamp() as f64);
                Ok(())
            }
            Err(err) => {
                self.metrics.sync_failures_total.inc();
                Err(err)
            }
        }
    }

    async fn scan_bucket(&self) -> Result<(), ScanError> {
        let tenant_ids = fetcher::list_tenants(self.bucket.as_ref()).await?;
        let previous = Arc::clone(&*self.tenants.read().unwrap());

        let mut scans = stream::iter(tenant_ids.into_iter().map(|tenant_id| {
            let previous = previous.get(&tenant_id).cloned();
            async move {
                let index = fetcher::fetch_tenant_index(
                    self.bucket.as_ref(),
                    &self.cache,
                    self.cfg.metas_concurrency,
                    &tenant_id,
                    previous.as_deref(),
                )
                .await?;
                Ok::<_, ScanError>((tenant_id, index))
            }
        }))
        .buffer_unordered(self.cfg.tenants_concurrency.max(1));

        let mut next = TenantSet::new();
        while let Some(scanned) = scans.next().await {
            // First failing tenant aborts the scan; dropping the stream
            // cancels the tenants still in flight.
            let (tenant_id, index) = scanned?;
            next.insert(tenant_id, Arc::new(index));
        }
        drop(scans);

        let next = Arc::new(next);
        *self.tenants.write().unwrap() = Arc::clone(&next);

        if let Err(err) = self.cache.gc(&next) {
            tracing::warn!(error = %err, "blocks metadata cache garbage collection failed");
        }

        tracing::debug!(tenants = next.len(), "blocks scan completed");
        Ok(())
    }
}

impl Drop for BlocksScanner {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(scan_loop) = self.scan_loop.lock().unwrap().take() {
            scan_loop.abort();
        }
    }
}
