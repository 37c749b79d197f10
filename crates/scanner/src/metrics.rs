use prometheus::{Gauge, Histogram, HistogramOpts, IntCounter, Opts, Registry};

/// Prometheus instruments published by the blocks scanner.
///
/// The two sync counters move in lockstep per scan attempt: `syncs_total`
/// on every attempt, `sync_failures_total` once per attempt that errored.
#[derive(Clone)]
pub struct ScannerMetrics {
    /// Total blocks metadata synchronization attempts
    pub syncs_total: IntCounter,

    /// Total blocks metadata synchronization attempts that failed
    pub sync_failures_total: IntCounter,

    /// Configured consistency delay in seconds
    pub consistency_delay_seconds: Gauge,

    /// Unix timestamp of the last successful blocks scan, 0 until the first
    /// success
    pub last_successful_scan_timestamp_seconds: Gauge,

    /// Wall-clock duration of blocks scans
    pub scan_duration_seconds: Histogram,
}

impl ScannerMetrics {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let syncs_total = IntCounter::with_opts(
            Opts::new(
                "blocks_meta_syncs_total",
                "Total blocks metadata synchronization attempts",
            )
            .const_label("component", "querier"),
        )?;
        registry.register(Box::new(syncs_total.clone()))?;

        let sync_failures_total = IntCounter::with_opts(
            Opts::new(
                "blocks_meta_sync_failures_total",
                "Total blocks metadata synchronization failures",
            )
            .const_label("component", "querier"),
        )?;
        registry.register(Box::new(sync_failures_total.clone()))?;

        let consistency_delay_seconds = Gauge::with_opts(
            Opts::new(
                "blocks_meta_sync_consistency_delay_seconds",
                "Configured consistency delay in seconds.",
            )
            .const_label("component", "querier"),
        )?;
        registry.register(Box::new(consistency_delay_seconds.clone()))?;

        let last_successful_scan_timestamp_seconds = Gauge::with_opts(Opts::new(
            "querier_blocks_last_successful_scan_timestamp_seconds",
            "Unix timestamp of the last successful blocks scan.",
        ))?;
        registry.register(Box::new(last_successful_scan_timestamp_seconds.clone()))?;

        let scan_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "querier_blocks_scan_duration_seconds",
            "Time it takes to perform a full blocks scan.",
        ))?;
        registry.register(Box::new(scan_duration_seconds.clone()))?;

        Ok(Self {
            syncs_total,
            sync_failures_total,
            consistency_delay_seconds,
            last_successful_scan_timestamp_seconds,
            scan_duration_seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_and_gather() {
        let registry = Registry::new();
        let metrics = ScannerMetrics::new(&registry).unwrap();

        metrics.syncs_total.inc();
        metrics.sync_failures_total.inc();
        metrics.scan_duration_seconds.observe(0.5);

        let families: Vec<String> = registry
            .gather()
            .into_iter()
            .map(|f| f.get_name().to_string())
            .collect();

        assert!(families.contains(&"blocks_meta_syncs_total".to_string()));
        assert!(families.contains(&"blocks_meta_sync_failures_total".to_string()));
        assert!(families.contains(&"blocks_meta_sync_consistency_delay_seconds".to_string()));
        assert!(families
            .contains(&"querier_blocks_last_successful_scan_timestamp_seconds".to_string()));
        assert!(families.contains(&"querier_blocks_scan_duration_seconds".to_string()));
    }

    #[test]
    fn test_component_label() {
        let registry = Registry::new();
        let _metrics = ScannerMetrics::new(&registry).unwrap();

        let families = registry.gather();
        let syncs = families
            .iter()
            .find(|f| f.get_name() == "blocks_meta_syncs_total")
            .unwrap();
        let labels = syncs.get_metric()[0].get_label();
        assert_eq!(labels[0].get_name(), "component");
        assert_eq!(labels[0].get_value(), "querier");
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        let _metrics = ScannerMetrics::new(&registry).unwrap();
        assert!(ScannerMetrics::new(&registry).is_err());
    }
}
