// Metrics and monitoring

#[cfg(feature = "metrics")]
mod registry {
    use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
    use std::sync::Arc;

    /// Tracker metrics
    pub struct TrackerMetrics {
        // Ingestion
        pub events_ingested: IntCounter,
        pub batches_committed: IntCounter,
        pub resolution_errors: IntCounter,
        pub commit_duration: Histogram,

        // Claims
        pub claims_acquired: IntCounter,
        pub claims_rejected: IntCounter,
        pub claims_released: IntCounter,

        /// Candidates returned, labelled by record set
        pub candidates_returned: IntCounterVec,

        registry: Arc<Registry>,
    }

    impl TrackerMetrics {
        pub fn new() -> prometheus::Result<Self> {
            let registry = Arc::new(Registry::new());

            let events_ingested =
                IntCounter::new("packet_tracker_events_ingested_total", "Packet events committed to the store")?;
            let batches_committed =
                IntCounter::new("packet_tracker_batches_committed_total", "Event batches committed")?;
            let resolution_errors = IntCounter::new(
                "packet_tracker_resolution_errors_total",
                "Event batches aborted by a connection resolution failure",
            )?;
            let commit_duration = Histogram::with_opts(HistogramOpts::new(
                "packet_tracker_commit_duration_seconds",
                "Time to commit a prepared batch",
            ))?;
            let claims_acquired =
                IntCounter::new("packet_tracker_claims_acquired_total", "Claims won by this process")?;
            let claims_rejected =
                IntCounter::new("packet_tracker_claims_rejected_total", "Claims lost to another worker")?;
            let claims_released =
                IntCounter::new("packet_tracker_claims_released_total", "Claims released after a failed relay")?;
            let candidates_returned = IntCounterVec::new(
                Opts::new("packet_tracker_candidates_returned_total", "Candidates returned by queries"),
                &["set"],
            )?;

            registry.register(Box::new(events_ingested.clone()))?;
            registry.register(Box::new(batches_committed.clone()))?;
            registry.register(Box::new(resolution_errors.clone()))?;
            registry.register(Box::new(commit_duration.clone()))?;
            registry.register(Box::new(claims_acquired.clone()))?;
            registry.register(Box::new(claims_rejected.clone()))?;
            registry.register(Box::new(claims_released.clone()))?;
            registry.register(Box::new(candidates_returned.clone()))?;

            Ok(Self {
                events_ingested,
                batches_committed,
                resolution_errors,
                commit_duration,
                claims_acquired,
                claims_rejected,
                claims_released,
                candidates_returned,
                registry,
            })
        }

        pub fn registry(&self) -> Arc<Registry> {
            self.registry.clone()
        }

        pub fn record_commit(&self, events: usize, seconds: f64) {
            self.events_ingested.inc_by(events as u64);
            self.batches_committed.inc();
            self.commit_duration.observe(seconds);
        }

        pub fn record_resolution_error(&self) {
            self.resolution_errors.inc();
        }

        pub fn record_claim(&self, won: bool) {
            if won {
                self.claims_acquired.inc();
            } else {
                self.claims_rejected.inc();
            }
        }

        pub fn record_release(&self, released: bool) {
            if released {
                self.claims_released.inc();
            }
        }

        pub fn record_candidates(&self, set: &str, count: usize) {
            self.candidates_returned.with_label_values(&[set]).inc_by(count as u64);
        }
    }
}

#[cfg(not(feature = "metrics"))]
mod registry {
    /// No-op metrics when the `metrics` feature is disabled
    #[derive(Default)]
    pub struct TrackerMetrics;

    impl TrackerMetrics {
        pub fn new() -> Result<Self, std::convert::Infallible> {
            Ok(Self)
        }

        pub fn record_commit(&self, _events: usize, _seconds: f64) {}

        pub fn record_resolution_error(&self) {}

        pub fn record_claim(&self, _won: bool) {}

        pub fn record_release(&self, _released: bool) {}

        pub fn record_candidates(&self, _set: &str, _count: usize) {}
    }
}

pub use registry::TrackerMetrics;
