use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;

/// Global runtime metrics for the collector.
///
/// Lock-free counters, safe to bump from any task.
#[derive(Default)]
pub struct RuntimeMetrics {
    pub protocols_active: AtomicUsize,

    // Scrape cycles
    pub cycles_run: AtomicUsize,
    pub fetch_errors: AtomicUsize,
    pub parse_errors: AtomicUsize,

    // Output sinks
    pub rates_emitted: AtomicUsize,
    pub states_emitted: AtomicUsize,
    pub dropped_records: AtomicUsize,

    // Ingest master
    pub records_forwarded: AtomicUsize,
    pub publish_errors: AtomicUsize,
    pub ingest_reconnects: AtomicUsize,
}

impl RuntimeMetrics {
    /// One-line summary for the periodic reporter.
    pub fn summary(&self) -> String {
        format!(
            "protocols={} cycles={} fetch_err={} parse_err={} rates={} states={} dropped={} forwarded={} publish_err={} reconnects={}",
            self.protocols_active.load(Ordering::Relaxed),
            self.cycles_run.load(Ordering::Relaxed),
            self.fetch_errors.load(Ordering::Relaxed),
            self.parse_errors.load(Ordering::Relaxed),
            self.rates_emitted.load(Ordering::Relaxed),
            self.states_emitted.load(Ordering::Relaxed),
            self.dropped_records.load(Ordering::Relaxed),
            self.records_forwarded.load(Ordering::Relaxed),
            self.publish_errors.load(Ordering::Relaxed),
            self.ingest_reconnects.load(Ordering::Relaxed),
        )
    }
}

/// Global metrics registry (singleton)
pub static METRICS: Lazy<Arc<RuntimeMetrics>> =
    Lazy::new(|| Arc::new(RuntimeMetrics::default()));
