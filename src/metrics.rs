//! Reconcile metrics for the VpnGw controller
//!
//! Two monotonic OpenTelemetry counters:
//! - `vpngw_reconcile_total`: every dispatched reconcile
//! - `vpngw_reconcile_errors_total`: every reconcile whose convergence failed
//!
//! [`ReconcileMetrics`] also keeps in-process totals so callers can read
//! what the controller recorded without going through an exporter.

use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::Lazy;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Meter};
use opentelemetry::KeyValue;

/// Global meter for VpnGw metrics
static METER: Lazy<Meter> = Lazy::new(|| global::meter("vpngw"));

/// Counter of reconcile dispatches
pub static RECONCILE_TOTAL: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("vpngw_reconcile_total")
        .with_description("Total number of VpnGw reconciliations")
        .with_unit("{reconciles}")
        .build()
});

/// Counter of non-success reconcile outcomes
///
/// Labels:
/// - `result`: error, error_no_retry
pub static RECONCILE_ERRORS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("vpngw_reconcile_errors_total")
        .with_description("Total number of failed VpnGw reconciliations")
        .with_unit("{errors}")
        .build()
});

/// Records reconcile outcomes to the global counters and local totals
#[derive(Debug, Default)]
pub struct ReconcileMetrics {
    dispatched: AtomicU64,
    failed: AtomicU64,
}

impl ReconcileMetrics {
    /// Create a recorder with zeroed totals
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one dispatched reconcile
    pub fn record_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        RECONCILE_TOTAL.add(1, &[]);
    }

    /// Record one failed reconcile, labelled with its outcome
    pub fn record_failure(&self, result: &'static str) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        RECONCILE_ERRORS.add(1, &[KeyValue::new("result", result)]);
    }

    /// Reconciles dispatched so far
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Reconciles failed so far
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}
