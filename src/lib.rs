//! VpnGw operator - converges declared tunnel gateways into running workloads
//!
//! A `VpnGw` custom resource declares a gateway that may terminate an SSL
//! (OpenVPN) tunnel, an IPsec tunnel, or both. The operator derives a
//! StatefulSet from each `VpnGw`, creates it when missing, updates it when the
//! declared state drifts from the last observed state, and records the
//! observed state back into the `VpnGw` status.
//!
//! # Modules
//!
//! - [`crd`] - The `VpnGw` custom resource, its validation and change detection
//! - [`workload`] - StatefulSet synthesis from a `VpnGw`
//! - [`controller`] - Convergence handler and reconcile dispatcher
//! - [`controller_runner`] - Watch registration for the kube-runtime controller
//! - [`config`] - Controller configuration
//! - [`metrics`] - Reconcile counters
//! - [`telemetry`] - Logging and OpenTelemetry setup
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod controller_runner;
pub mod crd;
pub mod error;
pub mod metrics;
pub mod telemetry;
pub mod workload;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager name used for every write issued by the operator
pub const FIELD_MANAGER: &str = "vpngw-controller";

/// Default delay before a retryable reconcile failure is redelivered
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;

/// Watcher timeout (seconds) - must be less than the client read timeout (30s)
pub const DEFAULT_WATCH_TIMEOUT_SECS: u32 = 25;
