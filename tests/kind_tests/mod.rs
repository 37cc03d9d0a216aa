//! Integration tests for the VpnGw operator
//!
//! These tests require a Kubernetes cluster (kind) and tell the story of how
//! a network administrator manages VPN gateways.
//!
//! - `vpngw_lifecycle`: creating, scaling and deleting gateways against a
//!   real API server, with the reconcile dispatcher driven by hand
//!
//! ```bash
//! cargo test --test kind -- --ignored --nocapture
//! ```

mod helpers;
mod vpngw_lifecycle;
