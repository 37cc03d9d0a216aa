//! Controller implementation for VpnGw resources
//!
//! Controllers follow the Kubernetes controller pattern with observe-diff-act
//! loops. All API server access goes through [`GatewayStore`].

mod store;
mod vpn_gw;

pub use store::{GatewayStore, GwKey, KubeStore};
pub use vpn_gw::{
    dispatch, error_policy, reconcile, Context, ContextBuilder, Converge, StatefulSetConverger,
    SyncState,
};
