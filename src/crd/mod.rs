//! Custom Resource Definitions for the VpnGw operator

mod status;
mod vpn_gw;

pub use status::{affinity_equal, selectors_equal, tolerations_equal, VpnGwStatus};
pub use vpn_gw::{VpnGw, VpnGwSpec, MAX_OVPN_PORT, MAX_REPLICAS, OVPN_PROTO_TCP, OVPN_PROTO_UDP};
