//! VpnGw status: the last observed gateway state
//!
//! The status mirrors every spec field that shapes the StatefulSet. Comparing
//! a freshly declared spec against it tells the controller whether the
//! workload needs to be rewritten.

use k8s_openapi::api::core::v1::{Affinity, Toleration};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::VpnGwSpec;

/// Status for a VpnGw
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VpnGwStatus {
    /// Subnet recorded at creation; never changes afterwards
    #[serde(default)]
    pub subnet: String,

    /// Last observed pinned address
    #[serde(default)]
    pub ip: String,

    /// Last observed replica count
    #[serde(default)]
    pub replicas: i32,

    /// Last observed SSL toggle
    #[serde(default)]
    pub enable_ssl_vpn: bool,

    /// Last observed IPsec toggle
    #[serde(default)]
    pub enable_ipsec_vpn: bool,

    /// Last observed OpenVPN cipher
    #[serde(default)]
    pub ovpn_cipher: String,

    /// Last observed OpenVPN protocol
    #[serde(default)]
    pub ovpn_proto: String,

    /// Last observed OpenVPN port
    #[serde(default)]
    pub ovpn_port: i32,

    /// Last observed OpenVPN client CIDR
    #[serde(default)]
    pub ovpn_subnet_cidr: String,

    /// Last observed SSL server image
    #[serde(default)]
    pub ssl_vpn_image: String,

    /// Last observed IPsec server image override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipsec_vpn_image: Option<String>,

    /// Last observed node selector expressions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selector: Vec<String>,

    /// Last observed tolerations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,

    /// Last observed affinity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,
}

impl VpnGwStatus {
    /// Compute the status that mirrors `spec`, starting from `self`
    ///
    /// Returns the new status and whether any mirrored field differed. Every
    /// field is examined so the result is fully synchronized in one pass.
    /// The subnet only ever moves from empty to set.
    pub fn observe(&self, spec: &VpnGwSpec) -> (VpnGwStatus, bool) {
        let mut next = self.clone();
        let mut changed = false;

        if next.subnet.is_empty() && !spec.subnet.is_empty() {
            next.subnet = spec.subnet.clone();
            changed = true;
        }

        changed |= sync(&mut next.ip, &spec.ip);
        changed |= sync(&mut next.replicas, &spec.replicas);
        changed |= sync(&mut next.enable_ssl_vpn, &spec.enable_ssl_vpn);
        changed |= sync(&mut next.enable_ipsec_vpn, &spec.enable_ipsec_vpn);
        changed |= sync(&mut next.ovpn_cipher, &spec.ovpn_cipher);
        changed |= sync(&mut next.ovpn_proto, &spec.ovpn_proto);
        changed |= sync(&mut next.ovpn_port, &spec.ovpn_port);
        changed |= sync(&mut next.ovpn_subnet_cidr, &spec.ovpn_subnet_cidr);
        changed |= sync(&mut next.ssl_vpn_image, &spec.ssl_vpn_image);

        if !optional_str_equal(next.ipsec_vpn_image.as_deref(), spec.ipsec_vpn_image.as_deref())
        {
            next.ipsec_vpn_image = spec.ipsec_vpn_image.clone();
            changed = true;
        }
        if !selectors_equal(&next.selector, &spec.selector) {
            next.selector = spec.selector.clone();
            changed = true;
        }
        if !tolerations_equal(&next.tolerations, &spec.tolerations) {
            next.tolerations = spec.tolerations.clone();
            changed = true;
        }
        if !affinity_equal(next.affinity.as_ref(), spec.affinity.as_ref()) {
            next.affinity = spec.affinity.clone();
            changed = true;
        }

        (next, changed)
    }
}

fn sync<T: PartialEq + Clone>(observed: &mut T, declared: &T) -> bool {
    if observed == declared {
        return false;
    }
    *observed = declared.clone();
    true
}

/// `None` and `Some("")` carry the same meaning on the wire
fn optional_str_equal(a: Option<&str>, b: Option<&str>) -> bool {
    a.unwrap_or_default() == b.unwrap_or_default()
}

/// Selector expressions are compared in order, exactly as declared
pub fn selectors_equal(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x == y)
}

/// Tolerations are compared field by field, in order
pub fn tolerations_equal(a: &[Toleration], b: &[Toleration]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| toleration_equal(x, y))
}

fn toleration_equal(a: &Toleration, b: &Toleration) -> bool {
    optional_str_equal(a.key.as_deref(), b.key.as_deref())
        && optional_str_equal(a.operator.as_deref(), b.operator.as_deref())
        && optional_str_equal(a.value.as_deref(), b.value.as_deref())
        && optional_str_equal(a.effect.as_deref(), b.effect.as_deref())
        && a.toleration_seconds == b.toleration_seconds
}

/// An absent affinity and an affinity with no rules are the same constraint
pub fn affinity_equal(a: Option<&Affinity>, b: Option<&Affinity>) -> bool {
    fn normalize(affinity: Option<&Affinity>) -> Option<&Affinity> {
        affinity.filter(|a| {
            a.node_affinity.is_some() || a.pod_affinity.is_some() || a.pod_anti_affinity.is_some()
        })
    }
    normalize(a) == normalize(b)
}
