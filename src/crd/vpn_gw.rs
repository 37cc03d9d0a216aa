//! VpnGw Custom Resource Definition
//!
//! A VpnGw declares a tunnel gateway attached to a kube-ovn subnet. It may run
//! an SSL (OpenVPN) server, an IPsec server, or both.

use k8s_openapi::api::core::v1::{Affinity, Toleration};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::VpnGwStatus;
use crate::Error;

/// Upper bound on gateway replicas
pub const MAX_REPLICAS: i32 = 2;

/// OpenVPN over UDP
pub const OVPN_PROTO_UDP: &str = "udp";

/// OpenVPN over TCP
pub const OVPN_PROTO_TCP: &str = "tcp";

/// Highest valid OpenVPN listen port
pub const MAX_OVPN_PORT: i32 = 65535;

/// Specification for a VpnGw
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "vpn-gw.kube-ovn-operator.com",
    version = "v1",
    kind = "VpnGw",
    plural = "vpngws",
    shortname = "vpngw",
    status = "VpnGwStatus",
    namespaced,
    printcolumn = r#"{"name":"Subnet","type":"string","jsonPath":".spec.subnet"}"#,
    printcolumn = r#"{"name":"IP","type":"string","jsonPath":".spec.ip"}"#,
    printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"SSL","type":"boolean","jsonPath":".spec.enableSslVpn"}"#,
    printcolumn = r#"{"name":"IPsec","type":"boolean","jsonPath":".spec.enableIpsecVpn"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct VpnGwSpec {
    /// kube-ovn logical switch the gateway pods attach to
    #[serde(default)]
    pub subnet: String,

    /// Pinned pod address; allocated from the subnet when empty
    #[serde(default)]
    pub ip: String,

    /// Number of gateway pods (0-2)
    #[serde(default)]
    pub replicas: i32,

    /// Run the SSL (OpenVPN) tunnel server
    #[serde(default)]
    pub enable_ssl_vpn: bool,

    /// Run the IPsec tunnel server
    #[serde(default)]
    pub enable_ipsec_vpn: bool,

    /// OpenVPN cipher suite (e.g., AES-256-GCM)
    #[serde(default)]
    pub ovpn_cipher: String,

    /// OpenVPN transport protocol: udp or tcp
    #[serde(default)]
    pub ovpn_proto: String,

    /// OpenVPN listen port
    #[serde(default)]
    pub ovpn_port: i32,

    /// CIDR handed out to OpenVPN clients
    #[serde(default)]
    pub ovpn_subnet_cidr: String,

    /// Image for the SSL tunnel server container
    #[serde(default)]
    pub ssl_vpn_image: String,

    /// Image for the IPsec tunnel server container, defaults to `sslVpnImage`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipsec_vpn_image: Option<String>,

    /// Node selector expressions in `key:value` form
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selector: Vec<String>,

    /// Tolerations copied onto the gateway pods
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,

    /// Affinity copied onto the gateway pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,
}

impl VpnGwSpec {
    /// Image the IPsec container runs
    pub fn resolved_ipsec_image(&self) -> &str {
        self.ipsec_vpn_image
            .as_deref()
            .filter(|image| !image.is_empty())
            .unwrap_or(&self.ssl_vpn_image)
    }

    /// Validate the gateway specification
    ///
    /// Rules are checked in order and the first failure wins. `gw` is the
    /// `namespace/name` used in the error.
    pub fn validate(&self, gw: &str) -> Result<(), Error> {
        if self.subnet.is_empty() {
            return Err(Error::validation_for_field(
                gw,
                "spec.subnet",
                "vpn gw subnet is required",
            ));
        }
        if self.ip.is_empty() {
            info!(gw = %gw, "vpn gw ip not set, it will be allocated from the subnet");
        }
        if !(0..=MAX_REPLICAS).contains(&self.replicas) {
            return Err(Error::validation_for_field(
                gw,
                "spec.replicas",
                format!("vpn gw replicas should be between 0 and {MAX_REPLICAS}"),
            ));
        }
        if self.enable_ssl_vpn {
            self.validate_ssl_vpn(gw)?;
        }
        if self.enable_ipsec_vpn && self.resolved_ipsec_image().is_empty() {
            return Err(Error::validation_for_field(
                gw,
                "spec.ipsecVpnImage",
                "ipsec vpn image is required",
            ));
        }
        Ok(())
    }

    fn validate_ssl_vpn(&self, gw: &str) -> Result<(), Error> {
        if self.ovpn_cipher.is_empty() {
            return Err(Error::validation_for_field(
                gw,
                "spec.ovpnCipher",
                "ssl vpn cipher is required",
            ));
        }
        if self.ovpn_proto.is_empty() {
            return Err(Error::validation_for_field(
                gw,
                "spec.ovpnProto",
                "ssl vpn proto is required",
            ));
        }
        if self.ovpn_port == 0 {
            return Err(Error::validation_for_field(
                gw,
                "spec.ovpnPort",
                "ssl vpn port is required",
            ));
        }
        if !(1..=MAX_OVPN_PORT).contains(&self.ovpn_port) {
            return Err(Error::validation_for_field(
                gw,
                "spec.ovpnPort",
                format!("ssl vpn port {} is out of range 1-{}", self.ovpn_port, MAX_OVPN_PORT),
            ));
        }
        if self.ovpn_subnet_cidr.is_empty() {
            return Err(Error::validation_for_field(
                gw,
                "spec.ovpnSubnetCidr",
                "ssl vpn subnet cidr is required",
            ));
        }
        if self.ovpn_proto != OVPN_PROTO_UDP && self.ovpn_proto != OVPN_PROTO_TCP {
            return Err(Error::validation_for_field(
                gw,
                "spec.ovpnProto",
                "ssl vpn proto should be udp or tcp",
            ));
        }
        if self.ssl_vpn_image.is_empty() {
            return Err(Error::validation_for_field(
                gw,
                "spec.sslVpnImage",
                "ssl vpn image is required",
            ));
        }
        Ok(())
    }
}

impl VpnGw {
    /// `namespace/name` identity used in logs and errors
    pub fn key(&self) -> String {
        match self.namespace() {
            Some(ns) => format!("{}/{}", ns, self.name_any()),
            None => self.name_any(),
        }
    }

    /// Validate the resource: its spec, plus subnet immutability against the
    /// recorded status
    pub fn validate(&self) -> Result<(), Error> {
        let key = self.key();
        self.spec.validate(&key)?;

        let recorded = self
            .status
            .as_ref()
            .map(|s| s.subnet.as_str())
            .unwrap_or_default();
        if !recorded.is_empty() && recorded != self.spec.subnet {
            return Err(Error::validation_for_field(
                key,
                "spec.subnet",
                format!(
                    "vpn gw subnet cannot change after creation (recorded {}, declared {})",
                    recorded, self.spec.subnet
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Test Fixtures
    // =========================================================================

    fn plain_spec() -> VpnGwSpec {
        VpnGwSpec {
            subnet: "10.0.0.0/24".to_string(),
            replicas: 1,
            ..Default::default()
        }
    }

    fn ssl_spec() -> VpnGwSpec {
        VpnGwSpec {
            enable_ssl_vpn: true,
            ovpn_proto: "udp".to_string(),
            ovpn_port: 1194,
            ovpn_cipher: "AES-256-GCM".to_string(),
            ovpn_subnet_cidr: "10.8.0.0/24".to_string(),
            ssl_vpn_image: "vpn:latest".to_string(),
            ..plain_spec()
        }
    }

    fn field_of(spec: &VpnGwSpec) -> Option<String> {
        spec.validate("default/gw1")
            .err()
            .and_then(|e| e.field().map(str::to_string))
    }

    // =========================================================================
    // Accepted Specs
    // =========================================================================

    /// Story: A minimal gateway with both tunnels off is valid
    #[test]
    fn story_minimal_gateway_is_accepted() {
        assert!(plain_spec().validate("default/gw1").is_ok());
    }

    /// Story: A missing pinned address is fine, it gets allocated
    #[test]
    fn story_missing_ip_is_not_an_error() {
        let spec = plain_spec();
        assert!(spec.ip.is_empty());
        assert!(spec.validate("default/gw1").is_ok());
    }

    #[test]
    fn test_full_ssl_gateway_is_accepted() {
        assert!(ssl_spec().validate("default/gw1").is_ok());
        let tcp = VpnGwSpec {
            ovpn_proto: "tcp".to_string(),
            ..ssl_spec()
        };
        assert!(tcp.validate("default/gw1").is_ok());
    }

    #[test]
    fn test_replica_bounds_are_inclusive() {
        for replicas in [0, 1, 2] {
            let spec = VpnGwSpec {
                replicas,
                ..plain_spec()
            };
            assert!(spec.validate("default/gw1").is_ok(), "replicas={replicas}");
        }
    }

    // =========================================================================
    // Rejected Specs
    // =========================================================================

    #[test]
    fn test_empty_subnet_is_rejected() {
        let spec = VpnGwSpec {
            subnet: String::new(),
            ..plain_spec()
        };
        assert_eq!(field_of(&spec).as_deref(), Some("spec.subnet"));
    }

    /// Story: Replica counts outside 0..=2 are rejected
    #[test]
    fn story_out_of_range_replicas_are_rejected() {
        for replicas in [-1, 3] {
            let spec = VpnGwSpec {
                replicas,
                ..plain_spec()
            };
            assert_eq!(field_of(&spec).as_deref(), Some("spec.replicas"));
        }
    }

    /// Story: Enabling SSL without a cipher fails on the cipher field
    #[test]
    fn story_ssl_without_cipher_is_rejected() {
        let spec = VpnGwSpec {
            ovpn_cipher: String::new(),
            ..ssl_spec()
        };
        let err = spec.validate("default/gw1").unwrap_err();
        assert_eq!(err.field(), Some("spec.ovpnCipher"));
        assert!(err.to_string().contains("cipher is required"));
    }

    /// Story: Only udp and tcp are accepted tunnel transports
    #[test]
    fn story_ssl_with_unknown_proto_is_rejected() {
        let spec = VpnGwSpec {
            ovpn_proto: "http".to_string(),
            ..ssl_spec()
        };
        let err = spec.validate("default/gw1").unwrap_err();
        assert_eq!(err.field(), Some("spec.ovpnProto"));
        assert!(err.to_string().contains("udp or tcp"));
    }

    #[test]
    fn test_crd_carries_status_subresource() {
        use kube::CustomResourceExt;

        let crd = VpnGw::crd();
        assert_eq!(crd.spec.names.kind, "VpnGw");
        let version = &crd.spec.versions[0];
        assert!(version
            .subresources
            .as_ref()
            .and_then(|s| s.status.as_ref())
            .is_some());

        let gw = VpnGw {
            status: Some(VpnGwStatus::default()),
            ..VpnGw::new("gw1", plain_spec())
        };
        assert_eq!(gw.status.map(|s| s.replicas), Some(0));
    }

    /// Story: A port the API server would refuse is caught up front
    #[test]
    fn story_ssl_port_outside_tcp_range_is_rejected() {
        for port in [-5, 65536, 70000] {
            let spec = VpnGwSpec {
                ovpn_port: port,
                ..ssl_spec()
            };
            let err = spec.validate("default/gw1").unwrap_err();
            assert_eq!(err.field(), Some("spec.ovpnPort"), "port {port}");
            assert!(!err.is_retryable());
        }

        for port in [1, 1194, MAX_OVPN_PORT] {
            let spec = VpnGwSpec {
                ovpn_port: port,
                ..ssl_spec()
            };
            assert!(spec.validate("default/gw1").is_ok(), "port {port}");
        }
    }

    #[test]
    fn test_ssl_field_checks_run_in_order() {
        let spec = VpnGwSpec {
            ovpn_cipher: String::new(),
            ovpn_port: 0,
            ssl_vpn_image: String::new(),
            ..ssl_spec()
        };
        assert_eq!(field_of(&spec).as_deref(), Some("spec.ovpnCipher"));

        let spec = VpnGwSpec {
            ovpn_port: 0,
            ..ssl_spec()
        };
        assert_eq!(field_of(&spec).as_deref(), Some("spec.ovpnPort"));

        let spec = VpnGwSpec {
            ovpn_subnet_cidr: String::new(),
            ..ssl_spec()
        };
        assert_eq!(field_of(&spec).as_deref(), Some("spec.ovpnSubnetCidr"));

        let spec = VpnGwSpec {
            ssl_vpn_image: String::new(),
            ..ssl_spec()
        };
        assert_eq!(field_of(&spec).as_deref(), Some("spec.sslVpnImage"));
    }

    #[test]
    fn test_ssl_params_ignored_when_ssl_disabled() {
        let spec = VpnGwSpec {
            enable_ssl_vpn: false,
            ovpn_proto: "http".to_string(),
            ..plain_spec()
        };
        assert!(spec.validate("default/gw1").is_ok());
    }

    #[test]
    fn test_ipsec_needs_an_image() {
        let spec = VpnGwSpec {
            enable_ipsec_vpn: true,
            ..plain_spec()
        };
        assert_eq!(field_of(&spec).as_deref(), Some("spec.ipsecVpnImage"));

        let fallback = VpnGwSpec {
            enable_ipsec_vpn: true,
            ssl_vpn_image: "vpn:latest".to_string(),
            ..plain_spec()
        };
        assert!(fallback.validate("default/gw1").is_ok());
        assert_eq!(fallback.resolved_ipsec_image(), "vpn:latest");

        let explicit = VpnGwSpec {
            ipsec_vpn_image: Some("ipsec:v1".to_string()),
            ..fallback
        };
        assert_eq!(explicit.resolved_ipsec_image(), "ipsec:v1");
    }

    // =========================================================================
    // Resource-level Validation
    // =========================================================================

    /// Story: The subnet cannot be moved once the gateway has been created
    #[test]
    fn story_subnet_change_after_creation_is_rejected() {
        let mut gw = VpnGw::new("gw1", plain_spec());
        gw.metadata.namespace = Some("default".to_string());
        gw.status = Some(VpnGwStatus {
            subnet: "10.0.0.0/24".to_string(),
            ..Default::default()
        });
        assert!(gw.validate().is_ok());

        gw.spec.subnet = "10.1.0.0/24".to_string();
        let err = gw.validate().unwrap_err();
        assert_eq!(err.field(), Some("spec.subnet"));
        assert!(err.to_string().contains("default/gw1"));
    }

    #[test]
    fn test_key_includes_namespace() {
        let mut gw = VpnGw::new("gw1", plain_spec());
        assert_eq!(gw.key(), "gw1");
        gw.metadata.namespace = Some("kube-system".to_string());
        assert_eq!(gw.key(), "kube-system/gw1");
    }

    #[test]
    fn test_spec_uses_camel_case_wire_names() {
        let json = serde_json::to_value(ssl_spec()).expect("serialize spec");
        assert_eq!(json["enableSslVpn"], true);
        assert_eq!(json["ovpnSubnetCidr"], "10.8.0.0/24");
        assert_eq!(json["sslVpnImage"], "vpn:latest");
        assert!(json.get("ipsecVpnImage").is_none());
    }
}
