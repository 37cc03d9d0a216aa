//! StatefulSet synthesis for VpnGw gateways
//!
//! Builds the StatefulSet that runs a gateway's tunnel servers:
//! - `ssl-vpn-server` container when SSL is enabled
//! - `ipsec-vpn-server` container when IPsec is enabled
//! - kube-ovn annotations pinning the pods to the gateway's subnet and address
//! - node selector, tolerations and affinity from the gateway spec
//! - a controller owner reference back to the VpnGw (garbage collection)
//!
//! Synthesis is pure: the same VpnGw and prior StatefulSet always produce the
//! same result.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec, StatefulSetUpdateStrategy};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec, SecurityContext,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::{Resource, ResourceExt};

use crate::crd::{VpnGw, VpnGwSpec};
use crate::Error;

/// Container name (and port name) of the SSL tunnel server
pub const SSL_VPN_SERVER: &str = "ssl-vpn-server";

/// Container name of the IPsec tunnel server
pub const IPSEC_VPN_SERVER: &str = "ipsec-vpn-server";

/// Label value shared by every gateway workload
pub const APP_LABEL_VALUE: &str = "vpngw";

/// Label carrying the owning gateway's name; part of the pod selector
pub const GATEWAY_NAME_LABEL: &str = "vpngw";

/// Label recording whether the SSL server is enabled
pub const ENABLE_SSL_VPN_LABEL: &str = "enable_ssl_vpn";

/// Label recording whether the IPsec server is enabled
pub const ENABLE_IPSEC_VPN_LABEL: &str = "enable_ipsec_vpn";

/// kube-ovn annotation pinning a pod's address
pub const KUBEOVN_IP_ADDRESS_ANNOTATION: &str = "ovn.kubernetes.io/ip_address";

/// kube-ovn annotation selecting a pod's logical switch
pub const KUBEOVN_LOGICAL_SWITCH_ANNOTATION: &str = "ovn.kubernetes.io/logical_switch";

/// Environment variable carrying the OpenVPN protocol
pub const OVPN_PROTO_KEY: &str = "ovpn_proto";

/// Environment variable carrying the OpenVPN port
pub const OVPN_PORT_KEY: &str = "ovpn_port";

/// Environment variable carrying the OpenVPN cipher
pub const OVPN_CIPHER_KEY: &str = "ovpn_cipher";

/// Environment variable carrying the OpenVPN client CIDR
pub const OVPN_SUBNET_CIDR_KEY: &str = "ovpn_subnet_cidr";

/// Hook for configuring the IPsec container beyond its base shape
///
/// The base container carries image, command and security context only. Its
/// tunnel configuration is delivered out of band by default; deployments that
/// push it through the pod spec implement this trait.
pub trait IpsecContainerConfig: Send + Sync {
    /// Adjust the IPsec container for the given gateway
    fn configure(&self, spec: &VpnGwSpec, container: &mut Container);
}

/// IPsec configuration is provided out of band; the container is left as is
#[derive(Clone, Copy, Debug, Default)]
pub struct OutOfBandIpsec;

impl IpsecContainerConfig for OutOfBandIpsec {
    fn configure(&self, _spec: &VpnGwSpec, _container: &mut Container) {}
}

/// Pod selector of a gateway's StatefulSet
///
/// Only labels that never change for the gateway's lifetime belong here, since
/// the API server rejects updates to a StatefulSet's selector.
pub fn selector_labels_for_vpn_gw(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_string(), APP_LABEL_VALUE.to_string()),
        (GATEWAY_NAME_LABEL.to_string(), name.to_string()),
    ])
}

/// Labels for a gateway's StatefulSet and pods: the selector plus the tunnel
/// toggles
pub fn labels_for_vpn_gw(name: &str, spec: &VpnGwSpec) -> BTreeMap<String, String> {
    let mut labels = selector_labels_for_vpn_gw(name);
    labels.insert(
        ENABLE_SSL_VPN_LABEL.to_string(),
        spec.enable_ssl_vpn.to_string(),
    );
    labels.insert(
        ENABLE_IPSEC_VPN_LABEL.to_string(),
        spec.enable_ipsec_vpn.to_string(),
    );
    labels
}

/// Parse `key:value` selector expressions into a node selector
///
/// Expressions that do not split into exactly two parts are skipped.
pub fn parse_node_selector(selector: &[String]) -> BTreeMap<String, String> {
    selector
        .iter()
        .filter_map(|expr| {
            let parts: Vec<&str> = expr.trim().split(':').collect();
            match parts.as_slice() {
                [key, value] => Some((key.trim().to_string(), value.trim().to_string())),
                _ => None,
            }
        })
        .collect()
}

/// Build the StatefulSet for a gateway
///
/// `prior` is the StatefulSet currently stored, if any. Its annotations are
/// carried over (fresh kube-ovn annotations win) and its resourceVersion is
/// kept so that the update is rejected if the object changed in between.
pub fn statefulset_for_vpn_gw(
    gw: &VpnGw,
    prior: Option<&StatefulSet>,
    ipsec: &dyn IpsecContainerConfig,
) -> Result<StatefulSet, Error> {
    let owner = gw.controller_owner_ref(&()).ok_or_else(|| {
        Error::internal("synthesizer", format!("VpnGw {} has no UID", gw.key()))
    })?;
    let spec = &gw.spec;
    let name = gw.name_any();
    let labels = labels_for_vpn_gw(&name, spec);

    let prior_annotations = prior
        .and_then(|sts| sts.metadata.annotations.clone())
        .unwrap_or_default();
    let mut pod_annotations = prior_annotations.clone();
    pod_annotations.insert(
        KUBEOVN_LOGICAL_SWITCH_ANNOTATION.to_string(),
        spec.subnet.clone(),
    );
    pod_annotations.insert(KUBEOVN_IP_ADDRESS_ANNOTATION.to_string(), spec.ip.clone());

    let mut containers = Vec::new();
    if spec.enable_ssl_vpn {
        containers.push(ssl_vpn_container(spec));
    }
    if spec.enable_ipsec_vpn {
        let mut container = ipsec_vpn_container(spec);
        ipsec.configure(spec, &mut container);
        containers.push(container);
    }

    let node_selector = parse_node_selector(&spec.selector);

    Ok(StatefulSet {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: gw.namespace(),
            labels: Some(labels.clone()),
            annotations: (!prior_annotations.is_empty()).then_some(prior_annotations),
            owner_references: Some(vec![owner]),
            resource_version: prior.and_then(|sts| sts.metadata.resource_version.clone()),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            replicas: Some(spec.replicas),
            selector: LabelSelector {
                match_labels: Some(selector_labels_for_vpn_gw(&name)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    annotations: Some(pod_annotations),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers,
                    node_selector: (!node_selector.is_empty()).then_some(node_selector),
                    tolerations: (!spec.tolerations.is_empty()).then(|| spec.tolerations.clone()),
                    affinity: spec.affinity.clone(),
                    ..Default::default()
                }),
            },
            update_strategy: Some(StatefulSetUpdateStrategy {
                type_: Some("RollingUpdate".to_string()),
                rolling_update: None,
            }),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Tunnel servers manage routes and interfaces, so they run privileged
fn tunnel_security_context() -> SecurityContext {
    SecurityContext {
        privileged: Some(true),
        allow_privilege_escalation: Some(true),
        ..Default::default()
    }
}

fn base_container(name: &str, image: &str) -> Container {
    Container {
        name: name.to_string(),
        image: Some(image.to_string()),
        command: Some(vec!["bash".to_string()]),
        args: Some(vec!["-c".to_string(), "sleep infinity".to_string()]),
        image_pull_policy: Some("IfNotPresent".to_string()),
        security_context: Some(tunnel_security_context()),
        ..Default::default()
    }
}

fn ssl_vpn_container(spec: &VpnGwSpec) -> Container {
    let env = |name: &str, value: String| EnvVar {
        name: name.to_string(),
        value: Some(value),
        ..Default::default()
    };

    Container {
        ports: Some(vec![ContainerPort {
            container_port: spec.ovpn_port,
            name: Some(SSL_VPN_SERVER.to_string()),
            protocol: Some(spec.ovpn_proto.to_uppercase()),
            ..Default::default()
        }]),
        env: Some(vec![
            env(OVPN_PROTO_KEY, spec.ovpn_proto.clone()),
            env(OVPN_PORT_KEY, spec.ovpn_port.to_string()),
            env(OVPN_CIPHER_KEY, spec.ovpn_cipher.clone()),
            env(OVPN_SUBNET_CIDR_KEY, spec.ovpn_subnet_cidr.clone()),
        ]),
        ..base_container(SSL_VPN_SERVER, &spec.ssl_vpn_image)
    }
}

fn ipsec_vpn_container(spec: &VpnGwSpec) -> Container {
    base_container(IPSEC_VPN_SERVER, spec.resolved_ipsec_image())
}
