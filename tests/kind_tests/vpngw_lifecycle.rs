//! VpnGw lifecycle against a real API server
//!
//! The controller is not running; each test calls the dispatcher directly so
//! every step is deterministic.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::StatefulSet;
use kube::api::{Api, PostParams};
use kube::Client;

use vpngw::controller::{dispatch, Context, GwKey, KubeStore};
use vpngw::crd::{VpnGw, VpnGwSpec};
use vpngw::workload::SSL_VPN_SERVER;

use super::helpers::{cleanup_gateway, ensure_test_cluster, TEST_NAMESPACE};

// =============================================================================
// Test Fixtures
// =============================================================================

fn sample_gateway(name: &str) -> VpnGw {
    let mut gw = VpnGw::new(
        name,
        VpnGwSpec {
            subnet: "ovn-default".to_string(),
            replicas: 1,
            enable_ssl_vpn: true,
            ovpn_cipher: "AES-256-GCM".to_string(),
            ovpn_proto: "udp".to_string(),
            ovpn_port: 1194,
            ovpn_subnet_cidr: "10.240.0.0/16".to_string(),
            ssl_vpn_image: "busybox:1.36".to_string(),
            ..Default::default()
        },
    );
    gw.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    gw
}

fn context(client: &Client) -> Context {
    Context::builder(Arc::new(KubeStore::new(client.clone()))).build()
}

// =============================================================================
// Gateway Lifecycle Stories
// =============================================================================

/// Story: Administrator creates a gateway, then scales it
///
/// Expected behavior:
/// - The first reconcile creates a StatefulSet owned by the VpnGw
/// - The status mirrors the spec afterwards
/// - Raising replicas updates the same StatefulSet
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_admin_creates_and_scales_gateway() {
    let client = ensure_test_cluster().await.expect("failed to setup cluster");
    let name = "test-vpngw-lifecycle";
    cleanup_gateway(&client, name).await;

    let gws: Api<VpnGw> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let statefulsets: Api<StatefulSet> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    gws.create(&PostParams::default(), &sample_gateway(name))
        .await
        .expect("failed to create gateway");

    let ctx = context(&client);
    let key = GwKey::new(TEST_NAMESPACE, name);

    // Act: first reconcile
    dispatch(&key, &ctx).await.expect("first reconcile");

    // Assert: StatefulSet created and owned by the gateway
    let sts = statefulsets.get(name).await.expect("statefulset created");
    assert_eq!(sts.spec.as_ref().and_then(|s| s.replicas), Some(1));
    let owner = &sts.metadata.owner_references.as_ref().unwrap()[0];
    assert_eq!(owner.kind, "VpnGw");
    assert_eq!(owner.controller, Some(true));
    let containers = &sts.spec.unwrap().template.spec.unwrap().containers;
    assert_eq!(containers[0].name, SSL_VPN_SERVER);

    let status = gws.get(name).await.unwrap().status.expect("status written");
    assert_eq!(status.replicas, 1);
    assert_eq!(status.subnet, "ovn-default");

    // Act: scale to two replicas
    let mut gw = gws.get(name).await.unwrap();
    gw.spec.replicas = 2;
    gws.replace(name, &PostParams::default(), &gw)
        .await
        .expect("failed to scale gateway");
    dispatch(&key, &ctx).await.expect("second reconcile");

    // Assert: the same StatefulSet now asks for two replicas
    let sts = statefulsets.get(name).await.unwrap();
    assert_eq!(sts.spec.and_then(|s| s.replicas), Some(2));

    cleanup_gateway(&client, name).await;
}

/// Story: Administrator submits a gateway with too many replicas
///
/// The API server accepts it, but the reconcile refuses to build anything.
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_invalid_gateway_creates_nothing() {
    let client = ensure_test_cluster().await.expect("failed to setup cluster");
    let name = "test-vpngw-invalid";
    cleanup_gateway(&client, name).await;

    let gws: Api<VpnGw> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let statefulsets: Api<StatefulSet> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let mut gw = sample_gateway(name);
    gw.spec.replicas = 3;
    gws.create(&PostParams::default(), &gw)
        .await
        .expect("failed to create gateway");

    let err = dispatch(&GwKey::new(TEST_NAMESPACE, name), &context(&client))
        .await
        .expect_err("validation must fail");
    assert_eq!(err.field(), Some("spec.replicas"));
    assert!(statefulsets.get_opt(name).await.unwrap().is_none());

    cleanup_gateway(&client, name).await;
}
