//! Shared setup for kind integration tests

use std::time::Duration;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::{Client, CustomResourceExt};

use vpngw::crd::VpnGw;
use vpngw::FIELD_MANAGER;

/// Namespace the tests create their gateways in
pub const TEST_NAMESPACE: &str = "default";

/// Connect to the current cluster and make sure the VpnGw CRD is installed
pub async fn ensure_test_cluster() -> anyhow::Result<Client> {
    let client = Client::try_default().await?;

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();
    crds.patch(
        "vpngws.vpn-gw.kube-ovn-operator.com",
        &params,
        &Patch::Apply(&VpnGw::crd()),
    )
    .await?;

    // Give the API server a moment to serve the new resource
    tokio::time::sleep(Duration::from_secs(2)).await;
    Ok(client)
}

/// Delete a gateway left behind by an earlier run
pub async fn cleanup_gateway(client: &Client, name: &str) {
    let api: Api<VpnGw> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let _ = api.delete(name, &DeleteParams::default()).await;
    for _ in 0..30 {
        if matches!(api.get_opt(name).await, Ok(None)) {
            return;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}
