//! Controller runner - wires the VpnGw reconciler into kube-runtime
//!
//! The returned future watches VpnGw resources and the StatefulSets they own.
//! A StatefulSet event is mapped to its controller owner, so only
//! StatefulSets whose controller reference points at a VpnGw trigger a
//! reconcile, and always of that VpnGw.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use crate::config::ControllerConfig;
use crate::controller::{error_policy, reconcile, Context, KubeStore};
use crate::crd::VpnGw;
use crate::metrics::ReconcileMetrics;

/// Build the VpnGw controller future
///
/// Runs until a shutdown signal is received. In-flight reconciles are
/// dropped at that point; redelivery after restart re-derives their state.
pub fn build_vpn_gw_controller(
    client: Client,
    config: &ControllerConfig,
    metrics: Arc<ReconcileMetrics>,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    let ctx = Arc::new(
        Context::builder(Arc::new(KubeStore::new(client.clone())))
            .metrics(metrics)
            .retry_delay(config.retry_delay())
            .build(),
    );

    let (gws, statefulsets): (Api<VpnGw>, Api<StatefulSet>) = match &config.namespace {
        Some(ns) => {
            tracing::info!(namespace = %ns, "- VpnGw controller (namespaced)");
            (
                Api::namespaced(client.clone(), ns),
                Api::namespaced(client, ns),
            )
        }
        None => {
            tracing::info!("- VpnGw controller (all namespaces)");
            (Api::all(client.clone()), Api::all(client))
        }
    };

    let watcher = || WatcherConfig::default().timeout(config.watch_timeout_secs);

    Box::pin(
        Controller::new(gws, watcher())
            .owns(statefulsets, watcher())
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .for_each(log_reconcile_result("VpnGw")),
    )
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
