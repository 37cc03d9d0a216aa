//! VpnGw controller implementation
//!
//! Each reconcile re-reads the VpnGw, validates it, and converges its
//! StatefulSet: create when missing, replace when the declared state differs
//! from the status mirror, and do nothing otherwise. State is always
//! re-derived from the latest VpnGw, so redelivered, duplicated and reordered
//! events are harmless.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use super::store::{GatewayStore, GwKey};
use crate::crd::{VpnGw, VpnGwStatus};
use crate::metrics::ReconcileMetrics;
use crate::workload::{statefulset_for_vpn_gw, IpsecContainerConfig, OutOfBandIpsec};
use crate::{Error, DEFAULT_RETRY_DELAY_SECS};

/// Outcome of one convergence attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    /// The StatefulSet and status match the VpnGw
    Success,
    /// A transient failure; the reconcile should be redelivered
    Error,
    /// A failure retrying cannot fix; logged and dropped
    ErrorNoRetry,
}

impl SyncState {
    /// Metric label for this outcome
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::ErrorNoRetry => "error_no_retry",
        }
    }
}

/// Strategy that drives a validated VpnGw's workload to its declared state
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Converge: Send + Sync {
    /// Converge the workload of `gw`, identified by `key`
    async fn converge(&self, gw: &VpnGw, key: &GwKey) -> SyncState;
}

/// Converges a VpnGw into a single StatefulSet of the same name
pub struct StatefulSetConverger {
    store: Arc<dyn GatewayStore>,
    ipsec: Arc<dyn IpsecContainerConfig>,
}

impl StatefulSetConverger {
    /// Create a converger writing through `store`
    pub fn new(store: Arc<dyn GatewayStore>, ipsec: Arc<dyn IpsecContainerConfig>) -> Self {
        Self { store, ipsec }
    }

    /// Persist the mirror on a private copy of the VpnGw
    async fn persist_status(&self, gw: &VpnGw, status: VpnGwStatus, key: &GwKey) -> SyncState {
        let mut observed = gw.clone();
        observed.status = Some(status);
        match self.store.replace_status(&observed).await {
            Ok(()) => {
                debug!(gw = %key, "status updated");
                SyncState::Success
            }
            Err(e) => {
                error!(gw = %key, error = %e, "failed to update vpn gw status");
                SyncState::Error
            }
        }
    }
}

#[async_trait]
impl Converge for StatefulSetConverger {
    async fn converge(&self, gw: &VpnGw, key: &GwKey) -> SyncState {
        debug!(gw = %key, "start converging vpn gw");

        let prior = match self.store.get_statefulset(key).await {
            Ok(prior) => prior,
            Err(e) => {
                error!(gw = %key, error = %e, "failed to get statefulset");
                return SyncState::Error;
            }
        };

        let (status, changed) = gw.status.clone().unwrap_or_default().observe(&gw.spec);

        match prior {
            None => {
                let sts = match statefulset_for_vpn_gw(gw, None, self.ipsec.as_ref()) {
                    Ok(sts) => sts,
                    Err(e) => {
                        error!(gw = %key, error = %e, "failed to build statefulset");
                        return SyncState::ErrorNoRetry;
                    }
                };
                if let Err(e) = self.store.create_statefulset(&sts).await {
                    error!(gw = %key, error = %e, "failed to create statefulset");
                    return SyncState::Error;
                }
                info!(gw = %key, replicas = gw.spec.replicas, "created statefulset");
                if !changed {
                    return SyncState::Success;
                }
                self.persist_status(gw, status, key).await
            }
            Some(_) if !changed => {
                debug!(gw = %key, "vpn gw unchanged, nothing to do");
                SyncState::Success
            }
            Some(prior) => {
                let sts = match statefulset_for_vpn_gw(gw, Some(&prior), self.ipsec.as_ref()) {
                    Ok(sts) => sts,
                    Err(e) => {
                        error!(gw = %key, error = %e, "failed to build statefulset");
                        return SyncState::ErrorNoRetry;
                    }
                };
                if let Err(e) = self.store.replace_statefulset(&sts).await {
                    error!(gw = %key, error = %e, "failed to update statefulset");
                    return SyncState::Error;
                }
                info!(gw = %key, replicas = gw.spec.replicas, "updated statefulset");
                self.persist_status(gw, status, key).await
            }
        }
    }
}

/// Controller context containing shared state and clients
///
/// The convergence strategy is fixed when the context is built.
///
/// ```ignore
/// let ctx = Context::builder(Arc::new(KubeStore::new(client)))
///     .ipsec_config(Arc::new(MyIpsecConfig))
///     .retry_delay(Duration::from_secs(10))
///     .build();
/// ```
pub struct Context {
    /// Store the VpnGw is fetched from
    pub store: Arc<dyn GatewayStore>,
    /// Convergence strategy
    pub converger: Arc<dyn Converge>,
    /// Reconcile counters
    pub metrics: Arc<ReconcileMetrics>,
    /// Delay before a retryable failure is redelivered
    pub retry_delay: Duration,
}

impl Context {
    /// Create a builder around the given store
    pub fn builder(store: Arc<dyn GatewayStore>) -> ContextBuilder {
        ContextBuilder::new(store)
    }
}

/// Builder for constructing [`Context`] instances
pub struct ContextBuilder {
    store: Arc<dyn GatewayStore>,
    converger: Option<Arc<dyn Converge>>,
    ipsec: Arc<dyn IpsecContainerConfig>,
    metrics: Option<Arc<ReconcileMetrics>>,
    retry_delay: Duration,
}

impl ContextBuilder {
    fn new(store: Arc<dyn GatewayStore>) -> Self {
        Self {
            store,
            converger: None,
            ipsec: Arc::new(OutOfBandIpsec),
            metrics: None,
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
        }
    }

    /// Override the convergence strategy
    pub fn converger(mut self, converger: Arc<dyn Converge>) -> Self {
        self.converger = Some(converger);
        self
    }

    /// Configure how IPsec containers are set up by the default converger
    pub fn ipsec_config(mut self, ipsec: Arc<dyn IpsecContainerConfig>) -> Self {
        self.ipsec = ipsec;
        self
    }

    /// Share a metrics recorder
    pub fn metrics(mut self, metrics: Arc<ReconcileMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Set the delay before retryable failures are redelivered
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        let converger: Arc<dyn Converge> = match self.converger {
            Some(converger) => converger,
            None => Arc::new(StatefulSetConverger::new(self.store.clone(), self.ipsec)),
        };
        Context {
            store: self.store,
            converger,
            metrics: self.metrics.unwrap_or_default(),
            retry_delay: self.retry_delay,
        }
    }
}

/// Handle one delivered event for `key`
///
/// - VpnGw gone: nothing to do, its StatefulSet is garbage collected
/// - invalid spec: the validation error is returned as is
/// - `SyncState::Error`: [`Error::Retry`] so the event is redelivered
/// - `SyncState::ErrorNoRetry`: logged, not redelivered
pub async fn dispatch(key: &GwKey, ctx: &Context) -> Result<Action, Error> {
    ctx.metrics.record_dispatch();

    let gw = match ctx.store.get_vpn_gw(key).await {
        Ok(Some(gw)) => gw,
        Ok(None) => {
            debug!(gw = %key, "vpn gw not found, assuming deleted");
            return Ok(Action::await_change());
        }
        Err(e) => {
            error!(gw = %key, error = %e, "failed to get vpn gw");
            return Err(e);
        }
    };

    if let Err(e) = gw.validate() {
        error!(gw = %key, error = %e, "vpn gw validation failed");
        return Err(e);
    }

    match ctx.converger.converge(&gw, key).await {
        SyncState::Success => Ok(Action::await_change()),
        state @ SyncState::Error => {
            ctx.metrics.record_failure(state.as_str());
            error!(gw = %key, "failed to handle vpn gw, will retry");
            Err(Error::retry(key.to_string()))
        }
        state @ SyncState::ErrorNoRetry => {
            ctx.metrics.record_failure(state.as_str());
            error!(gw = %key, "failed to handle vpn gw, not retrying");
            Ok(Action::await_change())
        }
    }
}

/// Reconcile a VpnGw resource
///
/// Entry point for the kube-runtime controller. The object handed in by the
/// runtime only supplies the key; the VpnGw is re-read so that convergence
/// always works from the latest stored version.
#[instrument(skip(gw, ctx), fields(gw = %gw.key()))]
pub async fn reconcile(gw: Arc<VpnGw>, ctx: Arc<Context>) -> Result<Action, Error> {
    let key = GwKey::from_resource(&gw)?;
    debug!("start reconcile");
    let result = dispatch(&key, &ctx).await;
    debug!(ok = result.is_ok(), "end reconcile");
    result
}

/// Error policy for the VpnGw controller
///
/// Retryable errors are requeued after the configured delay. Anything else
/// waits for the VpnGw to change.
pub fn error_policy(gw: Arc<VpnGw>, error: &Error, ctx: Arc<Context>) -> Action {
    if error.is_retryable() {
        warn!(gw = %gw.name_any(), error = %error, "reconcile failed, requeueing");
        Action::requeue(ctx.retry_delay)
    } else {
        error!(gw = %gw.name_any(), error = %error, "reconcile failed, waiting for a spec change");
        Action::await_change()
    }
}
