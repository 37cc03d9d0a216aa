//! Access to the API server objects the controller reads and writes
//!
//! The [`GatewayStore`] trait is the seam between convergence logic and the
//! Kubernetes API so that the logic can be exercised against mocks and
//! in-memory fakes.

use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use kube::api::{Api, PostParams};
use kube::{Client, Resource, ResourceExt};

#[cfg(test)]
use mockall::automock;

use crate::crd::VpnGw;
use crate::{Error, FIELD_MANAGER};

/// Identity of a VpnGw and of the StatefulSet derived from it
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GwKey {
    /// Namespace of the VpnGw
    pub namespace: String,
    /// Name of the VpnGw
    pub name: String,
}

impl GwKey {
    /// Create a key from namespace and name
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of an existing VpnGw, which must be namespaced
    pub fn from_resource(gw: &VpnGw) -> Result<Self, Error> {
        let namespace = gw.namespace().ok_or_else(|| {
            Error::internal("controller", format!("VpnGw {} has no namespace", gw.name_any()))
        })?;
        Ok(Self::new(namespace, gw.name_any()))
    }
}

impl fmt::Display for GwKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Trait abstracting the API server operations used during convergence
///
/// Reads return `Ok(None)` when the object does not exist. Writes are
/// unconditional on the trait level; implementations may enforce optimistic
/// concurrency through `resourceVersion`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait GatewayStore: Send + Sync {
    /// Fetch a VpnGw by key
    async fn get_vpn_gw(&self, key: &GwKey) -> Result<Option<VpnGw>, Error>;

    /// Fetch the StatefulSet derived from the VpnGw with this key
    async fn get_statefulset(&self, key: &GwKey) -> Result<Option<StatefulSet>, Error>;

    /// Create a StatefulSet
    async fn create_statefulset(&self, sts: &StatefulSet) -> Result<(), Error>;

    /// Replace an existing StatefulSet
    async fn replace_statefulset(&self, sts: &StatefulSet) -> Result<(), Error>;

    /// Replace the status subresource of a VpnGw
    async fn replace_status(&self, gw: &VpnGw) -> Result<(), Error>;
}

/// Real store backed by the Kubernetes API
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    /// Create a new KubeStore wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn statefulsets(&self, namespace: &str) -> Api<StatefulSet> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn vpn_gws(&self, namespace: &str) -> Api<VpnGw> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..Default::default()
    }
}

fn identity_of<K: Resource>(obj: &K, kind: &str) -> Result<(String, String), Error> {
    let namespace = obj
        .namespace()
        .ok_or_else(|| Error::internal("store", format!("{kind} has no namespace")))?;
    let name = obj
        .meta()
        .name
        .clone()
        .ok_or_else(|| Error::internal("store", format!("{kind} has no name")))?;
    Ok((namespace, name))
}

#[async_trait]
impl GatewayStore for KubeStore {
    async fn get_vpn_gw(&self, key: &GwKey) -> Result<Option<VpnGw>, Error> {
        Ok(self.vpn_gws(&key.namespace).get_opt(&key.name).await?)
    }

    async fn get_statefulset(&self, key: &GwKey) -> Result<Option<StatefulSet>, Error> {
        Ok(self.statefulsets(&key.namespace).get_opt(&key.name).await?)
    }

    async fn create_statefulset(&self, sts: &StatefulSet) -> Result<(), Error> {
        let (namespace, _) = identity_of(sts, "StatefulSet")?;
        self.statefulsets(&namespace)
            .create(&post_params(), sts)
            .await?;
        Ok(())
    }

    async fn replace_statefulset(&self, sts: &StatefulSet) -> Result<(), Error> {
        let (namespace, name) = identity_of(sts, "StatefulSet")?;
        self.statefulsets(&namespace)
            .replace(&name, &post_params(), sts)
            .await?;
        Ok(())
    }

    async fn replace_status(&self, gw: &VpnGw) -> Result<(), Error> {
        let (namespace, name) = identity_of(gw, "VpnGw")?;
        let data = serde_json::to_vec(gw)?;
        self.vpn_gws(&namespace)
            .replace_status(&name, &post_params(), data)
            .await?;
        Ok(())
    }
}
