//! Kubernetes control-plane access for Strimzi-managed Kafka clusters.
//!
//! Strimzi publishes the addresses of a cluster's listeners in the status of
//! its `Kafka` custom resource:
//!
//! ```yaml
//! status:
//!   listeners:
//!     - name: plain
//!       type: plain
//!       bootstrapServers: my-cluster-kafka-bootstrap.kafka.svc:9092
//! ```
//!
//! This module reads that status and hands the listener descriptors to the
//! [`BrokerLocator`](crate::BrokerLocator), which decides which one to use.

use async_trait::async_trait;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use kube::{Api, Client};
use serde::Deserialize;
use tokio::sync::OnceCell;

use crate::error::DiscoveryError;

/// API group of the Strimzi custom resources.
pub const STRIMZI_GROUP: &str = "kafka.strimzi.io";

/// API version of the Strimzi `Kafka` resource.
pub const STRIMZI_VERSION: &str = "v1beta2";

const KAFKA_KIND: &str = "Kafka";
const KAFKA_PLURAL: &str = "kafkas";

/// A listener entry from the cluster status.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerDescriptor {
    /// Listener name, e.g. `plain` or `external`.
    #[serde(default)]
    pub name: Option<String>,

    /// Listener type, e.g. `plain`, `tls` or `external`.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,

    /// Comma-separated `host:port` list, if the listener is ready.
    #[serde(default)]
    pub bootstrap_servers: Option<String>,
}

impl ListenerDescriptor {
    /// Returns `true` if either the name or the type equals `label`.
    #[must_use]
    pub fn is(&self, label: &str) -> bool {
        self.name.as_deref() == Some(label) || self.kind.as_deref() == Some(label)
    }
}

#[derive(Debug, Default, Deserialize)]
struct KafkaStatus {
    #[serde(default)]
    listeners: Option<Vec<ListenerDescriptor>>,
}

/// Read access to cluster status in the control plane.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Returns the listener descriptors of the named cluster.
    ///
    /// When `namespace` is `None` the client's default namespace is used.
    ///
    /// # Errors
    ///
    /// [`DiscoveryError::ClusterNotFound`] if there is no such cluster,
    /// [`DiscoveryError::ClusterNotReady`] if it has no status or listeners,
    /// and [`DiscoveryError::ControlPlane`] if the request itself fails.
    async fn cluster_listeners(
        &self,
        namespace: Option<&str>,
        cluster_name: &str,
    ) -> Result<Vec<ListenerDescriptor>, DiscoveryError>;
}

/// [`ControlPlane`] backed by the Kubernetes API server.
///
/// The kube client is built on first use, so a missing in-cluster
/// environment or kubeconfig surfaces as a [`DiscoveryError::ControlPlane`]
/// from the lookup itself and goes through the locator's fallback.
#[derive(Clone, Default)]
pub struct KubeControlPlane {
    client: OnceCell<Client>,
}

impl KubeControlPlane {
    /// Wraps an existing kube client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client: OnceCell::from(client),
        }
    }

    /// Creates a control plane whose client is inferred on first use from
    /// the in-cluster environment or the local kubeconfig.
    #[must_use]
    pub fn infer() -> Self {
        Self::default()
    }

    async fn client(&self) -> Result<&Client, DiscoveryError> {
        self.client
            .get_or_try_init(|| async {
                tracing::debug!("inferring Kubernetes client configuration");
                Client::try_default()
                    .await
                    .map_err(|e| DiscoveryError::ControlPlane(e.to_string()))
            })
            .await
    }
}

fn kafkas(client: &Client, namespace: &str) -> Api<DynamicObject> {
    let gvk = GroupVersionKind::gvk(STRIMZI_GROUP, STRIMZI_VERSION, KAFKA_KIND);
    let resource = ApiResource::from_gvk_with_plural(&gvk, KAFKA_PLURAL);
    Api::namespaced_with(client.clone(), namespace, &resource)
}

impl std::fmt::Debug for KubeControlPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeControlPlane")
            .field(
                "default_namespace",
                &self.client.get().map(Client::default_namespace),
            )
            .finish()
    }
}

#[async_trait]
impl ControlPlane for KubeControlPlane {
    async fn cluster_listeners(
        &self,
        namespace: Option<&str>,
        cluster_name: &str,
    ) -> Result<Vec<ListenerDescriptor>, DiscoveryError> {
        let client = self.client().await?;
        let namespace = namespace.unwrap_or_else(|| client.default_namespace());

        tracing::info!("Fetching Strimzi Kafka cluster '{cluster_name}' in namespace '{namespace}'");

        let kafka = kafkas(client, namespace)
            .get_opt(cluster_name)
            .await
            .map_err(|e| DiscoveryError::ControlPlane(e.to_string()))?;

        let Some(kafka) = kafka else {
            return Err(DiscoveryError::ClusterNotFound {
                namespace: namespace.to_string(),
                name: cluster_name.to_string(),
            });
        };

        listeners_from_status(kafka.data.get("status")).ok_or_else(|| {
            DiscoveryError::ClusterNotReady {
                namespace: namespace.to_string(),
                name: cluster_name.to_string(),
            }
        })
    }
}

/// Extracts the listener list from a `Kafka` resource status.
///
/// Returns `None` if the status or its listener list is absent or unreadable.
fn listeners_from_status(status: Option<&serde_json::Value>) -> Option<Vec<ListenerDescriptor>> {
    let status = status.filter(|s| !s.is_null())?;

    match KafkaStatus::deserialize(status) {
        Ok(status) => status.listeners,
        Err(e) => {
            tracing::warn!("unreadable Kafka status: {e}");
            None
        }
    }
}
