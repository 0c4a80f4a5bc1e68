//! Broker discovery with a deterministic fallback chain.
//!
//! # How It Works
//!
//! 1. An explicit broker list, if configured, is returned as-is
//! 2. Otherwise the cluster's listeners are read from the control plane
//! 3. The `plain` listener is preferred, then `external`
//! 4. The chosen listener's bootstrap string is parsed into addresses
//! 5. If 2-4 fail, a configured default list is used, unless it is the
//!    `localhost:9092` placeholder, in which case the failure propagates

use std::time::Duration;

use crate::broker::{self, BrokerAddress, PLACEHOLDER_BROKER};
use crate::error::{DiscoveryError, Error, Result};
use crate::k8s::{ControlPlane, ListenerDescriptor};

/// Default deadline for the control-plane lookup.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Listener labels in order of preference.
const LISTENER_PRIORITY: [&str; 2] = ["plain", "external"];

/// Configuration for broker discovery.
#[derive(Clone, Debug)]
pub struct DiscoveryConfig {
    /// The Strimzi `Kafka` resource name.
    pub cluster_name: String,

    /// The Kubernetes namespace where the cluster is deployed.
    /// If `None`, uses the current namespace from the kube client.
    pub namespace: Option<String>,

    /// Brokers that bypass discovery entirely when non-empty.
    pub explicit_brokers: Option<Vec<BrokerAddress>>,

    /// Brokers to fall back to when discovery fails.
    pub default_brokers: Vec<BrokerAddress>,

    /// Deadline for the control-plane lookup.
    pub timeout: Duration,
}

impl DiscoveryConfig {
    /// Creates a new discovery configuration.
    ///
    /// The fallback list starts out as the `localhost:9092` placeholder, so
    /// discovery failures propagate until a real default is configured.
    #[must_use]
    pub fn new(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            namespace: None,
            explicit_brokers: None,
            default_brokers: vec![placeholder()],
            timeout: DEFAULT_DISCOVERY_TIMEOUT,
        }
    }

    /// Sets an explicit namespace for the cluster.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Sets brokers that bypass discovery.
    #[must_use]
    pub fn explicit_brokers(mut self, brokers: Vec<BrokerAddress>) -> Self {
        self.explicit_brokers = Some(brokers);
        self
    }

    /// Sets the fallback broker list.
    #[must_use]
    pub fn default_brokers(mut self, brokers: Vec<BrokerAddress>) -> Self {
        self.default_brokers = brokers;
        self
    }

    /// Sets the control-plane lookup deadline.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn placeholder() -> BrokerAddress {
    BrokerAddress::new("localhost", 9092)
}

/// Resolves the broker address list for a cluster.
#[derive(Debug)]
pub struct BrokerLocator<C> {
    control_plane: C,
}

impl<C: ControlPlane> BrokerLocator<C> {
    /// Creates a locator that queries the given control plane.
    #[must_use]
    pub fn new(control_plane: C) -> Self {
        Self { control_plane }
    }

    /// Resolves a non-empty, ordered broker list.
    ///
    /// Nothing is cached; every call performs discovery again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Discovery`] or [`Error::Timeout`] when no usable
    /// address can be produced by any path.
    pub async fn locate(&self, config: &DiscoveryConfig) -> Result<Vec<BrokerAddress>> {
        if let Some(brokers) = config.explicit_brokers.as_ref().filter(|b| !b.is_empty()) {
            tracing::info!(
                "Using explicitly configured brokers: {}",
                broker::join_brokers(brokers)
            );
            return Ok(brokers.clone());
        }

        let err = match self.discover(config).await {
            Ok(brokers) => {
                tracing::info!(
                    "Successfully discovered Kafka brokers: {}",
                    broker::join_brokers(&brokers)
                );
                return Ok(brokers);
            }
            Err(err) => err,
        };

        tracing::error!("Failed to discover Kafka brokers: {err}");

        if config.default_brokers.is_empty() || broker::is_placeholder(&config.default_brokers) {
            tracing::error!(
                "Kafka discovery failed and no fallback brokers are configured (default is {PLACEHOLDER_BROKER})"
            );
            return Err(err);
        }

        tracing::warn!(
            "Falling back to configured Kafka brokers: {}",
            broker::join_brokers(&config.default_brokers)
        );

        Ok(config.default_brokers.clone())
    }

    /// Queries the control plane and parses the preferred listener.
    async fn discover(&self, config: &DiscoveryConfig) -> Result<Vec<BrokerAddress>> {
        let namespace = config.namespace.as_deref();
        let cluster_name = config.cluster_name.as_str();

        let lookup = self.control_plane.cluster_listeners(namespace, cluster_name);
        let listeners = tokio::time::timeout(config.timeout, lookup)
            .await
            .map_err(|_| {
                Error::timeout(
                    format!("discovery of Kafka cluster '{cluster_name}'"),
                    config.timeout,
                )
            })??;

        let Some(listener) = select_listener(&listeners) else {
            let cluster = match namespace {
                Some(namespace) => format!("{namespace}/{cluster_name}"),
                None => cluster_name.to_string(),
            };
            return Err(DiscoveryError::NoUsableListener { cluster }.into());
        };

        let servers = listener.bootstrap_servers.as_deref().unwrap_or_default();

        tracing::debug!(
            "Found {} listener bootstrap servers: {servers}",
            listener
                .name
                .as_deref()
                .or(listener.kind.as_deref())
                .unwrap_or_default()
        );

        Ok(broker::parse_bootstrap_servers(servers)?)
    }
}

/// Picks the highest-priority listener that carries bootstrap servers.
fn select_listener(listeners: &[ListenerDescriptor]) -> Option<&ListenerDescriptor> {
    LISTENER_PRIORITY.iter().find_map(|label| {
        listeners.iter().find(|l| {
            l.is(label)
                && l
                    .bootstrap_servers
                    .as_deref()
                    .is_some_and(|s| !s.trim().is_empty())
        })
    })
}
