//! Environment-driven configuration.
//!
//! | Variable                  | Default           |
//! |---------------------------|-------------------|
//! | `KAFKA_BROKERS`           | unset (discover)  |
//! | `KAFKA_DEFAULT_BROKERS`   | `localhost:9092`  |
//! | `KAFKA_CLUSTER_NAMESPACE` | `kafka`           |
//! | `KAFKA_CLUSTER_NAME`      | `my-cluster`      |
//! | `KAFKA_CLIENT_ID`         | `kafka-lag-k8s`   |
//! | `KAFKA_REQUEST_TIMEOUT_MS`| `10000`           |
//! | `DISCOVERY_TIMEOUT_MS`    | `10000`           |

use std::time::Duration;

use crate::broker::{self, BrokerAddress, PLACEHOLDER_BROKER};
use crate::error::{Error, Result};
use crate::lag::DEFAULT_REQUEST_TIMEOUT;
use crate::locator::{DEFAULT_DISCOVERY_TIMEOUT, DiscoveryConfig};

/// Default client id reported to the brokers.
pub const DEFAULT_CLIENT_ID: &str = "kafka-lag-k8s";

const DEFAULT_NAMESPACE: &str = "kafka";
const DEFAULT_CLUSTER_NAME: &str = "my-cluster";

/// Settings for the broker client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientSettings {
    /// Client id reported to the brokers.
    pub client_id: String,
    /// Deadline for each broker RPC.
    pub request_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Complete configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Broker discovery settings.
    pub discovery: DiscoveryConfig,
    /// Broker client settings.
    pub client: ClientSettings,
}

impl Config {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Discovery`] if a broker list variable is malformed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    ///
    /// Blank values are treated as unset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Discovery`] if a broker list variable is malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let namespace = get("KAFKA_CLUSTER_NAMESPACE").unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        let cluster_name = get("KAFKA_CLUSTER_NAME").unwrap_or_else(|| DEFAULT_CLUSTER_NAME.to_string());

        let default_brokers = match get("KAFKA_DEFAULT_BROKERS") {
            Some(servers) => parse_brokers("KAFKA_DEFAULT_BROKERS", &servers)?,
            None => vec![BrokerAddress::new("localhost", 9092)],
        };

        let mut discovery = DiscoveryConfig::new(cluster_name)
            .namespace(namespace)
            .default_brokers(default_brokers)
            .timeout(millis(get("DISCOVERY_TIMEOUT_MS").as_deref(), DEFAULT_DISCOVERY_TIMEOUT));

        if let Some(servers) = get("KAFKA_BROKERS") {
            discovery = discovery.explicit_brokers(parse_brokers("KAFKA_BROKERS", &servers)?);
        }

        let client = ClientSettings {
            client_id: get("KAFKA_CLIENT_ID").unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
            request_timeout: millis(get("KAFKA_REQUEST_TIMEOUT_MS").as_deref(), DEFAULT_REQUEST_TIMEOUT),
        };

        let config = Self { discovery, client };
        config.warn_on_defaults();
        Ok(config)
    }

    fn warn_on_defaults(&self) {
        let discovery = &self.discovery;

        if discovery.explicit_brokers.is_none() && broker::is_placeholder(&discovery.default_brokers) {
            tracing::warn!(
                "KAFKA_BROKERS is not set and the fallback is the default '{PLACEHOLDER_BROKER}'; discovery failures will not be masked"
            );
        }
    }
}

fn parse_brokers(key: &str, servers: &str) -> Result<Vec<BrokerAddress>> {
    broker::parse_bootstrap_servers(servers).map_err(|e| {
        tracing::error!("invalid {key}: {e}");
        Error::from(e)
    })
}

fn millis(value: Option<&str>, default: Duration) -> Duration {
    match value.map(str::trim).map(str::parse::<u64>) {
        Some(Ok(ms)) if ms > 0 => Duration::from_millis(ms),
        Some(_) => {
            tracing::warn!("ignoring invalid timeout {value:?}; using {default:?}");
            default
        }
        None => default,
    }
}
