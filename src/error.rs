//! Error taxonomy shared by discovery, the broker session and lag computation.

use std::time::Duration;

use thiserror::Error;

/// Result type for crate operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
///
/// A consumer group that does not exist is not an error; see
/// [`LagOutcome::NotFound`](crate::LagOutcome::NotFound).
#[derive(Debug, Error)]
pub enum Error {
    /// No usable broker address could be produced by any discovery path.
    #[error("broker discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    /// An operation was attempted before the broker session was connected.
    #[error("broker session is not initialized; call connect() first")]
    NotInitialized,

    /// A bounded discovery call or broker RPC exceeded its deadline.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The deadline that was exceeded.
        timeout: Duration,
    },

    /// The broker connection could not be established.
    #[error("unable to connect to brokers: {0}")]
    Connect(String),

    /// An unexpected broker-protocol failure during lag computation.
    #[error("lag computation failed: {0}")]
    LagComputation(String),
}

impl Error {
    pub(crate) fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout,
        }
    }
}

/// Reasons broker discovery can fail.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// The control plane has no record of the cluster.
    #[error("Kafka cluster '{namespace}/{name}' not found")]
    ClusterNotFound {
        /// Namespace that was searched.
        namespace: String,
        /// Cluster resource name.
        name: String,
    },

    /// The cluster exists but reports no status or listeners yet.
    #[error("could not find status or listeners for Kafka cluster '{namespace}/{name}'")]
    ClusterNotReady {
        /// Namespace of the cluster.
        namespace: String,
        /// Cluster resource name.
        name: String,
    },

    /// Neither a `plain` nor an `external` listener carries bootstrap servers.
    #[error(
        "could not find a suitable listener (plain or external) with bootstrap servers for Kafka cluster '{cluster}'"
    )]
    NoUsableListener {
        /// The cluster as `namespace/name`, or just `name` when the client's
        /// default namespace was used.
        cluster: String,
    },

    /// A bootstrap-server token is not a valid `host:port` pair.
    #[error("invalid bootstrap server '{0}'")]
    InvalidBootstrap(String),

    /// Discovery produced no addresses.
    #[error("no broker addresses discovered")]
    Empty,

    /// The control-plane request itself failed.
    #[error("control plane request failed: {0}")]
    ControlPlane(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_names_operation() {
        let err = Error::timeout("fetch committed offsets for 'g1'", Duration::from_secs(5));
        assert_eq!(
            err.to_string(),
            "fetch committed offsets for 'g1' timed out after 5s"
        );
    }

    #[test]
    fn discovery_error_converts() {
        let err: Error = DiscoveryError::Empty.into();
        assert!(matches!(err, Error::Discovery(DiscoveryError::Empty)));
    }

    #[test]
    fn cluster_not_ready_message() {
        let err = DiscoveryError::ClusterNotReady {
            namespace: "kafka".to_string(),
            name: "my-cluster".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "could not find status or listeners for Kafka cluster 'kafka/my-cluster'"
        );
    }

    #[test]
    fn no_usable_listener_message() {
        let err = DiscoveryError::NoUsableListener {
            cluster: "my-cluster".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "could not find a suitable listener (plain or external) with bootstrap servers for Kafka cluster 'my-cluster'"
        );
    }
}
