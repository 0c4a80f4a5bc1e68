//! The shared broker connection.
//!
//! A [`BrokerSession`] owns the one administrative connection and the one
//! producer of the process. It is created disconnected, handed to every
//! component that needs broker access, and moved between states only by
//! [`BrokerSession::connect`] and [`BrokerSession::disconnect`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::admin::{AdminClient, Producer};
use crate::broker::{self, BrokerAddress};
use crate::error::{DiscoveryError, Error, Result};

/// Default deadline for establishing the connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Live handles of a connected session.
#[derive(Clone)]
pub struct Connection {
    /// Administrative handle.
    pub admin: Arc<dyn AdminClient>,
    /// Producer handle.
    pub producer: Arc<dyn Producer>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// Builds connections to a broker list.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connects both the administrative client and the producer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connect`] if either handle cannot be established.
    async fn connect(&self, brokers: &[BrokerAddress]) -> Result<Connection>;
}

/// The process-wide broker session.
///
/// Cloning is cheap and every clone refers to the same session.
#[derive(Clone)]
pub struct BrokerSession {
    inner: Arc<Inner>,
}

struct Inner {
    connector: Box<dyn Connector>,
    connect_timeout: Duration,
    /// Serializes connects; `state` is only written to install or take a connection.
    connecting: Mutex<()>,
    state: RwLock<Option<Connection>>,
}

impl BrokerSession {
    /// Creates a disconnected session.
    #[must_use]
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                connector: Box::new(connector),
                connect_timeout: DEFAULT_CONNECT_TIMEOUT,
                connecting: Mutex::new(()),
                state: RwLock::new(None),
            }),
        }
    }

    /// Creates a disconnected session with a custom connect deadline.
    #[must_use]
    pub fn with_connect_timeout(connector: impl Connector + 'static, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                connector: Box::new(connector),
                connect_timeout: timeout,
                connecting: Mutex::new(()),
                state: RwLock::new(None),
            }),
        }
    }

    /// Connects to `brokers`, creating both handles eagerly.
    ///
    /// If the session is already connected the existing connection is
    /// returned and no second connection is made.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Discovery`] for an empty broker list,
    /// [`Error::Timeout`] if the connect deadline passes, and
    /// [`Error::Connect`] if the transport fails.
    pub async fn connect(&self, brokers: &[BrokerAddress]) -> Result<Connection> {
        if brokers.is_empty() {
            return Err(DiscoveryError::Empty.into());
        }

        let _connecting = self.inner.connecting.lock().await;

        if let Some(connection) = self.inner.state.read().await.as_ref() {
            tracing::debug!("broker session already connected");
            return Ok(connection.clone());
        }

        let servers = broker::join_brokers(brokers);
        tracing::info!("Connecting to Kafka brokers: {servers}");

        let timeout = self.inner.connect_timeout;
        let connection = tokio::time::timeout(timeout, self.inner.connector.connect(brokers))
            .await
            .map_err(|_| Error::timeout(format!("connect to {servers}"), timeout))??;

        tracing::info!("Kafka admin and producer connected successfully");

        *self.inner.state.write().await = Some(connection.clone());
        Ok(connection)
    }

    /// Tears down both handles.
    ///
    /// Idempotent; failures while closing are logged, never returned.
    pub async fn disconnect(&self) {
        let Some(connection) = self.inner.state.write().await.take() else {
            tracing::debug!("broker session already disconnected");
            return;
        };

        match connection.producer.disconnect().await {
            Ok(()) => tracing::info!("Kafka producer disconnected"),
            Err(e) => tracing::error!("Error disconnecting Kafka producer: {e}"),
        }

        match connection.admin.disconnect().await {
            Ok(()) => tracing::info!("Kafka admin disconnected"),
            Err(e) => tracing::error!("Error disconnecting Kafka admin: {e}"),
        }
    }

    /// Returns `true` while connected.
    pub async fn is_connected(&self) -> bool {
        self.inner.state.read().await.is_some()
    }

    /// Returns the administrative handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] until [`connect`](Self::connect)
    /// completes, including while a connect is in flight.
    pub async fn admin(&self) -> Result<Arc<dyn AdminClient>> {
        self.inner
            .state
            .read()
            .await
            .as_ref()
            .map(|c| Arc::clone(&c.admin))
            .ok_or(Error::NotInitialized)
    }

    /// Returns the producer handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] before [`connect`](Self::connect).
    pub async fn producer(&self) -> Result<Arc<dyn Producer>> {
        self.inner
            .state
            .read()
            .await
            .as_ref()
            .map(|c| Arc::clone(&c.producer))
            .ok_or(Error::NotInitialized)
    }
}

impl std::fmt::Debug for BrokerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerSession")
            .field("connect_timeout", &self.inner.connect_timeout)
            .finish_non_exhaustive()
    }
}
