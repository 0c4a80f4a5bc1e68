#![deny(missing_docs)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Broker discovery and consumer-group lag reporting for
//! [Strimzi](https://strimzi.io)-managed Kafka clusters on Kubernetes.
//!
//! A monitoring service needs two things from a Kafka cluster whose address
//! may not be known up front: a list of brokers to talk to, and, per consumer
//! group, how far each committed position trails the end of its partition.
//! This crate reads the broker list from the status of the cluster's `Kafka`
//! custom resource, keeps one shared broker connection, and builds lag reports
//! over it.
//!
//! # Features
//!
//! - **Strimzi discovery**: Reads listener bootstrap servers, preferring `plain` over `external`
//! - **Explicit fallback policy**: A real default broker list masks discovery failures; the
//!   `localhost:9092` placeholder does not
//! - **Shared session**: One administrative connection and one producer, with idempotent teardown
//! - **Lag reports**: Per-partition lag with `unknown`/`error` states, decimal-string offsets
//! - **Bounded calls**: Every discovery lookup and broker RPC carries a deadline
//!
//! # Usage
//!
//! ```ignore
//! use kafka_lag_k8s::{BrokerLocator, BrokerSession, Config, KubeControlPlane, LagCalculator};
//! use kafka_lag_k8s::kafka::RdKafkaConnector;
//!
//! let config = Config::from_env()?;
//!
//! // Resolve brokers, then connect the shared session once
//! let locator = BrokerLocator::new(KubeControlPlane::infer());
//! let brokers = locator.locate(&config.discovery).await?;
//!
//! let session = BrokerSession::new(RdKafkaConnector::new(config.client.clone()));
//! session.connect(&brokers).await?;
//!
//! // Compute lag per request
//! let calculator = LagCalculator::new(session.clone())
//!     .request_timeout(config.client.request_timeout);
//! let outcome = calculator.compute_lag("orders-service", None).await?;
//! println!("{}", serde_json::to_string_pretty(&outcome)?);
//!
//! session.disconnect().await;
//! ```

mod admin;
mod broker;
mod config;
mod error;
mod k8s;
mod lag;
mod locator;
mod offset;
mod session;

#[cfg(feature = "rdkafka")]
pub mod kafka;

#[cfg(test)]
mod testing;

pub use admin::{
    AdminClient, BrokerError, GroupListing, GroupOffsets, OutgoingMessage, Producer,
    RecordMetadata, TopicOffsets, WireOffset,
};
pub use broker::{BrokerAddress, PLACEHOLDER_BROKER, parse_bootstrap_servers};
pub use config::{ClientSettings, Config};
pub use error::{DiscoveryError, Error, Result};
pub use k8s::{ControlPlane, KubeControlPlane, ListenerDescriptor};
pub use lag::{
    GroupNotFound, LagCalculator, LagOutcome, LagReport, LagValue, PartitionLag,
    parse_topic_filter,
};
pub use locator::{BrokerLocator, DiscoveryConfig};
pub use offset::{OffsetValue, SnapshotKind, TopicOffsetSnapshot};
pub use session::{BrokerSession, Connection, Connector};
