//! librdkafka-backed broker connection.
//!
//! librdkafka's metadata and offset calls block, so they run on tokio's
//! blocking pool. Error codes are classified into [`BrokerError`] here and
//! nowhere else.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::error::{KafkaError, KafkaResult, RDKafkaErrorCode};
use rdkafka::metadata::MetadataTopic;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer as _};
use rdkafka::{Offset, TopicPartitionList};
use tokio::sync::Mutex;

use crate::admin::{
    AdminClient, BrokerError, GroupListing, GroupOffsets, OutgoingMessage, Producer,
    RecordMetadata, TopicOffsets, WireOffset, is_internal_topic,
};
use crate::broker::{self, BrokerAddress};
use crate::config::ClientSettings;
use crate::error::{Error, Result};
use crate::session::{Connection, Connector};

/// Offset reported for a partition without a committed offset.
const NO_OFFSET: &str = "-1";

/// Connects to Kafka through librdkafka.
#[derive(Clone, Debug)]
pub struct RdKafkaConnector {
    settings: ClientSettings,
}

impl RdKafkaConnector {
    /// Creates a connector with the given client settings.
    #[must_use]
    pub fn new(settings: ClientSettings) -> Self {
        Self { settings }
    }

    fn client_config(&self, brokers: &[BrokerAddress]) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", broker::join_brokers(brokers))
            .set("client.id", &self.settings.client_id)
            .set("retry.backoff.ms", "300")
            .set("retries", "5");
        config
    }
}

#[async_trait]
impl Connector for RdKafkaConnector {
    async fn connect(&self, brokers: &[BrokerAddress]) -> Result<Connection> {
        let config = self.client_config(brokers);
        let timeout = self.settings.request_timeout;

        let consumer: BaseConsumer = config
            .create()
            .map_err(|e| Error::Connect(e.to_string()))?;
        let consumer = Arc::new(consumer);

        // librdkafka connects lazily; a metadata round trip proves the brokers answer
        let probe = Arc::clone(&consumer);
        tokio::task::spawn_blocking(move || probe.fetch_metadata(None, timeout).map(|_| ()))
            .await
            .map_err(|e| Error::Connect(e.to_string()))?
            .map_err(|e| Error::Connect(e.to_string()))?;

        let producer: FutureProducer = config
            .create()
            .map_err(|e| Error::Connect(e.to_string()))?;

        Ok(Connection {
            admin: Arc::new(RdKafkaAdmin {
                config,
                consumer,
                timeout,
                group_consumers: Mutex::default(),
            }),
            producer: Arc::new(RdKafkaProducer { producer, timeout }),
        })
    }
}

/// Administrative client over a shared librdkafka consumer.
///
/// Committed offsets can only be read through a consumer bound to the group,
/// so one such consumer is created per group on first use and kept until
/// [`disconnect`](AdminClient::disconnect).
pub struct RdKafkaAdmin {
    config: ClientConfig,
    consumer: Arc<BaseConsumer>,
    timeout: Duration,
    group_consumers: Mutex<HashMap<String, Arc<BaseConsumer>>>,
}

impl RdKafkaAdmin {
    async fn group_consumer(&self, group_id: &str) -> KafkaResult<Arc<BaseConsumer>> {
        let mut consumers = self.group_consumers.lock().await;

        if let Some(consumer) = consumers.get(group_id) {
            return Ok(Arc::clone(consumer));
        }

        let mut config = self.config.clone();
        config
            .set("group.id", group_id)
            .set("enable.auto.commit", "false");

        let consumer: Arc<BaseConsumer> = Arc::new(config.create()?);
        consumers.insert(group_id.to_string(), Arc::clone(&consumer));

        tracing::debug!("created offset consumer for group '{group_id}'");
        Ok(consumer)
    }

    async fn blocking<T, F>(&self, group: Option<&str>, call: F) -> std::result::Result<T, BrokerError>
    where
        T: Send + 'static,
        F: FnOnce(&BaseConsumer, Duration) -> std::result::Result<T, KafkaError> + Send + 'static,
    {
        let consumer = Arc::clone(&self.consumer);
        let timeout = self.timeout;

        tokio::task::spawn_blocking(move || call(&consumer, timeout))
            .await
            .map_err(|e| BrokerError::Protocol(e.to_string()))?
            .map_err(|e| classify(&e, group))
    }
}

#[async_trait]
impl AdminClient for RdKafkaAdmin {
    async fn list_groups(&self) -> std::result::Result<Vec<GroupListing>, BrokerError> {
        self.blocking(None, |consumer, timeout| {
            let groups = consumer.fetch_group_list(None, timeout)?;
            Ok(groups
                .groups()
                .iter()
                .map(|g| GroupListing {
                    group_id: g.name().to_string(),
                })
                .collect())
        })
        .await
    }

    async fn list_topics(&self) -> std::result::Result<Vec<String>, BrokerError> {
        self.blocking(None, |consumer, timeout| {
            let metadata = consumer.fetch_metadata(None, timeout)?;
            Ok(metadata
                .topics()
                .iter()
                .map(MetadataTopic::name)
                .filter(|name| !is_internal_topic(name))
                .map(str::to_string)
                .collect())
        })
        .await
    }

    async fn fetch_committed_offsets(
        &self,
        group_id: &str,
    ) -> std::result::Result<GroupOffsets, BrokerError> {
        let group_consumer = self
            .group_consumer(group_id)
            .await
            .map_err(|e| classify(&e, Some(group_id)))?;

        // The group's topics are unknown up front, so every partition is asked for
        self.blocking(Some(group_id), move |consumer, timeout| {
            let metadata = consumer.fetch_metadata(None, timeout)?;

            let mut tpl = TopicPartitionList::new();
            for topic in metadata.topics() {
                if is_internal_topic(topic.name()) {
                    continue;
                }
                for partition in topic.partitions() {
                    tpl.add_partition(topic.name(), partition.id());
                }
            }

            let committed = group_consumer.committed_offsets(tpl, timeout)?;

            Ok(group_committed_offsets(
                committed
                    .elements()
                    .iter()
                    .map(|e| (e.topic().to_string(), e.partition(), e.offset())),
            ))
        })
        .await
    }

    async fn fetch_topic_high_water_marks(
        &self,
        topic: &str,
    ) -> std::result::Result<Vec<WireOffset>, BrokerError> {
        let topic = topic.to_string();

        self.blocking(None, move |consumer, timeout| {
            let metadata = consumer.fetch_metadata(Some(&topic), timeout)?;

            let mut offsets = Vec::new();
            for partition in metadata.topics().iter().flat_map(|t| t.partitions()) {
                let (_low, high) = consumer.fetch_watermarks(&topic, partition.id(), timeout)?;
                offsets.push(WireOffset::new(partition.id(), high.to_string()));
            }

            Ok(offsets)
        })
        .await
    }

    /// Drops the cached per-group consumers.
    ///
    /// librdkafka closes a client when its last handle drops. The shared admin
    /// consumer is therefore released only once every clone of the
    /// connection is gone, which can be after this returns if a lag
    /// computation is still in flight.
    async fn disconnect(&self) -> std::result::Result<(), BrokerError> {
        let released = std::mem::take(&mut *self.group_consumers.lock().await);
        tracing::debug!(
            "releasing librdkafka admin consumer and {} group consumers",
            released.len()
        );
        Ok(())
    }
}

/// Groups committed offsets by topic, keeping only topics with at least one
/// committed partition.
fn group_committed_offsets(
    elements: impl Iterator<Item = (String, i32, Offset)>,
) -> GroupOffsets {
    let mut by_topic: BTreeMap<String, (bool, Vec<WireOffset>)> = BTreeMap::new();

    for (topic, partition, offset) in elements {
        let (tracked, partitions) = by_topic.entry(topic).or_default();

        let offset = match offset {
            Offset::Offset(offset) => {
                *tracked = true;
                offset.to_string()
            }
            _ => NO_OFFSET.to_string(),
        };

        partitions.push(WireOffset::new(partition, offset));
    }

    GroupOffsets {
        topics: by_topic
            .into_iter()
            .filter(|(_, (tracked, _))| *tracked)
            .map(|(topic, (_, partitions))| TopicOffsets { topic, partitions })
            .collect(),
    }
}

/// Maps librdkafka error codes onto [`BrokerError`].
fn classify(err: &KafkaError, group: Option<&str>) -> BrokerError {
    let group = group.unwrap_or_default().to_string();

    match err.rdkafka_error_code() {
        Some(RDKafkaErrorCode::GroupIdNotFound) => BrokerError::GroupNotFound(group),
        Some(RDKafkaErrorCode::CoordinatorNotAvailable | RDKafkaErrorCode::NotCoordinator) => {
            BrokerError::CoordinatorUnavailable(group)
        }
        Some(RDKafkaErrorCode::RequestTimedOut | RDKafkaErrorCode::OperationTimedOut) => {
            BrokerError::Timeout
        }
        _ => BrokerError::Protocol(err.to_string()),
    }
}

/// Producer over a librdkafka `FutureProducer`.
pub struct RdKafkaProducer {
    producer: FutureProducer,
    timeout: Duration,
}

#[async_trait]
impl Producer for RdKafkaProducer {
    async fn send(
        &self,
        topic: &str,
        messages: &[OutgoingMessage],
    ) -> std::result::Result<Vec<RecordMetadata>, BrokerError> {
        let deliveries = messages.iter().map(|message| {
            let record = FutureRecord::<str, str>::to(topic).payload(message.value.as_str());
            let record = match message.key.as_deref() {
                Some(key) => record.key(key),
                None => record,
            };
            self.producer.send(record, self.timeout)
        });

        join_all(deliveries)
            .await
            .into_iter()
            .map(|delivery| match delivery {
                Ok((partition, offset)) => Ok(RecordMetadata {
                    topic_name: topic.to_string(),
                    partition,
                    offset: offset.to_string(),
                }),
                Err((err, _message)) => Err(classify(&err, None)),
            })
            .collect()
    }

    async fn disconnect(&self) -> std::result::Result<(), BrokerError> {
        let producer = self.producer.clone();
        let timeout = self.timeout;

        tokio::task::spawn_blocking(move || producer.flush(timeout))
            .await
            .map_err(|e| BrokerError::Protocol(e.to_string()))?
            .map_err(|e| classify(&e, None))
    }
}
