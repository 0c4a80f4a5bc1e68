//! Broker-facing client seams.
//!
//! The administrative client and the producer are implemented by a transport
//! (see the `rdkafka` feature). Transport failures are classified into
//! [`BrokerError`] here, once, so nothing above this boundary inspects
//! transport error messages.
//!
//! Offsets cross this boundary as decimal strings.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classified broker RPC failure.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BrokerError {
    /// The consumer group id does not exist.
    #[error("consumer group '{0}' does not exist")]
    GroupNotFound(String),

    /// No coordinator is available for the consumer group.
    #[error("coordinator for consumer group '{0}' is not available")]
    CoordinatorUnavailable(String),

    /// The transport gave up waiting for the broker.
    #[error("broker request timed out")]
    Timeout,

    /// Any other protocol or transport failure.
    #[error("broker protocol error: {0}")]
    Protocol(String),
}

/// An entry from the consumer group listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupListing {
    /// Consumer group id.
    pub group_id: String,
}

/// A partition offset as transmitted by the broker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireOffset {
    /// Partition number.
    pub partition: i32,
    /// Decimal-encoded offset; `-1` means no committed offset.
    pub offset: String,
}

impl WireOffset {
    /// Creates a wire offset.
    #[must_use]
    pub fn new(partition: i32, offset: impl Into<String>) -> Self {
        Self {
            partition,
            offset: offset.into(),
        }
    }
}

/// Committed offsets of one topic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicOffsets {
    /// Topic name.
    pub topic: String,
    /// Committed offset per partition.
    pub partitions: Vec<WireOffset>,
}

/// Committed offsets of a consumer group across every topic it tracks.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupOffsets {
    /// Tracked topics.
    pub topics: Vec<TopicOffsets>,
}

/// A message to produce.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Optional message key.
    #[serde(default)]
    pub key: Option<String>,
    /// Message value.
    pub value: String,
}

/// Where a produced message landed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    /// Topic name.
    pub topic_name: String,
    /// Partition number.
    pub partition: i32,
    /// Decimal-encoded offset of the record.
    pub offset: String,
}

/// Returns `true` for broker-internal topics such as `__consumer_offsets`.
pub(crate) fn is_internal_topic(topic: &str) -> bool {
    topic.starts_with("__")
}

/// Administrative operations against the brokers.
///
/// Implementations must be safe for concurrent use; one instance is shared by
/// every in-flight lag computation.
#[async_trait]
pub trait AdminClient: Send + Sync {
    /// Lists the consumer groups known to the cluster.
    async fn list_groups(&self) -> Result<Vec<GroupListing>, BrokerError>;

    /// Lists the names of the topics in the cluster, internal topics excluded.
    async fn list_topics(&self) -> Result<Vec<String>, BrokerError>;

    /// Fetches the committed offsets of `group_id` for every topic it tracks.
    async fn fetch_committed_offsets(&self, group_id: &str) -> Result<GroupOffsets, BrokerError>;

    /// Fetches the high-water mark of every partition of `topic`.
    async fn fetch_topic_high_water_marks(&self, topic: &str)
    -> Result<Vec<WireOffset>, BrokerError>;

    /// Releases the connection.
    async fn disconnect(&self) -> Result<(), BrokerError>;
}

/// Message production.
#[async_trait]
pub trait Producer: Send + Sync {
    /// Sends `messages` to `topic` and waits for delivery.
    async fn send(
        &self,
        topic: &str,
        messages: &[OutgoingMessage],
    ) -> Result<Vec<RecordMetadata>, BrokerError>;

    /// Flushes pending messages and releases the connection.
    async fn disconnect(&self) -> Result<(), BrokerError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn committed_offsets_wire_shape() {
        let offsets: GroupOffsets = serde_json::from_value(json!({
            "topics": [
                {
                    "topic": "orders",
                    "partitions": [
                        { "partition": 0, "offset": "100" },
                        { "partition": 1, "offset": "-1" }
                    ]
                }
            ]
        }))
        .unwrap();

        assert_eq!(offsets.topics.len(), 1);
        assert_eq!(offsets.topics[0].topic, "orders");
        assert_eq!(
            offsets.topics[0].partitions,
            vec![WireOffset::new(0, "100"), WireOffset::new(1, "-1")]
        );
    }

    #[test]
    fn internal_topics() {
        assert!(is_internal_topic("__consumer_offsets"));
        assert!(is_internal_topic("__transaction_state"));
        assert!(!is_internal_topic("orders"));
        assert!(!is_internal_topic("_schemas"));
    }

    #[test]
    fn group_listing_uses_camel_case() {
        let listing = GroupListing {
            group_id: "g1".to_string(),
        };
        assert_eq!(serde_json::to_value(&listing).unwrap(), json!({ "groupId": "g1" }));
    }

    #[test]
    fn outgoing_message_key_is_optional() {
        let message: OutgoingMessage = serde_json::from_value(json!({ "value": "hello" })).unwrap();
        assert_eq!(message.key, None);
        assert_eq!(message.value, "hello");
    }
}
