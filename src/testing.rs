//! In-memory broker and control-plane doubles for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::admin::{
    AdminClient, BrokerError, GroupListing, GroupOffsets, OutgoingMessage, Producer,
    RecordMetadata, TopicOffsets, WireOffset,
};
use crate::broker::BrokerAddress;
use crate::error::{DiscoveryError, Error, Result};
use crate::k8s::{ControlPlane, ListenerDescriptor};
use crate::session::{Connection, Connector};

fn wire(partitions: &[(i32, &str)]) -> Vec<WireOffset> {
    partitions
        .iter()
        .map(|(partition, offset)| WireOffset::new(*partition, *offset))
        .collect()
}

// Control plane

enum ControlPlaneResponse {
    Listeners(Vec<ListenerDescriptor>),
    Fail(DiscoveryError),
    Stall,
}

pub(crate) struct MockControlPlane {
    pub calls: Arc<AtomicUsize>,
    response: ControlPlaneResponse,
}

impl MockControlPlane {
    fn with(response: ControlPlaneResponse) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            response,
        }
    }

    pub fn listeners(listeners: Vec<ListenerDescriptor>) -> Self {
        Self::with(ControlPlaneResponse::Listeners(listeners))
    }

    pub fn failing(err: DiscoveryError) -> Self {
        Self::with(ControlPlaneResponse::Fail(err))
    }

    pub fn stalled() -> Self {
        Self::with(ControlPlaneResponse::Stall)
    }
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    async fn cluster_listeners(
        &self,
        _namespace: Option<&str>,
        _cluster_name: &str,
    ) -> std::result::Result<Vec<ListenerDescriptor>, DiscoveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        match &self.response {
            ControlPlaneResponse::Listeners(listeners) => Ok(listeners.clone()),
            ControlPlaneResponse::Fail(err) => Err(err.clone()),
            ControlPlaneResponse::Stall => std::future::pending().await,
        }
    }
}

// Admin client

#[derive(Clone)]
pub(crate) struct MockAdmin {
    pub groups: std::result::Result<Vec<GroupListing>, BrokerError>,
    pub topics: std::result::Result<Vec<String>, BrokerError>,
    pub stall_list_topics: bool,
    pub committed: HashMap<String, std::result::Result<GroupOffsets, BrokerError>>,
    pub high_water_marks: HashMap<String, std::result::Result<Vec<WireOffset>, BrokerError>>,
    pub stall_high_water_marks: bool,
    pub fail_disconnect: bool,
    pub high_water_mark_calls: Arc<AtomicUsize>,
    pub disconnects: Arc<AtomicUsize>,
}

impl Default for MockAdmin {
    fn default() -> Self {
        Self {
            groups: Ok(Vec::new()),
            topics: Ok(Vec::new()),
            stall_list_topics: false,
            committed: HashMap::new(),
            high_water_marks: HashMap::new(),
            stall_high_water_marks: false,
            fail_disconnect: false,
            high_water_mark_calls: Arc::new(AtomicUsize::new(0)),
            disconnects: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl MockAdmin {
    /// Registers a listed group with committed offsets per topic.
    pub fn with_group(mut self, group_id: &str, topics: &[(&str, &[(i32, &str)])]) -> Self {
        if let Ok(groups) = self.groups.as_mut() {
            groups.push(GroupListing {
                group_id: group_id.to_string(),
            });
        }

        let offsets = GroupOffsets {
            topics: topics
                .iter()
                .map(|(topic, partitions)| TopicOffsets {
                    topic: (*topic).to_string(),
                    partitions: wire(partitions),
                })
                .collect(),
        };

        self.committed.insert(group_id.to_string(), Ok(offsets));
        self
    }

    pub fn with_high_water_marks(mut self, topic: &str, partitions: &[(i32, &str)]) -> Self {
        self.high_water_marks
            .insert(topic.to_string(), Ok(wire(partitions)));
        self
    }

    pub fn with_topics(mut self, topics: &[&str]) -> Self {
        self.topics = Ok(topics.iter().map(|t| (*t).to_string()).collect());
        self
    }

    pub fn with_list_topics_error(mut self, err: BrokerError) -> Self {
        self.topics = Err(err);
        self
    }

    pub fn with_list_groups_error(mut self, err: BrokerError) -> Self {
        self.groups = Err(err);
        self
    }

    pub fn with_committed_error(mut self, group_id: &str, err: BrokerError) -> Self {
        self.committed.insert(group_id.to_string(), Err(err));
        self
    }

    pub fn with_high_water_mark_error(mut self, topic: &str, err: BrokerError) -> Self {
        self.high_water_marks.insert(topic.to_string(), Err(err));
        self
    }
}

#[async_trait]
impl AdminClient for MockAdmin {
    async fn list_groups(&self) -> std::result::Result<Vec<GroupListing>, BrokerError> {
        self.groups.clone()
    }

    async fn list_topics(&self) -> std::result::Result<Vec<String>, BrokerError> {
        if self.stall_list_topics {
            return std::future::pending().await;
        }

        self.topics.clone()
    }

    async fn fetch_committed_offsets(
        &self,
        group_id: &str,
    ) -> std::result::Result<GroupOffsets, BrokerError> {
        self.committed
            .get(group_id)
            .cloned()
            .unwrap_or_else(|| Err(BrokerError::GroupNotFound(group_id.to_string())))
    }

    async fn fetch_topic_high_water_marks(
        &self,
        topic: &str,
    ) -> std::result::Result<Vec<WireOffset>, BrokerError> {
        self.high_water_mark_calls.fetch_add(1, Ordering::SeqCst);

        if self.stall_high_water_marks {
            return std::future::pending().await;
        }

        // Let sibling fetches interleave
        tokio::task::yield_now().await;

        self.high_water_marks
            .get(topic)
            .cloned()
            .unwrap_or_else(|| Err(BrokerError::Protocol(format!("unknown topic '{topic}'"))))
    }

    async fn disconnect(&self) -> std::result::Result<(), BrokerError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);

        if self.fail_disconnect {
            return Err(BrokerError::Protocol("socket already closed".to_string()));
        }

        Ok(())
    }
}

// Producer

#[derive(Clone, Default)]
pub(crate) struct MockProducer {
    pub next_offset: Arc<AtomicI64>,
    pub disconnects: Arc<AtomicUsize>,
}

#[async_trait]
impl Producer for MockProducer {
    async fn send(
        &self,
        topic: &str,
        messages: &[OutgoingMessage],
    ) -> std::result::Result<Vec<RecordMetadata>, BrokerError> {
        Ok(messages
            .iter()
            .map(|_| RecordMetadata {
                topic_name: topic.to_string(),
                partition: 0,
                offset: self.next_offset.fetch_add(1, Ordering::SeqCst).to_string(),
            })
            .collect())
    }

    async fn disconnect(&self) -> std::result::Result<(), BrokerError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// Connector

enum ConnectMode {
    Succeed,
    Fail(String),
    Stall,
}

pub(crate) struct MockConnector {
    pub admin: MockAdmin,
    pub producer: MockProducer,
    pub calls: Arc<AtomicUsize>,
    pub brokers: Arc<Mutex<Vec<Vec<BrokerAddress>>>>,
    mode: ConnectMode,
}

impl MockConnector {
    fn with(admin: MockAdmin, mode: ConnectMode) -> Self {
        Self {
            admin,
            producer: MockProducer::default(),
            calls: Arc::new(AtomicUsize::new(0)),
            brokers: Arc::new(Mutex::new(Vec::new())),
            mode,
        }
    }

    pub fn new(admin: MockAdmin) -> Self {
        Self::with(admin, ConnectMode::Succeed)
    }

    pub fn failing(message: &str) -> Self {
        Self::with(MockAdmin::default(), ConnectMode::Fail(message.to_string()))
    }

    pub fn stalled() -> Self {
        Self::with(MockAdmin::default(), ConnectMode::Stall)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, brokers: &[BrokerAddress]) -> Result<Connection> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.brokers.lock().unwrap().push(brokers.to_vec());

        tokio::task::yield_now().await;

        match &self.mode {
            ConnectMode::Succeed => Ok(Connection {
                admin: Arc::new(self.admin.clone()),
                producer: Arc::new(self.producer.clone()),
            }),
            ConnectMode::Fail(message) => Err(Error::Connect(message.clone())),
            ConnectMode::Stall => std::future::pending().await,
        }
    }
}
