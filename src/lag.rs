//! Consumer-group lag computation.
//!
//! Lag for a partition is the distance between its high-water mark and the
//! group's committed offset, never negative. Partitions whose offsets are
//! missing report `unknown`, and partitions whose offsets cannot be read
//! report `error`; neither stops the rest of the report from being built, and
//! neither contributes to the total.
//!
//! # Example
//!
//! ```ignore
//! use kafka_lag_k8s::{BrokerSession, LagCalculator, LagOutcome};
//!
//! let calculator = LagCalculator::new(session.clone());
//!
//! match calculator.compute_lag("orders-service", None).await? {
//!     LagOutcome::Report(report) => println!("{}", serde_json::to_string(&report)?),
//!     LagOutcome::NotFound(missing) => eprintln!("{}", missing.message()),
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::admin::{AdminClient, BrokerError, is_internal_topic};
use crate::error::{Error, Result};
use crate::offset::{OffsetValue, SnapshotKind, TopicOffsetSnapshot};
use crate::session::BrokerSession;

/// Default deadline for each broker RPC.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Lag of a single partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LagValue {
    /// Messages between the committed offset and the high-water mark.
    Known(i64),
    /// One of the offsets is missing.
    Unknown,
    /// One of the offsets could not be read.
    Error,
}

impl LagValue {
    /// Returns the concrete lag, if any.
    #[must_use]
    pub fn get(self) -> Option<i64> {
        match self {
            Self::Known(lag) => Some(lag),
            Self::Unknown | Self::Error => None,
        }
    }
}

impl fmt::Display for LagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(lag) => write!(f, "{lag}"),
            Self::Unknown => f.write_str("unknown"),
            Self::Error => f.write_str("error"),
        }
    }
}

impl Serialize for LagValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Lag details of one partition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionLag {
    /// Partition number; the report keys partitions by it.
    #[serde(skip)]
    pub partition: i32,
    /// Computed lag or status tag.
    pub lag: LagValue,
    /// The group's committed offset.
    pub consumer_offset: OffsetValue,
    /// The partition's high-water mark.
    pub latest_offset: OffsetValue,
}

impl PartitionLag {
    /// Computes lag from a committed offset and an optional high-water mark.
    #[must_use]
    pub fn new(partition: i32, committed: &OffsetValue, latest: Option<&OffsetValue>) -> Self {
        let consumer_offset = committed.clone();
        let latest_offset = latest.cloned().unwrap_or(OffsetValue::Unset);

        let lag = match (&consumer_offset, &latest_offset) {
            (OffsetValue::Unset, _) | (_, OffsetValue::Unset) => LagValue::Unknown,
            (OffsetValue::At(committed), OffsetValue::At(latest)) => latest
                .checked_sub(*committed)
                .map_or(LagValue::Error, |lag| LagValue::Known(lag.max(0))),
            _ => LagValue::Error,
        };

        Self {
            partition,
            lag,
            consumer_offset,
            latest_offset,
        }
    }
}

/// Lag of every partition a consumer group tracks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LagReport {
    /// Consumer group id.
    pub group_id: String,
    /// Sum of every concrete partition lag.
    #[serde(serialize_with = "serialize_decimal")]
    pub total_lag: i64,
    /// Why the report has no topics, when it has none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Partition lag by topic, then by partition.
    pub topics: BTreeMap<String, BTreeMap<i32, PartitionLag>>,
}

impl LagReport {
    fn empty(group_id: &str, note: String) -> Self {
        Self {
            group_id: group_id.to_string(),
            total_lag: 0,
            note: Some(note),
            topics: BTreeMap::new(),
        }
    }

    /// Returns the lag of one partition.
    #[must_use]
    pub fn partition(&self, topic: &str, partition: i32) -> Option<&PartitionLag> {
        self.topics.get(topic)?.get(&partition)
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_decimal<S: Serializer>(value: &i64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// The consumer group does not exist or has no coordinator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupNotFound {
    /// Consumer group id.
    pub group_id: String,
}

impl GroupNotFound {
    /// Human-readable explanation.
    #[must_use]
    pub fn message(&self) -> String {
        format!(
            "Consumer group '{}' not found or is not active.",
            self.group_id
        )
    }
}

impl Serialize for GroupNotFound {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("GroupNotFound", 1)?;
        state.serialize_field("error", &self.message())?;
        state.end()
    }
}

/// Result of a lag computation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum LagOutcome {
    /// The group exists; its lag report.
    Report(LagReport),
    /// The group does not exist.
    NotFound(GroupNotFound),
}

impl LagOutcome {
    fn not_found(group_id: &str) -> Self {
        tracing::debug!("consumer group '{group_id}' not found");
        Self::NotFound(GroupNotFound {
            group_id: group_id.to_string(),
        })
    }
}

/// Splits a comma-separated topic list, ignoring blanks.
///
/// Returns `None` when no topic remains, meaning "all tracked topics".
#[must_use]
pub fn parse_topic_filter(topics: &str) -> Option<BTreeSet<String>> {
    let filter: BTreeSet<String> = topics
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect();

    (!filter.is_empty()).then_some(filter)
}

/// Computes consumer-group lag through a shared [`BrokerSession`].
///
/// Safe to use from many concurrent requests; nothing is cached between calls.
#[derive(Clone, Debug)]
pub struct LagCalculator {
    session: BrokerSession,
    request_timeout: Duration,
}

impl LagCalculator {
    /// Creates a calculator using the default RPC deadline.
    #[must_use]
    pub fn new(session: BrokerSession) -> Self {
        Self {
            session,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Sets the deadline applied to each broker RPC.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Lists consumer group ids, sorted.
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialized`] before the session connects, [`Error::Timeout`]
    /// if the broker does not answer in time, and [`Error::LagComputation`] for
    /// other broker failures.
    pub async fn list_groups(&self) -> Result<Vec<String>> {
        let admin = self.session.admin().await?;
        let operation = "list consumer groups";

        let groups = self
            .rpc(operation, admin.list_groups())
            .await?
            .map_err(|e| self.broker_failure(operation, e))?;

        let mut ids: Vec<String> = groups.into_iter().map(|g| g.group_id).collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    /// Lists topic names, sorted, without broker-internal topics.
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialized`] before the session connects, [`Error::Timeout`]
    /// if the broker does not answer in time, and [`Error::LagComputation`] for
    /// other broker failures.
    pub async fn list_topics(&self) -> Result<Vec<String>> {
        let admin = self.session.admin().await?;
        let operation = "list topics";

        let mut topics = self
            .rpc(operation, admin.list_topics())
            .await?
            .map_err(|e| self.broker_failure(operation, e))?;

        topics.retain(|t| !is_internal_topic(t));
        topics.sort();
        topics.dedup();
        Ok(topics)
    }

    /// Computes the lag of `group_id`, optionally restricted to `topic_filter`.
    ///
    /// A group the broker does not know about yields [`LagOutcome::NotFound`].
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialized`] before the session connects, [`Error::Timeout`]
    /// if any broker RPC exceeds its deadline, and [`Error::LagComputation`] for
    /// unexpected broker failures.
    pub async fn compute_lag(
        &self,
        group_id: &str,
        topic_filter: Option<&BTreeSet<String>>,
    ) -> Result<LagOutcome> {
        let admin = self.session.admin().await?;

        let operation = "list consumer groups";
        match self.rpc(operation, admin.list_groups()).await? {
            Ok(groups) if groups.iter().any(|g| g.group_id == group_id) => {}
            Ok(_) => return Ok(LagOutcome::not_found(group_id)),
            Err(e) => return self.not_found_or_failure(group_id, operation, e),
        }

        let operation = format!("fetch committed offsets for group '{group_id}'");
        let committed = match self
            .rpc(&operation, admin.fetch_committed_offsets(group_id))
            .await?
        {
            Ok(committed) => committed,
            Err(e) => return self.not_found_or_failure(group_id, &operation, e),
        };

        let working: Vec<TopicOffsetSnapshot> = committed
            .topics
            .iter()
            .filter(|t| topic_filter.is_none_or(|filter| filter.contains(&t.topic)))
            .map(|t| TopicOffsetSnapshot::from_wire(&t.topic, SnapshotKind::Committed, &t.partitions))
            .collect();

        if working.is_empty() {
            let note = match topic_filter {
                Some(filter) => format!(
                    "Consumer group '{group_id}' has no committed offsets for the requested topics: {}.",
                    filter.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
                ),
                None => format!("Consumer group '{group_id}' has no committed offsets."),
            };
            tracing::debug!("{note}");
            return Ok(LagOutcome::Report(LagReport::empty(group_id, note)));
        }

        let latest = self.fetch_high_water_marks(admin.as_ref(), &working).await?;

        let mut report = LagReport {
            group_id: group_id.to_string(),
            total_lag: 0,
            note: None,
            topics: BTreeMap::new(),
        };

        for (committed, latest) in working.iter().zip(&latest) {
            debug_assert_eq!(committed.topic(), latest.topic());
            debug_assert_eq!(latest.kind(), SnapshotKind::HighWaterMark);

            let partitions = report.topics.entry(committed.topic().to_string()).or_default();

            for (partition, offset) in committed.partitions() {
                let lag = PartitionLag::new(partition, offset, latest.get(partition));

                match lag.lag {
                    LagValue::Known(value) => {
                        report.total_lag = report.total_lag.saturating_add(value);
                    }
                    LagValue::Error => tracing::warn!(
                        "unreadable offsets for {}/{partition} in group '{group_id}': committed={}, latest={}",
                        committed.topic(),
                        lag.consumer_offset,
                        lag.latest_offset
                    ),
                    LagValue::Unknown => {}
                }

                partitions.insert(partition, lag);
            }
        }

        tracing::debug!(
            "consumer group '{group_id}': total lag {} across {} topics",
            report.total_lag,
            report.topics.len()
        );

        Ok(LagOutcome::Report(report))
    }

    /// Fetches high-water marks for every working topic concurrently.
    ///
    /// The result is in the same order as `working`.
    async fn fetch_high_water_marks(
        &self,
        admin: &dyn AdminClient,
        working: &[TopicOffsetSnapshot],
    ) -> Result<Vec<TopicOffsetSnapshot>> {
        let fetches = working.iter().map(|snapshot| async move {
            let topic = snapshot.topic();
            let operation = format!("fetch high-water marks for topic '{topic}'");

            let wire = self
                .rpc(&operation, admin.fetch_topic_high_water_marks(topic))
                .await?
                .map_err(|e| self.broker_failure(&operation, e))?;

            Ok::<_, Error>(TopicOffsetSnapshot::from_wire(
                topic,
                SnapshotKind::HighWaterMark,
                &wire,
            ))
        });

        join_all(fetches).await.into_iter().collect()
    }

    /// Runs a broker RPC under the request deadline.
    async fn rpc<T>(
        &self,
        operation: &str,
        call: impl Future<Output = std::result::Result<T, BrokerError>>,
    ) -> Result<std::result::Result<T, BrokerError>> {
        tokio::time::timeout(self.request_timeout, call)
            .await
            .map_err(|_| Error::timeout(operation, self.request_timeout))
    }

    fn broker_failure(&self, operation: &str, err: BrokerError) -> Error {
        match err {
            BrokerError::Timeout => Error::timeout(operation, self.request_timeout),
            err => Error::LagComputation(format!("{operation}: {err}")),
        }
    }

    fn not_found_or_failure(
        &self,
        group_id: &str,
        operation: &str,
        err: BrokerError,
    ) -> Result<LagOutcome> {
        match err {
            BrokerError::GroupNotFound(_) | BrokerError::CoordinatorUnavailable(_) => {
                Ok(LagOutcome::not_found(group_id))
            }
            err => Err(self.broker_failure(operation, err)),
        }
    }
}
