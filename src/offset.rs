//! Offset values and per-topic offset snapshots.
//!
//! Offsets travel as decimal strings and are held as `i64` internally.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::admin::WireOffset;

/// Placeholder rendered for a missing offset.
pub const NOT_AVAILABLE: &str = "N/A";

/// A parsed partition offset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OffsetValue {
    /// A concrete, non-negative offset.
    At(i64),
    /// No offset: the broker's `-1` sentinel, or absent from the snapshot.
    Unset,
    /// The transmitted value is not a decimal integer.
    Invalid(String),
}

impl OffsetValue {
    /// Parses a decimal-encoded offset.
    ///
    /// Negative values are the broker's "no offset" sentinels.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.parse::<i64>() {
            Ok(offset) if offset >= 0 => Self::At(offset),
            Ok(_) => Self::Unset,
            Err(_) => Self::Invalid(raw.to_string()),
        }
    }

    /// Returns the concrete offset, if any.
    #[must_use]
    pub fn get(&self) -> Option<i64> {
        match self {
            Self::At(offset) => Some(*offset),
            _ => None,
        }
    }
}

impl fmt::Display for OffsetValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::At(offset) => write!(f, "{offset}"),
            Self::Unset => f.write_str(NOT_AVAILABLE),
            Self::Invalid(raw) => f.write_str(raw),
        }
    }
}

impl Serialize for OffsetValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Which broker view a snapshot was taken from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotKind {
    /// The consumer group's committed offsets.
    Committed,
    /// The partitions' high-water marks.
    HighWaterMark,
}

/// Offsets of one topic, all of one kind, taken at one point in time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicOffsetSnapshot {
    topic: String,
    kind: SnapshotKind,
    offsets: BTreeMap<i32, OffsetValue>,
}

impl TopicOffsetSnapshot {
    /// Builds a snapshot from wire offsets. A repeated partition keeps its last value.
    #[must_use]
    pub fn from_wire(topic: impl Into<String>, kind: SnapshotKind, wire: &[WireOffset]) -> Self {
        Self {
            topic: topic.into(),
            kind,
            offsets: wire
                .iter()
                .map(|w| (w.partition, OffsetValue::parse(&w.offset)))
                .collect(),
        }
    }

    /// Topic the snapshot belongs to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Kind of offsets held.
    #[must_use]
    pub fn kind(&self) -> SnapshotKind {
        self.kind
    }

    /// Offset of `partition`, if present.
    #[must_use]
    pub fn get(&self, partition: i32) -> Option<&OffsetValue> {
        self.offsets.get(&partition)
    }

    /// Partitions and offsets in partition order.
    pub fn partitions(&self) -> impl Iterator<Item = (i32, &OffsetValue)> {
        self.offsets.iter().map(|(p, o)| (*p, o))
    }

    /// Number of partitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Returns `true` if the snapshot holds no partitions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // OffsetValue tests

    #[test]
    fn parse_concrete() {
        assert_eq!(OffsetValue::parse("0"), OffsetValue::At(0));
        assert_eq!(OffsetValue::parse("150"), OffsetValue::At(150));
    }

    #[test]
    fn parse_sentinels() {
        assert_eq!(OffsetValue::parse("-1"), OffsetValue::Unset);
        assert_eq!(OffsetValue::parse("-1001"), OffsetValue::Unset);
    }

    #[test]
    fn parse_invalid() {
        assert_eq!(OffsetValue::parse("12.5"), OffsetValue::Invalid("12.5".to_string()));
        assert_eq!(OffsetValue::parse(""), OffsetValue::Invalid(String::new()));
        assert_eq!(
            OffsetValue::parse("9223372036854775808"),
            OffsetValue::Invalid("9223372036854775808".to_string())
        );
    }

    #[test]
    fn decimal_strings_are_preserved() {
        for raw in ["0", "1", "50", "4294967296", "9007199254740993", "9223372036854775807"] {
            assert_eq!(OffsetValue::parse(raw).to_string(), raw);
        }
    }

    #[test]
    fn display_placeholders() {
        assert_eq!(OffsetValue::Unset.to_string(), "N/A");
        assert_eq!(OffsetValue::Invalid("abc".to_string()).to_string(), "abc");
    }

    #[test]
    fn serializes_as_string() {
        assert_eq!(
            serde_json::to_string(&OffsetValue::At(9_223_372_036_854_775_807)).unwrap(),
            "\"9223372036854775807\""
        );
        assert_eq!(serde_json::to_string(&OffsetValue::Unset).unwrap(), "\"N/A\"");
    }

    // TopicOffsetSnapshot tests

    #[test]
    fn snapshot_from_wire() {
        let wire = vec![WireOffset::new(1, "-1"), WireOffset::new(0, "100")];
        let snapshot = TopicOffsetSnapshot::from_wire("orders", SnapshotKind::Committed, &wire);

        assert_eq!(snapshot.topic(), "orders");
        assert_eq!(snapshot.kind(), SnapshotKind::Committed);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get(0), Some(&OffsetValue::At(100)));
        assert_eq!(snapshot.get(1), Some(&OffsetValue::Unset));
        assert_eq!(snapshot.get(2), None);

        let partitions: Vec<i32> = snapshot.partitions().map(|(p, _)| p).collect();
        assert_eq!(partitions, vec![0, 1]);
    }

    #[test]
    fn empty_snapshot() {
        let snapshot = TopicOffsetSnapshot::from_wire("orders", SnapshotKind::HighWaterMark, &[]);
        assert!(snapshot.is_empty());
    }
}
