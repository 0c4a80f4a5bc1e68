//! Broker addresses and bootstrap-server string parsing.

use std::fmt;
use std::str::FromStr;

use crate::error::DiscoveryError;

/// Placeholder broker list meaning "no real default was configured".
pub const PLACEHOLDER_BROKER: &str = "localhost:9092";

/// A broker `host:port` pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BrokerAddress {
    /// Host name or IP address. IPv6 literals keep their brackets.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl BrokerAddress {
    /// Creates a new broker address.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for BrokerAddress {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        let invalid = || DiscoveryError::InvalidBootstrap(token.to_string());

        let (host, port) = token.rsplit_once(':').ok_or_else(invalid)?;

        // An unbracketed IPv6 literal would split on its last group
        if host.is_empty() || (host.contains(':') && !host.starts_with('[')) {
            return Err(invalid());
        }

        let port = port.parse::<u16>().map_err(|_| invalid())?;
        if port == 0 {
            return Err(invalid());
        }

        Ok(Self::new(host, port))
    }
}

/// Parses a comma-separated bootstrap-server string into broker addresses.
///
/// Order is preserved.
///
/// # Errors
///
/// Returns [`DiscoveryError::Empty`] for a blank string and
/// [`DiscoveryError::InvalidBootstrap`] for any empty or malformed token.
pub fn parse_bootstrap_servers(servers: &str) -> Result<Vec<BrokerAddress>, DiscoveryError> {
    if servers.trim().is_empty() {
        return Err(DiscoveryError::Empty);
    }

    servers.split(',').map(str::parse).collect()
}

/// Joins broker addresses into a bootstrap-server string.
#[must_use]
pub fn join_brokers(brokers: &[BrokerAddress]) -> String {
    brokers
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Returns `true` if the list is exactly the `localhost:9092` placeholder.
#[must_use]
pub fn is_placeholder(brokers: &[BrokerAddress]) -> bool {
    matches!(brokers, [only] if only.to_string() == PLACEHOLDER_BROKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    // BrokerAddress parsing tests

    #[test]
    fn parse_host_and_port() {
        let addr: BrokerAddress = "my-cluster-kafka-bootstrap.kafka.svc:9092".parse().unwrap();
        assert_eq!(addr.host, "my-cluster-kafka-bootstrap.kafka.svc");
        assert_eq!(addr.port, 9092);
    }

    #[test]
    fn parse_trims_whitespace() {
        let addr: BrokerAddress = "  10.0.0.1:9093 ".parse().unwrap();
        assert_eq!(addr, BrokerAddress::new("10.0.0.1", 9093));
    }

    #[test]
    fn parse_bracketed_ipv6() {
        let addr: BrokerAddress = "[::1]:9092".parse().unwrap();
        assert_eq!(addr.host, "[::1]");
        assert_eq!(addr.to_string(), "[::1]:9092");
    }

    #[test]
    fn parse_rejects_missing_port() {
        assert_eq!(
            "broker".parse::<BrokerAddress>(),
            Err(DiscoveryError::InvalidBootstrap("broker".to_string()))
        );
    }

    #[test]
    fn parse_rejects_bad_ports() {
        assert!("broker:abc".parse::<BrokerAddress>().is_err());
        assert!("broker:70000".parse::<BrokerAddress>().is_err());
        assert!("broker:0".parse::<BrokerAddress>().is_err());
        assert!(":9092".parse::<BrokerAddress>().is_err());
    }

    #[test]
    fn parse_rejects_unbracketed_ipv6() {
        assert!("::1:9092".parse::<BrokerAddress>().is_err());
    }

    // Bootstrap string tests

    #[test]
    fn bootstrap_preserves_order() {
        let brokers = parse_bootstrap_servers("b:9092,a:9092,c:9093").unwrap();
        assert_eq!(
            brokers,
            vec![
                BrokerAddress::new("b", 9092),
                BrokerAddress::new("a", 9092),
                BrokerAddress::new("c", 9093),
            ]
        );
        assert_eq!(join_brokers(&brokers), "b:9092,a:9092,c:9093");
    }

    #[test]
    fn bootstrap_blank_is_empty() {
        assert_eq!(parse_bootstrap_servers(""), Err(DiscoveryError::Empty));
        assert_eq!(parse_bootstrap_servers("  "), Err(DiscoveryError::Empty));
    }

    #[test]
    fn bootstrap_rejects_empty_token() {
        assert_eq!(
            parse_bootstrap_servers("a:9092,,b:9092"),
            Err(DiscoveryError::InvalidBootstrap(String::new()))
        );
        assert!(parse_bootstrap_servers("a:9092,").is_err());
    }

    // Placeholder tests

    #[test]
    fn placeholder_only_matches_single_localhost() {
        assert!(is_placeholder(&[BrokerAddress::new("localhost", 9092)]));
        assert!(!is_placeholder(&[BrokerAddress::new("localhost", 9093)]));
        assert!(!is_placeholder(&[]));
        assert!(!is_placeholder(&[
            BrokerAddress::new("localhost", 9092),
            BrokerAddress::new("other", 9092),
        ]));
    }
}
