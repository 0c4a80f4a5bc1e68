//! Consumer-group lag report for a Strimzi-managed Kafka cluster.
//!
//! Discovers the cluster's brokers (unless `KAFKA_BROKERS` is set), connects
//! once, prints the lag of each requested consumer group as JSON and
//! disconnects.
//!
//! # Usage
//!
//! ```text
//! cargo run --example lag-report --features rdkafka -- <group-id>... [--topics a,b]
//! cargo run --example lag-report --features rdkafka -- --list-topics
//! ```
//!
//! With no group id, the known consumer groups are listed instead.
//!
//! # Environment Variables
//!
//! See [`kafka_lag_k8s::Config`]; `RUST_LOG` controls log output.

use std::env;

use kafka_lag_k8s::kafka::RdKafkaConnector;
use kafka_lag_k8s::{
    BrokerLocator, BrokerSession, Config, KubeControlPlane, LagCalculator, LagOutcome,
    parse_topic_filter,
};
use tracing::{Level, error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut groups = Vec::new();
    let mut topics = None;
    let mut list_topics = false;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--topics" {
            topics = args.next().as_deref().and_then(parse_topic_filter);
        } else if arg == "--list-topics" {
            list_topics = true;
        } else {
            groups.push(arg);
        }
    }

    let config = Config::from_env()?;

    let locator = BrokerLocator::new(KubeControlPlane::infer());
    let brokers = locator.locate(&config.discovery).await?;

    let session = BrokerSession::new(RdKafkaConnector::new(config.client.clone()));
    session.connect(&brokers).await?;

    let calculator =
        LagCalculator::new(session.clone()).request_timeout(config.client.request_timeout);

    let result = if list_topics {
        print_topics(&calculator).await
    } else {
        run(&calculator, &groups, topics.as_ref()).await
    };

    session.disconnect().await;

    if let Err(e) = &result {
        error!("{e}");
    }

    result
}

async fn run(
    calculator: &LagCalculator,
    groups: &[String],
    topics: Option<&std::collections::BTreeSet<String>>,
) -> Result<(), Box<dyn std::error::Error>> {
    if groups.is_empty() {
        let ids = calculator.list_groups().await?;
        println!("{}", serde_json::to_string_pretty(&ids)?);
        return Ok(());
    }

    for group in groups {
        let outcome = calculator.compute_lag(group, topics).await?;

        if let LagOutcome::NotFound(missing) = &outcome {
            info!("{}", missing.message());
        }

        println!("{}", serde_json::to_string_pretty(&outcome)?);
    }

    Ok(())
}

async fn print_topics(calculator: &LagCalculator) -> Result<(), Box<dyn std::error::Error>> {
    let topics = calculator.list_topics().await?;
    println!("{}", serde_json::to_string_pretty(&topics)?);
    Ok(())
}
