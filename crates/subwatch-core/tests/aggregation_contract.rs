//! Contract Test: Source Aggregation
//!
//! Constraints verified:
//! - Results from all sources are unioned and normalized
//! - A failing source contributes nothing and fails nothing
//! - A source exceeding the fetch timeout is abandoned
//! - Sources are queried concurrently, not one after another

mod common;

use common::*;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use subwatch_core::SourceAggregator;
use subwatch_core::traits::SourceConnector;

#[tokio::test]
async fn union_of_sources_is_normalized() {
    let connectors: Vec<Arc<dyn SourceConnector>> = vec![
        Arc::new(StaticConnector::new(
            "crtsh",
            &["*.Example.com\nmail.example.com", "10.1.2.3", "admin@example.com"],
        )),
        Arc::new(StaticConnector::new("threatminer", &["MAIL.example.com", "dev.example.com."])),
    ];
    let aggregator = SourceAggregator::new(connectors, Duration::from_secs(1));

    let snapshot = aggregator.aggregate("example.com").await;

    assert_eq!(
        snapshot,
        names(&[
            "admin.example.com",
            "dev.example.com",
            "example.com",
            "mail.example.com",
        ])
    );
}

#[tokio::test]
async fn failing_source_is_ignored() {
    let connectors: Vec<Arc<dyn SourceConnector>> = vec![
        Arc::new(FailingConnector),
        Arc::new(StaticConnector::new("ok", &["a.{domain}"])),
    ];
    let aggregator = SourceAggregator::new(connectors, Duration::from_secs(1));

    let snapshot = aggregator.aggregate("example.com").await;
    assert_eq!(snapshot, names(&["a.example.com"]));
}

#[tokio::test]
async fn all_sources_failing_yields_empty_snapshot() {
    let connectors: Vec<Arc<dyn SourceConnector>> =
        vec![Arc::new(FailingConnector), Arc::new(FailingConnector)];
    let aggregator = SourceAggregator::new(connectors, Duration::from_secs(1));

    assert!(aggregator.aggregate("example.com").await.is_empty());
}

#[tokio::test]
async fn slow_source_times_out_without_losing_others() {
    let slow = StaticConnector::new("slow", &["slow.example.com"])
        .with_delay(Duration::from_secs(30));
    let connectors: Vec<Arc<dyn SourceConnector>> = vec![
        Arc::new(slow),
        Arc::new(StaticConnector::new("fast", &["fast.example.com"])),
    ];
    let aggregator = SourceAggregator::new(connectors, Duration::from_millis(100));

    let started = Instant::now();
    let snapshot = aggregator.aggregate("example.com").await;

    assert_eq!(snapshot, names(&["fast.example.com"]));
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "aggregate should give up on the slow source"
    );
}

#[tokio::test]
async fn sources_are_queried_concurrently() {
    let first = StaticConnector::new("first", &["a.example.com"]).with_delay(Duration::from_millis(300));
    let second = StaticConnector::new("second", &["b.example.com"]).with_delay(Duration::from_millis(300));
    let first_calls = first.call_counter();
    let second_calls = second.call_counter();

    let connectors: Vec<Arc<dyn SourceConnector>> = vec![Arc::new(first), Arc::new(second)];
    let aggregator = SourceAggregator::new(connectors, Duration::from_secs(5));

    let started = Instant::now();
    let snapshot = aggregator.aggregate("example.com").await;

    assert_eq!(snapshot.len(), 2);
    assert!(
        started.elapsed() < Duration::from_millis(550),
        "two 300ms fetches took {:?}",
        started.elapsed()
    );
    assert_eq!(first_calls.load(Ordering::SeqCst), 1);
    assert_eq!(second_calls.load(Ordering::SeqCst), 1);
}
