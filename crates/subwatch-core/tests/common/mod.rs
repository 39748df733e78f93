//! Test doubles and common utilities for contract tests
//!
//! The doubles here record what the engine asks of them so tests can assert
//! on behaviour (how often the store was written, how many resolutions ran
//! at once, what each channel received) without touching the network.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use subwatch_core::config::MonitorConfig;
use subwatch_core::error::{Error, Result};
use subwatch_core::store::MemoryDomainStore;
use subwatch_core::traits::{
    ChannelId, DnsResolver, DomainRecord, DomainRecordStream, DomainStore, Notifier,
    SourceConnector,
};

/// A connector returning a fixed list of names
///
/// `{domain}` in a name is replaced with the queried domain.
pub struct StaticConnector {
    name: &'static str,
    names: Vec<String>,
    calls: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl StaticConnector {
    pub fn new(name: &'static str, names: &[&str]) -> Self {
        Self {
            name,
            names: names.iter().map(|n| n.to_string()).collect(),
            calls: Arc::new(AtomicUsize::new(0)),
            delay: None,
        }
    }

    /// Sleep for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Shared handle to the call counter
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl SourceConnector for StaticConnector {
    async fn try_fetch(&self, domain: &str) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .names
            .iter()
            .map(|n| n.replace("{domain}", domain))
            .collect())
    }

    fn source_name(&self) -> &'static str {
        self.name
    }
}

/// A connector whose every fetch fails
pub struct FailingConnector;

#[async_trait]
impl SourceConnector for FailingConnector {
    async fn try_fetch(&self, _domain: &str) -> Result<Vec<String>> {
        Err(Error::source_unavailable("failing", "HTTP 503"))
    }

    fn source_name(&self) -> &'static str {
        "failing"
    }
}

/// A store wrapper that counts calls and can be told to fail
pub struct FlakyStore {
    inner: MemoryDomainStore,
    merge_calls: Arc<AtomicUsize>,
    flush_calls: Arc<AtomicUsize>,
    failing_domains: Arc<Mutex<HashSet<String>>>,
    unavailable: Arc<AtomicBool>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryDomainStore::new(),
            merge_calls: Arc::new(AtomicUsize::new(0)),
            flush_calls: Arc::new(AtomicUsize::new(0)),
            failing_domains: Arc::new(Mutex::new(HashSet::new())),
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A second handle over the same data and counters
    pub fn sharing_state_with(other: &Self) -> Self {
        Self {
            inner: other.inner.clone(),
            merge_calls: Arc::clone(&other.merge_calls),
            flush_calls: Arc::clone(&other.flush_calls),
            failing_domains: Arc::clone(&other.failing_domains),
            unavailable: Arc::clone(&other.unavailable),
        }
    }

    /// Make every operation on `domain` fail with `StorageUnavailable`
    pub fn fail_domain(&self, domain: &str) {
        self.failing_domains.lock().unwrap().insert(domain.to_string());
    }

    /// Make every operation fail with `StorageUnavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn merge_call_count(&self) -> usize {
        self.merge_calls.load(Ordering::SeqCst)
    }

    pub fn flush_call_count(&self) -> usize {
        self.flush_calls.load(Ordering::SeqCst)
    }

    /// Seed a domain directly, bypassing failure injection
    pub async fn seed(&self, domain: &str, names: &[&str], channels: &[ChannelId]) {
        let record = DomainRecord::new(
            domain,
            names.iter().map(|n| n.to_string()).collect(),
            channels.iter().copied().collect(),
        );
        self.inner.insert(&record).await.unwrap();
    }

    /// Stored subdomains of `domain`
    pub async fn subdomains(&self, domain: &str) -> BTreeSet<String> {
        self.inner
            .find(domain)
            .await
            .unwrap()
            .map(|r| r.subdomains)
            .unwrap_or_default()
    }

    fn check(&self, domain: &str) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst)
            || self.failing_domains.lock().unwrap().contains(domain)
        {
            return Err(Error::storage_unavailable("connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl DomainStore for FlakyStore {
    async fn find(&self, domain: &str) -> Result<Option<DomainRecord>> {
        self.check(domain)?;
        self.inner.find(domain).await
    }

    async fn insert(&self, record: &DomainRecord) -> Result<()> {
        self.check(&record.name)?;
        self.inner.insert(record).await
    }

    async fn merge_add(&self, domain: &str, names: &BTreeSet<String>) -> Result<Vec<String>> {
        self.merge_calls.fetch_add(1, Ordering::SeqCst);
        self.check(domain)?;
        self.inner.merge_add(domain, names).await
    }

    async fn delete(&self, domain: &str) -> Result<bool> {
        self.check(domain)?;
        self.inner.delete(domain).await
    }

    fn list_all(&self) -> DomainRecordStream<'_> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Box::pin(futures::stream::once(async {
                Err::<DomainRecord, _>(Error::storage_unavailable("connection refused"))
            }));
        }
        self.inner.list_all()
    }

    async fn flush(&self) -> Result<()> {
        self.flush_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn store_name(&self) -> &'static str {
        "flaky"
    }
}

/// A resolver answering from fixed tables
///
/// Tracks the highest number of lookups in flight at once.
pub struct MockResolver {
    a: HashMap<String, Vec<Ipv4Addr>>,
    cname: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
    delay: Duration,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    lookups: Arc<AtomicUsize>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self {
            a: HashMap::new(),
            cname: HashMap::new(),
            failing: HashSet::new(),
            delay: Duration::ZERO,
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            lookups: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_a(mut self, name: &str, addr: [u8; 4]) -> Self {
        self.a.entry(name.to_string()).or_default().push(Ipv4Addr::from(addr));
        self
    }

    pub fn with_cname(mut self, name: &str, target: &str) -> Self {
        self.cname
            .entry(name.to_string())
            .or_default()
            .push(target.to_string());
        self
    }

    /// Every lookup for `name` returns a transport error
    pub fn failing_for(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn max_in_flight(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.max_in_flight)
    }

    pub fn lookup_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.lookups)
    }

    async fn enter<T: Clone>(&self, name: &str, table: &HashMap<String, Vec<T>>) -> Result<Vec<T>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(name) {
            return Err(Error::resolution(name, "SERVFAIL"));
        }
        Ok(table.get(name).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl DnsResolver for MockResolver {
    async fn lookup_a(&self, name: &str) -> Result<Vec<Ipv4Addr>> {
        self.enter(name, &self.a).await
    }

    async fn lookup_cname(&self, name: &str) -> Result<Vec<String>> {
        self.enter(name, &self.cname).await
    }

    fn resolver_name(&self) -> &'static str {
        "mock"
    }
}

/// A notifier that records messages instead of sending them
pub struct MockNotifier {
    channel: ChannelId,
    sent: Arc<Mutex<Vec<String>>>,
    fail: bool,
    delay: Option<Duration>,
}

impl MockNotifier {
    pub fn new(channel: ChannelId) -> Self {
        Self {
            channel,
            sent: Arc::new(Mutex::new(Vec::new())),
            fail: false,
            delay: None,
        }
    }

    /// A notifier whose deliveries are rejected
    pub fn failing(channel: ChannelId) -> Self {
        Self {
            fail: true,
            ..Self::new(channel)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Shared handle to the delivered messages
    pub fn outbox(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.sent)
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(Error::notification(self.channel.as_str(), "HTTP 500"));
        }
        self.sent.lock().unwrap().push(message.to_string());
        Ok(())
    }

    fn channel(&self) -> ChannelId {
        self.channel
    }
}

/// Helper to create a MonitorConfig with short timeouts for testing
pub fn test_config() -> MonitorConfig {
    let mut config = MonitorConfig::default();
    config.resolver.query_timeout_secs = 1;
    config.resolver.max_workers = 4;
    config.engine.fetch_timeout_secs = 1;
    config.engine.notify_timeout_secs = 1;
    config.engine.max_concurrent_domains = 4;
    config.engine.event_channel_capacity = 100;
    config
}

/// Build a string set from literals
pub fn names(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|n| n.to_string()).collect()
}

/// Build a channel set
pub fn channels(list: &[ChannelId]) -> BTreeSet<ChannelId> {
    list.iter().copied().collect()
}
