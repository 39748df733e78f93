//! Core monitoring engine
//!
//! The MonitorEngine is responsible for:
//! - Running discovery passes for single domains
//! - Adding, importing and deleting monitored domains
//! - Sweeping every stored domain with bounded concurrency
//! - Scheduling sweeps until shutdown
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ SourceAggregator │─── snapshot ───┐
//! └──────────────────┘                │
//!                                     ▼
//!                            ┌────────────────┐
//!                            │  DiffEngine    │◄──── DomainStore
//!                            └────────────────┘
//!                                     │ new names
//!                                     ▼
//!                         ┌──────────────────────┐
//!                         │ ResolutionDispatcher │
//!                         └──────────────────────┘
//!                                     │ DnsRecords
//!                                     ▼
//!                          ┌────────────────────┐
//!                          │ NotificationFanout │
//!                          └────────────────────┘
//! ```
//!
//! ## Pass Flow
//!
//! 1. Aggregate every source into one normalized snapshot
//! 2. Reconcile the snapshot against the store (atomic merge)
//! 3. If there are new, notifiable names, resolve them
//! 4. Notify the domain's channels about the names that resolved
//! 5. Emit events for monitoring/logging

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::aggregate::SourceAggregator;
use crate::config::MonitorConfig;
use crate::diff::{DiffEngine, ReconcileOutcome};
use crate::dispatch::ResolutionDispatcher;
use crate::error::{Error, Result};
use crate::normalize::canonical_root_domain;
use crate::notify::{NotificationFanout, NotifyReport};
use crate::traits::{ChannelId, DnsResolver, DomainRecord, DomainStore, Notifier, SourceConnector};

/// Events emitted by the MonitorEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A domain was added to monitoring
    DomainCreated {
        domain: String,
        subdomains: usize,
    },

    /// New subdomains were recorded for a domain
    NewSubdomains {
        domain: String,
        names: Vec<String>,
    },

    /// A notification channel failed
    NotificationFailed {
        domain: String,
        channel: ChannelId,
        error: String,
    },

    /// A domain's pass failed
    DomainFailed {
        domain: String,
        error: String,
    },

    /// A sweep started
    SweepStarted {
        domains: usize,
    },

    /// A sweep finished
    SweepCompleted {
        domains_monitored: usize,
        new_subdomains_found: usize,
        errors: usize,
    },

    /// Engine started
    Started {
        interval_secs: u64,
    },

    /// Engine stopped
    Stopped {
        reason: String,
    },
}

/// Result of one discovery pass for one domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainReport {
    /// The root domain
    pub domain: String,
    /// Whether the pass created the domain record
    pub created: bool,
    /// Size of the aggregated snapshot
    pub snapshot_size: usize,
    /// Names recorded by this pass, sorted
    pub new_subdomains: Vec<String>,
    /// How many new names resolved (0 when nothing was notified)
    pub resolved: usize,
    /// Notification outcome
    pub notify: NotifyReport,
}

impl DomainReport {
    fn new(domain: &str, snapshot_size: usize, outcome: &ReconcileOutcome) -> Self {
        Self {
            domain: domain.to_string(),
            created: outcome.is_created(),
            snapshot_size,
            new_subdomains: outcome.new_names().to_vec(),
            resolved: 0,
            notify: NotifyReport::default(),
        }
    }
}

/// Per-domain result inside a sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainResult {
    /// Number of new subdomains found
    NewSubdomains(usize),
    /// The pass failed with this error
    Failed(String),
}

/// Result of one sweep over every stored domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Domains processed
    pub domains_monitored: usize,
    /// New subdomains across all domains
    pub new_subdomains_found: usize,
    /// Domains whose pass failed
    pub errors: usize,
    /// Outcome per domain
    pub results: BTreeMap<String, DomainResult>,
    /// When the sweep started
    pub started_at: DateTime<Utc>,
    /// When the sweep finished
    pub finished_at: DateTime<Utc>,
}

/// Result of a bulk import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    /// Domains added, with their initial subdomain count
    pub added: BTreeMap<String, usize>,
    /// Domains that were already monitored
    pub duplicates: Vec<String>,
    /// Domains that could not be added, with the error text
    pub failed: BTreeMap<String, String>,
}

/// Aggregate figures over the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorStats {
    /// Monitored domains
    pub total_domains: usize,
    /// Known subdomains across all domains
    pub total_subdomains: usize,
    /// Domains with at least one notification channel
    pub notifying_domains: usize,
    /// Most recent `updated_at` across all domains
    pub last_update: Option<DateTime<Utc>>,
}

/// Core monitoring engine
///
/// ## Lifecycle
///
/// 1. Create with [`MonitorEngine::new()`]
/// 2. Manage domains with [`add_domain`](MonitorEngine::add_domain) and friends
/// 3. Start the scheduler with [`MonitorEngine::run()`]
/// 4. The scheduler runs until a shutdown signal is received
///
/// ## Isolation
///
/// Every pass for one domain is independent. A failing store call or a
/// failing notifier affects that domain only; a sweep always reports on
/// every domain it listed.
pub struct MonitorEngine {
    /// Domain store shared by all passes
    store: Arc<dyn DomainStore>,

    /// Source fan-out
    aggregator: SourceAggregator,

    /// Snapshot reconciliation
    diff: DiffEngine,

    /// DNS enrichment
    dispatcher: ResolutionDispatcher,

    /// Notification delivery
    fanout: NotificationFanout,

    /// Interval between scheduled sweeps
    monitor_interval: Duration,

    /// Maximum domains processed concurrently in a sweep
    max_concurrent_domains: usize,

    /// Notify about the initial snapshot of new domains
    notify_on_create: bool,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl MonitorEngine {
    /// Create a new monitoring engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        connectors: Vec<Arc<dyn SourceConnector>>,
        resolver: Arc<dyn DnsResolver>,
        store: Arc<dyn DomainStore>,
        notifiers: Vec<Arc<dyn Notifier>>,
        config: &MonitorConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        if connectors.is_empty() {
            return Err(Error::config("At least one source connector is required"));
        }

        let engine_config = &config.engine;
        let (tx, rx) = mpsc::channel(engine_config.event_channel_capacity);

        let engine = Self {
            aggregator: SourceAggregator::new(
                connectors,
                Duration::from_secs(engine_config.fetch_timeout_secs),
            ),
            diff: DiffEngine::new(Arc::clone(&store)),
            dispatcher: ResolutionDispatcher::new(
                resolver,
                config.resolver.max_workers,
                config.resolver.query_timeout(),
            ),
            fanout: NotificationFanout::new(
                notifiers,
                Duration::from_secs(engine_config.notify_timeout_secs),
            ),
            store,
            monitor_interval: Duration::from_secs(engine_config.monitor_interval_secs),
            max_concurrent_domains: engine_config.max_concurrent_domains,
            notify_on_create: engine_config.notify_on_create,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Run one discovery pass for a monitored domain
    ///
    /// # Returns
    ///
    /// - `Ok(DomainReport)`: Pass completed (sources may have contributed nothing)
    /// - `Err(Error::DomainNotFound)`: Domain is not monitored
    /// - `Err(Error::StorageUnavailable)`: Store failed; nothing was notified
    pub async fn monitor_domain(&self, domain: &str) -> Result<DomainReport> {
        let domain = canonical_root_domain(domain)?;

        let result = self.monitor_existing(&domain).await;
        if let Err(e) = &result {
            self.emit_event(EngineEvent::DomainFailed {
                domain: domain.clone(),
                error: e.to_string(),
            });
        }
        result
    }

    async fn monitor_existing(&self, domain: &str) -> Result<DomainReport> {
        if self.store.find(domain).await?.is_none() {
            return Err(Error::domain_not_found(domain));
        }

        debug!(domain, "Monitoring domain");
        let snapshot = self.aggregator.aggregate(domain).await;
        let outcome = self.diff.reconcile_existing(domain, &snapshot).await?;

        self.complete_pass(domain, snapshot.len(), outcome).await
    }

    /// Add a domain to monitoring
    ///
    /// Validates the name, runs an initial discovery and stores the result
    /// with `channels` as the domain's notification channels. The initial
    /// snapshot is only notified when `notify_on_create` is set.
    ///
    /// # Returns
    ///
    /// - `Ok(DomainReport)`: Domain created
    /// - `Err(Error::InvalidInput)`: Not a valid domain name
    /// - `Err(Error::DuplicateDomain)`: Domain is already monitored
    pub async fn add_domain(
        &self,
        domain: &str,
        channels: &BTreeSet<ChannelId>,
    ) -> Result<DomainReport> {
        let domain = canonical_root_domain(domain)?;

        if self.store.find(&domain).await?.is_some() {
            return Err(Error::duplicate_domain(&domain));
        }

        let snapshot = self.aggregator.aggregate(&domain).await;
        let outcome = self
            .diff
            .reconcile_with_channels(&domain, &snapshot, channels)
            .await?;

        if !outcome.is_created() {
            // Someone else added it while we were discovering
            return Err(Error::duplicate_domain(&domain));
        }

        info!(domain = %domain, subdomains = snapshot.len(), "Added domain");
        self.complete_pass(&domain, snapshot.len(), outcome).await
    }

    /// Add many domains
    ///
    /// Blank entries and entries starting with `#` are ignored. Domains are
    /// added concurrently, bounded like a sweep.
    pub async fn import_domains<I, S>(&self, domains: I, channels: &BTreeSet<ChannelId>) -> ImportReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries: BTreeSet<String> = domains
            .into_iter()
            .map(|d| d.as_ref().trim().to_string())
            .filter(|d| !d.is_empty() && !d.starts_with('#'))
            .collect();

        let results: Vec<(String, Result<DomainReport>)> = stream::iter(entries)
            .map(|entry| async move {
                let result = self.add_domain(&entry, channels).await;
                (entry, result)
            })
            .buffer_unordered(self.max_concurrent_domains)
            .collect()
            .await;

        let mut report = ImportReport::default();
        for (entry, result) in results {
            match result {
                Ok(domain_report) => {
                    report
                        .added
                        .insert(domain_report.domain, domain_report.snapshot_size);
                }
                Err(Error::DuplicateDomain(_)) => report.duplicates.push(entry),
                Err(e) => {
                    warn!(domain = %entry, "Import failed: {}", e);
                    report.failed.insert(entry, e.to_string());
                }
            }
        }
        report.duplicates.sort();

        info!(
            added = report.added.len(),
            duplicates = report.duplicates.len(),
            failed = report.failed.len(),
            "Import complete"
        );
        report
    }

    /// Stop monitoring a domain
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Domain removed
    /// - `Err(Error::DomainNotFound)`: Domain was not monitored
    pub async fn delete_domain(&self, domain: &str) -> Result<()> {
        let domain = canonical_root_domain(domain)?;
        if !self.store.delete(&domain).await? {
            return Err(Error::domain_not_found(&domain));
        }
        info!(domain = %domain, "Deleted domain");
        Ok(())
    }

    /// Load a domain's record
    pub async fn get_domain(&self, domain: &str) -> Result<Option<DomainRecord>> {
        let domain = canonical_root_domain(domain)?;
        self.store.find(&domain).await
    }

    /// Load every monitored domain, in name order
    pub async fn list_domains(&self) -> Result<Vec<DomainRecord>> {
        let mut records: Vec<DomainRecord> = self.store.list_all().try_collect().await?;
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    /// Compute aggregate figures over the store
    pub async fn stats(&self) -> Result<MonitorStats> {
        self.store
            .list_all()
            .try_fold(
                MonitorStats {
                    total_domains: 0,
                    total_subdomains: 0,
                    notifying_domains: 0,
                    last_update: None,
                },
                |mut stats, record| async move {
                    stats.total_domains += 1;
                    stats.total_subdomains += record.subdomains.len();
                    if !record.notify_channels.is_empty() {
                        stats.notifying_domains += 1;
                    }
                    stats.last_update = stats.last_update.max(Some(record.updated_at));
                    Ok(stats)
                },
            )
            .await
    }

    /// Monitor every stored domain once
    ///
    /// Domains run concurrently, at most `max_concurrent_domains` at a time.
    /// A failing domain is recorded in the report and never stops the sweep.
    ///
    /// # Returns
    ///
    /// - `Ok(SweepReport)`: Sweep completed
    /// - `Err(Error)`: The store could not list domains
    pub async fn sweep(&self) -> Result<SweepReport> {
        let started_at = Utc::now();

        let domains: Vec<String> = self
            .store
            .list_all()
            .map_ok(|record| record.name)
            .try_collect()
            .await?;

        info!(domains = domains.len(), "Starting sweep");
        self.emit_event(EngineEvent::SweepStarted {
            domains: domains.len(),
        });

        let outcomes: Vec<(String, Result<DomainReport>)> = stream::iter(domains)
            .map(|domain| async move {
                let result = self.monitor_domain(&domain).await;
                (domain, result)
            })
            .buffer_unordered(self.max_concurrent_domains)
            .collect()
            .await;

        let mut report = SweepReport {
            domains_monitored: outcomes.len(),
            new_subdomains_found: 0,
            errors: 0,
            results: BTreeMap::new(),
            started_at,
            finished_at: started_at,
        };

        for (domain, outcome) in outcomes {
            let result = match outcome {
                Ok(domain_report) => {
                    report.new_subdomains_found += domain_report.new_subdomains.len();
                    DomainResult::NewSubdomains(domain_report.new_subdomains.len())
                }
                Err(e) => {
                    error!(domain = %domain, "Monitoring failed: {}", e);
                    report.errors += 1;
                    DomainResult::Failed(e.to_string())
                }
            };
            report.results.insert(domain, result);
        }
        report.finished_at = Utc::now();

        info!(
            domains_monitored = report.domains_monitored,
            new_subdomains_found = report.new_subdomains_found,
            errors = report.errors,
            "Sweep complete"
        );
        self.emit_event(EngineEvent::SweepCompleted {
            domains_monitored: report.domains_monitored,
            new_subdomains_found: report.new_subdomains_found,
            errors: report.errors,
        });

        Ok(report)
    }

    /// Run the scheduler
    ///
    /// Sweeps immediately, then every `monitor_interval_secs`, until
    /// SIGINT is received. Sweeps never overlap; missed ticks are skipped.
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run the scheduler until `shutdown_rx` fires
    ///
    /// With `None`, waits for SIGINT like [`run`](MonitorEngine::run). The
    /// daemon passes a receiver wired to its own signal handling.
    pub async fn run_with_shutdown(
        &self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(
        &self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.emit_event(EngineEvent::Started {
            interval_secs: self.monitor_interval.as_secs(),
        });
        info!("Scheduler started, sweeping every {:?}", self.monitor_interval);

        let shutdown = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Failed to listen for ctrl-c: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
        };
        tokio::pin!(shutdown);

        let mut ticker = tokio::time::interval(self.monitor_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let reason = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    break "Shutdown signal";
                }

                _ = ticker.tick() => {
                    tokio::select! {
                        _ = &mut shutdown => {
                            warn!("Shutdown during sweep, abandoning remaining domains");
                            break "Shutdown signal during sweep";
                        }

                        result = self.sweep() => {
                            if let Err(e) = result {
                                error!("Sweep failed: {}", e);
                            }
                        }
                    }
                }
            }
        };

        info!("Shutdown signal received");
        self.emit_event(EngineEvent::Stopped {
            reason: reason.to_string(),
        });

        self.store.flush().await?;
        info!("Store flushed, engine stopped");

        Ok(())
    }

    /// Resolve and notify after a successful reconcile
    async fn complete_pass(
        &self,
        domain: &str,
        snapshot_size: usize,
        outcome: ReconcileOutcome,
    ) -> Result<DomainReport> {
        let mut report = DomainReport::new(domain, snapshot_size, &outcome);

        match &outcome {
            ReconcileOutcome::Created { names, .. } => {
                self.emit_event(EngineEvent::DomainCreated {
                    domain: domain.to_string(),
                    subdomains: names.len(),
                });
                if !self.notify_on_create {
                    return Ok(report);
                }
            }
            ReconcileOutcome::Updated { new_names, .. } => {
                self.emit_event(EngineEvent::NewSubdomains {
                    domain: domain.to_string(),
                    names: new_names.clone(),
                });
            }
            ReconcileOutcome::Unchanged => return Ok(report),
        }

        let channels = match outcome.notify_channels() {
            Some(channels) if !channels.is_empty() => channels,
            _ => {
                debug!(domain, "No notification channels, skipping resolution");
                return Ok(report);
            }
        };

        if report.new_subdomains.is_empty() {
            return Ok(report);
        }

        let records = self
            .dispatcher
            .resolve_all(report.new_subdomains.iter().cloned())
            .await;
        report.resolved = records.len();

        if records.is_empty() {
            info!(
                domain,
                new = report.new_subdomains.len(),
                "No new subdomain resolved, nothing to notify"
            );
            return Ok(report);
        }

        report.notify = self.fanout.notify(domain, &records, channels).await;
        for (channel, error) in &report.notify.failed {
            self.emit_event(EngineEvent::NotificationFailed {
                domain: domain.to_string(),
                channel: *channel,
                error: error.clone(),
            });
        }

        Ok(report)
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        // A closed channel just means nobody is listening
        if let Err(mpsc::error::TrySendError::Full(_)) = self.event_tx.try_send(event) {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_report_from_outcome() {
        let outcome = ReconcileOutcome::Updated {
            new_names: vec!["c.example.com".to_string()],
            notify_channels: BTreeSet::new(),
        };
        let report = DomainReport::new("example.com", 3, &outcome);
        assert!(!report.created);
        assert_eq!(report.new_subdomains, vec!["c.example.com"]);
        assert_eq!(report.snapshot_size, 3);
        assert!(report.notify.is_empty());
    }

    #[test]
    fn test_sweep_report_serialization() {
        let mut results = BTreeMap::new();
        results.insert("a.com".to_string(), DomainResult::NewSubdomains(2));
        results.insert("b.com".to_string(), DomainResult::Failed("boom".to_string()));

        let report = SweepReport {
            domains_monitored: 2,
            new_subdomains_found: 2,
            errors: 1,
            results,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["results"]["a.com"]["new_subdomains"], 2);
        assert_eq!(json["results"]["b.com"]["failed"], "boom");
    }
}
