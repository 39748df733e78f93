// # subwatch-core
//
// Core library for the subdomain discovery and change alerting system.
//
// ## Architecture Overview
//
// One monitoring pass for a root domain flows through these stages:
// - **SourceAggregator**: Fans out to every `SourceConnector` and unions the results
// - **normalize**: Canonicalizes raw names into a deduplicated set
// - **DiffEngine**: Reconciles the snapshot against the `DomainStore`
// - **ResolutionDispatcher**: Resolves A/CNAME records for new names with bounded parallelism
// - **NotificationFanout**: Formats one alert and delivers it to the domain's channels
// - **MonitorEngine**: Drives passes for single domains and scheduled sweeps
// - **PluginRegistry**: Builds connectors, stores, resolvers and notifiers from configuration
//
// ## Design Principles
//
// 1. **Partial results over failure**: A dead source or a timed-out query never aborts a pass
// 2. **Atomic merges**: The store decides what is new, so concurrent passes never double-report
// 3. **Isolation**: One domain's failure never stops a sweep
// 4. **Library-First**: The daemon is a thin shell over this crate

pub mod traits;
pub mod engine;
pub mod registry;
pub mod config;
pub mod error;
pub mod store;
pub mod normalize;
pub mod aggregate;
pub mod diff;
pub mod dispatch;
pub mod notify;

// Re-export core types for convenience
pub use traits::{
    ChannelId, DnsRecord, DnsResolver, DomainRecord, DomainStore, Notifier, SourceConnector,
};
pub use engine::{
    DomainReport, DomainResult, EngineEvent, ImportReport, MonitorEngine, MonitorStats, SweepReport,
};
pub use registry::PluginRegistry;
pub use config::{
    EngineConfig, MonitorConfig, NotifierConfig, ResolverConfig, SourceConfig, StoreConfig,
};
pub use error::{Error, Result};
pub use store::{FileDomainStore, MemoryDomainStore};
pub use normalize::{canonical_root_domain, normalize};
pub use aggregate::SourceAggregator;
pub use diff::{DiffEngine, ReconcileOutcome};
pub use dispatch::ResolutionDispatcher;
pub use notify::{NotificationFanout, NotifyReport};
