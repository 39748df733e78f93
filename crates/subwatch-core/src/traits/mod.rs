//! Core traits for the subwatch system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`SourceConnector`]: Pull raw subdomain names from an external source
//! - [`DomainStore`]: Persist monitored domains with atomic merges
//! - [`DnsResolver`]: Resolve A/CNAME records
//! - [`Notifier`]: Deliver messages to one notification channel

pub mod source_connector;
pub mod domain_store;
pub mod dns_resolver;
pub mod notifier;

pub use source_connector::{SourceConnector, SourceConnectorFactory};
pub use domain_store::{DomainRecord, DomainRecordStream, DomainStore, DomainStoreFactory};
pub use dns_resolver::{DnsRecord, DnsResolver, DnsResolverFactory};
pub use notifier::{ChannelId, Notifier, NotifierFactory};
