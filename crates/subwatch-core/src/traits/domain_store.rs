// # Domain Store Trait
//
// Defines the persistence gateway for monitored root domains.
//
// ## Purpose
//
// The store owns the only shared mutable state in the system: the set of
// known subdomains per root domain. All mutation goes through atomic
// primitives (`insert`, `merge_add`, `delete`) so concurrent pipelines for
// the same domain never double-report a name.
//
// ## Implementations
//
// - Memory: `MemoryDomainStore` (tests, ephemeral runs)
// - File: `FileDomainStore` (JSON with atomic writes)
// - PostgreSQL: `subwatch-store-postgres` crate
//
// ## Usage
//
// ```rust,ignore
// use subwatch_core::DomainStore;
//
// let store = /* DomainStore implementation */;
//
// let added = store.merge_add("example.com", &new_names).await?;
// for name in added {
//     println!("new: {}", name);
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::pin::Pin;
use tokio_stream::Stream;

use crate::traits::notifier::ChannelId;

/// A monitored root domain and everything known about it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRecord {
    /// Canonical lowercase root domain (unique key)
    pub name: String,
    /// Known subdomains; only ever grows
    pub subdomains: BTreeSet<String>,
    /// Channels notified about new subdomains of this domain
    #[serde(default)]
    pub notify_channels: BTreeSet<ChannelId>,
    /// When the domain was first recorded
    pub created_at: DateTime<Utc>,
    /// Last merge that added at least one subdomain
    pub updated_at: DateTime<Utc>,
}

impl DomainRecord {
    /// Create a new record stamped with the current time
    pub fn new(
        name: impl Into<String>,
        subdomains: BTreeSet<String>,
        notify_channels: BTreeSet<ChannelId>,
    ) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            subdomains,
            notify_channels,
            created_at: now,
            updated_at: now,
        }
    }

    /// Names in `snapshot` not yet known for this domain, in sorted order
    pub fn unknown_in(&self, snapshot: &BTreeSet<String>) -> BTreeSet<String> {
        snapshot.difference(&self.subdomains).cloned().collect()
    }
}

/// Lazy, finite stream of domain records
pub type DomainRecordStream<'a> =
    Pin<Box<dyn Stream<Item = Result<DomainRecord, crate::Error>> + Send + 'a>>;

/// Trait for domain store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks,
/// including concurrent `merge_add` calls for the same domain.
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Allowed Capabilities
/// - ✅ Perform I/O for persistent storage (files, databases)
/// - ✅ Implement locking/transactions for atomicity
///
/// ## Forbidden Capabilities
/// - ❌ Decide what counts as "new" beyond set membership (owned by `DiffEngine`)
/// - ❌ Trigger resolution or notification (owned by `MonitorEngine`)
///
/// ## Failure Semantics
///
/// Any transport failure must surface as `Error::StorageUnavailable`.
#[async_trait]
pub trait DomainStore: Send + Sync {
    /// Load the record for `domain`
    ///
    /// # Returns
    ///
    /// - `Ok(Some(DomainRecord))`: The stored record
    /// - `Ok(None)`: Domain is not monitored
    /// - `Err(Error)`: Storage error
    async fn find(&self, domain: &str) -> Result<Option<DomainRecord>, crate::Error>;

    /// Create a record
    ///
    /// Creation is race-safe: when two callers insert the same domain, exactly
    /// one succeeds and the other receives `Error::DuplicateDomain`.
    async fn insert(&self, record: &DomainRecord) -> Result<(), crate::Error>;

    /// Atomically add names to a domain's subdomain set
    ///
    /// Only names not already present are added. `updated_at` advances when at
    /// least one name was added. Concurrent callers receive disjoint results.
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<String>)`: Exactly the names this call added, sorted
    /// - `Err(Error::DomainNotFound)`: Domain is not monitored
    /// - `Err(Error)`: Storage error
    async fn merge_add(
        &self,
        domain: &str,
        names: &BTreeSet<String>,
    ) -> Result<Vec<String>, crate::Error>;

    /// Delete a record
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: Record removed
    /// - `Ok(false)`: Record did not exist
    async fn delete(&self, domain: &str) -> Result<bool, crate::Error>;

    /// Stream every stored record
    ///
    /// Each call starts a fresh traversal.
    fn list_all(&self) -> DomainRecordStream<'_>;

    /// Persist any pending changes
    ///
    /// Write-through implementations return immediately.
    async fn flush(&self) -> Result<(), crate::Error>;

    /// Store name (for logging/debugging)
    fn store_name(&self) -> &'static str;
}

/// Helper trait for constructing domain stores from configuration
#[async_trait]
pub trait DomainStoreFactory: Send + Sync {
    /// Create a DomainStore instance from configuration
    async fn create(
        &self,
        config: &crate::config::StoreConfig,
    ) -> Result<Box<dyn DomainStore>, crate::Error>;
}
