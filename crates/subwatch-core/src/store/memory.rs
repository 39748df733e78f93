// # Memory Domain Store
//
// In-memory implementation of DomainStore.
//
// ## Purpose
//
// Provides a fast store that doesn't persist across restarts. Useful for
// tests and one-shot runs.
//
// ## Restart Behavior
//
// Every domain is forgotten on restart, so the first pass afterwards
// recreates each domain that is added again.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::StoreConfig;
use crate::traits::{DomainRecord, DomainRecordStream, DomainStore, DomainStoreFactory};
use crate::Error;

/// In-memory domain store
///
/// All records live in a HashMap behind a RwLock. Every mutation takes the
/// write lock, which makes `insert` and `merge_add` atomic.
///
/// # Example
///
/// ```rust,no_run
/// use std::collections::BTreeSet;
/// use subwatch_core::store::MemoryDomainStore;
/// use subwatch_core::traits::{DomainRecord, DomainStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryDomainStore::new();
///
///     store
///         .insert(&DomainRecord::new("example.com", BTreeSet::new(), BTreeSet::new()))
///         .await?;
///
///     let names: BTreeSet<String> = ["www.example.com".to_string()].into();
///     let added = store.merge_add("example.com", &names).await?;
///     assert_eq!(added, vec!["www.example.com"]);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryDomainStore {
    inner: Arc<RwLock<HashMap<String, DomainRecord>>>,
}

impl MemoryDomainStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of domains in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl DomainStore for MemoryDomainStore {
    async fn find(&self, domain: &str) -> Result<Option<DomainRecord>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.get(domain).cloned())
    }

    async fn insert(&self, record: &DomainRecord) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        super::insert_new(&mut guard, record)
    }

    async fn merge_add(
        &self,
        domain: &str,
        names: &BTreeSet<String>,
    ) -> Result<Vec<String>, Error> {
        let mut guard = self.inner.write().await;
        let record = guard
            .get_mut(domain)
            .ok_or_else(|| Error::domain_not_found(domain))?;
        Ok(super::merge_into(record, names))
    }

    async fn delete(&self, domain: &str) -> Result<bool, Error> {
        let mut guard = self.inner.write().await;
        Ok(guard.remove(domain).is_some())
    }

    fn list_all(&self) -> DomainRecordStream<'_> {
        Box::pin(snapshot_stream(Arc::clone(&self.inner)))
    }

    async fn flush(&self) -> Result<(), Error> {
        Ok(())
    }

    fn store_name(&self) -> &'static str {
        "memory"
    }
}

/// Stream a point-in-time copy of the map, taken on first poll
fn snapshot_stream(
    inner: Arc<RwLock<HashMap<String, DomainRecord>>>,
) -> impl tokio_stream::Stream<Item = Result<DomainRecord, Error>> + Send {
    use futures::StreamExt;

    futures::stream::once(async move {
        let guard = inner.read().await;
        super::sorted_snapshot(&guard)
    })
    .flat_map(|records| futures::stream::iter(records.into_iter().map(Ok)))
}

/// Factory for `StoreConfig::Memory`
#[derive(Debug, Default)]
pub struct MemoryDomainStoreFactory;

#[async_trait]
impl DomainStoreFactory for MemoryDomainStoreFactory {
    async fn create(&self, config: &StoreConfig) -> Result<Box<dyn DomainStore>, Error> {
        match config {
            StoreConfig::Memory => Ok(Box::new(MemoryDomainStore::new())),
            other => Err(Error::config(format!(
                "Memory store factory cannot build a {} store",
                other.type_name()
            ))),
        }
    }
}
