//! Snapshot reconciliation
//!
//! Decides which names in a fresh snapshot have never been seen for a domain
//! and records them. The store's atomic `merge_add` is the final authority on
//! "new": the in-memory difference computed here only avoids pointless writes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::traits::{ChannelId, DomainRecord, DomainStore};
use crate::Error;

/// Result of reconciling one snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The domain was not monitored; a record was created holding the snapshot
    Created {
        /// Every name in the initial snapshot, sorted
        names: Vec<String>,
        /// Channels stored on the new record
        notify_channels: BTreeSet<ChannelId>,
    },

    /// The domain existed and at least one name was added
    Updated {
        /// Names added by this reconciliation, sorted
        new_names: Vec<String>,
        /// Channels stored on the record
        notify_channels: BTreeSet<ChannelId>,
    },

    /// Nothing new
    Unchanged,
}

impl ReconcileOutcome {
    /// Names this reconciliation introduced
    ///
    /// For `Created` that is the whole initial snapshot.
    pub fn new_names(&self) -> &[String] {
        match self {
            ReconcileOutcome::Created { names, .. } => names,
            ReconcileOutcome::Updated { new_names, .. } => new_names,
            ReconcileOutcome::Unchanged => &[],
        }
    }

    /// Channels attached to the domain
    pub fn notify_channels(&self) -> Option<&BTreeSet<ChannelId>> {
        match self {
            ReconcileOutcome::Created { notify_channels, .. }
            | ReconcileOutcome::Updated { notify_channels, .. } => Some(notify_channels),
            ReconcileOutcome::Unchanged => None,
        }
    }

    /// Whether the domain was created by this reconciliation
    pub fn is_created(&self) -> bool {
        matches!(self, ReconcileOutcome::Created { .. })
    }
}

/// Reconciles snapshots against the domain store
#[derive(Clone)]
pub struct DiffEngine {
    store: Arc<dyn DomainStore>,
}

impl DiffEngine {
    /// Create a diff engine over `store`
    pub fn new(store: Arc<dyn DomainStore>) -> Self {
        Self { store }
    }

    /// Reconcile `snapshot` for `domain`
    ///
    /// Unknown domains are created with no notification channels.
    pub async fn reconcile(
        &self,
        domain: &str,
        snapshot: &BTreeSet<String>,
    ) -> Result<ReconcileOutcome, Error> {
        self.reconcile_with_channels(domain, snapshot, &BTreeSet::new())
            .await
    }

    /// Reconcile `snapshot` for `domain`, attaching `channels` if the domain
    /// has to be created
    ///
    /// A domain is created even when the snapshot is empty. Only
    /// `StorageUnavailable` (and other store errors) are returned; a creation
    /// race with another caller is resolved by merging instead.
    pub async fn reconcile_with_channels(
        &self,
        domain: &str,
        snapshot: &BTreeSet<String>,
        channels: &BTreeSet<ChannelId>,
    ) -> Result<ReconcileOutcome, Error> {
        let existing = match self.store.find(domain).await? {
            Some(record) => record,
            None => {
                let record = DomainRecord::new(domain, snapshot.clone(), channels.clone());
                match self.store.insert(&record).await {
                    Ok(()) => {
                        info!(domain, subdomains = snapshot.len(), "Created domain record");
                        return Ok(ReconcileOutcome::Created {
                            names: snapshot.iter().cloned().collect(),
                            notify_channels: record.notify_channels,
                        });
                    }
                    Err(Error::DuplicateDomain(_)) => {
                        debug!(domain, "Lost creation race, merging into existing record");
                        self.store
                            .find(domain)
                            .await?
                            .ok_or_else(|| Error::domain_not_found(domain))?
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        self.merge_snapshot(domain, existing, snapshot).await
    }

    /// Reconcile `snapshot` for a domain that must already be monitored
    ///
    /// Never creates a record: a domain deleted while its snapshot was being
    /// gathered stays deleted and `DomainNotFound` is returned.
    pub async fn reconcile_existing(
        &self,
        domain: &str,
        snapshot: &BTreeSet<String>,
    ) -> Result<ReconcileOutcome, Error> {
        let existing = self
            .store
            .find(domain)
            .await?
            .ok_or_else(|| Error::domain_not_found(domain))?;

        self.merge_snapshot(domain, existing, snapshot).await
    }

    async fn merge_snapshot(
        &self,
        domain: &str,
        existing: DomainRecord,
        snapshot: &BTreeSet<String>,
    ) -> Result<ReconcileOutcome, Error> {
        let candidates = existing.unknown_in(snapshot);
        if candidates.is_empty() {
            debug!(domain, "No unknown subdomains in snapshot");
            return Ok(ReconcileOutcome::Unchanged);
        }

        // merge_add refuses missing domains, so a concurrent delete wins here too
        let added = self.store.merge_add(domain, &candidates).await?;
        if added.is_empty() {
            // Another pass recorded them first
            return Ok(ReconcileOutcome::Unchanged);
        }

        info!(domain, added = added.len(), "Recorded new subdomains");
        Ok(ReconcileOutcome::Updated {
            new_names: added,
            notify_channels: existing.notify_channels,
        })
    }
}

impl std::fmt::Debug for DiffEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffEngine")
            .field("store", &self.store.store_name())
            .finish()
    }
}
