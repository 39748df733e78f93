// # Domain Store Implementations
//
// This module provides implementations of the DomainStore trait for
// different persistence strategies. The PostgreSQL store lives in its own
// crate.

pub mod file;
pub mod memory;

pub use file::{FileDomainStore, FileDomainStoreFactory};
pub use memory::{MemoryDomainStore, MemoryDomainStoreFactory};

use chrono::Utc;
use std::collections::{BTreeSet, HashMap};

use crate::traits::DomainRecord;
use crate::Error;

/// Add the names `record` does not have yet, returning them in sorted order
///
/// `updated_at` only moves when something was added.
pub(crate) fn merge_into(record: &mut DomainRecord, names: &BTreeSet<String>) -> Vec<String> {
    let added: Vec<String> = names
        .iter()
        .filter(|name| record.subdomains.insert((*name).clone()))
        .cloned()
        .collect();

    if !added.is_empty() {
        record.updated_at = Utc::now();
    }
    added
}

/// Insert `record` unless its domain is already present
pub(crate) fn insert_new(
    records: &mut HashMap<String, DomainRecord>,
    record: &DomainRecord,
) -> Result<(), Error> {
    if records.contains_key(&record.name) {
        return Err(Error::duplicate_domain(&record.name));
    }
    records.insert(record.name.clone(), record.clone());
    Ok(())
}

/// Snapshot of all records in name order
pub(crate) fn sorted_snapshot(records: &HashMap<String, DomainRecord>) -> Vec<DomainRecord> {
    let mut snapshot: Vec<DomainRecord> = records.values().cloned().collect();
    snapshot.sort_by(|a, b| a.name.cmp(&b.name));
    snapshot
}
