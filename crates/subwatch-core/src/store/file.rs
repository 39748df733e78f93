// # File Domain Store
//
// JSON file implementation of DomainStore with crash recovery.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of last known good state
// - Recovery: Falls back to backup if corruption detected
// - Refusal: With no usable backup, loading fails and neither file is touched
//
// ## Atomicity
//
// Each mutation holds the write lock until the new file is renamed into
// place. A failed write rolls the in-memory change back, so memory and disk
// never disagree about what was merged.
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "domains": {
//     "example.com": {
//       "name": "example.com",
//       "subdomains": ["api.example.com", "www.example.com"],
//       "notify_channels": ["slack"],
//       "created_at": "2025-01-09T12:00:00Z",
//       "updated_at": "2025-01-09T12:00:00Z"
//     }
//   }
// }
// ```

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::config::StoreConfig;
use crate::traits::{DomainRecord, DomainRecordStream, DomainStore, DomainStoreFactory};
use crate::Error;

/// Store file format version
const STORE_FILE_VERSION: &str = "1.0";

/// File-based domain store with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use subwatch_core::store::FileDomainStore;
/// use subwatch_core::traits::DomainStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileDomainStore::new("/var/lib/subwatch/domains.json").await?;
///
///     if let Some(record) = store.find("example.com").await? {
///         println!("{} known subdomains", record.subdomains.len());
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileDomainStore {
    path: PathBuf,
    domains: Arc<RwLock<HashMap<String, DomainRecord>>>,
}

/// Serializable store file format
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct StoreFileFormat {
    version: String,
    domains: HashMap<String, DomainRecord>,
}

/// Borrowed view used for writing without cloning the map
#[derive(serde::Serialize)]
struct StoreFileRef<'a> {
    version: &'a str,
    domains: &'a HashMap<String, DomainRecord>,
}

impl FileDomainStore {
    /// Create or load a file domain store
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Try to load the existing store file
    /// 3. If it is corrupted, load the backup and restore it
    /// 4. If neither parses, fail with `StorageUnavailable`
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create store directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let domains = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            domains: Arc::new(RwLock::new(domains)),
        })
    }

    /// Load domains from file with automatic recovery
    async fn load_with_recovery(path: &Path) -> Result<HashMap<String, DomainRecord>, Error> {
        match Self::load(path).await {
            Ok(domains) => {
                tracing::debug!("Loaded store file: {} domains", domains.len());
                Ok(domains)
            }
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "Store file appears corrupted: {}. Attempting recovery from backup.",
                    e
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    return Err(Error::storage_unavailable(format!(
                        "Store file {} is corrupted and has no backup: {}",
                        path.display(),
                        e
                    )));
                }

                match Self::load(&backup_path).await {
                    Ok(domains) => {
                        tracing::info!("Recovered store from backup: {} domains", domains.len());
                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!(
                                "Failed to restore store file from backup: {}",
                                restore_err
                            );
                        }
                        Ok(domains)
                    }
                    Err(backup_err) => Err(Error::storage_unavailable(format!(
                        "Store file {} and its backup are both unreadable: {}; {}",
                        path.display(),
                        e,
                        backup_err
                    ))),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Load domains from file
    ///
    /// Parse failures come back as `Error::Json` so the caller can tell
    /// corruption from I/O trouble.
    async fn load(path: &Path) -> Result<HashMap<String, DomainRecord>, Error> {
        if !path.exists() {
            tracing::debug!("Store file does not exist: {}", path.display());
            return Ok(HashMap::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::storage_unavailable(format!(
                "Failed to read store file {}: {}",
                path.display(),
                e
            ))
        })?;

        let file: StoreFileFormat = serde_json::from_str(&content)?;

        if file.version != STORE_FILE_VERSION {
            tracing::warn!(
                "Store file version mismatch: expected {}, got {}. Attempting to load anyway.",
                STORE_FILE_VERSION,
                file.version
            );
        }

        Ok(file.domains)
    }

    /// Write `domains` to disk atomically
    ///
    /// Callers hold the write lock for the duration.
    async fn persist(&self, domains: &HashMap<String, DomainRecord>) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(&StoreFileRef {
            version: STORE_FILE_VERSION,
            domains,
        })
        .map_err(|e| Error::storage_unavailable(format!("Failed to serialize store: {}", e)))?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::storage_unavailable(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::storage_unavailable(format!(
                    "Failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.sync_all().await.map_err(|e| {
                Error::storage_unavailable(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::storage_unavailable(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Store written to file: {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl DomainStore for FileDomainStore {
    async fn find(&self, domain: &str) -> Result<Option<DomainRecord>, Error> {
        let guard = self.domains.read().await;
        Ok(guard.get(domain).cloned())
    }

    async fn insert(&self, record: &DomainRecord) -> Result<(), Error> {
        let mut guard = self.domains.write().await;
        super::insert_new(&mut guard, record)?;

        if let Err(e) = self.persist(&guard).await {
            guard.remove(&record.name);
            return Err(e);
        }
        Ok(())
    }

    async fn merge_add(
        &self,
        domain: &str,
        names: &BTreeSet<String>,
    ) -> Result<Vec<String>, Error> {
        let mut guard = self.domains.write().await;
        let record = guard
            .get_mut(domain)
            .ok_or_else(|| Error::domain_not_found(domain))?;

        let previous_updated_at = record.updated_at;
        let added = super::merge_into(record, names);
        if added.is_empty() {
            return Ok(added);
        }

        if let Err(e) = self.persist(&guard).await {
            if let Some(record) = guard.get_mut(domain) {
                for name in &added {
                    record.subdomains.remove(name);
                }
                record.updated_at = previous_updated_at;
            }
            return Err(e);
        }
        Ok(added)
    }

    async fn delete(&self, domain: &str) -> Result<bool, Error> {
        let mut guard = self.domains.write().await;
        let Some(removed) = guard.remove(domain) else {
            return Ok(false);
        };

        if let Err(e) = self.persist(&guard).await {
            guard.insert(domain.to_string(), removed);
            return Err(e);
        }
        Ok(true)
    }

    fn list_all(&self) -> DomainRecordStream<'_> {
        use futures::StreamExt;

        Box::pin(
            futures::stream::once(async move {
                let guard = self.domains.read().await;
                super::sorted_snapshot(&guard)
            })
            .flat_map(|records| futures::stream::iter(records.into_iter().map(Ok))),
        )
    }

    async fn flush(&self) -> Result<(), Error> {
        // Mutations are written through; this rewrites the current state
        let guard = self.domains.read().await;
        self.persist(&guard).await
    }

    fn store_name(&self) -> &'static str {
        "file"
    }
}

/// Factory for `StoreConfig::File`
#[derive(Debug, Default)]
pub struct FileDomainStoreFactory;

#[async_trait]
impl DomainStoreFactory for FileDomainStoreFactory {
    async fn create(&self, config: &StoreConfig) -> Result<Box<dyn DomainStore>, Error> {
        match config {
            StoreConfig::File { path } => Ok(Box::new(FileDomainStore::new(path).await?)),
            other => Err(Error::config(format!(
                "File store factory cannot build a {} store",
                other.type_name()
            ))),
        }
    }
}
