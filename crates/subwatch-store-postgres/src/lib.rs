// # PostgreSQL Domain Store
//
// `DomainStore` implementation over a sqlx connection pool.
//
// ## Schema
//
// ```sql
// subwatch_domains    (name PK, notify_channels TEXT[], created_at, updated_at)
// subwatch_subdomains (domain FK -> subwatch_domains ON DELETE CASCADE, name,
//                      first_seen, PK (domain, name))
// ```
//
// The schema is created on connect if missing.
//
// ## Atomicity
//
// - `insert` relies on the primary key: the losing insert gets a unique
//   violation, reported as `DuplicateDomain`
// - `merge_add` is a single `INSERT … ON CONFLICT DO NOTHING RETURNING`, so
//   concurrent merges of overlapping sets get disjoint results
// - A merge into a missing domain fails the foreign key and is reported as
//   `DomainNotFound`
//
// ## Security
//
// The connection URL carries credentials and is never logged.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::collections::BTreeSet;
use std::time::Duration;
use subwatch_core::config::StoreConfig;
use subwatch_core::traits::{DomainRecordStream, DomainStoreFactory};
use subwatch_core::{ChannelId, DomainRecord, DomainStore, Error, PluginRegistry, Result};

/// How long to wait for a pooled connection
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS subwatch_domains (
        name            TEXT PRIMARY KEY,
        notify_channels TEXT[] NOT NULL DEFAULT '{}',
        created_at      TIMESTAMPTZ NOT NULL,
        updated_at      TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS subwatch_subdomains (
        domain     TEXT NOT NULL REFERENCES subwatch_domains (name) ON DELETE CASCADE,
        name       TEXT NOT NULL,
        first_seen TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (domain, name)
    )
    "#,
];

macro_rules! select_records {
    ($tail:literal) => {
        concat!(
            r#"
            SELECT d.name,
                   d.notify_channels,
                   d.created_at,
                   d.updated_at,
                   COALESCE(array_agg(s.name) FILTER (WHERE s.name IS NOT NULL), '{}') AS subdomains
            FROM subwatch_domains d
            LEFT JOIN subwatch_subdomains s ON s.domain = d.name
            "#,
            $tail
        )
    };
}

const FIND_RECORD: &str = select_records!("WHERE d.name = $1 GROUP BY d.name");
const LIST_RECORDS: &str = select_records!("GROUP BY d.name ORDER BY d.name");

/// PostgreSQL domain store
#[derive(Clone)]
pub struct PostgresDomainStore {
    pool: PgPool,
}

impl std::fmt::Debug for PostgresDomainStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresDomainStore")
            .field("url", &"<REDACTED>")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

impl PostgresDomainStore {
    /// Connect and make sure the schema exists
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(url)
            .await
            .map_err(storage_error)?;

        let store = Self::from_pool(pool);
        store.ensure_schema().await?;

        tracing::info!(max_connections, "Connected to PostgreSQL domain store");
        Ok(store)
    }

    /// Wrap an existing pool (the schema is not checked)
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the tables if they do not exist
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(storage_error)?;
        }
        Ok(())
    }
}

fn storage_error(e: sqlx::Error) -> Error {
    Error::storage_unavailable(format!("PostgreSQL error: {}", e))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}

fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db_err| db_err.is_foreign_key_violation())
}

fn channels_to_db(channels: &BTreeSet<ChannelId>) -> Vec<String> {
    channels.iter().map(|c| c.as_str().to_string()).collect()
}

fn channels_from_db(domain: &str, raw: Vec<String>) -> BTreeSet<ChannelId> {
    raw.into_iter()
        .filter_map(|value| match value.parse() {
            Ok(channel) => Some(channel),
            Err(_) => {
                tracing::warn!(domain, channel = %value, "Ignoring unknown stored channel");
                None
            }
        })
        .collect()
}

fn row_to_record(row: PgRow) -> Result<DomainRecord> {
    let name: String = row.try_get("name").map_err(storage_error)?;
    let channels: Vec<String> = row.try_get("notify_channels").map_err(storage_error)?;
    let subdomains: Vec<String> = row.try_get("subdomains").map_err(storage_error)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(storage_error)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(storage_error)?;

    let notify_channels = channels_from_db(&name, channels);
    Ok(DomainRecord {
        name,
        subdomains: subdomains.into_iter().collect(),
        notify_channels,
        created_at,
        updated_at,
    })
}

#[async_trait]
impl DomainStore for PostgresDomainStore {
    async fn find(&self, domain: &str) -> Result<Option<DomainRecord>> {
        let row = sqlx::query(FIND_RECORD)
            .bind(domain)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        row.map(row_to_record).transpose()
    }

    async fn insert(&self, record: &DomainRecord) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        sqlx::query(
            r#"
            INSERT INTO subwatch_domains (name, notify_channels, created_at, updated_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&record.name)
        .bind(channels_to_db(&record.notify_channels))
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::duplicate_domain(&record.name)
            } else {
                storage_error(e)
            }
        })?;

        if !record.subdomains.is_empty() {
            let names: Vec<&str> = record.subdomains.iter().map(String::as_str).collect();
            sqlx::query(
                r#"
                INSERT INTO subwatch_subdomains (domain, name)
                SELECT $1, unnest($2::text[])
                "#,
            )
            .bind(&record.name)
            .bind(names)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        }

        tx.commit().await.map_err(storage_error)
    }

    async fn merge_add(&self, domain: &str, names: &BTreeSet<String>) -> Result<Vec<String>> {
        if names.is_empty() {
            return match self.find(domain).await? {
                Some(_) => Ok(Vec::new()),
                None => Err(Error::domain_not_found(domain)),
            };
        }

        let batch: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let rows = sqlx::query(
            r#"
            INSERT INTO subwatch_subdomains (domain, name)
            SELECT $1, unnest($2::text[])
            ON CONFLICT (domain, name) DO NOTHING
            RETURNING name
            "#,
        )
        .bind(domain)
        .bind(batch)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                Error::domain_not_found(domain)
            } else {
                storage_error(e)
            }
        })?;

        let mut added = rows
            .into_iter()
            .map(|row| row.try_get::<String, _>("name"))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(storage_error)?;
        added.sort();

        if !added.is_empty() {
            sqlx::query("UPDATE subwatch_domains SET updated_at = $2 WHERE name = $1")
                .bind(domain)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await
                .map_err(storage_error)?;
        }

        tx.commit().await.map_err(storage_error)?;

        tracing::debug!(domain, added = added.len(), "Merged subdomains");
        Ok(added)
    }

    async fn delete(&self, domain: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM subwatch_domains WHERE name = $1")
            .bind(domain)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(result.rows_affected() > 0)
    }

    fn list_all(&self) -> DomainRecordStream<'_> {
        let rows = sqlx::query(LIST_RECORDS).fetch(&self.pool);

        Box::pin(rows.map(|row| row.map_err(storage_error).and_then(row_to_record)))
    }

    async fn flush(&self) -> Result<()> {
        // Every mutation commits on its own
        Ok(())
    }

    fn store_name(&self) -> &'static str {
        "postgres"
    }
}

/// Factory for creating PostgreSQL stores
pub struct PostgresStoreFactory;

#[async_trait]
impl DomainStoreFactory for PostgresStoreFactory {
    async fn create(&self, config: &StoreConfig) -> Result<Box<dyn DomainStore>> {
        match config {
            StoreConfig::Postgres {
                url,
                max_connections,
            } => Ok(Box::new(
                PostgresDomainStore::connect(url, *max_connections).await?,
            )),
            _ => Err(Error::config("Invalid config for PostgreSQL store")),
        }
    }
}

/// Register the PostgreSQL store with a registry
pub fn register(registry: &PluginRegistry) {
    registry.register_store("postgres", Box::new(PostgresStoreFactory));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels_round_trip_through_text() {
        let channels: BTreeSet<ChannelId> = [ChannelId::Telegram, ChannelId::Slack].into();
        let stored = channels_to_db(&channels);
        assert_eq!(stored, vec!["slack", "telegram"]);
        assert_eq!(channels_from_db("example.com", stored), channels);
    }

    #[test]
    fn test_unknown_channel_is_dropped() {
        let raw = vec!["slack".to_string(), "pager".to_string()];
        let channels = channels_from_db("example.com", raw);
        assert_eq!(channels, [ChannelId::Slack].into());
    }

    #[tokio::test]
    async fn test_factory_rejects_other_config() {
        let err = PostgresStoreFactory
            .create(&StoreConfig::Memory)
            .await
            .err()
            .expect("expected factory to reject non-postgres config");
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_register() {
        let registry = PluginRegistry::with_builtin_stores();
        register(&registry);
        assert!(registry.has_store("postgres"));
        assert!(registry.has_store("memory"));
    }
}
