//! Plugin registry
//!
//! The registry lets source connectors, domain stores, DNS resolvers and
//! notifiers be registered at runtime and built from configuration by type
//! name.
//!
//! ## Registration
//!
//! Plugin crates expose a `register` function:
//!
//! ```rust,ignore
//! // In the subwatch-sources crate
//! pub fn register(registry: &PluginRegistry) {
//!     registry.register_source("crtsh", Box::new(CrtshFactory));
//!     registry.register_source("threatminer", Box::new(ThreatMinerFactory));
//! }
//! ```
//!
//! The daemon calls each of them, then builds every component from its
//! `MonitorConfig`:
//!
//! ```rust,ignore
//! let registry = PluginRegistry::with_builtin_stores();
//! subwatch_sources::register(&registry);
//!
//! let connectors = registry.create_sources(&config.sources)?;
//! let store = registry.create_store(&config.store).await?;
//! ```

use crate::config::{NotifierConfig, ResolverConfig, SourceConfig, StoreConfig};
use crate::error::{Error, Result};
use crate::store::{FileDomainStoreFactory, MemoryDomainStoreFactory};
use crate::traits::{DnsResolver, DomainStore, Notifier, SourceConnector};
use crate::traits::{DnsResolverFactory, DomainStoreFactory, NotifierFactory, SourceConnectorFactory};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Registry for plugin-based component creation
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes. A poisoned lock is recovered rather than
/// propagated; factories are inserted atomically so the map is never torn.
#[derive(Default)]
pub struct PluginRegistry {
    /// Registered source connector factories
    sources: RwLock<HashMap<String, Box<dyn SourceConnectorFactory>>>,

    /// Registered domain store factories
    stores: RwLock<HashMap<String, Arc<dyn DomainStoreFactory>>>,

    /// Registered DNS resolver factories
    resolvers: RwLock<HashMap<String, Box<dyn DnsResolverFactory>>>,

    /// Registered notifier factories
    notifiers: RwLock<HashMap<String, Box<dyn NotifierFactory>>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

impl PluginRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the memory and file stores registered
    pub fn with_builtin_stores() -> Self {
        let registry = Self::new();
        registry.register_store("memory", Box::new(MemoryDomainStoreFactory));
        registry.register_store("file", Box::new(FileDomainStoreFactory));
        registry
    }

    /// Register a source connector factory
    ///
    /// # Parameters
    ///
    /// - `name`: Source type name (e.g., "crtsh", "threatminer")
    /// - `factory`: Factory object for creating connector instances
    pub fn register_source(
        &self,
        name: impl Into<String>,
        factory: Box<dyn SourceConnectorFactory>,
    ) {
        write(&self.sources).insert(name.into(), factory);
    }

    /// Register a domain store factory
    pub fn register_store(&self, name: impl Into<String>, factory: Box<dyn DomainStoreFactory>) {
        write(&self.stores).insert(name.into(), Arc::from(factory));
    }

    /// Register a DNS resolver factory
    pub fn register_resolver(&self, name: impl Into<String>, factory: Box<dyn DnsResolverFactory>) {
        write(&self.resolvers).insert(name.into(), factory);
    }

    /// Register a notifier factory
    pub fn register_notifier(&self, name: impl Into<String>, factory: Box<dyn NotifierFactory>) {
        write(&self.notifiers).insert(name.into(), factory);
    }

    /// Create a source connector from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn SourceConnector>)`: Created connector
    /// - `Err(Error)`: If the source type is not registered or creation fails
    pub fn create_source(&self, config: &SourceConfig) -> Result<Box<dyn SourceConnector>> {
        let source_type = config.type_name();
        let sources = read(&self.sources);

        let factory = sources
            .get(source_type)
            .ok_or_else(|| Error::config(format!("Unknown source type: {}", source_type)))?;

        factory.create(config)
    }

    /// Create every configured source connector
    pub fn create_sources(&self, configs: &[SourceConfig]) -> Result<Vec<Arc<dyn SourceConnector>>> {
        configs
            .iter()
            .map(|config| self.create_source(config).map(Arc::from))
            .collect()
    }

    /// Create a domain store from configuration
    pub async fn create_store(&self, config: &StoreConfig) -> Result<Box<dyn DomainStore>> {
        let store_type = config.type_name();

        // Clone the factory out so no lock is held across the await
        let factory = read(&self.stores)
            .get(store_type)
            .cloned()
            .ok_or_else(|| Error::config(format!("Unknown store type: {}", store_type)))?;

        factory.create(config).await
    }

    /// Create a DNS resolver from configuration
    pub fn create_resolver(&self, config: &ResolverConfig) -> Result<Box<dyn DnsResolver>> {
        let resolvers = read(&self.resolvers);

        let factory = resolvers.get(&config.resolver_type).ok_or_else(|| {
            Error::config(format!("Unknown resolver type: {}", config.resolver_type))
        })?;

        factory.create(config)
    }

    /// Create a notifier from configuration
    pub fn create_notifier(&self, config: &NotifierConfig) -> Result<Box<dyn Notifier>> {
        let notifier_type = config.type_name();
        let notifiers = read(&self.notifiers);

        let factory = notifiers
            .get(notifier_type)
            .ok_or_else(|| Error::config(format!("Unknown notifier type: {}", notifier_type)))?;

        factory.create(config)
    }

    /// Create every configured notifier
    pub fn create_notifiers(&self, configs: &[NotifierConfig]) -> Result<Vec<Arc<dyn Notifier>>> {
        configs
            .iter()
            .map(|config| self.create_notifier(config).map(Arc::from))
            .collect()
    }

    /// List all registered source types
    pub fn list_sources(&self) -> Vec<String> {
        read(&self.sources).keys().cloned().collect()
    }

    /// List all registered store types
    pub fn list_stores(&self) -> Vec<String> {
        read(&self.stores).keys().cloned().collect()
    }

    /// Check if a source type is registered
    pub fn has_source(&self, name: &str) -> bool {
        read(&self.sources).contains_key(name)
    }

    /// Check if a store type is registered
    pub fn has_store(&self, name: &str) -> bool {
        read(&self.stores).contains_key(name)
    }

    /// Check if a resolver type is registered
    pub fn has_resolver(&self, name: &str) -> bool {
        read(&self.resolvers).contains_key(name)
    }

    /// Check if a notifier type is registered
    pub fn has_notifier(&self, name: &str) -> bool {
        read(&self.notifiers).contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockSourceFactory;

    impl SourceConnectorFactory for MockSourceFactory {
        fn create(&self, _config: &SourceConfig) -> Result<Box<dyn SourceConnector>> {
            Err(Error::config("Mock source not implemented"))
        }
    }

    #[test]
    fn test_registry_registration() {
        let registry = PluginRegistry::new();
        assert!(!registry.has_source("crtsh"));

        registry.register_source("crtsh", Box::new(MockSourceFactory));

        assert!(registry.has_source("crtsh"));
        assert!(registry.list_sources().contains(&"crtsh".to_string()));
    }

    #[test]
    fn test_unknown_source_type() {
        let registry = PluginRegistry::new();
        let err = registry.create_source(&SourceConfig::threatminer()).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_builtin_stores() {
        let registry = PluginRegistry::with_builtin_stores();
        assert!(registry.has_store("memory"));
        assert!(registry.has_store("file"));

        let store = registry.create_store(&StoreConfig::Memory).await.unwrap();
        assert_eq!(store.store_name(), "memory");

        let err = registry
            .create_store(&StoreConfig::Postgres {
                url: "postgres://localhost/subwatch".to_string(),
                max_connections: 1,
            })
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    /// Source built from a `Custom` config: answers with the configured names
    struct FixedSource(Vec<String>);

    #[async_trait::async_trait]
    impl SourceConnector for FixedSource {
        async fn try_fetch(&self, _domain: &str) -> Result<Vec<String>> {
            Ok(self.0.clone())
        }

        fn source_name(&self) -> &'static str {
            "fixed"
        }
    }

    struct FixedSourceFactory;

    impl SourceConnectorFactory for FixedSourceFactory {
        fn create(&self, config: &SourceConfig) -> Result<Box<dyn SourceConnector>> {
            match config {
                SourceConfig::Custom { config, .. } => {
                    let names = serde_json::from_value(config["names"].clone())?;
                    Ok(Box::new(FixedSource(names)))
                }
                _ => Err(Error::config("Invalid config for fixed source")),
            }
        }
    }

    struct ScratchStoreFactory;

    #[async_trait::async_trait]
    impl DomainStoreFactory for ScratchStoreFactory {
        async fn create(&self, config: &StoreConfig) -> Result<Box<dyn DomainStore>> {
            match config {
                StoreConfig::Custom { .. } => Ok(Box::new(crate::store::MemoryDomainStore::new())),
                _ => Err(Error::config("Invalid config for scratch store")),
            }
        }
    }

    #[tokio::test]
    async fn test_custom_configs_resolve_by_factory_name() {
        let registry = PluginRegistry::new();
        registry.register_source("fixed", Box::new(FixedSourceFactory));
        registry.register_store("scratch", Box::new(ScratchStoreFactory));

        let source_config = SourceConfig::Custom {
            factory: "fixed".to_string(),
            config: serde_json::json!({ "names": ["a.example.com"] }),
        };
        source_config.validate().unwrap();

        let sources = registry.create_sources(&[source_config]).unwrap();
        assert_eq!(sources[0].fetch("example.com").await, vec!["a.example.com"]);

        let store = registry
            .create_store(&StoreConfig::Custom {
                factory: "scratch".to_string(),
                config: serde_json::Value::Null,
            })
            .await
            .unwrap();
        assert_eq!(store.store_name(), "memory");

        let unknown = SourceConfig::Custom {
            factory: "missing".to_string(),
            config: serde_json::json!({}),
        };
        assert!(matches!(registry.create_source(&unknown).err().unwrap(), Error::Config(_)));
    }
}
