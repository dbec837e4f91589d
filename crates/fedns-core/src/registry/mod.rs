//! Plugin-based backend registry
//!
//! The registry allows DNS backends to be registered dynamically at
//! runtime, avoiding hardcoded if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fedns_core::registry::BackendRegistry;
//! use fedns_core::config::BackendConfig;
//!
//! let registry = BackendRegistry::with_builtin();
//! fedns_provider_cloudflare::register(&registry);
//!
//! let config = BackendConfig::Cloudflare { ... };
//! let backend = registry.create_backend(&config)?;
//! ```

use crate::backend::MemoryDnsBackendFactory;
use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::traits::{DnsBackend, DnsBackendFactory};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Registry of DNS backend factories keyed by backend type name
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct BackendRegistry {
    backends: RwLock<HashMap<String, Box<dyn DnsBackendFactory>>>,
}

impl BackendRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in memory backend registered
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register_backend("memory", Box::new(MemoryDnsBackendFactory));
        registry
    }

    /// Register a DNS backend factory
    ///
    /// # Parameters
    ///
    /// - `name`: Backend type name (e.g., "memory", "cloudflare")
    /// - `factory`: Factory object for creating backend instances
    pub fn register_backend(&self, name: impl Into<String>, factory: Box<dyn DnsBackendFactory>) {
        let name = name.into();
        debug!("Registering DNS backend type {}", name);
        let mut backends = self.backends.write().unwrap_or_else(PoisonError::into_inner);
        backends.insert(name, factory);
    }

    /// Create a DNS backend from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn DnsBackend>)`: Created backend instance
    /// - `Err(Error)`: If the backend type is not registered or creation fails
    pub fn create_backend(&self, config: &BackendConfig) -> Result<Box<dyn DnsBackend>> {
        let backend_type = config.type_name();
        let backends = self.backends.read().unwrap_or_else(PoisonError::into_inner);

        let factory = backends
            .get(backend_type)
            .ok_or_else(|| Error::config(format!("Unknown backend type: {}", backend_type)))?;

        factory.create(config)
    }

    /// List all registered backend types, sorted
    pub fn list_backends(&self) -> Vec<String> {
        let backends = self.backends.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a backend type is registered
    pub fn has_backend(&self, name: &str) -> bool {
        let backends = self.backends.read().unwrap_or_else(PoisonError::into_inner);
        backends.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockBackendFactory;

    impl DnsBackendFactory for MockBackendFactory {
        fn create(&self, _config: &BackendConfig) -> Result<Box<dyn DnsBackend>> {
            Err(Error::config("Mock backend not implemented"))
        }
    }

    #[test]
    fn test_registry_registration() {
        let registry = BackendRegistry::new();

        assert!(!registry.has_backend("mock"));
        registry.register_backend("mock", Box::new(MockBackendFactory));

        assert!(registry.has_backend("mock"));
        assert!(registry.list_backends().contains(&"mock".to_string()));
    }

    #[test]
    fn test_builtin_memory_backend() {
        let registry = BackendRegistry::with_builtin();
        let backend = registry
            .create_backend(&BackendConfig::Memory {
                zones: vec!["example.com".to_string()],
            })
            .unwrap();
        assert_eq!(backend.backend_name(), "memory");
    }

    #[test]
    fn test_unknown_backend_type() {
        let registry = BackendRegistry::with_builtin();
        let config = BackendConfig::Cloudflare {
            api_token: "token".to_string(),
            zone_id: None,
        };
        let err = registry.create_backend(&config).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }
}
