//! Configuration types for federated service DNS
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};

use crate::naming::DnsNaming;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationDnsConfig {
    /// Federation name embedded in every service name (e.g., "myfederation")
    pub federation_name: String,

    /// Suffix of every service name (e.g., "federation.example.com")
    pub service_dns_suffix: String,

    /// Hosted zone the records are published into (e.g., "example.com")
    pub dns_zone_name: String,

    /// DNS backend configuration
    pub backend: BackendConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl FederationDnsConfig {
    /// Create a configuration with an in-memory backend for the zone
    pub fn new(
        federation_name: impl Into<String>,
        service_dns_suffix: impl Into<String>,
        dns_zone_name: impl Into<String>,
    ) -> Self {
        let dns_zone_name = dns_zone_name.into();
        Self {
            federation_name: federation_name.into(),
            service_dns_suffix: service_dns_suffix.into(),
            backend: BackendConfig::Memory {
                zones: vec![dns_zone_name.clone()],
            },
            dns_zone_name,
            engine: EngineConfig::default(),
        }
    }

    /// Set the backend configuration
    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    /// Set the engine configuration
    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    /// Naming scheme derived from this configuration
    pub fn naming(&self) -> DnsNaming {
        DnsNaming::new(&self.federation_name, &self.service_dns_suffix)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.federation_name.is_empty() {
            return Err(crate::Error::config("Federation name cannot be empty"));
        }
        if self.federation_name.contains('.') {
            return Err(crate::Error::config(format!(
                "Federation name must be a single DNS label, got '{}'",
                self.federation_name
            )));
        }
        if self.service_dns_suffix.trim_end_matches('.').is_empty() {
            return Err(crate::Error::config("Service DNS suffix cannot be empty"));
        }
        if self.dns_zone_name.trim_end_matches('.').is_empty() {
            return Err(crate::Error::config("DNS zone name cannot be empty"));
        }

        let suffix = self.service_dns_suffix.trim_end_matches('.').to_ascii_lowercase();
        let zone = self.dns_zone_name.trim_end_matches('.').to_ascii_lowercase();
        if suffix != zone && !suffix.ends_with(&format!(".{}", zone)) {
            return Err(crate::Error::config(format!(
                "Service DNS suffix '{}' is not inside DNS zone '{}'",
                self.service_dns_suffix, self.dns_zone_name
            )));
        }

        self.backend.validate()?;
        self.engine.validate()?;

        Ok(())
    }
}

/// DNS backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    /// In-memory backend (not persistent)
    Memory {
        /// Zones hosted by the backend
        #[serde(default)]
        zones: Vec<String>,
    },

    /// Cloudflare backend
    Cloudflare {
        /// Cloudflare API token
        api_token: String,
        /// Zone ID (optional, restricts listing to one zone)
        zone_id: Option<String>,
    },

    /// Custom backend
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl BackendConfig {
    /// Validate the backend configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            BackendConfig::Memory { .. } => Ok(()),
            BackendConfig::Cloudflare { api_token, .. } => {
                if api_token.is_empty() {
                    return Err(crate::Error::config("Cloudflare API token cannot be empty"));
                }
                Ok(())
            }
            BackendConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom backend factory cannot be empty",
                    ));
                }
                if config.is_null() {
                    return Err(crate::Error::config(
                        "Custom backend config cannot be null",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the backend type name
    pub fn type_name(&self) -> &str {
        match self {
            BackendConfig::Memory { .. } => "memory",
            BackendConfig::Cloudflare { .. } => "cloudflare",
            BackendConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Memory { zones: Vec::new() }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped (with a warning log).
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Remove every record of a service once its deletion is requested
    ///
    /// When false (the default) a deleted service keeps its zone and
    /// region alias records and only loses its address records.
    #[serde(default)]
    pub retract_on_delete: bool,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
            retract_on_delete: false,
        }
    }
}

fn default_event_channel_capacity() -> usize {
    1000
}
