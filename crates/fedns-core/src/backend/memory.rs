// # Memory DNS Backend
//
// In-memory implementation of DnsBackend.
//
// ## Purpose
//
// Provides a fast, fully deterministic backend with the same record set
// rules as hosted DNS services:
//
// - one record set per (name, type), names compared case-insensitively
// - an alias may not coexist with any other record at the same name
// - removal must match the listed record set exactly
//
// ## When to Use
//
// - Tests
// - Dry runs of the daemon without provider credentials

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::BackendConfig;
use crate::traits::dns_backend::{dns_key, trim_root};
use crate::traits::{DnsBackend, DnsBackendFactory, ResourceRecord, ZoneHandle};
use crate::Error;

const BACKEND_NAME: &str = "memory";

#[derive(Debug)]
struct MemoryZone {
    handle: ZoneHandle,
    records: Vec<ResourceRecord>,
}

/// In-memory DNS backend
///
/// Clones share the same zones.
///
/// # Example
///
/// ```rust,no_run
/// use fedns_core::backend::MemoryDnsBackend;
/// use fedns_core::traits::{DnsBackend, ResourceRecord};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let backend = MemoryDnsBackend::with_zone("example.com");
///     let zone = backend.list_zones().await?.remove(0);
///
///     let record = ResourceRecord::address("www.example.com", vec!["192.0.2.1".to_string()]);
///     backend.create_record(&zone, &record).await?;
///
///     assert_eq!(backend.list_records(&zone).await?, vec![record]);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryDnsBackend {
    zones: Arc<RwLock<BTreeMap<String, MemoryZone>>>,
    next_zone_id: Arc<AtomicUsize>,
}

impl MemoryDnsBackend {
    /// Create a backend hosting no zones
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend hosting the given zones
    pub fn with_zones<I, S>(zone_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let backend = Self::new();
        let mut zones = BTreeMap::new();
        for name in zone_names {
            let handle = backend.allocate_handle(name.into());
            zones.insert(
                handle.id.clone(),
                MemoryZone {
                    handle,
                    records: Vec::new(),
                },
            );
        }
        Self {
            zones: Arc::new(RwLock::new(zones)),
            next_zone_id: backend.next_zone_id,
        }
    }

    /// Create a backend hosting a single zone
    pub fn with_zone(zone_name: impl Into<String>) -> Self {
        Self::with_zones([zone_name.into()])
    }

    fn allocate_handle(&self, name: String) -> ZoneHandle {
        let id = self.next_zone_id.fetch_add(1, Ordering::SeqCst) + 1;
        ZoneHandle::new(format!("zone-{}", id), trim_root(&name))
    }

    /// Add a hosted zone
    pub async fn add_zone(&self, zone_name: impl Into<String>) -> ZoneHandle {
        let handle = self.allocate_handle(zone_name.into());
        self.zones.write().await.insert(
            handle.id.clone(),
            MemoryZone {
                handle: handle.clone(),
                records: Vec::new(),
            },
        );
        handle
    }

    /// All records of the zone called `zone_name`, sorted
    pub async fn records_in(&self, zone_name: &str) -> Vec<ResourceRecord> {
        let zones = self.zones.read().await;
        let mut records: Vec<ResourceRecord> = zones
            .values()
            .filter(|z| z.handle.name == trim_root(zone_name))
            .flat_map(|z| z.records.iter().cloned())
            .collect();
        records.sort();
        records
    }

    fn missing_zone(zone: &ZoneHandle) -> Error {
        Error::zone_not_found(format!("{} ({})", zone.name, zone.id))
    }
}

#[async_trait]
impl DnsBackend for MemoryDnsBackend {
    async fn list_zones(&self) -> Result<Vec<ZoneHandle>, Error> {
        let zones = self.zones.read().await;
        Ok(zones.values().map(|z| z.handle.clone()).collect())
    }

    async fn list_records(&self, zone: &ZoneHandle) -> Result<Vec<ResourceRecord>, Error> {
        let zones = self.zones.read().await;
        let hosted = zones.get(&zone.id).ok_or_else(|| Self::missing_zone(zone))?;
        Ok(hosted.records.clone())
    }

    async fn create_record(&self, zone: &ZoneHandle, record: &ResourceRecord) -> Result<(), Error> {
        let mut zones = self.zones.write().await;
        let hosted = zones.get_mut(&zone.id).ok_or_else(|| Self::missing_zone(zone))?;

        let wanted = dns_key(&record.name);
        if let Some(existing) = hosted.records.iter().find(|r| dns_key(&r.name) == wanted) {
            return Err(Error::backend_operation(
                BACKEND_NAME,
                "create",
                format!(
                    "record set {} {} already exists at {}",
                    existing.record_type, existing.name, record.name
                ),
            ));
        }

        debug!("memory: create {} in {}", record, zone.name);
        hosted.records.push(record.clone());
        Ok(())
    }

    async fn remove_record(&self, zone: &ZoneHandle, record: &ResourceRecord) -> Result<(), Error> {
        let mut zones = self.zones.write().await;
        let hosted = zones.get_mut(&zone.id).ok_or_else(|| Self::missing_zone(zone))?;

        let position = hosted
            .records
            .iter()
            .position(|r| r.same_content(record))
            .ok_or_else(|| {
                Error::backend_operation(
                    BACKEND_NAME,
                    "remove",
                    format!("no record set matching {}", record),
                )
            })?;

        debug!("memory: remove {} from {}", record, zone.name);
        hosted.records.remove(position);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }
}

/// Factory for creating memory backends
pub struct MemoryDnsBackendFactory;

impl DnsBackendFactory for MemoryDnsBackendFactory {
    fn create(&self, config: &BackendConfig) -> Result<Box<dyn DnsBackend>, Error> {
        match config {
            BackendConfig::Memory { zones } => {
                Ok(Box::new(MemoryDnsBackend::with_zones(zones.iter().cloned())))
            }
            _ => Err(Error::config("Invalid config for memory backend")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> ResourceRecord {
        ResourceRecord::address(name, vec!["192.0.2.1".to_string()])
    }

    #[tokio::test]
    async fn test_zones_have_distinct_ids() {
        let backend = MemoryDnsBackend::with_zones(["example.com", "example.org"]);
        let extra = backend.add_zone("example.net.").await;

        let zones = backend.list_zones().await.unwrap();
        assert_eq!(zones.len(), 3);
        assert_eq!(extra.name, "example.net");
        assert!(zones.iter().all(|z| z.id.starts_with("zone-")));
    }

    #[tokio::test]
    async fn test_rejects_second_record_at_name() {
        let backend = MemoryDnsBackend::with_zone("example.com");
        let zone = backend.list_zones().await.unwrap().remove(0);

        backend.create_record(&zone, &record("a.example.com")).await.unwrap();
        let alias = ResourceRecord::alias("a.example.com", "b.example.com");
        let err = backend.create_record(&zone, &alias).await.unwrap_err();

        assert!(matches!(err, Error::BackendOperationFailed { .. }));
    }

    #[tokio::test]
    async fn test_names_differing_in_case_collide() {
        let backend = MemoryDnsBackend::with_zone("example.com");
        let zone = backend.list_zones().await.unwrap().remove(0);

        backend.create_record(&zone, &record("A.Example.com")).await.unwrap();
        assert!(backend.create_record(&zone, &record("a.example.com")).await.is_err());

        backend.remove_record(&zone, &record("a.example.com")).await.unwrap();
        assert!(backend.records_in("example.com").await.is_empty());
    }

    #[tokio::test]
    async fn test_remove_requires_match() {
        let backend = MemoryDnsBackend::with_zone("example.com");
        let zone = backend.list_zones().await.unwrap().remove(0);

        assert!(backend.remove_record(&zone, &record("a.example.com")).await.is_err());

        backend.create_record(&zone, &record("a.example.com")).await.unwrap();
        backend.remove_record(&zone, &record("a.example.com")).await.unwrap();
        assert!(backend.records_in("example.com").await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_zone_handle() {
        let backend = MemoryDnsBackend::with_zone("example.com");
        let bogus = ZoneHandle::new("zone-99", "example.com");

        let err = backend.list_records(&bogus).await.unwrap_err();
        assert!(matches!(err, Error::ZoneNotFound(_)));
    }

    #[test]
    fn test_factory() {
        let factory = MemoryDnsBackendFactory;
        let backend = factory
            .create(&BackendConfig::Memory {
                zones: vec!["example.com".to_string()],
            })
            .unwrap();
        assert_eq!(backend.backend_name(), "memory");

        let wrong = BackendConfig::Cloudflare {
            api_token: "t".to_string(),
            zone_id: None,
        };
        assert!(factory.create(&wrong).is_err());
    }
}
