//! Test doubles and common utilities for architecture contract tests
//!
//! This module provides backend wrappers that count and inject failures
//! around the in-memory backend, plus fixtures for the two-region
//! federation used across the contract tests.

#![allow(dead_code)]

use fedns_core::error::{Error, Result};
use fedns_core::traits::{DnsBackend, ResourceRecord, ZoneHandle};
use fedns_core::{
    ClusterTopology, EngineEvent, FederatedDnsEngine, FederatedService, FederationDnsConfig,
    MemoryDnsBackend, ServiceKey,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::mpsc;

pub const FEDERATION: &str = "myfederation";
pub const SUFFIX: &str = "federation.example.com";
pub const ZONE: &str = "example.com";

pub const C1: &str = "c1";
pub const C2: &str = "c2";
pub const C1_IP: &str = "198.51.100.1";
pub const C2_IP: &str = "198.51.200.1";

pub const GLOBAL: &str = "servicename.servicenamespace.myfederation.svc.federation.example.com";
pub const FOO_REGION: &str =
    "servicename.servicenamespace.myfederation.svc.fooregion.federation.example.com";
pub const FOO_ZONE: &str =
    "servicename.servicenamespace.myfederation.svc.foozone.fooregion.federation.example.com";
pub const BAR_REGION: &str =
    "servicename.servicenamespace.myfederation.svc.barregion.federation.example.com";
pub const BAR_ZONE: &str =
    "servicename.servicenamespace.myfederation.svc.barzone.barregion.federation.example.com";

/// A DnsBackend wrapper that counts mutating calls and can be told to fail
pub struct CountingBackend {
    inner: MemoryDnsBackend,
    create_call_count: Arc<AtomicUsize>,
    remove_call_count: Arc<AtomicUsize>,
    /// Fail every mutating call while set
    failing: Arc<AtomicBool>,
    /// Mutating calls allowed before failing (usize::MAX = never)
    fail_after: Arc<AtomicUsize>,
}

impl CountingBackend {
    pub fn new(inner: MemoryDnsBackend) -> Self {
        Self {
            inner,
            create_call_count: Arc::new(AtomicUsize::new(0)),
            remove_call_count: Arc::new(AtomicUsize::new(0)),
            failing: Arc::new(AtomicBool::new(false)),
            fail_after: Arc::new(AtomicUsize::new(usize::MAX)),
        }
    }

    /// Create a new CountingBackend that shares counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            inner: other.inner.clone(),
            create_call_count: Arc::clone(&other.create_call_count),
            remove_call_count: Arc::clone(&other.remove_call_count),
            failing: Arc::clone(&other.failing),
            fail_after: Arc::clone(&other.fail_after),
        }
    }

    /// Get the number of times create_record() was called
    pub fn create_call_count(&self) -> usize {
        self.create_call_count.load(Ordering::SeqCst)
    }

    /// Get the number of times remove_record() was called
    pub fn remove_call_count(&self) -> usize {
        self.remove_call_count.load(Ordering::SeqCst)
    }

    /// Make every following mutating call fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Allow `n` more mutating calls, then fail
    pub fn fail_after(&self, n: usize) {
        let done = self.create_call_count() + self.remove_call_count();
        self.fail_after.store(done + n, Ordering::SeqCst);
    }

    /// Stop injecting failures
    pub fn recover(&self) {
        self.failing.store(false, Ordering::SeqCst);
        self.fail_after.store(usize::MAX, Ordering::SeqCst);
    }

    pub fn memory(&self) -> &MemoryDnsBackend {
        &self.inner
    }

    fn check(&self, operation: &str) -> Result<()> {
        let done = self.create_call_count() + self.remove_call_count();
        if self.failing.load(Ordering::SeqCst) || done >= self.fail_after.load(Ordering::SeqCst) {
            return Err(Error::backend_operation(
                "counting",
                operation,
                "injected failure",
            ));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DnsBackend for CountingBackend {
    async fn list_zones(&self) -> Result<Vec<ZoneHandle>> {
        self.inner.list_zones().await
    }

    async fn list_records(&self, zone: &ZoneHandle) -> Result<Vec<ResourceRecord>> {
        self.inner.list_records(zone).await
    }

    async fn create_record(&self, zone: &ZoneHandle, record: &ResourceRecord) -> Result<()> {
        self.check("create")?;
        self.create_call_count.fetch_add(1, Ordering::SeqCst);
        self.inner.create_record(zone, record).await
    }

    async fn remove_record(&self, zone: &ZoneHandle, record: &ResourceRecord) -> Result<()> {
        self.check("remove")?;
        self.remove_call_count.fetch_add(1, Ordering::SeqCst);
        self.inner.remove_record(zone, record).await
    }

    fn backend_name(&self) -> &'static str {
        "counting"
    }
}

/// Letter case a [`CaseFoldingBackend`] reports names in
#[derive(Debug, Clone, Copy)]
pub enum ListedCase {
    Lower,
    Upper,
}

/// A DnsBackend that reports record names and alias targets in one letter
/// case on listing, the way some providers normalise what they return
pub struct CaseFoldingBackend {
    inner: CountingBackend,
    case: ListedCase,
}

impl CaseFoldingBackend {
    pub fn new(inner: CountingBackend, case: ListedCase) -> Self {
        Self { inner, case }
    }

    fn fold(&self, text: &str) -> String {
        match self.case {
            ListedCase::Lower => text.to_ascii_lowercase(),
            ListedCase::Upper => text.to_ascii_uppercase(),
        }
    }
}

#[async_trait::async_trait]
impl DnsBackend for CaseFoldingBackend {
    async fn list_zones(&self) -> Result<Vec<ZoneHandle>> {
        self.inner.list_zones().await
    }

    async fn list_records(&self, zone: &ZoneHandle) -> Result<Vec<ResourceRecord>> {
        let records = self.inner.list_records(zone).await?;
        Ok(records
            .into_iter()
            .map(|r| ResourceRecord {
                name: self.fold(&r.name),
                values: r.values.iter().map(|v| self.fold(v)).collect(),
                ..r
            })
            .collect())
    }

    async fn create_record(&self, zone: &ZoneHandle, record: &ResourceRecord) -> Result<()> {
        self.inner.create_record(zone, record).await
    }

    async fn remove_record(&self, zone: &ZoneHandle, record: &ResourceRecord) -> Result<()> {
        self.inner.remove_record(zone, record).await
    }

    fn backend_name(&self) -> &'static str {
        "case-folding"
    }
}

/// Configuration used by every contract test
pub fn minimal_config() -> FederationDnsConfig {
    FederationDnsConfig::new(FEDERATION, SUFFIX, ZONE)
}

/// Engine over a counting in-memory backend with c1 (fooregion/foozone)
/// and c2 (barregion/barzone) registered
pub async fn two_region_engine() -> (
    Arc<FederatedDnsEngine>,
    CountingBackend,
    mpsc::Receiver<EngineEvent>,
) {
    two_region_engine_with(minimal_config(), MemoryDnsBackend::with_zone(ZONE)).await
}

/// Same as [`two_region_engine`] with a custom configuration and backend
pub async fn two_region_engine_with(
    config: FederationDnsConfig,
    memory: MemoryDnsBackend,
) -> (
    Arc<FederatedDnsEngine>,
    CountingBackend,
    mpsc::Receiver<EngineEvent>,
) {
    let backend = CountingBackend::new(memory);
    let (engine, events) = FederatedDnsEngine::new(
        Arc::new(CountingBackend::sharing_counters_with(&backend)),
        config,
    )
    .expect("engine construction succeeds");

    engine
        .set_cluster_topology(ClusterTopology::new(C1, "fooregion", ["foozone"]).unwrap())
        .await
        .unwrap();
    engine
        .set_cluster_topology(ClusterTopology::new(C2, "barregion", ["barzone"]).unwrap())
        .await
        .unwrap();

    (Arc::new(engine), backend, events)
}

pub fn service_key() -> ServiceKey {
    ServiceKey::new("servicenamespace", "servicename")
}

/// The service with the given clusters' load balancers healthy
pub fn service_with(endpoints: &[(&str, &str)]) -> FederatedService {
    endpoints
        .iter()
        .fold(FederatedService::new(service_key()), |service, (cluster, ip)| {
            service.with_endpoints(*cluster, [*ip])
        })
}

/// Ensure records from c1 then c2
pub async fn ensure_from_both(engine: &FederatedDnsEngine, service: &FederatedService) {
    engine.ensure_records(C1, service).await.unwrap();
    engine.ensure_records(C2, service).await.unwrap();
}

/// Handle of the publishing zone
pub async fn zone_handle(backend: &CountingBackend) -> ZoneHandle {
    backend
        .list_zones()
        .await
        .unwrap()
        .into_iter()
        .find(|z| z.name == ZONE)
        .expect("publishing zone is hosted")
}

/// Zone contents rendered as "zone:name:TYPE:ttl:[values]", sorted
pub async fn dump(backend: &CountingBackend) -> Vec<String> {
    let mut lines: Vec<String> = backend
        .memory()
        .records_in(ZONE)
        .await
        .iter()
        .map(|r| format!("{}:{}", ZONE, r))
        .collect();
    lines.sort();
    lines
}

pub fn a(name: &str, values: &[&str]) -> String {
    format!("{}:{}:A:180:[{}]", ZONE, name, values.join(" "))
}

pub fn cname(name: &str, target: &str) -> String {
    format!("{}:{}:CNAME:180:[{}]", ZONE, name, target)
}

/// Every event currently queued
pub fn drain(events: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

pub fn sorted(mut lines: Vec<String>) -> Vec<String> {
    lines.sort();
    lines
}
