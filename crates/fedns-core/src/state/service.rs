// # Service State Cache
//
// Last observed endpoint contribution of every cluster, per federated
// service.
//
// ## Locking
//
// The outer map is only locked long enough to find or insert an entry.
// Each service then has its own mutex, so updates for different services
// never contend while updates for the same service serialize. The engine
// keeps the per-service guard across planning and reconciliation so a
// later observation is never published before an earlier one.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info};

use crate::naming::ServiceKey;

/// A federated service as observed upstream
///
/// `endpoints` is the decoded `cluster -> addresses` mapping attached to
/// the service object. A cluster absent from the map contributes nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederatedService {
    /// Service identity
    pub key: ServiceKey,
    /// Whether deletion of the service has been requested
    #[serde(default)]
    pub deletion_requested: bool,
    /// Healthy load-balancer addresses per cluster
    #[serde(default)]
    pub endpoints: BTreeMap<String, Vec<String>>,
}

impl FederatedService {
    /// Create a service with no endpoints
    pub fn new(key: ServiceKey) -> Self {
        Self {
            key,
            deletion_requested: false,
            endpoints: BTreeMap::new(),
        }
    }

    /// Add addresses for a cluster
    pub fn with_endpoints<I, A>(mut self, cluster_name: impl Into<String>, addresses: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.endpoints
            .entry(cluster_name.into())
            .or_default()
            .extend(addresses.into_iter().map(Into::into));
        self
    }

    /// Set the deletion flag
    pub fn with_deletion_requested(mut self, deletion_requested: bool) -> Self {
        self.deletion_requested = deletion_requested;
        self
    }

    /// Addresses a cluster currently offers (empty when absent)
    pub fn endpoints_for(&self, cluster_name: &str) -> Vec<String> {
        self.endpoints.get(cluster_name).cloned().unwrap_or_default()
    }
}

/// One cluster's contribution to a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    /// Sorted, deduplicated, non-empty address literals
    pub addresses: Vec<String>,
    /// When this contribution was recorded
    pub observed_at: DateTime<Utc>,
}

impl Contribution {
    /// Normalize raw addresses into a contribution
    ///
    /// Blank entries (load balancers that only report a hostname) are
    /// dropped.
    pub fn new(addresses: impl IntoIterator<Item = String>) -> Self {
        let mut addresses: Vec<String> = addresses
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        addresses.sort();
        addresses.dedup();

        Self {
            addresses,
            observed_at: Utc::now(),
        }
    }

    /// Whether the cluster has no healthy endpoint
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

/// Cached state of one federated service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederatedServiceRecord {
    /// Service identity
    pub key: ServiceKey,
    /// Whether deletion of the service has been requested
    pub deletion_requested: bool,
    /// Contribution per cluster name
    pub contributions: BTreeMap<String, Contribution>,
}

impl FederatedServiceRecord {
    /// Create an empty record
    pub fn new(key: ServiceKey) -> Self {
        Self {
            key,
            deletion_requested: false,
            contributions: BTreeMap::new(),
        }
    }

    /// Replace one cluster's contribution
    ///
    /// The new value is authoritative for that cluster; other clusters are
    /// left untouched.
    pub fn set_contribution(
        &mut self,
        cluster_name: impl Into<String>,
        addresses: impl IntoIterator<Item = String>,
    ) {
        let cluster_name = cluster_name.into();
        let contribution = Contribution::new(addresses);
        debug!(
            "Service {} cluster {} contributes {:?}",
            self.key, cluster_name, contribution.addresses
        );
        self.contributions.insert(cluster_name, contribution);
    }

    /// Addresses per cluster, as consumed by the planner
    pub fn addresses_by_cluster(&self) -> BTreeMap<String, Vec<String>> {
        self.contributions
            .iter()
            .map(|(cluster, c)| (cluster.clone(), c.addresses.clone()))
            .collect()
    }

    /// Cluster whose contribution was observed longest ago, and its age at `now`
    pub fn stalest_contribution(&self, now: DateTime<Utc>) -> Option<(&str, Duration)> {
        self.contributions
            .iter()
            .min_by_key(|(_, c)| c.observed_at)
            .map(|(cluster, c)| (cluster.as_str(), now.signed_duration_since(c.observed_at)))
    }
}

/// Exclusive access to one service's cached record
pub type ServiceGuard = OwnedMutexGuard<FederatedServiceRecord>;

/// Thread-safe per-service state cache
#[derive(Debug, Default)]
pub struct ServiceStateCache {
    services: RwLock<HashMap<ServiceKey, Arc<Mutex<FederatedServiceRecord>>>>,
}

impl ServiceStateCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock a service's record, creating it on first use
    pub async fn lock(&self, key: &ServiceKey) -> ServiceGuard {
        let existing = self.services.read().await.get(key).cloned();
        let entry = match existing {
            Some(entry) => entry,
            None => {
                let mut services = self.services.write().await;
                services
                    .entry(key.clone())
                    .or_insert_with(|| {
                        info!("Tracking new federated service {}", key);
                        Arc::new(Mutex::new(FederatedServiceRecord::new(key.clone())))
                    })
                    .clone()
            }
        };
        entry.lock_owned().await
    }

    /// Lock a service's record only if it is cached
    pub async fn lock_existing(&self, key: &ServiceKey) -> Option<ServiceGuard> {
        let entry = self.services.read().await.get(key).cloned()?;
        Some(entry.lock_owned().await)
    }

    /// Replace one cluster's contribution and return a snapshot of the record
    pub async fn update_contribution(
        &self,
        key: &ServiceKey,
        cluster_name: &str,
        addresses: impl IntoIterator<Item = String>,
    ) -> FederatedServiceRecord {
        let mut guard = self.lock(key).await;
        guard.set_contribution(cluster_name, addresses);
        guard.clone()
    }

    /// Flag a service for deletion
    ///
    /// Returns `false` if the service is not cached.
    pub async fn mark_deleted(&self, key: &ServiceKey) -> bool {
        match self.lock_existing(key).await {
            Some(mut guard) => {
                info!("Service {} marked for deletion", key);
                guard.deletion_requested = true;
                true
            }
            None => false,
        }
    }

    /// Evict a service, returning its last state
    pub async fn forget(&self, key: &ServiceKey) -> Option<FederatedServiceRecord> {
        let entry = self.services.write().await.remove(key)?;
        info!("Forgetting federated service {}", key);
        let record = entry.lock().await.clone();
        Some(record)
    }

    /// Copy of a service's current record
    pub async fn snapshot(&self, key: &ServiceKey) -> Option<FederatedServiceRecord> {
        let guard = self.lock_existing(key).await?;
        Some(guard.clone())
    }

    /// Keys of every cached service, sorted
    pub async fn service_keys(&self) -> Vec<ServiceKey> {
        let mut keys: Vec<ServiceKey> = self.services.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of cached services
    pub async fn len(&self) -> usize {
        self.services.read().await.len()
    }

    /// Whether the cache is empty
    pub async fn is_empty(&self) -> bool {
        self.services.read().await.is_empty()
    }
}
