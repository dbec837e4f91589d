// # Topology Cache
//
// Region and zone membership of every registered federation cluster.
//
// ## Consistency
//
// The membership map is copy-on-write: writers build a new map and swap
// it in under the write lock, readers clone the current `Arc`. A reader
// therefore always plans against one consistent generation of the
// topology, even if a cluster joins or leaves mid-reconciliation.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::naming::validate_label;

/// Placement of one federation member cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterTopology {
    /// Cluster name
    pub cluster_name: String,
    /// Region the cluster runs in
    pub region: String,
    /// Availability zones the cluster spans (at least one)
    pub zones: BTreeSet<String>,
}

impl ClusterTopology {
    /// Create a validated topology entry
    ///
    /// A cluster belongs to exactly one region and at least one zone.
    pub fn new<I, Z>(cluster_name: impl Into<String>, region: impl Into<String>, zones: I) -> Result<Self>
    where
        I: IntoIterator<Item = Z>,
        Z: Into<String>,
    {
        let entry = Self {
            cluster_name: cluster_name.into(),
            region: region.into(),
            zones: zones.into_iter().map(Into::into).collect(),
        };
        entry.validate()?;
        Ok(entry)
    }

    /// Check the entry invariants
    pub fn validate(&self) -> Result<()> {
        if self.cluster_name.is_empty() {
            return Err(Error::invalid_input("Cluster name cannot be empty"));
        }
        if self.region.is_empty() {
            return Err(Error::invalid_input(format!(
                "Cluster {} has no region",
                self.cluster_name
            )));
        }
        if self.zones.is_empty() {
            return Err(Error::invalid_input(format!(
                "Cluster {} must belong to at least one zone",
                self.cluster_name
            )));
        }

        // Region and zone each become exactly one label of a service name
        for label in std::iter::once(&self.region).chain(&self.zones) {
            validate_label(label).map_err(|e| {
                Error::invalid_input(format!(
                    "Cluster {} has an invalid region or zone: {}",
                    self.cluster_name, e
                ))
            })?;
        }
        Ok(())
    }
}

/// Immutable view of the topology at one point in time
#[derive(Debug, Clone, Default)]
pub struct TopologySnapshot {
    clusters: Arc<BTreeMap<String, ClusterTopology>>,
}

impl TopologySnapshot {
    /// Build a snapshot directly from entries
    pub fn from_entries(entries: impl IntoIterator<Item = ClusterTopology>) -> Self {
        Self {
            clusters: Arc::new(
                entries
                    .into_iter()
                    .map(|entry| (entry.cluster_name.clone(), entry))
                    .collect(),
            ),
        }
    }

    /// Look up one cluster
    pub fn get(&self, cluster_name: &str) -> Option<&ClusterTopology> {
        self.clusters.get(cluster_name)
    }

    /// Iterate over clusters in name order
    pub fn iter(&self) -> impl Iterator<Item = &ClusterTopology> {
        self.clusters.values()
    }

    /// Number of known clusters
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    /// Whether no cluster is known
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

/// Thread-safe cluster membership cache
///
/// # Example
///
/// ```rust,no_run
/// use fedns_core::state::{ClusterTopology, TopologyCache};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let cache = TopologyCache::new();
///     cache.set_topology(ClusterTopology::new("c1", "us-east1", ["us-east1-b"])?).await?;
///
///     let entry = cache.topology("c1").await?;
///     assert_eq!(entry.region, "us-east1");
///     Ok(())
/// }
/// ```
#[derive(Debug, Default)]
pub struct TopologyCache {
    inner: RwLock<TopologySnapshot>,
}

impl TopologyCache {
    /// Create an empty topology cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Region and zones of a cluster
    ///
    /// Fails with [`Error::UnknownCluster`] if the cluster was never registered.
    pub async fn topology(&self, cluster_name: &str) -> Result<ClusterTopology> {
        self.inner
            .read()
            .await
            .get(cluster_name)
            .cloned()
            .ok_or_else(|| Error::unknown_cluster(cluster_name))
    }

    /// Register a cluster or replace its placement
    pub async fn set_topology(&self, entry: ClusterTopology) -> Result<()> {
        entry.validate()?;

        let mut guard = self.inner.write().await;
        let mut clusters = guard.clusters.as_ref().clone();
        info!(
            "Cluster {} placed in region {} zones {:?}",
            entry.cluster_name, entry.region, entry.zones
        );
        clusters.insert(entry.cluster_name.clone(), entry);
        *guard = TopologySnapshot {
            clusters: Arc::new(clusters),
        };
        Ok(())
    }

    /// Deregister a cluster, returning its last placement
    pub async fn remove_cluster(&self, cluster_name: &str) -> Option<ClusterTopology> {
        let mut guard = self.inner.write().await;
        if !guard.clusters.contains_key(cluster_name) {
            debug!("Cluster {} not registered, nothing to remove", cluster_name);
            return None;
        }

        let mut clusters = guard.clusters.as_ref().clone();
        let removed = clusters.remove(cluster_name);
        *guard = TopologySnapshot {
            clusters: Arc::new(clusters),
        };
        info!("Cluster {} removed from topology", cluster_name);
        removed
    }

    /// Consistent view of the current membership
    pub async fn snapshot(&self) -> TopologySnapshot {
        self.inner.read().await.clone()
    }

    /// Number of registered clusters
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Whether no cluster is registered
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_invariants() {
        assert!(ClusterTopology::new("c1", "r1", ["z1"]).is_ok());
        assert!(ClusterTopology::new("c1", "", ["z1"]).is_err());
        assert!(ClusterTopology::new("c1", "r1", Vec::<String>::new()).is_err());
        assert!(ClusterTopology::new("", "r1", ["z1"]).is_err());
        assert!(ClusterTopology::new("c1", "r1", [""]).is_err());
    }

    #[test]
    fn test_region_and_zone_are_single_labels() {
        assert!(ClusterTopology::new("c1", "US-East1", ["us-east1-b"]).is_ok());
        assert!(ClusterTopology::new("c1", "eu.west", ["a"]).is_err());
        assert!(ClusterTopology::new("c1", "r1", ["z1.r1"]).is_err());
        assert!(ClusterTopology::new("c1", "r_1", ["z1"]).is_err());
        assert!(ClusterTopology::new("c1", "r1", ["-z1"]).is_err());
    }

    #[tokio::test]
    async fn test_set_topology_revalidates_deserialized_entries() {
        // Entries from a snapshot bypass the constructor
        let entry: ClusterTopology = serde_json::from_str(
            r#"{"cluster_name": "c2", "region": "z1.r1", "zones": ["q"]}"#,
        )
        .unwrap();

        let cache = TopologyCache::new();
        let err = cache.set_topology(entry).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_cluster() {
        let cache = TopologyCache::new();
        let err = cache.topology("missing").await.unwrap_err();
        assert!(matches!(err, Error::UnknownCluster(name) if name == "missing"));
    }

    #[tokio::test]
    async fn test_set_replace_remove() {
        let cache = TopologyCache::new();
        assert!(cache.is_empty().await);

        cache
            .set_topology(ClusterTopology::new("c1", "r1", ["z1"]).unwrap())
            .await
            .unwrap();
        cache
            .set_topology(ClusterTopology::new("c1", "r2", ["z2", "z3"]).unwrap())
            .await
            .unwrap();

        let entry = cache.topology("c1").await.unwrap();
        assert_eq!(entry.region, "r2");
        assert_eq!(entry.zones.len(), 2);
        assert_eq!(cache.len().await, 1);

        assert!(cache.remove_cluster("c1").await.is_some());
        assert!(cache.remove_cluster("c1").await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_snapshot_is_stable_across_writes() {
        let cache = TopologyCache::new();
        cache
            .set_topology(ClusterTopology::new("c1", "r1", ["z1"]).unwrap())
            .await
            .unwrap();

        let before = cache.snapshot().await;
        cache.remove_cluster("c1").await;
        cache
            .set_topology(ClusterTopology::new("c2", "r2", ["z2"]).unwrap())
            .await
            .unwrap();

        assert!(before.get("c1").is_some());
        assert!(before.get("c2").is_none());
        assert_eq!(cache.snapshot().await.len(), 1);
    }
}
