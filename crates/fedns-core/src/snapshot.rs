// # Federation Snapshot
//
// A file-based description of federation membership and observed
// service endpoints, for driving the engine without an upstream watch.
//
// ## File Format
//
// ```json
// {
//   "clusters": [
//     { "cluster_name": "c1", "region": "us-east1", "zones": ["us-east1-b"] }
//   ],
//   "services": [
//     {
//       "key": { "namespace": "default", "name": "nginx" },
//       "deletion_requested": false,
//       "endpoints": { "c1": ["198.51.100.1"] }
//     }
//   ]
// }
// ```

use std::path::Path;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::error::{Error, Result};
use crate::state::{ClusterTopology, FederatedService};

/// Federation membership plus the services to publish
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationSnapshot {
    /// Cluster placement
    #[serde(default)]
    pub clusters: Vec<ClusterTopology>,
    /// Services and their per-cluster endpoints
    #[serde(default)]
    pub services: Vec<FederatedService>,
}

impl FederationSnapshot {
    /// Parse and validate a snapshot from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        let snapshot: FederationSnapshot = serde_json::from_str(text)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Load a snapshot file
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).await.map_err(|e| {
            Error::config(format!(
                "Failed to read snapshot {}: {}",
                path.display(),
                e
            ))
        })?;

        let snapshot = Self::from_json(&text)?;
        debug!(
            "Loaded snapshot {}: {} cluster(s), {} service(s)",
            path.display(),
            snapshot.clusters.len(),
            snapshot.services.len()
        );
        Ok(snapshot)
    }

    /// Check every cluster entry and reject duplicate clusters or services
    pub fn validate(&self) -> Result<()> {
        let mut seen_clusters = std::collections::BTreeSet::new();
        for cluster in &self.clusters {
            cluster.validate()?;
            if !seen_clusters.insert(cluster.cluster_name.as_str()) {
                return Err(Error::invalid_input(format!(
                    "Cluster {} listed more than once",
                    cluster.cluster_name
                )));
            }
        }

        let mut seen_services = std::collections::BTreeSet::new();
        for service in &self.services {
            service.key.validate()?;
            if !seen_services.insert(&service.key) {
                return Err(Error::invalid_input(format!(
                    "Service {} listed more than once",
                    service.key
                )));
            }
        }
        Ok(())
    }
}
