// # State Caches
//
// In-memory state the engine plans from: cluster placement and the last
// observed per-cluster contribution of each federated service.

pub mod service;
pub mod topology;

pub use service::{
    Contribution, FederatedService, FederatedServiceRecord, ServiceGuard, ServiceStateCache,
};
pub use topology::{ClusterTopology, TopologyCache, TopologySnapshot};
