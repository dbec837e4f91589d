// # fedns-core
//
// Core library for publishing federated services in DNS.
//
// ## Architecture Overview
//
// A federated service runs in many member clusters, each placed in a
// region and one or more availability zones. This library keeps the DNS
// view of such a service in step with its healthy endpoints:
// - **DnsNaming**: The global/region/zone name family of a service
// - **TopologyCache / ServiceStateCache**: Cluster placement and per-cluster contributions
// - **Planner**: Pure computation of the desired record hierarchy
// - **Reconciler**: Converges a zone towards a plan through a DnsBackend
// - **FederatedDnsEngine**: Ties caches, planner and reconciler together
// - **BackendRegistry**: Plugin-based registry for DNS backends
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Planning never performs I/O
// 2. **Ownership**: Only names in a service's own family are ever removed
// 3. **Plugin-Based**: Backends are registered dynamically, no hard-coded if-else
// 4. **Library-First**: All core functionality can be used as a library
// 5. **Idempotency**: Re-running a converged pass changes nothing

pub mod traits;
pub mod engine;
pub mod registry;
pub mod config;
pub mod error;
pub mod state;
pub mod naming;
pub mod planner;
pub mod reconciler;
pub mod backend;
pub mod snapshot;

// Re-export core types for convenience
pub use traits::{DnsBackend, DnsBackendFactory, RecordType, ResourceRecord, ZoneHandle};
pub use engine::{EngineEvent, FederatedDnsEngine};
pub use registry::BackendRegistry;
pub use config::{BackendConfig, EngineConfig, FederationDnsConfig};
pub use error::{Error, Result};
pub use naming::{DnsNaming, ServiceKey};
pub use planner::{Planner, RecordPlan};
pub use reconciler::{ChangeSet, ReconcileOutcome, Reconciler};
pub use backend::MemoryDnsBackend;
pub use state::{ClusterTopology, FederatedService, ServiceStateCache, TopologyCache};
pub use snapshot::FederationSnapshot;
