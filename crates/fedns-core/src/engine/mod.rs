//! Federated DNS engine
//!
//! The FederatedDnsEngine is responsible for:
//! - Recording each cluster's observed contribution to a service
//! - Planning the service's full record hierarchy from cached state
//! - Reconciling the publishing zone towards that plan
//! - Reporting what happened on an event channel
//!
//! ## Architecture
//!
//! ```text
//!   ensure_records(cluster, service)
//!                 │
//!                 ▼
//!   ┌──────────────────────────┐      ┌───────────────┐
//!   │ ServiceStateCache        │      │ TopologyCache │
//!   │ (per-service lock held)  │      │ (snapshot)    │
//!   └──────────────────────────┘      └───────────────┘
//!                 │                           │
//!                 └────────────┬──────────────┘
//!                              ▼
//!                      ┌──────────────┐
//!                      │   Planner    │  pure
//!                      └──────────────┘
//!                              │ RecordPlan
//!                              ▼
//!                      ┌──────────────┐      ┌─────────────┐
//!                      │  Reconciler  │─────▶│ DnsBackend  │
//!                      └──────────────┘      └─────────────┘
//! ```
//!
//! ## Event Flow
//!
//! 1. Topology lookup for the triggering cluster (unknown → error, nothing cached)
//! 2. Cache update; the cache now reflects the request whatever happens next
//! 3. Full re-plan over every cluster known for the service
//! 4. Zone lookup and reconciliation
//! 5. Events emitted for each created/removed record and the final result
//!
//! There is no internal retry. Every failure is safe to retry by calling
//! `ensure_records` or `resync_service` again.

use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::FederationDnsConfig;
use crate::error::{Error, Result};
use crate::naming::ServiceKey;
use crate::planner::{Planner, RecordPlan};
use crate::reconciler::{ReconcileOutcome, Reconciler};
use crate::snapshot::FederationSnapshot;
use crate::state::{
    ClusterTopology, FederatedService, FederatedServiceRecord, ServiceStateCache, TopologyCache,
};
use crate::traits::{DnsBackend, RecordType};

/// Events emitted by the FederatedDnsEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Reconciliation of a service started
    ReconcileStarted {
        service: ServiceKey,
        /// Cluster whose observation triggered the pass (None for resyncs)
        cluster: Option<String>,
    },

    /// A record was created
    RecordCreated {
        service: ServiceKey,
        name: String,
        record_type: RecordType,
    },

    /// A record was removed
    RecordRemoved {
        service: ServiceKey,
        name: String,
        record_type: RecordType,
    },

    /// Reconciliation converged the zone
    ReconcileSucceeded {
        service: ServiceKey,
        created: usize,
        removed: usize,
        unchanged: usize,
    },

    /// Reconciliation failed
    ReconcileFailed {
        service: ServiceKey,
        error: String,
        retryable: bool,
    },

    /// A service was evicted from the cache
    ServiceForgotten {
        service: ServiceKey,
    },
}

/// Core federated DNS engine
///
/// ## Threading
///
/// All methods take `&self`; share the engine across tasks with an `Arc`.
/// Calls for different services run fully in parallel. Calls for the same
/// service are serialized from cache update through reconciliation.
pub struct FederatedDnsEngine {
    /// Cluster placement
    topology: TopologyCache,

    /// Per-service contributions
    services: ServiceStateCache,

    /// Record hierarchy planner
    planner: Planner,

    /// Backend reconciler
    reconciler: Reconciler,

    /// Hosted zone records are published into
    dns_zone_name: String,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl FederatedDnsEngine {
    /// Create a new engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        backend: Arc<dyn DnsBackend>,
        config: FederationDnsConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);
        if config.engine.retract_on_delete {
            info!("Records of deleted services will be fully retracted");
        }

        let engine = Self {
            topology: TopologyCache::new(),
            services: ServiceStateCache::new(),
            planner: Planner::new(config.naming())
                .with_retract_on_delete(config.engine.retract_on_delete),
            reconciler: Reconciler::new(backend),
            dns_zone_name: config.dns_zone_name,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Cluster topology cache
    pub fn topology(&self) -> &TopologyCache {
        &self.topology
    }

    /// Service state cache
    pub fn services(&self) -> &ServiceStateCache {
        &self.services
    }

    /// Planner used for every pass
    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    /// Register or move a cluster
    ///
    /// Callers are expected to follow up with `ensure_records` (or
    /// `resync_all`) for every affected service.
    pub async fn set_cluster_topology(&self, entry: ClusterTopology) -> Result<()> {
        self.topology.set_topology(entry).await
    }

    /// Deregister a cluster
    pub async fn remove_cluster(&self, cluster_name: &str) -> Option<ClusterTopology> {
        self.topology.remove_cluster(cluster_name).await
    }

    /// Publish records for `service` after a change observed in `cluster_name`
    ///
    /// Replaces the cluster's cached contribution with the addresses the
    /// service currently lists for it (none if absent), adopts the
    /// service's deletion flag, then plans and reconciles the whole
    /// service.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownCluster`]: the cluster has no topology entry; the
    ///   cache is left untouched
    /// - [`Error::ZoneNotFound`], backend errors: the cache keeps the new
    ///   contribution so a retry publishes the latest state
    pub async fn ensure_records(
        &self,
        cluster_name: &str,
        service: &FederatedService,
    ) -> Result<ReconcileOutcome> {
        service.key.validate()?;
        let placement = self.topology.topology(cluster_name).await?;
        debug!(
            "Ensuring records for {} from cluster {} (region {})",
            service.key, cluster_name, placement.region
        );

        let mut guard = self.services.lock(&service.key).await;
        guard.set_contribution(cluster_name, service.endpoints_for(cluster_name));
        if guard.deletion_requested != service.deletion_requested {
            info!(
                "Service {} deletion requested: {}",
                service.key, service.deletion_requested
            );
            guard.deletion_requested = service.deletion_requested;
        }
        let record = (*guard).clone();

        let result = self.publish(&record, Some(cluster_name)).await;
        drop(guard);
        result
    }

    /// Re-plan and reconcile a cached service without new observations
    pub async fn resync_service(&self, key: &ServiceKey) -> Result<ReconcileOutcome> {
        let guard = self
            .services
            .lock_existing(key)
            .await
            .ok_or_else(|| Error::invalid_input(format!("Service {} is not tracked", key)))?;
        let record = (*guard).clone();

        if let Some((cluster, age)) = record.stalest_contribution(Utc::now()) {
            debug!(
                "Resyncing {}; stalest contribution is from cluster {} ({}s old)",
                key,
                cluster,
                age.num_seconds()
            );
        }

        let result = self.publish(&record, None).await;
        drop(guard);
        result
    }

    /// Resync every cached service
    ///
    /// Failures do not stop the sweep; each service's result is returned.
    pub async fn resync_all(&self) -> Vec<(ServiceKey, Result<ReconcileOutcome>)> {
        let keys = self.services.service_keys().await;
        info!("Resyncing {} service(s)", keys.len());

        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            let result = self.resync_service(&key).await;
            results.push((key, result));
        }
        results
    }

    /// Load a federation snapshot and publish every service in it
    ///
    /// The topology cache is replaced by the snapshot's clusters. Then
    /// `ensure_records` runs for every (service, cluster) pair, the way
    /// upstream watch events would trigger it. A failing pair does not
    /// stop the others; each service reports its merged outcome, or the
    /// last error it hit.
    ///
    /// Cached services the snapshot no longer lists are retired: published
    /// once more as deleted, then forgotten. A retirement that fails keeps
    /// the service cached so the next resync retries it.
    pub async fn apply_snapshot(
        &self,
        snapshot: &FederationSnapshot,
    ) -> Result<Vec<(ServiceKey, Result<ReconcileOutcome>)>> {
        snapshot.validate()?;

        let current = self.topology.snapshot().await;
        for stale in current
            .iter()
            .filter(|c| !snapshot.clusters.iter().any(|s| s.cluster_name == c.cluster_name))
        {
            self.topology.remove_cluster(&stale.cluster_name).await;
        }
        for cluster in &snapshot.clusters {
            self.topology.set_topology(cluster.clone()).await?;
        }

        let mut results = Vec::with_capacity(snapshot.services.len());
        for service in &snapshot.services {
            let mut merged: Result<ReconcileOutcome> = Ok(ReconcileOutcome::default());
            for cluster in &snapshot.clusters {
                match self.ensure_records(&cluster.cluster_name, service).await {
                    Ok(outcome) => {
                        if let Ok(total) = merged.as_mut() {
                            total.created.extend(outcome.created);
                            total.removed.extend(outcome.removed);
                            total.unchanged = outcome.unchanged;
                        }
                    }
                    Err(e) => merged = Err(e),
                }
            }
            results.push((service.key.clone(), merged));
        }

        let listed: BTreeSet<&ServiceKey> = snapshot.services.iter().map(|s| &s.key).collect();
        for key in self.services.service_keys().await {
            if listed.contains(&key) {
                continue;
            }
            info!("Service {} is no longer in the snapshot, retiring it", key);
            let result = self.retire_service(&key).await;
            results.push((key, result));
        }
        Ok(results)
    }

    /// Publish a cached service as deleted, then evict it
    async fn retire_service(&self, key: &ServiceKey) -> Result<ReconcileOutcome> {
        let Some(mut guard) = self.services.lock_existing(key).await else {
            return Ok(ReconcileOutcome::default());
        };
        guard.deletion_requested = true;
        let record = (*guard).clone();

        let result = self.publish(&record, None).await;
        drop(guard);

        if result.is_ok() {
            self.forget_service(key).await;
        }
        result
    }

    /// Flag a cached service as pending deletion
    ///
    /// Takes effect on DNS at the next `resync_service` or `ensure_records`.
    pub async fn mark_deleted(&self, key: &ServiceKey) -> bool {
        self.services.mark_deleted(key).await
    }

    /// Evict a service from the cache without touching DNS
    pub async fn forget_service(&self, key: &ServiceKey) -> Option<FederatedServiceRecord> {
        let forgotten = self.services.forget(key).await;
        if forgotten.is_some() {
            self.emit_event(EngineEvent::ServiceForgotten {
                service: key.clone(),
            });
        }
        forgotten
    }

    /// Plan a cached service without reconciling
    pub async fn plan_service(&self, key: &ServiceKey) -> Option<RecordPlan> {
        let record = self.services.snapshot(key).await?;
        let topology = self.topology.snapshot().await;
        Some(self.planner.plan_record(&record, &topology))
    }

    /// Plan and reconcile one service record
    async fn publish(
        &self,
        record: &FederatedServiceRecord,
        cluster: Option<&str>,
    ) -> Result<ReconcileOutcome> {
        self.emit_event(EngineEvent::ReconcileStarted {
            service: record.key.clone(),
            cluster: cluster.map(str::to_string),
        });

        match self.converge(record).await {
            Ok(outcome) => {
                for created in &outcome.created {
                    self.emit_event(EngineEvent::RecordCreated {
                        service: record.key.clone(),
                        name: created.name.clone(),
                        record_type: created.record_type,
                    });
                }
                for removed in &outcome.removed {
                    self.emit_event(EngineEvent::RecordRemoved {
                        service: record.key.clone(),
                        name: removed.name.clone(),
                        record_type: removed.record_type,
                    });
                }

                if outcome.is_noop() {
                    debug!("Records for {} already up to date", record.key);
                } else {
                    info!(
                        "Reconciled {}: {} created, {} removed, {} unchanged",
                        record.key,
                        outcome.created.len(),
                        outcome.removed.len(),
                        outcome.unchanged
                    );
                }
                self.emit_event(EngineEvent::ReconcileSucceeded {
                    service: record.key.clone(),
                    created: outcome.created.len(),
                    removed: outcome.removed.len(),
                    unchanged: outcome.unchanged,
                });
                Ok(outcome)
            }
            Err(e) => {
                warn!("Failed to reconcile records for {}: {}", record.key, e);
                self.emit_event(EngineEvent::ReconcileFailed {
                    service: record.key.clone(),
                    error: e.to_string(),
                    retryable: e.is_retryable(),
                });
                Err(e)
            }
        }
    }

    async fn converge(&self, record: &FederatedServiceRecord) -> Result<ReconcileOutcome> {
        let topology = self.topology.snapshot().await;
        let plan = self.planner.plan_record(record, &topology);
        let zone = self.reconciler.find_zone(&self.dns_zone_name).await?;

        self.reconciler
            .reconcile(&zone, self.planner.naming(), &record.key, &plan)
            .await
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        // Send event, logging warning if channel is full (backpressure)
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}
