//! DNS reconciler
//!
//! Converges a backend zone towards a [`RecordPlan`].
//!
//! ## Algorithm
//!
//! 1. List the zone's current record sets
//! 2. Keep only records owned by the service (see [`DnsNaming::owns`])
//! 3. Owned records with identical content to the plan are left alone
//! 4. Every other owned record is removed
//! 5. Every planned record not left alone is created
//!
//! Removals run before creations. A name switching between address and
//! alias, or an address record whose values changed, is therefore always
//! delete-then-create and never an in-place type change.
//!
//! ## Failure
//!
//! The first backend error aborts the pass and is returned. Nothing is
//! rolled back; the next pass re-lists and converges from whatever state
//! the zone is in.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::naming::{DnsNaming, ServiceKey};
use crate::planner::RecordPlan;
use crate::traits::dns_backend::trim_root;
use crate::traits::{DnsBackend, ResourceRecord, ZoneHandle, dns_key};

/// Changes needed to converge a zone
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Owned records that must go
    pub to_remove: Vec<ResourceRecord>,
    /// Planned records that must be created
    pub to_create: Vec<ResourceRecord>,
    /// Planned records already present
    pub unchanged: Vec<ResourceRecord>,
}

impl ChangeSet {
    /// Compute the changes between `current` and `desired`
    ///
    /// Records for which `owned` returns `false` are ignored entirely.
    pub fn compute(
        current: &[ResourceRecord],
        desired: &RecordPlan,
        owned: impl Fn(&str) -> bool,
    ) -> Self {
        let mut changes = ChangeSet::default();
        let mut satisfied: BTreeSet<String> = BTreeSet::new();

        for record in current.iter().filter(|r| owned(&r.name)) {
            let name = dns_key(&record.name);
            match desired.get(&name) {
                Some(wanted) if wanted.same_content(record) && !satisfied.contains(&name) => {
                    satisfied.insert(name);
                    changes.unchanged.push(record.clone());
                }
                _ => changes.to_remove.push(record.clone()),
            }
        }

        changes.to_create = desired
            .iter()
            .filter(|r| !satisfied.contains(&dns_key(&r.name)))
            .cloned()
            .collect();

        changes
    }

    /// Whether the zone is already converged
    pub fn is_empty(&self) -> bool {
        self.to_remove.is_empty() && self.to_create.is_empty()
    }
}

/// Result of a successful reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Records created, in application order
    pub created: Vec<ResourceRecord>,
    /// Records removed, in application order
    pub removed: Vec<ResourceRecord>,
    /// Number of planned records that were already correct
    pub unchanged: usize,
}

impl ReconcileOutcome {
    /// Whether the pass changed nothing
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.removed.is_empty()
    }
}

/// Applies record plans to a DNS backend
#[derive(Clone)]
pub struct Reconciler {
    backend: Arc<dyn DnsBackend>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("backend", &self.backend.backend_name())
            .finish()
    }
}

impl Reconciler {
    /// Create a reconciler over a backend
    pub fn new(backend: Arc<dyn DnsBackend>) -> Self {
        Self { backend }
    }

    /// Backend this reconciler writes to
    pub fn backend(&self) -> &Arc<dyn DnsBackend> {
        &self.backend
    }

    /// Find the hosted zone called `zone_name`
    ///
    /// Fails with [`Error::ZoneNotFound`] if the backend does not host it.
    pub async fn find_zone(&self, zone_name: &str) -> Result<ZoneHandle> {
        let wanted = trim_root(zone_name);
        self.backend
            .list_zones()
            .await?
            .into_iter()
            .find(|zone| trim_root(&zone.name).eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::zone_not_found(zone_name))
    }

    /// Converge `zone` to `desired` for one service
    ///
    /// Only records whose names belong to `service` under `naming` are
    /// ever removed; unrelated records in the zone are left untouched.
    pub async fn reconcile(
        &self,
        zone: &ZoneHandle,
        naming: &DnsNaming,
        service: &ServiceKey,
        desired: &RecordPlan,
    ) -> Result<ReconcileOutcome> {
        if let Some(stray) = desired.iter().find(|r| !naming.owns(service, &r.name)) {
            return Err(Error::invalid_input(format!(
                "Planned record {} is outside the name space of {}",
                stray.name, service
            )));
        }

        let current = self.backend.list_records(zone).await?;
        let changes = ChangeSet::compute(&current, desired, |name| naming.owns(service, name));

        if changes.is_empty() {
            debug!(
                "Zone {} already converged for {} ({} record(s))",
                zone.name,
                service,
                changes.unchanged.len()
            );
            return Ok(ReconcileOutcome {
                unchanged: changes.unchanged.len(),
                ..Default::default()
            });
        }

        let mut outcome = ReconcileOutcome {
            unchanged: changes.unchanged.len(),
            ..Default::default()
        };

        for record in changes.to_remove {
            self.backend.remove_record(zone, &record).await?;
            info!("Removed record {} from zone {}", record, zone.name);
            outcome.removed.push(record);
        }

        for record in changes.to_create {
            self.backend.create_record(zone, &record).await?;
            info!("Created record {} in zone {}", record, zone.name);
            outcome.created.push(record);
        }

        Ok(outcome)
    }
}
