//! Record hierarchy planner
//!
//! Computes the complete set of DNS records a federated service should
//! have, from its per-cluster contributions and the cluster topology.
//! Planning is pure: no I/O, and identical inputs always produce an
//! identical [`RecordPlan`].
//!
//! ## Hierarchy
//!
//! ```text
//!   zone name    A [zone union]    or  CNAME -> region name
//!       │
//!   region name  A [region union]  or  CNAME -> global name
//!       │
//!   global name  A [all addresses] or  (no record)
//! ```
//!
//! A zone or region without a healthy endpoint aliases one level up, so
//! clients fall back to the nearest scope that has one. When no cluster
//! has an endpoint the global record is omitted and the aliases dangle
//! until some cluster contributes again.

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::naming::{DnsNaming, ServiceKey};
use crate::state::{FederatedServiceRecord, TopologySnapshot};
use crate::traits::{RecordType, ResourceRecord, dns_key};

/// Desired records of one service, keyed by name
///
/// Keying by name makes it impossible to plan an address record and an
/// alias record for the same name. Keys are canonical ([`dns_key`]), so
/// names differing only in letter case are the same name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPlan {
    records: BTreeMap<String, ResourceRecord>,
}

impl RecordPlan {
    /// Create an empty plan
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record, replacing any record planned at the same name
    pub fn insert(&mut self, record: ResourceRecord) -> Option<ResourceRecord> {
        self.records.insert(dns_key(&record.name), record)
    }

    /// Record planned at `name`
    pub fn get(&self, name: &str) -> Option<&ResourceRecord> {
        self.records.get(&dns_key(name))
    }

    /// Iterate over planned records in name order
    pub fn iter(&self) -> impl Iterator<Item = &ResourceRecord> {
        self.records.values()
    }

    /// Number of planned records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing is planned
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of planned records of a given type
    pub fn count_of(&self, record_type: RecordType) -> usize {
        self.records
            .values()
            .filter(|r| r.record_type == record_type)
            .count()
    }
}

impl FromIterator<ResourceRecord> for RecordPlan {
    fn from_iter<T: IntoIterator<Item = ResourceRecord>>(iter: T) -> Self {
        let mut plan = RecordPlan::new();
        for record in iter {
            plan.insert(record);
        }
        plan
    }
}

/// Plans the zone / region / global record hierarchy
#[derive(Debug, Clone)]
pub struct Planner {
    naming: DnsNaming,
    retract_on_delete: bool,
}

impl Planner {
    /// Create a planner for a naming scheme
    pub fn new(naming: DnsNaming) -> Self {
        Self {
            naming,
            retract_on_delete: false,
        }
    }

    /// Plan no records at all for services pending deletion
    ///
    /// Off by default: a deleted service keeps its alias chain, matching
    /// the long-standing published behaviour.
    pub fn with_retract_on_delete(mut self, retract_on_delete: bool) -> Self {
        self.retract_on_delete = retract_on_delete;
        self
    }

    /// Naming scheme used by this planner
    pub fn naming(&self) -> &DnsNaming {
        &self.naming
    }

    /// Plan from a cached service record
    pub fn plan_record(
        &self,
        record: &FederatedServiceRecord,
        topology: &TopologySnapshot,
    ) -> RecordPlan {
        self.plan(
            &record.key,
            &record.addresses_by_cluster(),
            record.deletion_requested,
            topology,
        )
    }

    /// Plan the records of `service`
    ///
    /// `contributions` maps cluster names to their current addresses. A
    /// service with `deletion_requested` is planned as if every
    /// contribution were empty.
    pub fn plan(
        &self,
        service: &ServiceKey,
        contributions: &BTreeMap<String, Vec<String>>,
        deletion_requested: bool,
        topology: &TopologySnapshot,
    ) -> RecordPlan {
        if deletion_requested && self.retract_on_delete {
            debug!("Service {} pending deletion, retracting all records", service);
            return RecordPlan::new();
        }

        let addresses_of = |cluster: &str| -> Vec<String> {
            if deletion_requested {
                return Vec::new();
            }
            contributions
                .get(cluster)
                .map(|values| {
                    values
                        .iter()
                        .map(|v| v.trim())
                        .filter(|v| !v.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        };

        // Zones are keyed by (region, zone): the same zone label in two
        // regions yields two distinct names.
        let mut zones: BTreeMap<(&str, &str), BTreeSet<String>> = BTreeMap::new();
        let mut regions: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();

        for cluster in topology.iter() {
            let addresses = addresses_of(&cluster.cluster_name);
            regions
                .entry(cluster.region.as_str())
                .or_default()
                .extend(addresses.iter().cloned());
            for zone in &cluster.zones {
                zones
                    .entry((cluster.region.as_str(), zone.as_str()))
                    .or_default()
                    .extend(addresses.iter().cloned());
            }
        }

        let mut global: BTreeSet<String> = BTreeSet::new();
        for cluster in contributions.keys() {
            let addresses = addresses_of(cluster);
            if topology.get(cluster).is_none() && !addresses.is_empty() {
                debug!(
                    "Cluster {} has no topology entry; its endpoints only reach the global record of {}",
                    cluster, service
                );
            }
            global.extend(addresses);
        }

        let global_name = self.naming.global_name(service);
        let mut plan = RecordPlan::new();

        for ((region, zone), addresses) in zones {
            let name = self.naming.zone_name(service, zone, region);
            plan.insert(if addresses.is_empty() {
                ResourceRecord::alias(name, self.naming.region_name(service, region))
            } else {
                ResourceRecord::address(name, addresses)
            });
        }

        for (region, addresses) in regions {
            let name = self.naming.region_name(service, region);
            plan.insert(if addresses.is_empty() {
                ResourceRecord::alias(name, global_name.clone())
            } else {
                ResourceRecord::address(name, addresses)
            });
        }

        if !global.is_empty() {
            plan.insert(ResourceRecord::address(global_name, global));
        }

        debug!(
            "Planned {} record(s) for {} ({} address, {} alias)",
            plan.len(),
            service,
            plan.count_of(RecordType::Address),
            plan.count_of(RecordType::Alias)
        );
        plan
    }
}
