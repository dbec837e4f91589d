// # DNS Backend Trait
//
// Defines the interface the reconciler uses to read and mutate the
// resource record sets of a hosted DNS zone.
//
// ## Implementations
//
// - In-memory: `fedns_core::backend::MemoryDnsBackend` (tests, dry runs)
// - Cloudflare: `fedns-provider-cloudflare` crate
//
// ## Usage
//
// ```rust,ignore
// use fedns_core::DnsBackend;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let backend = /* DnsBackend implementation */;
//
//     for zone in backend.list_zones().await? {
//         for record in backend.list_records(&zone).await? {
//             println!("{} {} {:?}", record.name, record.record_type, record.values);
//         }
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// TTL in seconds of every record the planner emits
pub const RECORD_TTL_SECS: u32 = 180;

/// Type of a published resource record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// Resolves directly to address literals (`A`)
    Address,
    /// Redirects resolution to another name (`CNAME`)
    Alias,
}

impl RecordType {
    /// DNS wire name of this record type
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Address => "A",
            RecordType::Alias => "CNAME",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resource record set: one name, one type, one or more values
///
/// Values are kept sorted and deduplicated so that two records with the
/// same content always compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Fully qualified name, without trailing root dot
    pub name: String,
    /// Address or alias
    pub record_type: RecordType,
    /// Time-to-live in seconds
    pub ttl: u32,
    /// Address literals, or the single alias target
    pub values: Vec<String>,
}

impl ResourceRecord {
    /// Create a record, normalizing the name and value order
    pub fn new(
        name: impl Into<String>,
        record_type: RecordType,
        ttl: u32,
        values: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut values: Vec<String> = values.into_iter().collect();
        values.sort();
        values.dedup();

        Self {
            name: trim_root(&name.into()).to_string(),
            record_type,
            ttl,
            values,
        }
    }

    /// Address record with the standard TTL
    pub fn address(name: impl Into<String>, values: impl IntoIterator<Item = String>) -> Self {
        Self::new(name, RecordType::Address, RECORD_TTL_SECS, values)
    }

    /// Alias record with the standard TTL
    pub fn alias(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RecordType::Alias, RECORD_TTL_SECS, [target.into()])
    }

    /// Whether `other` describes the same record set content
    ///
    /// Backends may report names with a trailing root dot, in any letter
    /// case, and values in any order; all three are ignored.
    pub fn same_content(&self, other: &ResourceRecord) -> bool {
        if self.record_type != other.record_type
            || self.ttl != other.ttl
            || dns_key(&self.name) != dns_key(&other.name)
        {
            return false;
        }

        let mut mine: Vec<String> = self.values.iter().map(|v| dns_key(v)).collect();
        let mut theirs: Vec<String> = other.values.iter().map(|v| dns_key(v)).collect();
        mine.sort_unstable();
        mine.dedup();
        theirs.sort_unstable();
        theirs.dedup();
        mine == theirs
    }
}

impl fmt::Display for ResourceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:[{}]",
            self.name,
            self.record_type,
            self.ttl,
            self.values.join(" ")
        )
    }
}

/// Handle to a hosted zone in a DNS backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ZoneHandle {
    /// Backend-specific zone identifier
    pub id: String,
    /// Zone apex name (e.g., "example.com")
    pub name: String,
}

impl ZoneHandle {
    /// Create a zone handle
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Strip a single trailing root dot from a DNS name
pub(crate) fn trim_root(name: &str) -> &str {
    name.strip_suffix('.').unwrap_or(name)
}

/// Canonical form of a DNS name for comparisons: no root dot, lowercase
pub fn dns_key(name: &str) -> String {
    trim_root(name).to_ascii_lowercase()
}

/// Trait for DNS backend implementations
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Contract
///
/// Backends are single-shot: one call, one remote operation (or a small
/// fixed sequence of them), success or an error. They never retry, never
/// cache zone contents between calls, and never decide which records
/// should exist. Retry is the caller's concern; re-running a whole
/// reconciliation is always safe.
///
/// Error mapping:
/// - unreachable backend, throttling, 5xx → [`crate::Error::BackendUnavailable`]
/// - rejected or failed mutation → [`crate::Error::BackendOperationFailed`]
/// - unknown zone → [`crate::Error::ZoneNotFound`]
#[async_trait]
pub trait DnsBackend: Send + Sync {
    /// List the hosted zones visible to this backend
    async fn list_zones(&self) -> Result<Vec<ZoneHandle>, crate::Error>;

    /// List every record set currently present in `zone`
    async fn list_records(&self, zone: &ZoneHandle) -> Result<Vec<ResourceRecord>, crate::Error>;

    /// Create a record set
    ///
    /// Fails if a record set of either type already exists at the name.
    async fn create_record(
        &self,
        zone: &ZoneHandle,
        record: &ResourceRecord,
    ) -> Result<(), crate::Error>;

    /// Remove a record set matching `record`'s name and type
    async fn remove_record(
        &self,
        zone: &ZoneHandle,
        record: &ResourceRecord,
    ) -> Result<(), crate::Error>;

    /// Get the backend name (for logging/debugging)
    fn backend_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS backends from configuration
pub trait DnsBackendFactory: Send + Sync {
    /// Create a DnsBackend instance from configuration
    fn create(
        &self,
        config: &crate::config::BackendConfig,
    ) -> Result<Box<dyn DnsBackend>, crate::Error>;
}
