//! Core traits for federated service DNS
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`DnsBackend`]: Read and mutate record sets of a hosted DNS zone

pub mod dns_backend;

pub use dns_backend::{
    DnsBackend, DnsBackendFactory, RECORD_TTL_SECS, RecordType, ResourceRecord, ZoneHandle, dns_key,
};
