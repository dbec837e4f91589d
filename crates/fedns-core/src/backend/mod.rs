// # DNS Backend Implementations
//
// Built-in implementations of the DnsBackend trait. Provider-specific
// backends live in their own crates.

pub mod memory;

pub use memory::{MemoryDnsBackend, MemoryDnsBackendFactory};
