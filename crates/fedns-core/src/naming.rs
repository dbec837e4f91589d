//! DNS naming scheme for federated services
//!
//! Every federated service owns a fixed family of names under the
//! federation's service DNS suffix:
//!
//! ```text
//! <service>.<namespace>.<federation>.svc.<suffix>                  global
//! <service>.<namespace>.<federation>.svc.<region>.<suffix>         region
//! <service>.<namespace>.<federation>.svc.<zone>.<region>.<suffix>  zone
//! ```
//!
//! The reconciler uses [`DnsNaming::owns`] to restrict deletions to this
//! family, so unrelated records in a shared zone are never touched.
//!
//! DNS names are case-insensitive. Every name built here is lowercase and
//! [`DnsNaming::owns`] ignores the case of the name it is given.

use crate::error::{Error, Result};
use crate::traits::dns_backend::dns_key;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of a federated service: namespace plus name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServiceKey {
    /// Namespace the service lives in
    pub namespace: String,
    /// Service name
    pub name: String,
}

impl ServiceKey {
    /// Create a service key
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Namespace and name must each be a single DNS label
    pub fn validate(&self) -> Result<()> {
        validate_label(&self.namespace)
            .and_then(|_| validate_label(&self.name))
            .map_err(|e| {
                Error::invalid_input(format!("Service {} cannot be named in DNS: {}", self, e))
            })
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for ServiceKey {
    type Err = Error;

    /// Parse the `namespace/name` form
    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((namespace, name))
                if !namespace.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self::new(namespace, name))
            }
            _ => Err(Error::invalid_input(format!(
                "Service key must be of the form namespace/name, got '{}'",
                s
            ))),
        }
    }
}

/// Check one DNS label (RFC 1035: 1-63 chars, alphanumeric and hyphen,
/// no leading or trailing hyphen)
pub fn validate_label(label: &str) -> Result<()> {
    if label.is_empty() {
        return Err(Error::invalid_input("DNS label cannot be empty"));
    }

    if label.len() > 63 {
        return Err(Error::invalid_input(format!(
            "DNS label too long: {} chars (max 63). Label: '{}'",
            label.len(),
            label
        )));
    }

    if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(Error::invalid_input(format!(
            "DNS label contains invalid characters. Label: '{}'. \
            Valid: alphanumeric and hyphen only.",
            label
        )));
    }

    if label.starts_with('-') || label.ends_with('-') {
        return Err(Error::invalid_input(format!(
            "DNS label cannot start or end with hyphen. Label: '{}'",
            label
        )));
    }

    Ok(())
}

/// Check a dotted domain name; a single trailing root dot is allowed
pub fn validate_domain_name(domain: &str) -> Result<()> {
    let domain = domain.strip_suffix('.').unwrap_or(domain);
    if domain.is_empty() {
        return Err(Error::invalid_input("Domain name cannot be empty"));
    }

    // Total length limit (RFC 1035: 253 chars max)
    if domain.len() > 253 {
        return Err(Error::invalid_input(format!(
            "Domain name too long: {} chars (max 253). Got: {}",
            domain.len(),
            domain
        )));
    }

    for label in domain.split('.') {
        validate_label(label)
            .map_err(|e| Error::invalid_input(format!("Invalid domain '{}': {}", domain, e)))?;
    }

    Ok(())
}

/// Builds and recognizes the DNS names of federated services
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsNaming {
    federation_name: String,
    service_dns_suffix: String,
}

impl DnsNaming {
    /// Create a naming scheme for a federation and service DNS suffix
    pub fn new(federation_name: impl Into<String>, service_dns_suffix: impl Into<String>) -> Self {
        Self {
            federation_name: federation_name.into().to_ascii_lowercase(),
            service_dns_suffix: dns_key(&service_dns_suffix.into()),
        }
    }

    /// Federation name embedded in every service name
    pub fn federation_name(&self) -> &str {
        &self.federation_name
    }

    /// Suffix every service name ends with
    pub fn service_dns_suffix(&self) -> &str {
        &self.service_dns_suffix
    }

    /// `<service>.<namespace>.<federation>.svc`
    fn service_prefix(&self, service: &ServiceKey) -> String {
        format!(
            "{}.{}.{}.svc",
            service.name, service.namespace, self.federation_name
        )
        .to_ascii_lowercase()
    }

    /// Global name of a service
    pub fn global_name(&self, service: &ServiceKey) -> String {
        format!("{}.{}", self.service_prefix(service), self.service_dns_suffix)
    }

    /// Region-level name of a service
    pub fn region_name(&self, service: &ServiceKey, region: &str) -> String {
        format!(
            "{}.{}.{}",
            self.service_prefix(service),
            region.to_ascii_lowercase(),
            self.service_dns_suffix
        )
    }

    /// Zone-level name of a service
    pub fn zone_name(&self, service: &ServiceKey, zone: &str, region: &str) -> String {
        format!(
            "{}.{}.{}.{}",
            self.service_prefix(service),
            zone.to_ascii_lowercase(),
            region.to_ascii_lowercase(),
            self.service_dns_suffix
        )
    }

    /// Whether `name` belongs to the name family of `service`
    ///
    /// Matches the global name and any name with exactly one (region) or
    /// two (zone, region) non-empty labels between the service prefix and
    /// the suffix. A trailing root dot and letter case are ignored.
    pub fn owns(&self, service: &ServiceKey, name: &str) -> bool {
        let name = dns_key(name);
        let prefix = self.service_prefix(service);

        let Some(rest) = name.strip_prefix(prefix.as_str()) else {
            return false;
        };
        let Some(rest) = rest.strip_prefix('.') else {
            return false;
        };
        if rest == self.service_dns_suffix {
            return true;
        }

        let Some(middle) = rest
            .strip_suffix(self.service_dns_suffix.as_str())
            .and_then(|m| m.strip_suffix('.'))
        else {
            return false;
        };

        let labels: Vec<&str> = middle.split('.').collect();
        (1..=2).contains(&labels.len()) && labels.iter().all(|l| !l.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naming() -> DnsNaming {
        DnsNaming::new("fed", "example.com")
    }

    #[test]
    fn test_names_are_bit_exact() {
        let svc = ServiceKey::new("ns1", "svc1");
        let n = naming();

        assert_eq!(n.global_name(&svc), "svc1.ns1.fed.svc.example.com");
        assert_eq!(n.region_name(&svc, "r1"), "svc1.ns1.fed.svc.r1.example.com");
        assert_eq!(n.zone_name(&svc, "z1", "r1"), "svc1.ns1.fed.svc.z1.r1.example.com");
    }

    #[test]
    fn test_suffix_root_dot_is_dropped() {
        let n = DnsNaming::new("fed", "example.com.");
        assert_eq!(n.service_dns_suffix(), "example.com");
    }

    #[test]
    fn test_owns_service_family_only() {
        let svc = ServiceKey::new("ns1", "svc1");
        let n = naming();

        assert!(n.owns(&svc, "svc1.ns1.fed.svc.example.com"));
        assert!(n.owns(&svc, "svc1.ns1.fed.svc.example.com."));
        assert!(n.owns(&svc, "svc1.ns1.fed.svc.r1.example.com"));
        assert!(n.owns(&svc, "svc1.ns1.fed.svc.z1.r1.example.com"));

        // Other services, other federations, unrelated names
        assert!(!n.owns(&svc, "svc2.ns1.fed.svc.example.com"));
        assert!(!n.owns(&svc, "svc1.ns1.other.svc.example.com"));
        assert!(!n.owns(&svc, "www.example.com"));
        assert!(!n.owns(&svc, "example.com"));

        // Too deep, or empty labels
        assert!(!n.owns(&svc, "svc1.ns1.fed.svc.a.z1.r1.example.com"));
        assert!(!n.owns(&svc, "svc1.ns1.fed.svc..example.com"));
    }

    #[test]
    fn test_names_are_lowercase_and_owned_in_any_case() {
        let svc = ServiceKey::new("Prod", "Web");
        let n = DnsNaming::new("Fed", "Example.COM.");

        let zone = n.zone_name(&svc, "US-East1-b", "US-East1");
        assert_eq!(zone, "web.prod.fed.svc.us-east1-b.us-east1.example.com");
        assert_eq!(n.global_name(&svc), "web.prod.fed.svc.example.com");

        assert!(n.owns(&svc, &zone));
        assert!(n.owns(&svc, "Web.Prod.Fed.svc.US-East1-b.US-East1.example.com."));
        assert!(n.owns(&svc, "WEB.PROD.FED.SVC.EXAMPLE.COM"));
    }

    #[test]
    fn test_label_validation() {
        assert!(validate_label("us-east1").is_ok());
        assert!(validate_label("US-East1").is_ok());
        assert!(validate_label("").is_err());
        assert!(validate_label("eu.west").is_err());
        assert!(validate_label("-east").is_err());
        assert!(validate_label("east-").is_err());
        assert!(validate_label("under_score").is_err());
        assert!(validate_label(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_domain_name_validation() {
        assert!(validate_domain_name("federation.example.com").is_ok());
        assert!(validate_domain_name("federation.example.com.").is_ok());
        assert!(validate_domain_name("").is_err());
        assert!(validate_domain_name("a..b").is_err());
        assert!(validate_domain_name("-bad.example.com").is_err());
        assert!(validate_domain_name("bad_label.example.com").is_err());
        assert!(validate_domain_name(&format!("{}.com", "a.".repeat(130))).is_err());
    }

    #[test]
    fn test_owns_rejects_prefix_collision() {
        let n = naming();
        let short = ServiceKey::new("ns", "svc");
        // "svc.ns.fed.svcx..." must not be claimed by "svc.ns.fed.svc"
        assert!(!n.owns(&short, "svc.ns.fed.svcx.example.com"));
    }

    #[test]
    fn test_service_key_parse() {
        let key: ServiceKey = "ns1/svc1".parse().unwrap();
        assert_eq!(key, ServiceKey::new("ns1", "svc1"));
        assert_eq!(key.to_string(), "ns1/svc1");

        assert!("svc1".parse::<ServiceKey>().is_err());
        assert!("/svc1".parse::<ServiceKey>().is_err());
        assert!("a/b/c".parse::<ServiceKey>().is_err());
    }

    #[test]
    fn test_service_key_labels() {
        assert!(ServiceKey::new("ns1", "svc1").validate().is_ok());
        assert!(ServiceKey::new("ns1", "svc.1").validate().is_err());
        assert!(ServiceKey::new("ns_1", "svc1").validate().is_err());
    }
}
