// # Cloudflare DNS Backend
//
// This crate provides a Cloudflare implementation of `DnsBackend` for
// publishing federated service records.
//
// ## Record Mapping
//
// Cloudflare stores one API record per value, while the engine works
// with record sets:
//
// - An address record set becomes one `A` (IPv4) or `AAAA` (IPv6) API
//   record per address
// - An alias record set becomes a single `CNAME` API record
// - Listing groups API records back into record sets by (name, type);
//   `A` and `AAAA` records at one name form a single address set
// - Other record types are ignored
//
// Creating and removing a record set is therefore several API calls. A
// failure partway is returned as-is; the next reconciliation re-lists
// and converges.
//
// ## Behaviour
//
// - HTTP timeout of 30 seconds
// - Status codes mapped to engine errors (401/403, 404, 409, 429, 5xx)
// - Dry-run mode performs every GET but skips POST and DELETE
// - No retry, no backoff, no caching, no background tasks
//
// ## Security Requirements
//
// - API token NEVER appears in logs or Debug output
// - Construction fails fast if the token is empty
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List Zones: GET `/zones`, GET `/zones/:zone_id`
// - List DNS Records: GET `/zones/:zone_id/dns_records`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Delete DNS Record: DELETE `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use fedns_core::config::BackendConfig;
use fedns_core::traits::{
    DnsBackend, DnsBackendFactory, RecordType, ResourceRecord, ZoneHandle, dns_key,
};
use fedns_core::{BackendRegistry, Error, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size for list requests
const PAGE_SIZE: u32 = 100;

const BACKEND_NAME: &str = "cloudflare";

/// Response envelope shared by every Cloudflare API v4 call
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    total_pages: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiZone {
    id: String,
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiRecord {
    id: String,
    #[serde(rename = "type")]
    record_type: String,
    name: String,
    content: String,
    #[serde(default)]
    ttl: u32,
}

impl<T> ApiEnvelope<T> {
    fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return "request was not successful".to_string();
        }
        self.errors
            .iter()
            .map(|e| format!("{} ({})", e.message, e.code))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// What a 404 means for the request being made
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NotFoundMeans {
    /// The zone itself is missing
    Zone,
    /// A record is missing
    Record,
}

/// Map a non-success HTTP status to an engine error
fn status_error(operation: &str, status: u16, body: &str, not_found: NotFoundMeans) -> Error {
    match status {
        401 | 403 => Error::backend_unavailable(
            BACKEND_NAME,
            format!(
                "Authentication failed: Invalid API token or insufficient permissions. Status: {}",
                status
            ),
        ),
        404 => match not_found {
            NotFoundMeans::Zone => Error::zone_not_found(format!("Cloudflare zone ({})", body)),
            NotFoundMeans::Record => {
                Error::backend_operation(BACKEND_NAME, operation, format!("Record not found: {}", body))
            }
        },
        409 => Error::backend_operation(
            BACKEND_NAME,
            operation,
            format!("Conflict: Record set changed concurrently. Status: {}", status),
        ),
        429 => Error::backend_unavailable(
            BACKEND_NAME,
            format!("Rate limit exceeded. Please retry later. Status: {}", status),
        ),
        500..=599 => Error::backend_unavailable(
            BACKEND_NAME,
            format!("Cloudflare server error (transient): {} - {}", status, body),
        ),
        _ => Error::backend_operation(
            BACKEND_NAME,
            operation,
            format!("HTTP {} - {}", status, body),
        ),
    }
}

/// Cloudflare API record type for an address literal
fn address_type(value: &str) -> Result<&'static str> {
    match value.parse::<IpAddr>() {
        Ok(IpAddr::V4(_)) => Ok("A"),
        Ok(IpAddr::V6(_)) => Ok("AAAA"),
        Err(_) => Err(Error::invalid_input(format!(
            "'{}' is not an IP address literal",
            value
        ))),
    }
}

/// Engine record type of a Cloudflare API record type
fn record_type_of(api_type: &str) -> Option<RecordType> {
    match api_type {
        "A" | "AAAA" => Some(RecordType::Address),
        "CNAME" => Some(RecordType::Alias),
        _ => None,
    }
}

/// Group API records into record sets
///
/// Names compare case-insensitively. The set's TTL is the smallest TTL
/// among its API records.
fn group_records(records: &[ApiRecord]) -> Vec<ResourceRecord> {
    let mut sets: BTreeMap<(String, RecordType), (u32, Vec<String>)> = BTreeMap::new();

    for record in records {
        let Some(record_type) = record_type_of(&record.record_type) else {
            continue;
        };
        let key = (dns_key(&record.name), record_type);
        let entry = sets.entry(key).or_insert((record.ttl, Vec::new()));
        entry.0 = entry.0.min(record.ttl);
        entry.1.push(record.content.clone());
    }

    sets.into_iter()
        .map(|((name, record_type), (ttl, values))| {
            ResourceRecord::new(name, record_type, ttl, values)
        })
        .collect()
}

/// API records making up `wanted`, or None if the zone's set differs
fn matching_records<'a>(
    candidates: &'a [ApiRecord],
    wanted: &ResourceRecord,
) -> Option<Vec<&'a ApiRecord>> {
    let selected: Vec<&ApiRecord> = candidates
        .iter()
        .filter(|r| dns_key(&r.name) == dns_key(&wanted.name))
        .filter(|r| record_type_of(&r.record_type) == Some(wanted.record_type))
        .collect();

    let listed = ResourceRecord::new(
        wanted.name.clone(),
        wanted.record_type,
        selected.iter().map(|r| r.ttl).min().unwrap_or(wanted.ttl),
        selected.iter().map(|r| r.content.clone()),
    );

    if selected.is_empty() || !listed.same_content(wanted) {
        return None;
    }
    Some(selected)
}

/// Cloudflare DNS backend
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the backend will:
/// - Perform all GET requests (zone and record listing)
/// - Log the intended POST/DELETE requests
/// - **NOT** actually modify DNS records
///
/// # Security
///
/// The Debug implementation does NOT expose the API token.
pub struct CloudflareBackend {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// Zone ID (optional, restricts the backend to one zone)
    zone_id: Option<String>,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Dry-run mode: if true, perform GET requests but skip mutations
    dry_run: bool,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareBackend")
            .field("api_token", &"<REDACTED>")
            .field("zone_id", &self.zone_id)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareBackend {
    /// Create a new Cloudflare backend
    ///
    /// # Parameters
    ///
    /// - `api_token`: Cloudflare API token with Zone:Read and DNS:Edit permissions
    /// - `zone_id`: Optional zone ID; when set, only that zone is listed
    /// - `dry_run`: If true, perform GET requests but skip mutations
    pub fn new(api_token: impl Into<String>, zone_id: Option<String>, dry_run: bool) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| {
                Error::backend_unavailable(BACKEND_NAME, format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            api_token,
            zone_id,
            client,
            dry_run,
        })
    }

    /// Create a backend in live mode
    pub fn new_live(api_token: impl Into<String>, zone_id: Option<String>) -> Result<Self> {
        Self::new(api_token, zone_id, false)
    }

    /// Create a backend in dry-run mode
    pub fn new_dry_run(api_token: impl Into<String>, zone_id: Option<String>) -> Result<Self> {
        Self::new(api_token, zone_id, true)
    }

    fn mode(&self) -> &'static str {
        if self.dry_run { "DRY-RUN" } else { "LIVE" }
    }

    /// Send a request and decode the API envelope
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        operation: &str,
        not_found: NotFoundMeans,
    ) -> Result<ApiEnvelope<T>> {
        let response = request
            .bearer_auth(&self.api_token)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| {
                Error::backend_unavailable(BACKEND_NAME, format!("HTTP request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(status_error(operation, status.as_u16(), &error_text, not_found));
        }

        let envelope: ApiEnvelope<T> = response.json().await.map_err(|e| {
            Error::backend_operation(BACKEND_NAME, operation, format!("Failed to parse response: {}", e))
        })?;

        if !envelope.success {
            return Err(Error::backend_operation(
                BACKEND_NAME,
                operation,
                envelope.error_summary(),
            ));
        }
        Ok(envelope)
    }

    /// GET every page of a list endpoint
    async fn get_all_pages<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        operation: &str,
        not_found: NotFoundMeans,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page: u32 = 1;

        loop {
            let page_str = page.to_string();
            let per_page = PAGE_SIZE.to_string();
            let request = self
                .client
                .get(url)
                .query(query)
                .query(&[("page", page_str.as_str()), ("per_page", per_page.as_str())]);

            let envelope: ApiEnvelope<Vec<T>> = self.send(request, operation, not_found).await?;
            let total_pages = envelope.result_info.as_ref().map_or(1, |i| i.total_pages);
            items.extend(envelope.result.unwrap_or_default());

            if page >= total_pages {
                break;
            }
            page += 1;
        }

        Ok(items)
    }

    /// API records of a zone, optionally filtered by name
    async fn api_records(&self, zone: &ZoneHandle, name: Option<&str>) -> Result<Vec<ApiRecord>> {
        let url = format!("{}/zones/{}/dns_records", CLOUDFLARE_API_BASE, zone.id);
        let query: Vec<(&str, &str)> = name.map(|n| ("name", n)).into_iter().collect();
        self.get_all_pages(&url, &query, "list", NotFoundMeans::Zone)
            .await
    }

    async fn post_record(&self, zone: &ZoneHandle, payload: serde_json::Value) -> Result<()> {
        let url = format!("{}/zones/{}/dns_records", CLOUDFLARE_API_BASE, zone.id);

        if self.dry_run {
            tracing::info!("[DRY-RUN] Would send POST request to {} with payload: {}", url, payload);
            return Ok(());
        }

        let _: ApiEnvelope<serde_json::Value> = self
            .send(self.client.post(&url).json(&payload), "create", NotFoundMeans::Zone)
            .await?;
        Ok(())
    }

    async fn delete_record(&self, zone: &ZoneHandle, record_id: &str) -> Result<()> {
        let url = format!(
            "{}/zones/{}/dns_records/{}",
            CLOUDFLARE_API_BASE, zone.id, record_id
        );

        if self.dry_run {
            tracing::info!("[DRY-RUN] Would send DELETE request to {}", url);
            return Ok(());
        }

        let _: ApiEnvelope<serde_json::Value> = self
            .send(self.client.delete(&url), "remove", NotFoundMeans::Record)
            .await?;
        Ok(())
    }
}

/// Payloads creating `record`, one per API record
fn create_payloads(record: &ResourceRecord) -> Result<Vec<serde_json::Value>> {
    record
        .values
        .iter()
        .map(|value| {
            let api_type = match record.record_type {
                RecordType::Address => address_type(value)?,
                RecordType::Alias => "CNAME",
            };
            Ok(serde_json::json!({
                "type": api_type,
                "name": record.name,
                "content": value,
                "ttl": record.ttl,
                "proxied": false,
            }))
        })
        .collect()
}

#[async_trait]
impl DnsBackend for CloudflareBackend {
    /// List hosted zones
    ///
    /// # API Calls
    ///
    /// ```http
    /// GET /zones/:zone_id      (zone ID configured)
    /// GET /zones?page=N        (otherwise)
    /// ```
    async fn list_zones(&self) -> Result<Vec<ZoneHandle>> {
        let zones: Vec<ApiZone> = match &self.zone_id {
            Some(zone_id) => {
                tracing::debug!("Using pre-configured zone ID");
                let url = format!("{}/zones/{}", CLOUDFLARE_API_BASE, zone_id);
                let envelope: ApiEnvelope<ApiZone> = self
                    .send(self.client.get(&url), "list", NotFoundMeans::Zone)
                    .await?;
                envelope.result.into_iter().collect()
            }
            None => {
                let url = format!("{}/zones", CLOUDFLARE_API_BASE);
                self.get_all_pages(&url, &[], "list", NotFoundMeans::Zone)
                    .await?
            }
        };

        tracing::debug!("Cloudflare hosts {} zone(s)", zones.len());
        Ok(zones
            .into_iter()
            .map(|z| ZoneHandle::new(z.id, z.name))
            .collect())
    }

    async fn list_records(&self, zone: &ZoneHandle) -> Result<Vec<ResourceRecord>> {
        let records = self.api_records(zone, None).await?;
        Ok(group_records(&records))
    }

    /// Create a record set, one POST per value
    async fn create_record(&self, zone: &ZoneHandle, record: &ResourceRecord) -> Result<()> {
        let payloads = create_payloads(record)?;

        tracing::info!(
            "Creating Cloudflare record set {} in {} [mode: {}]",
            record,
            zone.name,
            self.mode()
        );

        for payload in payloads {
            self.post_record(zone, payload).await?;
        }
        Ok(())
    }

    /// Remove a record set, one DELETE per API record
    ///
    /// The set currently listed at the name must match `record` exactly.
    async fn remove_record(&self, zone: &ZoneHandle, record: &ResourceRecord) -> Result<()> {
        let candidates = self.api_records(zone, Some(&record.name)).await?;
        let matching = matching_records(&candidates, record).ok_or_else(|| {
            Error::backend_operation(
                BACKEND_NAME,
                "remove",
                format!("no record set matching {}", record),
            )
        })?;

        tracing::info!(
            "Removing Cloudflare record set {} from {} [mode: {}]",
            record,
            zone.name,
            self.mode()
        );

        for api_record in matching {
            self.delete_record(zone, &api_record.id).await?;
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }
}

/// Factory for creating Cloudflare backends
pub struct CloudflareFactory;

impl DnsBackendFactory for CloudflareFactory {
    fn create(&self, config: &BackendConfig) -> Result<Box<dyn DnsBackend>> {
        match config {
            BackendConfig::Cloudflare { api_token, zone_id } => {
                if api_token.is_empty() {
                    return Err(Error::config("Cloudflare API token is required"));
                }

                // Check for dry-run mode environment variable
                let dry_run = std::env::var("FEDNS_MODE")
                    .unwrap_or_default()
                    .eq_ignore_ascii_case("dry-run");

                if dry_run {
                    tracing::warn!("Cloudflare backend running in DRY-RUN mode - no changes will be made");
                }

                Ok(Box::new(CloudflareBackend::new(
                    api_token.clone(),
                    zone_id.clone(),
                    dry_run,
                )?))
            }
            _ => Err(Error::config("Invalid config for Cloudflare backend")),
        }
    }
}

/// Register the Cloudflare backend with a registry
///
/// # Example
///
/// ```rust
/// use fedns_core::BackendRegistry;
///
/// let registry = BackendRegistry::with_builtin();
/// fedns_provider_cloudflare::register(&registry);
/// assert!(registry.has_backend("cloudflare"));
/// ```
pub fn register(registry: &BackendRegistry) {
    registry.register_backend(BACKEND_NAME, Box::new(CloudflareFactory));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_record(id: &str, record_type: &str, name: &str, content: &str) -> ApiRecord {
        ApiRecord {
            id: id.to_string(),
            record_type: record_type.to_string(),
            name: name.to_string(),
            content: content.to_string(),
            ttl: 180,
        }
    }

    #[test]
    fn test_factory_creation() {
        let factory = CloudflareFactory;

        let config = BackendConfig::Cloudflare {
            api_token: "test_token".to_string(),
            zone_id: Some("test_zone".to_string()),
        };

        let backend = factory.create(&config).unwrap();
        assert_eq!(backend.backend_name(), "cloudflare");
    }

    #[test]
    fn test_factory_missing_token() {
        let factory = CloudflareFactory;

        let config = BackendConfig::Cloudflare {
            api_token: "".to_string(),
            zone_id: None,
        };

        assert!(factory.create(&config).is_err());
        assert!(factory.create(&BackendConfig::Memory { zones: vec![] }).is_err());
    }

    #[test]
    fn test_empty_token_rejected() {
        let err = CloudflareBackend::new("", None, false).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_dry_run_mode() {
        let dry = CloudflareBackend::new_dry_run("token", None).unwrap();
        let live = CloudflareBackend::new_live("token", None).unwrap();

        assert!(dry.dry_run, "Dry-run backend should have dry_run=true");
        assert!(!live.dry_run, "Live backend should have dry_run=false");
    }

    #[test]
    fn test_api_token_not_exposed_in_debug() {
        let backend = CloudflareBackend::new("secret_token_12345", None, false).unwrap();

        let debug_str = format!("{:?}", backend);
        assert!(!debug_str.contains("secret_token"));
        assert!(debug_str.contains("CloudflareBackend"));
    }

    #[test]
    fn test_register() {
        let registry = BackendRegistry::with_builtin();
        register(&registry);
        assert_eq!(registry.list_backends(), vec!["cloudflare", "memory"]);
    }

    #[test]
    fn test_status_mapping() {
        let auth = status_error("list", 403, "", NotFoundMeans::Zone);
        assert!(matches!(auth, Error::BackendUnavailable { .. }));

        let zone = status_error("list", 404, "zone-1", NotFoundMeans::Zone);
        assert!(matches!(zone, Error::ZoneNotFound(_)));

        let record = status_error("remove", 404, "rec-1", NotFoundMeans::Record);
        assert!(matches!(record, Error::BackendOperationFailed { ref operation, .. } if operation == "remove"));

        assert!(status_error("create", 429, "", NotFoundMeans::Zone).is_retryable());
        assert!(status_error("create", 503, "", NotFoundMeans::Zone).is_retryable());
        assert!(matches!(
            status_error("create", 409, "", NotFoundMeans::Zone),
            Error::BackendOperationFailed { .. }
        ));
    }

    #[test]
    fn test_group_records_into_sets() {
        let records = vec![
            api_record("1", "A", "svc.example.com", "198.51.100.2"),
            api_record("2", "A", "svc.example.com", "198.51.100.1"),
            api_record("3", "AAAA", "svc.example.com", "2001:db8::1"),
            api_record("4", "CNAME", "zone.svc.example.com", "svc.example.com"),
            api_record("5", "TXT", "svc.example.com", "v=spf1"),
        ];

        let sets = group_records(&records);

        assert_eq!(sets.len(), 2);
        assert_eq!(
            sets[0],
            ResourceRecord::address(
                "svc.example.com",
                ["198.51.100.1", "198.51.100.2", "2001:db8::1"].map(String::from)
            )
        );
        assert_eq!(sets[1], ResourceRecord::alias("zone.svc.example.com", "svc.example.com"));
    }

    #[test]
    fn test_matching_records_requires_exact_set() {
        let candidates = vec![
            api_record("1", "A", "svc.example.com", "198.51.100.1"),
            api_record("2", "A", "svc.example.com", "198.51.100.2"),
        ];

        let full = ResourceRecord::address(
            "svc.example.com",
            ["198.51.100.1", "198.51.100.2"].map(String::from),
        );
        let ids: Vec<&str> = matching_records(&candidates, &full)
            .unwrap()
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(ids, vec!["1", "2"]);

        let partial = ResourceRecord::address("svc.example.com", ["198.51.100.1".to_string()]);
        assert!(matching_records(&candidates, &partial).is_none());

        let alias = ResourceRecord::alias("svc.example.com", "other.example.com");
        assert!(matching_records(&candidates, &alias).is_none());
    }

    #[test]
    fn test_create_payloads() {
        let record = ResourceRecord::address(
            "svc.example.com",
            ["2001:db8::1", "198.51.100.1"].map(String::from),
        );
        let payloads = create_payloads(&record).unwrap();

        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0]["type"], "A");
        assert_eq!(payloads[1]["type"], "AAAA");
        assert_eq!(payloads[0]["ttl"], 180);
        assert_eq!(payloads[0]["proxied"], false);

        let alias = ResourceRecord::alias("zone.svc.example.com", "svc.example.com");
        assert_eq!(create_payloads(&alias).unwrap()[0]["type"], "CNAME");

        let bad = ResourceRecord::address("svc.example.com", ["lb.example.com".to_string()]);
        assert!(matches!(create_payloads(&bad), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_envelope_decoding() {
        let json = r#"{
            "success": false,
            "errors": [{ "code": 81053, "message": "An A, AAAA, or CNAME record with that host already exists." }],
            "result": null
        }"#;
        let envelope: ApiEnvelope<ApiRecord> = serde_json::from_str(json).unwrap();
        assert!(!envelope.success);
        assert!(envelope.error_summary().contains("81053"));

        let zones = r#"{
            "success": true,
            "errors": [],
            "result": [{ "id": "023e105f4ecef8ad9ca31a8372d0c353", "name": "example.com", "status": "active" }],
            "result_info": { "page": 1, "per_page": 100, "total_pages": 1, "count": 1 }
        }"#;
        let envelope: ApiEnvelope<Vec<ApiZone>> = serde_json::from_str(zones).unwrap();
        assert_eq!(envelope.result.unwrap()[0].name, "example.com");
        assert_eq!(envelope.result_info.unwrap().total_pages, 1);
    }

    #[tokio::test]
    async fn test_dry_run_create_makes_no_request() {
        let backend = CloudflareBackend::new_dry_run("token", Some("zone-1".to_string())).unwrap();
        let zone = ZoneHandle::new("zone-1", "example.com");
        let record = ResourceRecord::address("svc.example.com", ["198.51.100.1".to_string()]);

        backend.create_record(&zone, &record).await.unwrap();
    }
}
