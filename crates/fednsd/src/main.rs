// # fednsd - Federated Service DNS Daemon
//
// The fednsd daemon is a thin integration layer over fedns-core:
// 1. Reading configuration from environment variables
// 2. Initializing tracing and the runtime
// 3. Registering DNS backends
// 4. Publishing every service of a federation snapshot file
// 5. Periodically resyncing cached services until shutdown
//
// All planning and reconciliation logic lives in fedns-core.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Federation
// - `FEDNS_FEDERATION_NAME`: Federation name, a single DNS label (required)
// - `FEDNS_DNS_SUFFIX`: Service DNS suffix (required)
// - `FEDNS_DNS_ZONE`: Hosted zone records are published into (required)
// - `FEDNS_SNAPSHOT_PATH`: Federation snapshot JSON file (required)
//
// ### DNS Backend
// - `FEDNS_BACKEND_TYPE`: Backend type (cloudflare, memory)
// - `FEDNS_BACKEND_API_TOKEN`: API token (cloudflare)
// - `FEDNS_BACKEND_ZONE_ID`: Zone ID (optional)
// - `FEDNS_MODE`: Set to `dry-run` to skip all DNS mutations (cloudflare)
//
// ### Engine
// - `FEDNS_RESYNC_INTERVAL_SECS`: Seconds between full resyncs (default 300)
// - `FEDNS_RETRACT_ON_DELETE`: Remove every record of deleted services (default false)
// - `FEDNS_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Signals
//
// - SIGTERM / SIGINT: clean shutdown
// - SIGHUP: reload the snapshot file and publish it again
//
// ## Example
//
// ```bash
// export FEDNS_FEDERATION_NAME=myfederation
// export FEDNS_DNS_SUFFIX=federation.example.com
// export FEDNS_DNS_ZONE=example.com
// export FEDNS_SNAPSHOT_PATH=/etc/fedns/snapshot.json
// export FEDNS_BACKEND_TYPE=cloudflare
// export FEDNS_BACKEND_API_TOKEN=your_token
//
// fednsd
// ```

use anyhow::{Context, Result};
use fedns_core::{
    BackendConfig, BackendRegistry, DnsBackend, EngineConfig, EngineEvent, FederatedDnsEngine,
    FederationDnsConfig, FederationSnapshot,
};
use fedns_core::naming::{validate_domain_name, validate_label};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, interval_at};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::IntervalStream;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};

/// Default seconds between full resyncs
const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 300;

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum FednsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<FednsExitCode> for ExitCode {
    fn from(code: FednsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
#[derive(Debug, Clone)]
struct Config {
    federation_name: String,
    dns_suffix: String,
    dns_zone: String,
    snapshot_path: PathBuf,
    backend_type: String,
    backend_api_token: String,
    backend_zone_id: Option<String>,
    resync_interval_secs: u64,
    retract_on_delete: bool,
    log_level: String,
}

/// Read a required environment variable
fn required_env(name: &str) -> Result<String> {
    env::var(name).with_context(|| format!("{} is required. Set it via: export {}=...", name, name))
}

/// Parse a boolean flag value
fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("{} must be true or false. Got: '{}'", name, other),
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        let resync_interval_secs = match env::var("FEDNS_RESYNC_INTERVAL_SECS") {
            Ok(raw) => raw.trim().parse().with_context(|| {
                format!("FEDNS_RESYNC_INTERVAL_SECS must be a number of seconds. Got: '{}'", raw)
            })?,
            Err(_) => DEFAULT_RESYNC_INTERVAL_SECS,
        };

        let retract_on_delete = match env::var("FEDNS_RETRACT_ON_DELETE") {
            Ok(raw) => parse_bool("FEDNS_RETRACT_ON_DELETE", &raw)?,
            Err(_) => false,
        };

        Ok(Self {
            federation_name: required_env("FEDNS_FEDERATION_NAME")?,
            dns_suffix: required_env("FEDNS_DNS_SUFFIX")?,
            dns_zone: required_env("FEDNS_DNS_ZONE")?,
            snapshot_path: PathBuf::from(required_env("FEDNS_SNAPSHOT_PATH")?),
            backend_type: env::var("FEDNS_BACKEND_TYPE")
                .unwrap_or_else(|_| "cloudflare".to_string()),
            backend_api_token: env::var("FEDNS_BACKEND_API_TOKEN").unwrap_or_default(),
            backend_zone_id: env::var("FEDNS_BACKEND_ZONE_ID")
                .ok()
                .filter(|s| !s.is_empty()),
            resync_interval_secs,
            retract_on_delete,
            log_level: env::var("FEDNS_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    ///
    /// This performs validation including:
    /// - Domain name shape of the federation name, suffix and zone
    /// - Backend type enumeration and API token sanity checks
    /// - Snapshot file presence
    /// - Numeric range validation
    fn validate(&self) -> Result<()> {
        validate_label(&self.federation_name)
            .context("FEDNS_FEDERATION_NAME must be a single DNS label")?;
        validate_domain_name(&self.dns_suffix).context("Invalid FEDNS_DNS_SUFFIX")?;
        validate_domain_name(&self.dns_zone).context("Invalid FEDNS_DNS_ZONE")?;

        match self.backend_type.as_str() {
            "memory" => {}
            "cloudflare" => self.validate_api_token()?,
            _ => anyhow::bail!(
                "FEDNS_BACKEND_TYPE '{}' is not supported. \
                Supported backends: cloudflare, memory",
                self.backend_type
            ),
        }

        if !self.snapshot_path.is_file() {
            anyhow::bail!(
                "FEDNS_SNAPSHOT_PATH does not point to a file: {}",
                self.snapshot_path.display()
            );
        }

        if !(10..=86_400).contains(&self.resync_interval_secs) {
            anyhow::bail!(
                "FEDNS_RESYNC_INTERVAL_SECS must be between 10 and 86400 seconds. Got: {}",
                self.resync_interval_secs
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "FEDNS_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        // Suffix-in-zone and the rest of the library rules
        self.to_engine_config().validate()?;

        Ok(())
    }

    fn validate_api_token(&self) -> Result<()> {
        if self.backend_api_token.is_empty() {
            anyhow::bail!(
                "FEDNS_BACKEND_API_TOKEN is required for the cloudflare backend. \
                Set it via: export FEDNS_BACKEND_API_TOKEN=your_token"
            );
        }

        // Cloudflare API tokens are typically 40 characters
        if self.backend_api_token.len() < 20 {
            anyhow::bail!(
                "FEDNS_BACKEND_API_TOKEN appears too short ({} chars). \
                Cloudflare tokens are typically 40 characters. \
                Verify your token is correct.",
                self.backend_api_token.len()
            );
        }

        let token_lower = self.backend_api_token.to_lowercase();
        if token_lower.contains("your_token")
            || token_lower.contains("replace_me")
            || token_lower.contains("example")
        {
            anyhow::bail!(
                "FEDNS_BACKEND_API_TOKEN appears to be a placeholder. \
                Use an actual API token from your DNS provider."
            );
        }

        Ok(())
    }

    /// Library configuration derived from the environment
    fn to_engine_config(&self) -> FederationDnsConfig {
        let backend = match self.backend_type.as_str() {
            "cloudflare" => BackendConfig::Cloudflare {
                api_token: self.backend_api_token.clone(),
                zone_id: self.backend_zone_id.clone(),
            },
            _ => BackendConfig::Memory {
                zones: vec![self.dns_zone.clone()],
            },
        };

        FederationDnsConfig::new(&self.federation_name, &self.dns_suffix, &self.dns_zone)
            .with_backend(backend)
            .with_engine(EngineConfig {
                retract_on_delete: self.retract_on_delete,
                ..EngineConfig::default()
            })
    }

    fn log_level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return FednsExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return FednsExitCode::ConfigError.into();
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level())
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return FednsExitCode::ConfigError.into();
    }

    info!("Starting fednsd daemon");
    info!(
        "Federation {} publishing under {} into zone {}",
        config.federation_name, config.dns_suffix, config.dns_zone
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return FednsExitCode::RuntimeError.into();
        }
    };

    let code = rt.block_on(async {
        let engine = match build_engine(&config) {
            Ok(engine) => engine,
            Err(e) => {
                error!("Startup error: {:#}", e);
                return FednsExitCode::ConfigError;
            }
        };

        if let Err(e) = publish_snapshot(&engine, &config).await {
            error!("Startup error: {:#}", e);
            return FednsExitCode::ConfigError;
        }

        match run_daemon(engine, &config).await {
            Ok(()) => FednsExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                FednsExitCode::RuntimeError
            }
        }
    });

    code.into()
}

/// Create the backend and engine, and start logging engine events
fn build_engine(config: &Config) -> Result<Arc<FederatedDnsEngine>> {
    let registry = BackendRegistry::with_builtin();

    #[cfg(feature = "cloudflare")]
    {
        info!("Registering Cloudflare backend");
        fedns_provider_cloudflare::register(&registry);
    }

    let engine_config = config.to_engine_config();
    let backend: Arc<dyn DnsBackend> = Arc::from(
        registry
            .create_backend(&engine_config.backend)
            .with_context(|| format!("Failed to create {} backend", config.backend_type))?,
    );
    info!("Using DNS backend: {}", backend.backend_name());

    let (engine, events) =
        FederatedDnsEngine::new(backend, engine_config).context("Failed to create engine")?;

    tokio::spawn(log_events(events));
    Ok(Arc::new(engine))
}

/// Drain engine events into the log until the engine is dropped
async fn log_events(mut events: mpsc::Receiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::ReconcileFailed {
                service,
                error,
                retryable,
            } => warn!(
                "Reconcile of {} failed (retryable: {}): {}",
                service, retryable, error
            ),
            other => debug!("Engine event: {:?}", other),
        }
    }
}

/// Load the snapshot file and publish every service in it
async fn publish_snapshot(engine: &FederatedDnsEngine, config: &Config) -> Result<()> {
    let snapshot = FederationSnapshot::load(&config.snapshot_path).await?;

    info!(
        "Publishing snapshot: {} cluster(s), {} service(s)",
        snapshot.clusters.len(),
        snapshot.services.len()
    );

    let results = engine.apply_snapshot(&snapshot).await?;

    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
    if failed > 0 {
        warn!(
            "{} of {} service(s) failed to publish; they will be retried on the next resync",
            failed,
            results.len()
        );
    }
    Ok(())
}

/// Resync until a shutdown signal arrives
async fn run_daemon(engine: Arc<FederatedDnsEngine>, config: &Config) -> Result<()> {
    let period = Duration::from_secs(config.resync_interval_secs);
    let mut ticks = IntervalStream::new(interval_at(Instant::now() + period, period));
    let mut signals = Signals::install()?;

    info!("Daemon initialized; resyncing every {:?}", period);

    loop {
        tokio::select! {
            Some(_) = ticks.next() => {
                let results = engine.resync_all().await;
                let failed = results.iter().filter(|(_, r)| r.is_err()).count();
                if failed > 0 {
                    warn!("Resync finished with {} failure(s) out of {}", failed, results.len());
                } else {
                    debug!("Resync of {} service(s) finished", results.len());
                }
            }
            received = signals.next() => match received {
                DaemonSignal::Reload => {
                    info!("Received SIGHUP, reloading snapshot");
                    if let Err(e) = publish_snapshot(&engine, config).await {
                        error!("Snapshot reload failed, keeping cached state: {:#}", e);
                    }
                }
                DaemonSignal::Shutdown(name) => {
                    info!("Received shutdown signal: {}", name);
                    break;
                }
            },
        }
    }

    info!("Shutting down daemon");
    Ok(())
}

/// What a received signal asks the daemon to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DaemonSignal {
    Shutdown(&'static str),
    Reload,
}

#[cfg(unix)]
struct Signals {
    sigterm: Signal,
    sigint: Signal,
    sighup: Signal,
}

#[cfg(unix)]
impl Signals {
    fn install() -> Result<Self> {
        Ok(Self {
            sigterm: signal(SignalKind::terminate())
                .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?,
            sigint: signal(SignalKind::interrupt())
                .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?,
            sighup: signal(SignalKind::hangup())
                .map_err(|e| anyhow::anyhow!("Failed to setup SIGHUP handler: {}", e))?,
        })
    }

    async fn next(&mut self) -> DaemonSignal {
        tokio::select! {
            _ = self.sigterm.recv() => DaemonSignal::Shutdown("SIGTERM"),
            _ = self.sigint.recv() => DaemonSignal::Shutdown("SIGINT"),
            _ = self.sighup.recv() => DaemonSignal::Reload,
        }
    }
}

/// Fallback for non-Unix platforms: CTRL-C only, no reload
#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn install() -> Result<Self> {
        Ok(Self)
    }

    async fn next(&mut self) -> DaemonSignal {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to wait for CTRL-C: {}", e);
        }
        DaemonSignal::Shutdown("SIGINT")
    }
}
