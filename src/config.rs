//! The fully-materialized configuration value the runtime consumes.
//!
//! Nothing in this module touches the filesystem or the environment; loading
//! a `ClientConfig` from a file or `KRAKEN_*` environment variables is an
//! external collaborator's job.

use std::time::Duration;

use crate::backoff::{BackoffPolicy, ExponentialBackoff};

/// TLS options for the transport.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub verify_peer: bool,
    pub ca_path: Option<String>,
    pub client_cert_path: Option<String>,
    pub client_key_path: Option<String>,
    pub cipher_suites: Vec<String>,
    pub allow_insecure: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            verify_peer: true,
            ca_path: None,
            client_cert_path: None,
            client_key_path: None,
            cipher_suites: Vec::new(),
            allow_insecure: false,
        }
    }
}

/// Deadlines for the transport's connect/read/write/heartbeat operations.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionTimeouts {
    pub connect: Duration,
    pub read: Duration,
    pub write: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for ConnectionTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            read: Duration::from_secs(30),
            write: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(15),
        }
    }
}

/// Action to take when the sequence tracker reports a gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapRecoveryAction {
    Ignore,
    Reconnect,
    Snapshot,
    Callback,
}

#[derive(Debug, Clone)]
pub struct GapDetectionConfig {
    pub enabled: bool,
    pub gap_tolerance: u64,
    pub track_reorders: bool,
    pub recovery: GapRecoveryAction,
}

impl Default for GapDetectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gap_tolerance: 0,
            track_reorders: true,
            recovery: GapRecoveryAction::Callback,
        }
    }
}

/// Out-of-scope telemetry wiring: the core only produces the plain-data value
/// below and an atomic [`crate::metrics::Metrics`] snapshot. Exporters (HTTP
/// scrape server, OTLP push) are external consumers of both.
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    pub enable_metrics: bool,
    pub service_name: String,
    pub service_version: String,
    pub environment: String,
    pub metrics_interval: Option<Duration>,
    pub http_scrape_port: Option<u16>,
    pub otlp_endpoint: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    pub requests_per_sec: f64,
    pub burst_size: usize,
    pub enabled: bool,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_sec: 10.0,
            burst_size: 20,
            enabled: true,
        }
    }
}

/// The value the runtime is constructed from. The caller (CLI, config-file
/// loader, env-var loader — all out of scope) is responsible for populating
/// every field; this type performs no I/O.
#[derive(Clone)]
pub struct ClientConfig {
    pub url: String,
    /// Already-signed auth token for private channels. `None` disables auth.
    pub auth_token: Option<String>,
    pub use_queue: bool,
    pub queue_capacity: usize,
    pub checksum_validation: bool,
    pub backoff: Box<dyn BackoffPolicy>,
    pub gap_detection: GapDetectionConfig,
    pub telemetry: TelemetryConfig,
    pub timeouts: ConnectionTimeouts,
    pub tls: TlsConfig,
    pub rate_limiter: Option<RateLimiterConfig>,
    pub circuit_breaker_enabled: bool,
    /// Deprecated synonym pair: when either is set, `backoff` should have
    /// been constructed via [`ClientConfig::with_legacy_reconnect`].
    pub reconnect_attempts: Option<u32>,
    pub reconnect_delay: Option<Duration>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("use_queue", &self.use_queue)
            .field("queue_capacity", &self.queue_capacity)
            .field("checksum_validation", &self.checksum_validation)
            .field("gap_detection", &self.gap_detection)
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: None,
            use_queue: true,
            queue_capacity: 1024,
            checksum_validation: true,
            backoff: Box::new(ExponentialBackoff::conservative()),
            gap_detection: GapDetectionConfig::default(),
            telemetry: TelemetryConfig::default(),
            timeouts: ConnectionTimeouts::default(),
            tls: TlsConfig::default(),
            rate_limiter: Some(RateLimiterConfig::default()),
            circuit_breaker_enabled: true,
            reconnect_attempts: None,
            reconnect_delay: None,
        }
    }

    /// Applies the legacy `reconnect_attempts`/`reconnect_delay` surface as a
    /// deprecated synonym for an [`ExponentialBackoff`] (default multiplier
    /// and jitter, `max_attempts` from `reconnect_attempts`).
    pub fn with_legacy_reconnect(mut self, attempts: u32, delay: Duration) -> Self {
        self.reconnect_attempts = Some(attempts);
        self.reconnect_delay = Some(delay);
        self.backoff = Box::new(
            ExponentialBackoff::builder()
                .initial_delay(delay)
                .max_attempts(attempts as i32)
                .build(),
        );
        self
    }
}
