//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Display name used when announcing the listening address.
    pub hostname: String,

    /// Debug mode: verbose logging and the diagnostic routes.
    pub debug: bool,

    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Worker pool sizing.
    pub workers: WorkerConfig,

    /// Response cache settings.
    pub cache: CacheConfig,

    /// Built-in static file handler.
    pub static_files: StaticFilesConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            debug: false,
            listener: ListenerConfig::default(),
            workers: WorkerConfig::default(),
            cache: CacheConfig::default(),
            static_files: StaticFilesConfig::default(),
            observability: ObservabilityConfig::default(),
            admin: AdminConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind (e.g., "0.0.0.0").
    pub host: String,

    /// Plain HTTP port. 0 picks an ephemeral port.
    pub port: u16,

    /// How many consecutive ports to try when the configured one is taken.
    pub port_retry_attempts: u32,

    /// Keep connections open between requests.
    pub keep_alive: bool,

    /// Time allowed for a client to send a complete request head.
    pub header_read_timeout_secs: u64,

    /// Time allowed for a TLS handshake.
    pub handshake_timeout_secs: u64,

    /// Largest request body accepted before answering 413.
    pub max_body_bytes: usize,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl ListenerConfig {
    pub fn header_read_timeout(&self) -> Duration {
        Duration::from_secs(self.header_read_timeout_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 1337,
            port_retry_attempts: 32,
            keep_alive: true,
            header_read_timeout_secs: 30,
            handshake_timeout_secs: 10,
            max_body_bytes: 2 * 1024 * 1024,
            tls: None,
        }
    }
}

/// TLS configuration for the secure listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Exact port for HTTPS; no retry.
    pub port: u16,

    /// Path to certificate file (PEM).
    pub cert_path: PathBuf,

    /// Path to private key file (PEM).
    pub key_path: PathBuf,
}

/// Worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of workers serving connections.
    pub count: usize,

    /// Connections allowed to wait for a free worker.
    pub queue_capacity: usize,

    /// Upper bound on the shutdown drain.
    pub drain_timeout_secs: u64,
}

impl WorkerConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            count,
            queue_capacity: 256,
            drain_timeout_secs: 30,
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Global switch; bindings still opt in individually.
    pub enabled: bool,

    /// Entry lifetime in seconds. 0 means entries never expire.
    pub ttl_secs: u64,

    /// Upper bound on stored entries.
    pub max_entries: usize,

    /// JSON snapshot loaded on start and written on stop.
    pub persistence_path: Option<PathBuf>,
}

impl CacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_secs > 0).then(|| Duration::from_secs(self.ttl_secs))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 0,
            max_entries: 10_000,
            persistence_path: None,
        }
    }
}

/// Static file handler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StaticFilesConfig {
    pub enabled: bool,

    /// Directory files are served from.
    pub root: PathBuf,

    /// File stem served for `/`.
    pub index: String,

    /// Extension assumed when the request names none.
    pub default_extension: String,

    /// Extensions that are never served.
    pub exclude_extensions: Vec<String>,
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            root: PathBuf::from("./public"),
            index: "index".to_string(),
            default_extension: "html".to_string(),
            exclude_extensions: vec!["txt".to_string()],
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Diagnostic route configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Expose the `admin/*` routes.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}
