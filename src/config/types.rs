// Configuration types
// Sections mirror the config file: server, http, shutdown, logging, thumbnail, health

use serde::Deserialize;

use crate::logger::AccessLogFormat;

/// Root of the deserialized configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub http: HttpConfig,
    pub shutdown: ShutdownConfig,
    pub logging: LoggingConfig,
    pub thumbnail: ThumbnailConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

/// Listener configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Runtime worker threads (CPU cores when unset)
    pub workers: Option<usize>,
    /// Connections beyond this limit are dropped on accept
    pub max_connections: Option<u64>,
}

/// Request pipeline configuration
#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    /// Largest aggregated request body, in bytes
    pub max_body_size: u64,
    /// How long a connection waits for a collaborator's reply
    pub reply_timeout_ms: u64,
    pub keep_alive: bool,
    /// Upper bound on a connection's lifetime, in seconds
    pub connection_timeout: u64,
    pub server_name: String,
}

/// Shutdown configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ShutdownConfig {
    /// Time in-flight connections get to finish before being aborted
    pub grace_period_ms: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub access_log: bool,
    #[serde(default)]
    pub access_log_format: AccessLogFormat,
    /// Access log file path (stdout if not set)
    #[serde(default)]
    pub access_log_file: Option<String>,
    /// Error log file path (stderr if not set)
    #[serde(default)]
    pub error_log_file: Option<String>,
}

/// Selectors served by the thumbnail collaborator
#[derive(Debug, Deserialize, Clone)]
pub struct ThumbnailConfig {
    pub upload_path: String,
    pub image_path: String,
}

/// Health check configuration
#[derive(Debug, Deserialize, Clone)]
pub struct HealthConfig {
    #[serde(default = "default_health_enabled")]
    pub enabled: bool,
    #[serde(default = "default_healthz_path")]
    pub liveness_path: String,
    #[serde(default = "default_readyz_path")]
    pub readiness_path: String,
}

#[allow(clippy::missing_const_for_fn)]
fn default_health_enabled() -> bool {
    true
}

fn default_healthz_path() -> String {
    "/healthz".to_string()
}

fn default_readyz_path() -> String {
    "/readyz".to_string()
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: default_health_enabled(),
            liveness_path: default_healthz_path(),
            readiness_path: default_readyz_path(),
        }
    }
}
