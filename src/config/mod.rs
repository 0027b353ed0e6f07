// Configuration module entry point
// Layered configuration: defaults, optional file, THUMBNAILER__* environment variables

mod types;

use std::net::SocketAddr;
use std::time::Duration;

pub use types::{
    Config, HealthConfig, HttpConfig, LoggingConfig, ServerConfig, ShutdownConfig,
    ThumbnailConfig,
};

/// Default configuration file, resolved with any supported extension
pub const DEFAULT_CONFIG_PATH: &str = "config";

/// 16 MiB, enough for a typical image upload
pub const DEFAULT_MAX_BODY_SIZE: u64 = 16 * 1024 * 1024;

impl Config {
    /// Load configuration from `config_path`; a missing file is not an error.
    ///
    /// Environment variables override the file, e.g.
    /// `THUMBNAILER__SERVER__PORT=9000`.
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(config::Environment::with_prefix("THUMBNAILER").separator("__"))
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("http.max_body_size", DEFAULT_MAX_BODY_SIZE)?
            .set_default("http.reply_timeout_ms", 30_000)?
            .set_default("http.keep_alive", true)?
            .set_default("http.connection_timeout", 60)?
            .set_default("http.server_name", "thumbnail-server/0.1")?
            .set_default("shutdown.grace_period_ms", 5_000)?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("logging.access_log_format", "combined")?
            .set_default("thumbnail.upload_path", "/thumbnail")?
            .set_default("thumbnail.image_path", "/image/thumbnail.jpg")?
            .build()?;

        settings.try_deserialize()
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }
}

impl HttpConfig {
    pub const fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    pub const fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout)
    }
}

impl ShutdownConfig {
    pub const fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}
