use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration for the frame receiver
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Upload handling configuration
    #[serde(default)]
    pub ingest: IngestConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name reported by the health endpoint and in logs
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (text, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Install the Prometheus exporter
    #[serde(default)]
    pub metrics_enabled: bool,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Largest accepted request body in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// Upload handling configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Write received frames to disk. When off, frames are still validated
    /// and counted.
    #[serde(default = "default_true")]
    pub save_images: bool,
    /// Directory frames are written to
    #[serde(default = "default_output_directory")]
    pub output_directory: PathBuf,
    /// Log every received frame at info level
    #[serde(default = "default_true")]
    pub verbose_logging: bool,
    /// Log a statistics summary every N successful frames (0 disables)
    #[serde(default = "default_stats_log_interval")]
    pub stats_log_interval: u64,
    /// Upper bound on decodes and writes running at once
    #[serde(default = "default_max_concurrent_decodes")]
    pub max_concurrent_decodes: usize,
}

// Default value functions
fn default_service_name() -> String {
    "frame-receiver".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_body_bytes() -> usize {
    8 * 1024 * 1024 // 8MB
}

fn default_true() -> bool {
    true
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("received_frames")
}

fn default_stats_log_interval() -> u64 {
    10
}

fn default_max_concurrent_decodes() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Add config file if present
            .add_source(config::File::with_name("config/receiver").required(false))
            .add_source(config::File::with_name("/etc/frame-receiver/receiver").required(false))
            // Override with environment variables
            // RECEIVER__SERVER__PORT -> server.port
            .add_source(
                config::Environment::with_prefix("RECEIVER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the service cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ingest.max_concurrent_decodes == 0 {
            anyhow::bail!("ingest.max_concurrent_decodes must be at least 1");
        }
        if self.server.max_body_bytes == 0 {
            anyhow::bail!("server.max_body_bytes must be greater than 0");
        }
        if self.ingest.save_images && self.ingest.output_directory.as_os_str().is_empty() {
            anyhow::bail!("ingest.output_directory is required when save_images is enabled");
        }
        Ok(())
    }
}

impl ServerConfig {
    /// Listen address as `host:port`
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            metrics_enabled: false,
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
            cors_enabled: true,
            cors_origins: Vec::new(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            save_images: true,
            output_directory: default_output_directory(),
            verbose_logging: true,
            stats_log_interval: default_stats_log_interval(),
            max_concurrent_decodes: default_max_concurrent_decodes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert!(config.ingest.save_images);
        assert_eq!(config.ingest.output_directory, PathBuf::from("received_frames"));
        assert_eq!(config.ingest.stats_log_interval, 10);
        assert!(config.ingest.max_concurrent_decodes >= 1);
        assert_eq!(config.server.listen_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_partial_source_fills_defaults() {
        let source = config::Config::builder()
            .add_source(config::File::from_str(
                "[server]\nport = 9000\n\n[ingest]\nsave_images = false\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();

        let config: Config = source.try_deserialize().unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(!config.ingest.save_images);
        assert!(config.ingest.verbose_logging);
        assert_eq!(config.service.name, "frame-receiver");
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.ingest.max_concurrent_decodes = 0;
        assert!(config.validate().is_err());
    }
}
