// Configuration management with layered configuration (file, env)

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub analysis_service: AnalysisServiceConfig,
    pub scheduler: SchedulerConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_seconds: u64,
}

/// Where the external analysis service lives and how much we send it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisServiceConfig {
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

fn default_request_timeout() -> u64 {
    300
}

fn default_max_upload_bytes() -> u64 {
    200 * 1024 * 1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub poll_interval_seconds: u64,
    /// Prometheus listener of the scheduler process; the API uses
    /// `observability.metrics_port`
    #[serde(default = "default_scheduler_metrics_port")]
    pub metrics_port: u16,
}

fn default_scheduler_metrics_port() -> u16 {
    9091
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub metrics_port: u16,
    pub tracing_endpoint: Option<String>,
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let defaults = Config::try_from(&Settings::default())?;

        let builder = Config::builder()
            .add_source(defaults)
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local configuration (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port must be greater than 0".to_string());
        }

        if self.database.url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }

        let base_url = self.analysis_service.base_url.trim();
        if base_url.is_empty() {
            return Err("Analysis service base_url cannot be empty".to_string());
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(format!(
                "Analysis service base_url must be an http(s) URL, got '{}'",
                base_url
            ));
        }
        if self.analysis_service.max_upload_bytes == 0 {
            return Err("Analysis service max_upload_bytes must be greater than 0".to_string());
        }

        if self.scheduler.poll_interval_seconds == 0 {
            return Err("Scheduler poll_interval_seconds must be greater than 0".to_string());
        }
        if self.scheduler.metrics_port == self.observability.metrics_port {
            return Err(format!(
                "Scheduler metrics_port must differ from the API metrics_port ({})",
                self.observability.metrics_port
            ));
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "postgresql://localhost/helpdesk_reports".to_string(),
                max_connections: 10,
                min_connections: 2,
                connect_timeout_seconds: 30,
            },
            analysis_service: AnalysisServiceConfig {
                base_url: "http://localhost:8000".to_string(),
                request_timeout_seconds: default_request_timeout(),
                max_upload_bytes: default_max_upload_bytes(),
            },
            scheduler: SchedulerConfig {
                poll_interval_seconds: 30,
                metrics_port: default_scheduler_metrics_port(),
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                metrics_port: 9090,
                tracing_endpoint: None,
            },
        }
    }
}
