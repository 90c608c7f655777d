// Configuration management with layered configuration (file, env)

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub http: HttpClientConfig,
    pub executor: ExecutorSettings,
    pub scheduler: SchedulerSettings,
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
    #[serde(default)]
    pub run_migrations: bool,
}

/// Outbound transport settings shared by the request builder and the legacy client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpClientConfig {
    /// Base URL used when an envelope carries no `baseUrl`
    #[serde(default)]
    pub default_base_url: Option<String>,
    pub timeout_seconds: u64,
    /// Endpoint the SOAP adapter forwards to when the caller names none
    pub legacy_base_url: String,
}

/// What the executor does when one record's call or transform fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordFailurePolicy {
    /// Flush the page's completed records, then fail the run
    #[default]
    Abort,
    /// Log the failed record and keep going
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorSettings {
    pub max_concurrent_writes: usize,
    #[serde(default)]
    pub record_failure_policy: RecordFailurePolicy,
    #[serde(default)]
    pub wait_for_writes: bool,
}

/// Whether a cron firing may start while the previous run of the same job is still going
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    #[default]
    Allow,
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    pub worker_pool_size: usize,
    #[serde(default)]
    pub overlap_policy: OverlapPolicy,
    pub timezone: String,
    #[serde(default = "default_scan_on_startup")]
    pub scan_on_startup: bool,
}

fn default_scan_on_startup() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
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
            // Start with built-in defaults so partial files are enough
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

        if self.http.timeout_seconds == 0 {
            return Err("HTTP timeout_seconds must be greater than 0".to_string());
        }
        if let Some(base) = &self.http.default_base_url {
            if base.is_empty() {
                return Err("HTTP default_base_url cannot be empty when set".to_string());
            }
        }

        if self.executor.max_concurrent_writes == 0 {
            return Err("Executor max_concurrent_writes must be greater than 0".to_string());
        }

        if self.scheduler.worker_pool_size == 0 {
            return Err("Scheduler worker_pool_size must be greater than 0".to_string());
        }
        if self.scheduler.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(format!(
                "Scheduler timezone '{}' is not a known IANA timezone",
                self.scheduler.timezone
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
                url: "postgresql://localhost/etl_jobs".to_string(),
                max_connections: 10,
                min_connections: 2,
                connect_timeout_seconds: 30,
                run_migrations: false,
            },
            http: HttpClientConfig {
                default_base_url: None,
                timeout_seconds: 30,
                legacy_base_url: "http://localhost:8000".to_string(),
            },
            executor: ExecutorSettings {
                max_concurrent_writes: 4,
                record_failure_policy: RecordFailurePolicy::Abort,
                wait_for_writes: false,
            },
            scheduler: SchedulerSettings {
                worker_pool_size: 10,
                overlap_policy: OverlapPolicy::Allow,
                timezone: "UTC".to_string(),
                scan_on_startup: true,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logs: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validation_catches_empty_database_url() {
        let mut settings = Settings::default();
        settings.database.url = String::new();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_catches_zero_port() {
        let mut settings = Settings::default();
        settings.server.port = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_catches_unknown_timezone() {
        let mut settings = Settings::default();
        settings.scheduler.timezone = "Mars/Olympus_Mons".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_catches_zero_write_bound() {
        let mut settings = Settings::default();
        settings.executor.max_concurrent_writes = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_partial_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("default.toml")).unwrap();
        writeln!(
            file,
            r#"
[executor]
max_concurrent_writes = 2
record_failure_policy = "skip"

[scheduler]
worker_pool_size = 3
overlap_policy = "skip"
timezone = "Asia/Ho_Chi_Minh"
"#
        )
        .unwrap();

        let settings = Settings::load_from_path(dir.path()).unwrap();
        assert_eq!(settings.executor.max_concurrent_writes, 2);
        assert_eq!(
            settings.executor.record_failure_policy,
            RecordFailurePolicy::Skip
        );
        assert_eq!(settings.scheduler.overlap_policy, OverlapPolicy::Skip);
        assert_eq!(settings.scheduler.worker_pool_size, 3);
        // untouched sections keep their defaults
        assert_eq!(settings.server.port, 8080);
        assert!(settings.validate().is_ok());
    }
}
