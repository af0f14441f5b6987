//! Configuration Loading
//!
//! TOML configuration with per-section defaults, environment overrides for
//! secrets and validation before anything starts polling.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    ValidationError(String),
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineSection,
    pub retry: RetrySection,
    pub enrichment: EnrichmentSection,
    pub dedupe: DedupeSection,
    pub sources: SourcesSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// Seconds between discovery rounds in watch mode.
    pub poll_interval_secs: u64,
    /// Concurrent enrichment jobs.
    pub max_concurrent_jobs: usize,
    /// Pending jobs the queue will hold before submissions backpressure.
    pub queue_capacity: usize,
    /// Concurrent requests per upstream host.
    pub per_host_concurrency: usize,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            max_concurrent_jobs: 3,
            queue_capacity: 256,
            per_host_concurrency: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentSection {
    /// Enrichment budget per filter run.
    pub candidate_limit: usize,
    /// Per-candidate wait for an enrichment result, in milliseconds.
    pub item_timeout_ms: u64,
    /// Cache TTL for enrichment responses, in seconds.
    pub cache_ttl_secs: u64,
}

impl Default for EnrichmentSection {
    fn default() -> Self {
        Self {
            candidate_limit: 8,
            item_timeout_ms: 2_000,
            cache_ttl_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupeSection {
    /// "local" or "redis".
    pub backend: String,
    /// Redis connection URL; the REDIS_URL env var overrides this.
    pub redis_url: Option<String>,
    /// Suppression window per admitted key, in seconds.
    pub ttl_secs: u64,
    pub connect_timeout_ms: u64,
    pub call_timeout_ms: u64,
}

impl Default for DedupeSection {
    fn default() -> Self {
        Self {
            backend: "local".to_string(),
            redis_url: None,
            ttl_secs: 300,
            connect_timeout_ms: 3_000,
            call_timeout_ms: 800,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesSection {
    pub market_api_url: String,
    /// Records requested per discovery round, per source.
    pub discovery_limit: usize,
    /// Ignore listings older than this many minutes, for sources that can
    /// filter upstream. Zero disables the cutoff.
    pub lookback_minutes: u64,
}

impl Default for SourcesSection {
    fn default() -> Self {
        Self {
            market_api_url: "https://api.dexscreener.com".to_string(),
            discovery_limit: 50,
            lookback_minutes: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.max_concurrent_jobs == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.max_concurrent_jobs must be at least 1".to_string(),
            ));
        }
        if self.pipeline.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.pipeline.per_host_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.per_host_concurrency must be at least 1".to_string(),
            ));
        }
        if self.retry.attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::ValidationError(
                "retry.base_delay_ms cannot exceed retry.max_delay_ms".to_string(),
            ));
        }
        if self.dedupe.ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "dedupe.ttl_secs must be at least 1".to_string(),
            ));
        }
        match self.dedupe.backend.as_str() {
            "local" | "redis" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "dedupe.backend must be 'local' or 'redis', got '{other}'"
                )));
            }
        }
        if self.sources.market_api_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "sources.market_api_url cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Pull secret-bearing settings from the environment.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("REDIS_URL") {
            if !url.trim().is_empty() {
                debug!("config: redis url taken from REDIS_URL");
                self.dedupe.redis_url = Some(url);
            }
        }
    }
}

/// Load, override and validate a config file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path.as_ref())?;
    let mut config: Config = toml::from_str(&content)?;
    config.apply_env_overrides();
    config.validate()?;
    info!("config: loaded from {}", path.as_ref().display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.max_concurrent_jobs, 3);
        assert_eq!(config.dedupe.backend, "local");
        assert_eq!(config.dedupe.ttl_secs, 300);
        assert_eq!(config.enrichment.candidate_limit, 8);
    }

    #[test]
    fn test_load_partial_config_fills_defaults() {
        let file = write_config(
            r#"
            [pipeline]
            max_concurrent_jobs = 5

            [dedupe]
            backend = "redis"
            redis_url = "redis://localhost:6379"
            "#,
        );

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.pipeline.max_concurrent_jobs, 5);
        assert_eq!(config.pipeline.queue_capacity, 256);
        assert_eq!(config.dedupe.backend, "redis");
        assert_eq!(config.retry.attempts, 3);
    }

    #[test]
    fn test_invalid_backend_rejected() {
        let file = write_config(
            r#"
            [dedupe]
            backend = "memcached"
            "#,
        );
        assert!(matches!(
            load_config(file.path()),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let file = write_config(
            r#"
            [pipeline]
            max_concurrent_jobs = 0
            "#,
        );
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_base_delay_cannot_exceed_max() {
        let file = write_config(
            r#"
            [retry]
            base_delay_ms = 20000
            max_delay_ms = 10000
            "#,
        );
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        assert!(matches!(
            load_config("/nonexistent/config.toml"),
            Err(ConfigError::IoError(_))
        ));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let file = write_config("this is not [ valid toml");
        assert!(matches!(
            load_config(file.path()),
            Err(ConfigError::ParseError(_))
        ));
    }
}
