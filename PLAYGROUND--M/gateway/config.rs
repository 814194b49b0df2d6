use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming the backend base URL.
pub const BACKEND_URL_ENV: &str = "FASTAPI_BACKEND_URL";
/// Environment variable naming the gateway listen address.
pub const LISTEN_ADDR_ENV: &str = "MLPG_LISTEN_ADDR";
/// Backend used when nothing else is configured.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

/// Failures while assembling a [`GatewayConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("reading {}: {source}", .path.display())]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// The config file is not valid TOML for this schema.
    #[error("parsing {}: {source}", .path.display())]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },
    /// A listen address override did not parse.
    #[error("invalid listen address {value:?}")]
    ListenAddr {
        /// Offending value.
        value: String,
    },
    /// The merged config violates a constraint.
    #[error("invalid gateway config: {0}")]
    Invalid(String),
}

/// Exponential backoff applied to backend write calls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay_ms: u64,
    /// Upper bound on any single delay.
    pub max_delay_ms: u64,
    /// Growth factor between retries.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero based), capped at `max_delay_ms`.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = self.base_delay_ms as f64 * self.multiplier.powi(exponent);
        let capped = scaled.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

/// Gateway settings: defaults, then TOML, then environment, then flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Socket the HTTP server binds.
    pub listen_addr: SocketAddr,
    /// Base URL of the training backend.
    pub backend_url: String,
    /// Per-attempt timeout for proxied calls.
    pub request_timeout_ms: u64,
    /// Timeout for the backend health check.
    pub health_timeout_ms: u64,
    /// Largest accepted upload body.
    pub max_upload_bytes: usize,
    /// Backoff for training and preprocessing calls.
    pub retry: RetryPolicy,
    /// JSON-lines request log, if any.
    pub log_path: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            request_timeout_ms: 30_000,
            health_timeout_ms: 5_000,
            max_upload_bytes: 50 * 1024 * 1024,
            retry: RetryPolicy::default(),
            log_path: None,
        }
    }
}

/// Command line values layered over everything else.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// `--listen`.
    pub listen_addr: Option<SocketAddr>,
    /// `--backend-url`.
    pub backend_url: Option<String>,
    /// `--log-path`.
    pub log_path: Option<PathBuf>,
}

impl GatewayConfig {
    /// Parses TOML text; missing keys keep their defaults.
    pub fn from_toml_str(raw: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Defaults or `path`, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&raw, path)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())
    }

    /// Applies [`BACKEND_URL_ENV`] and [`LISTEN_ADDR_ENV`] through `lookup`.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(BACKEND_URL_ENV).filter(|url| !url.trim().is_empty()) {
            self.backend_url = url;
        }
        if let Some(raw) = lookup(LISTEN_ADDR_ENV) {
            self.listen_addr = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::ListenAddr { value: raw.clone() })?;
        }
        Ok(self)
    }

    /// Applies command line overrides.
    #[must_use]
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(addr) = overrides.listen_addr {
            self.listen_addr = addr;
        }
        if let Some(url) = overrides.backend_url {
            self.backend_url = url;
        }
        if overrides.log_path.is_some() {
            self.log_path = overrides.log_path;
        }
        self
    }

    /// Rejects empty URLs, zero timeouts and shrinking backoff.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.backend_url.trim();
        if url.is_empty() {
            return Err(ConfigError::Invalid("backend_url must not be empty".into()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "backend_url must be an http(s) URL, got {url:?}"
            )));
        }
        if self.request_timeout_ms == 0 || self.health_timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be greater than zero".into()));
        }
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid("max_upload_bytes must be greater than zero".into()));
        }
        if self.retry.multiplier.is_nan() || self.retry.multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "retry multiplier must be at least 1, got {}",
                self.retry.multiplier
            )));
        }
        Ok(())
    }

    /// Per-attempt timeout for proxied calls.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Health check timeout.
    #[must_use]
    pub const fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    /// Backend URL with `path` appended, without doubled slashes.
    #[must_use]
    pub fn backend_endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.backend_url.trim().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_point_at_local_backend() {
        let config = GatewayConfig::default();
        assert_eq!(config.backend_url, "http://localhost:8000");
        assert_eq!(config.listen_addr.port(), 3000);
        assert_eq!(config.retry.max_retries, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_layers_over_defaults() {
        let raw = r#"
backend_url = "http://trainer:9000/"
request_timeout_ms = 1500

[retry]
max_retries = 5
"#;
        let config = GatewayConfig::from_toml_str(raw, Path::new("gateway.toml")).unwrap();
        assert_eq!(config.request_timeout(), Duration::from_millis(1500));
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay_ms, 200);
        assert_eq!(config.health_timeout_ms, 5_000);
        assert_eq!(config.backend_endpoint("/api/train"), "http://trainer:9000/api/train");
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.toml");
        fs::write(&path, "listen_addr = \"0.0.0.0:8080\"\n").unwrap();
        let config = GatewayConfig::load(Some(&path)).unwrap();
        assert_eq!(config.listen_addr.port(), 8080);

        let missing = GatewayConfig::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));
    }

    #[test]
    fn environment_then_flags_win() {
        let config = GatewayConfig::default()
            .apply_env(env(&[
                (BACKEND_URL_ENV, "http://env-backend:8000"),
                (LISTEN_ADDR_ENV, "127.0.0.1:4000"),
            ]))
            .unwrap();
        assert_eq!(config.backend_url, "http://env-backend:8000");
        assert_eq!(config.listen_addr.port(), 4000);

        let config = config.with_overrides(ConfigOverrides {
            backend_url: Some("http://flag-backend:8000".into()),
            ..ConfigOverrides::default()
        });
        assert_eq!(config.backend_url, "http://flag-backend:8000");
        assert_eq!(config.listen_addr.port(), 4000);

        let err = GatewayConfig::default()
            .apply_env(env(&[(LISTEN_ADDR_ENV, "not-an-addr")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ListenAddr { .. }));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = GatewayConfig {
            backend_url: "  ".into(),
            ..GatewayConfig::default()
        };
        assert!(config.validate().is_err());
        config.backend_url = DEFAULT_BACKEND_URL.into();
        config.request_timeout_ms = 0;
        assert!(config.validate().is_err());
        config.request_timeout_ms = 10;
        config.retry.multiplier = 0.5;
        assert!(config.validate().is_err());
        config.retry.multiplier = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn backoff_grows_then_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(200));
        assert_eq!(policy.delay_for(1), Duration::from_millis(400));
        assert_eq!(policy.delay_for(2), Duration::from_millis(800));
        assert_eq!(policy.delay_for(10), Duration::from_millis(5_000));
    }
}
