use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Worker pool settings applied to every run
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DispatcherConfig {
    /// Upper bound on concurrently running workers
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Drop failed and empty results instead of delivering them
    #[serde(default = "default_check_result")]
    pub check_result: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            check_result: default_check_result(),
        }
    }
}

fn default_max_workers() -> usize {
    25
}

fn default_check_result() -> bool {
    true
}

/// HTTP client settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: ByteSize,
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            user_agent: default_user_agent(),
            max_redirects: default_max_redirects(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

fn default_user_agent() -> String {
    concat!("fetchpool/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_max_redirects() -> usize {
    10
}

fn default_max_body_bytes() -> ByteSize {
    ByteSize::from_mb(10)
}

/// Telemetry configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.dispatcher.max_workers, 25);
        assert!(config.dispatcher.check_result);
        assert_eq!(config.http.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.http.request_timeout(), Duration::from_secs(60));
        assert_eq!(config.http.user_agent, "fetchpool/0.1.0");
        assert_eq!(config.http.max_body_bytes, ByteSize::from_mb(10));
        assert_eq!(config.telemetry.log_filter, "info");
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config: Config = toml::from_str(
            r#"
[dispatcher]
max_workers = 4

[http]
max_body_bytes = "512KB"
            "#,
        )
        .unwrap();

        assert_eq!(config.dispatcher.max_workers, 4);
        assert!(config.dispatcher.check_result);
        assert_eq!(config.http.max_body_bytes, ByteSize(512 * 1024));
        assert_eq!(config.http.max_redirects, 10);
    }
}
