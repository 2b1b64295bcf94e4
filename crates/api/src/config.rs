//! Application configuration loaded from environment variables.

use std::time::Duration;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` — `text` or `json` (default: `text`)
/// - `DATABASE_URL` — PostgreSQL URL; unset keeps orders in memory
/// - `PRODUCT_SERVICE_URL` — default: `"http://localhost:4001"`
/// - `PAYMENT_SERVICE_URL` — default: `"http://localhost:4003"`
/// - `ALLOW_STATUS_OVERRIDE` — enables `PATCH /orders/:id` (default: `true`)
/// - `COLLABORATOR_RETRY_DELAY_MS` — linear backoff unit (default: `200`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub product_service_url: String,
    pub payment_service_url: String,
    pub allow_status_override: bool,
    pub collaborator_retry_delay: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            host: non_empty("HOST").unwrap_or(defaults.host),
            port: non_empty("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: non_empty("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match non_empty("LOG_FORMAT") {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => defaults.log_format,
            },
            database_url: non_empty("DATABASE_URL"),
            product_service_url: non_empty("PRODUCT_SERVICE_URL")
                .unwrap_or(defaults.product_service_url),
            payment_service_url: non_empty("PAYMENT_SERVICE_URL")
                .unwrap_or(defaults.payment_service_url),
            allow_status_override: non_empty("ALLOW_STATUS_OVERRIDE")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.allow_status_override),
            collaborator_retry_delay: non_empty("COLLABORATOR_RETRY_DELAY_MS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.collaborator_retry_delay),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            product_service_url: "http://localhost:4001".to_string(),
            payment_service_url: "http://localhost:4003".to_string(),
            allow_status_override: true,
            collaborator_retry_delay: Duration::from_millis(200),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.database_url.is_none());
        assert!(config.allow_status_override);
        assert_eq!(config.collaborator_retry_delay, Duration::from_millis(200));
    }

    #[test]
    fn test_empty_environment_gives_defaults() {
        let config = from_pairs(&[]);
        assert_eq!(config.addr(), "0.0.0.0:3000");
        assert_eq!(config.product_service_url, "http://localhost:4001");
        assert_eq!(config.payment_service_url, "http://localhost:4003");
    }

    #[test]
    fn test_values_are_read() {
        let config = from_pairs(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/orders"),
            ("PRODUCT_SERVICE_URL", "http://product:4001"),
            ("ALLOW_STATUS_OVERRIDE", "false"),
            ("COLLABORATOR_RETRY_DELAY_MS", "50"),
        ]);
        assert_eq!(config.addr(), "127.0.0.1:8080");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/orders"));
        assert_eq!(config.product_service_url, "http://product:4001");
        assert!(!config.allow_status_override);
        assert_eq!(config.collaborator_retry_delay, Duration::from_millis(50));
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let config = from_pairs(&[("PORT", "http"), ("COLLABORATOR_RETRY_DELAY_MS", "-1")]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.collaborator_retry_delay, Duration::from_millis(200));
    }

    #[test]
    fn test_blank_database_url_means_memory() {
        let config = from_pairs(&[("DATABASE_URL", "  ")]);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_override_flag_values() {
        for (value, expected) in [("0", false), ("off", false), ("1", true), ("yes", true)] {
            let config = from_pairs(&[("ALLOW_STATUS_OVERRIDE", value)]);
            assert_eq!(config.allow_status_override, expected, "value {value}");
        }
    }
}
