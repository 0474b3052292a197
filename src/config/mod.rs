//! Configuration module - environment variable parsing

use std::env;

use crate::error::ConfigError;

/// Collector configuration loaded from environment variables (§6)
#[derive(Clone, Debug)]
pub struct Settings {
    /// UDP port the Ingress binds to
    pub ingress_port: u16,
    /// Dev-mode auto-registration of unknown senders
    pub skip_auth: bool,
    /// Whether bot-authored events are persisted and acted upon
    pub log_bots: bool,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Database connection string (opaque to the core; consumed by the Store adapter).
    /// Unset when running against the in-memory `Store` (no production adapter ships in this crate).
    pub database_url: Option<String>,
    /// Grace period for draining in-flight workers on shutdown
    pub grace_period_secs: u64,
}

impl Settings {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let ingress_port = match env::var("INGRESS_PORT") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                name: "INGRESS_PORT",
                value: raw,
            })?,
            Err(_) => 27500,
        };

        let skip_auth = parse_bool_env("SKIP_AUTH")?.unwrap_or(false);
        let log_bots = parse_bool_env("LOG_BOTS")?.unwrap_or(false);

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let database_url = env::var("DATABASE_URL").ok();

        let grace_period_secs = match env::var("SHUTDOWN_GRACE_SECS") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                name: "SHUTDOWN_GRACE_SECS",
                value: raw,
            })?,
            Err(_) => 5,
        };

        Ok(Self {
            ingress_port,
            skip_auth,
            log_bots,
            log_level,
            database_url,
            grace_period_secs,
        })
    }
}

fn parse_bool_env(name: &'static str) -> Result<Option<bool>, ConfigError> {
    match env::var(name) {
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidValue { name, value: raw }),
        },
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_env_accepts_common_spellings() {
        std::env::set_var("HLSTATSD_TEST_FLAG_TRUE", "yes");
        std::env::set_var("HLSTATSD_TEST_FLAG_FALSE", "0");
        assert_eq!(
            parse_bool_env("HLSTATSD_TEST_FLAG_TRUE").unwrap(),
            Some(true)
        );
        assert_eq!(
            parse_bool_env("HLSTATSD_TEST_FLAG_FALSE").unwrap(),
            Some(false)
        );
        std::env::remove_var("HLSTATSD_TEST_FLAG_TRUE");
        std::env::remove_var("HLSTATSD_TEST_FLAG_FALSE");
    }

    #[test]
    fn parse_bool_env_rejects_garbage() {
        std::env::set_var("HLSTATSD_TEST_FLAG_BAD", "maybe");
        assert!(parse_bool_env("HLSTATSD_TEST_FLAG_BAD").is_err());
        std::env::remove_var("HLSTATSD_TEST_FLAG_BAD");
    }
}
