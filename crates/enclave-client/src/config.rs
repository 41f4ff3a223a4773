//! Configuration for the enclave key channel.
//!
//! All values are read from environment variables; every field has a safe
//! default so an unconfigured process gets the standard cache behaviour.

use anyhow::{Context, Result};
use serde::Deserialize;

/// Validated key-channel configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// TTL in seconds for cached plaintext column encryption keys.
    /// `0` disables the key cache entirely: every query re-decrypts.
    #[serde(default = "default_key_cache_ttl")]
    pub key_cache_ttl_secs: u64,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_key_cache_ttl() -> u64 {
    7200
}
fn default_log_level() -> String {
    "info".into()
}

impl Settings {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but cannot be parsed, or if
    /// validation fails.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let settings: Settings = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.log_level, "LOG_LEVEL")?;
        Ok(())
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} must not be empty");
    }
    Ok(())
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            key_cache_ttl_secs: default_key_cache_ttl(),
            log_level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_correct() {
        let settings = Settings::default();
        assert_eq!(settings.key_cache_ttl_secs, 7200);
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn zero_ttl_is_a_valid_setting() {
        // TTL 0 means "never cache plaintext keys", not a validation error.
        let settings = Settings {
            key_cache_ttl_secs: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_log_level() {
        let settings = Settings {
            log_level: "  ".into(),
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }
}
