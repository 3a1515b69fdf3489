//! Configuration management for Outpost.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::Path;

use questline_common::TotpParams;
use questline_common::constants::{
    DEFAULT_DIGITS, DEFAULT_HISTORY_PER_PAGE, DEFAULT_LISTEN_ADDR, DEFAULT_REDIS_URL,
    DEFAULT_SECRET_LENGTH, DEFAULT_TIME_STEP_SECS, DEFAULT_WINDOW, DISPLAY_REQUESTS_PER_MINUTE,
    MAX_DIGITS, MAX_HISTORY_PER_PAGE, MAX_WINDOW,
};

/// Environment variable prefix (`OUTPOST__TOTP__WINDOW=2`)
const ENV_PREFIX: &str = "OUTPOST";

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Token required on `/admin` routes (admin API disabled when unset)
    #[serde(default)]
    pub admin_token: Option<String>,

    /// One-time code configuration
    #[serde(default)]
    pub totp: TotpConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Mission history paging
    #[serde(default)]
    pub history: HistoryConfig,
}

/// One-time code configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TotpConfig {
    /// Step length in seconds
    #[serde(default = "default_time_step")]
    pub time_step_secs: u64,

    /// Adjacent steps accepted on each side of the current one
    #[serde(default = "default_window")]
    pub window: u32,

    /// Code length
    #[serde(default = "default_digits")]
    pub digits: u32,

    /// Base32 symbols in newly issued secrets
    #[serde(default = "default_secret_length")]
    pub secret_length: usize,
}

impl Default for TotpConfig {
    fn default() -> Self {
        Self {
            time_step_secs: default_time_step(),
            window: default_window(),
            digits: default_digits(),
            secret_length: default_secret_length(),
        }
    }
}

impl TotpConfig {
    pub fn params(&self) -> TotpParams {
        TotpParams {
            time_step: self.time_step_secs,
            digits: self.digits,
            window: self.window,
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Live code display requests per client per minute
    #[serde(default = "default_display_requests")]
    pub display_requests_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            display_requests_per_minute: default_display_requests(),
        }
    }
}

/// Mission history paging
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_per_page")]
    pub default_per_page: u32,

    #[serde(default = "default_max_per_page")]
    pub max_per_page: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            default_per_page: default_per_page(),
            max_per_page: default_max_per_page(),
        }
    }
}

impl HistoryConfig {
    /// Resolve requested paging to `(page, per_page)`, both at least 1
    pub fn clamp(&self, page: Option<u32>, per_page: Option<u32>) -> (u32, u32) {
        let page = page.unwrap_or(1).max(1);
        let per_page = per_page
            .filter(|&n| n > 0)
            .unwrap_or(self.default_per_page)
            .clamp(1, self.max_per_page.max(1));
        (page, per_page)
    }
}

// Default value functions
fn default_redis_url() -> String { DEFAULT_REDIS_URL.to_string() }
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_time_step() -> u64 { DEFAULT_TIME_STEP_SECS } // 15 minutes
fn default_window() -> u32 { DEFAULT_WINDOW }
fn default_digits() -> u32 { DEFAULT_DIGITS }
fn default_secret_length() -> usize { DEFAULT_SECRET_LENGTH }
fn default_display_requests() -> u32 { DISPLAY_REQUESTS_PER_MINUTE }
fn default_per_page() -> u32 { DEFAULT_HISTORY_PER_PAGE }
fn default_max_per_page() -> u32 { MAX_HISTORY_PER_PAGE }

impl AppConfig {
    /// Load configuration from file and environment, with CLI overrides
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        let mut builder = config::Config::builder();

        if Path::new(config_path).exists() {
            builder = builder.add_source(config::File::with_name(config_path));
        } else {
            // Use defaults if config file doesn't exist
            tracing::warn!(path = %config_path, "Config file not found, using defaults");
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to load config")?;

        let mut config: AppConfig = settings
            .try_deserialize()
            .context("Failed to parse config")?;

        // Apply CLI overrides
        if let Some(ref redis_url) = args.redis_url {
            config.redis_url = redis_url.clone();
        }
        if let Some(ref listen) = args.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(ref token) = args.admin_token {
            config.admin_token = Some(token.clone());
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the TOTP engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.totp.time_step_secs == 0 {
            bail!("totp.time_step_secs must be greater than zero");
        }
        if i64::try_from(self.totp.time_step_secs).is_err() {
            bail!("totp.time_step_secs is too large");
        }
        if self.totp.window > MAX_WINDOW {
            bail!("totp.window must be at most {}", MAX_WINDOW);
        }
        if self.totp.digits == 0 || self.totp.digits > MAX_DIGITS {
            bail!("totp.digits must be between 1 and {}", MAX_DIGITS);
        }
        if self.totp.secret_length < DEFAULT_SECRET_LENGTH {
            bail!(
                "totp.secret_length must be at least {} symbols",
                DEFAULT_SECRET_LENGTH
            );
        }
        if self.admin_token.as_deref().is_some_and(|t| t.trim().is_empty()) {
            bail!("admin_token must not be blank");
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            listen_addr: default_listen_addr(),
            admin_token: None,
            totp: TotpConfig::default(),
            rate_limit: RateLimitConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_engine_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.totp.params(), TotpParams::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unusable_totp() {
        let mut config = AppConfig::default();
        config.totp.time_step_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.totp.digits = 11;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.totp.secret_length = 8;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.admin_token = Some("  ".to_string());
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.totp.time_step_secs = u64::MAX;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_caps_window() {
        let mut config = AppConfig::default();
        config.totp.window = MAX_WINDOW;
        assert!(config.validate().is_ok());

        config.totp.window = MAX_WINDOW + 1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("totp.window"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(
                "listen_addr = \"0.0.0.0:9000\"\n[totp]\nwindow = 2\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let config: AppConfig = settings.try_deserialize().unwrap();

        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.totp.window, 2);
        assert_eq!(config.totp.time_step_secs, DEFAULT_TIME_STEP_SECS);
        assert_eq!(config.rate_limit.display_requests_per_minute, 60);
        assert!(config.admin_token.is_none());
    }

    #[test]
    fn test_history_clamp() {
        let history = HistoryConfig::default();
        assert_eq!(history.clamp(None, None), (1, 20));
        assert_eq!(history.clamp(Some(0), Some(0)), (1, 20));
        assert_eq!(history.clamp(Some(3), Some(500)), (3, 50));
        assert_eq!(history.clamp(Some(2), Some(5)), (2, 5));
    }
}
