//! Configuration loading for the `wayfare` CLI.
//!
//! Configuration is loaded from a TOML file with the following resolution
//! order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.wayfare/config.toml` (user)
//! 3. built-in defaults
//!
//! The API key comes from `WAYFARE_API_KEY` when set, otherwise from
//! `[provider] api_key`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::lookup::LookupConfig;
use crate::optimizer::OptimizerConfig;
use crate::providers::places::DEFAULT_BASE_URL;
use crate::{Result, WayfareError};

/// Environment variable that overrides `[provider] api_key`.
pub const API_KEY_ENV: &str = "WAYFARE_API_KEY";

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub optimizer: OptimizerSection,
    #[serde(default)]
    pub lookup: LookupSection,
    #[serde(default)]
    pub provider: ProviderSection,
}

/// `[optimizer]`: rate limiting, coalescing and cache sizing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OptimizerSection {
    pub max_requests_per_minute: usize,
    /// Per-category overrides, e.g. `category_limits = { autocomplete = 100 }`.
    pub category_limits: HashMap<String, usize>,
    pub min_request_interval_ms: u64,
    pub poll_interval_ms: u64,
    pub in_flight_stale_after_ms: u64,
    pub sweep_interval_ms: u64,
    pub max_cache_entries: u64,
}

impl Default for OptimizerSection {
    fn default() -> Self {
        let d = OptimizerConfig::default();
        Self {
            max_requests_per_minute: d.max_requests_per_window,
            category_limits: HashMap::new(),
            min_request_interval_ms: d.min_request_interval.as_millis() as u64,
            poll_interval_ms: d.poll_interval.as_millis() as u64,
            in_flight_stale_after_ms: d.in_flight_stale_after.as_millis() as u64,
            sweep_interval_ms: d.sweep_interval.as_millis() as u64,
            max_cache_entries: d.max_cache_entries,
        }
    }
}

impl TryFrom<&OptimizerSection> for OptimizerConfig {
    type Error = WayfareError;

    /// Fails when a timer period is zero.
    fn try_from(s: &OptimizerSection) -> Result<Self> {
        let mut config = OptimizerConfig::new()
            .max_requests_per_window(s.max_requests_per_minute)
            .min_request_interval(Duration::from_millis(s.min_request_interval_ms))
            .poll_interval(Duration::from_millis(s.poll_interval_ms))
            .in_flight_stale_after(Duration::from_millis(s.in_flight_stale_after_ms))
            .sweep_interval(Duration::from_millis(s.sweep_interval_ms))
            .max_cache_entries(s.max_cache_entries);
        for (category, limit) in &s.category_limits {
            config = config.category_limit(category.clone(), *limit);
        }
        config.validate()?;
        Ok(config)
    }
}

/// `[lookup]`: per-category cache lifetimes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LookupSection {
    pub places_ttl_ms: u64,
    pub autocomplete_ttl_ms: u64,
    pub geocoding_ttl_ms: u64,
    pub min_autocomplete_chars: usize,
}

impl Default for LookupSection {
    fn default() -> Self {
        let d = LookupConfig::default();
        Self {
            places_ttl_ms: d.places_ttl.as_millis() as u64,
            autocomplete_ttl_ms: d.autocomplete_ttl.as_millis() as u64,
            geocoding_ttl_ms: d.geocoding_ttl.as_millis() as u64,
            min_autocomplete_chars: d.min_autocomplete_chars,
        }
    }
}

impl From<&LookupSection> for LookupConfig {
    fn from(s: &LookupSection) -> Self {
        LookupConfig::new()
            .places_ttl(Duration::from_millis(s.places_ttl_ms))
            .autocomplete_ttl(Duration::from_millis(s.autocomplete_ttl_ms))
            .geocoding_ttl(Duration::from_millis(s.geocoding_ttl_ms))
            .min_autocomplete_chars(s.min_autocomplete_chars)
    }
}

/// `[provider]`: places API endpoint and credentials.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            timeout_ms: 10_000,
        }
    }
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// An explicit path must exist. Without one, the user file is used if
    /// present, else defaults.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            WayfareError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            WayfareError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })?;
        config.optimizer_config()?;
        Ok(config)
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(WayfareError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        let user_config =
            dirs::home_dir().map(|home| home.join(".wayfare").join("config.toml"));
        Ok(user_config.filter(|p| p.exists()))
    }

    /// API key, preferring the environment over the file.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| self.provider.api_key.clone())
    }

    pub fn optimizer_config(&self) -> Result<OptimizerConfig> {
        OptimizerConfig::try_from(&self.optimizer)
    }

    pub fn lookup_config(&self) -> LookupConfig {
        (&self.lookup).into()
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_optimizer_defaults() {
        let config = Config::default();
        let optimizer = config.optimizer_config().unwrap();
        assert_eq!(optimizer.max_requests_per_window, 50);
        assert_eq!(optimizer.min_request_interval, Duration::from_millis(100));
        assert_eq!(optimizer.in_flight_stale_after, Duration::from_secs(5));
        assert_eq!(config.lookup_config().min_autocomplete_chars, 3);
        assert_eq!(config.provider.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn parse_partial_config_keeps_defaults() {
        let toml = r#"
            [optimizer]
            max_requests_per_minute = 20
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.optimizer.max_requests_per_minute, 20);
        assert_eq!(config.optimizer.poll_interval_ms, 200);
        assert_eq!(config.lookup.places_ttl_ms, 600_000);
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
            [optimizer]
            max_requests_per_minute = 30
            category_limits = { autocomplete = 120 }
            min_request_interval_ms = 50
            poll_interval_ms = 100
            in_flight_stale_after_ms = 10000
            sweep_interval_ms = 60000
            max_cache_entries = 500

            [lookup]
            places_ttl_ms = 1000
            autocomplete_ttl_ms = 2000
            geocoding_ttl_ms = 3000
            min_autocomplete_chars = 2

            [provider]
            base_url = "http://localhost:8080"
            api_key = "from-file"
            timeout_ms = 2500
        "#;
        let config: Config = toml::from_str(toml).unwrap();

        let optimizer = config.optimizer_config().unwrap();
        assert_eq!(optimizer.max_requests_per_window, 30);
        assert_eq!(optimizer.category_limits["autocomplete"], 120);
        assert_eq!(optimizer.in_flight_stale_after, Duration::from_secs(10));
        assert_eq!(optimizer.max_cache_entries, 500);

        let lookup = config.lookup_config();
        assert_eq!(lookup.autocomplete_ttl, Duration::from_secs(2));
        assert_eq!(lookup.min_autocomplete_chars, 2);

        assert_eq!(config.provider.base_url, "http://localhost:8080");
        assert_eq!(config.provider_timeout(), Duration::from_millis(2500));
    }

    #[test]
    fn zero_periods_are_rejected() {
        for field in ["sweep_interval_ms", "poll_interval_ms"] {
            let toml = format!("[optimizer]\n{field} = 0\n");
            let config: Config = toml::from_str(&toml).unwrap();
            let err = config.optimizer_config().unwrap_err();
            assert!(err.to_string().contains("must be non-zero"), "{field}: {err}");
        }
    }

    #[test]
    fn config_not_found_returns_error() {
        let result = Config::load(Some(Path::new("/nonexistent/wayfare.toml")));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Config file not found"));
    }
}
