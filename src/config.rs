//! Configuration management for modwatch.
//!
//! This module handles loading and validating environment variables and application settings.

use std::collections::BTreeSet;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::{ModwatchError, Result};
use crate::version::normalize_runtime_version;

const DEFAULT_PORTAL_API_URL: &str = "https://mods.factorio.com/api";
const DEFAULT_PORTAL_URL: &str = "https://mods.factorio.com";
const DEFAULT_ASSETS_URL: &str = "https://assets-mod.factorio.com";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
const DEFAULT_LOOKBACK_HOURS: i64 = 24;
const DEFAULT_RUNTIME_VERSION: &str = "2.0";
const DEFAULT_STATE_READ_ATTEMPTS: u32 = 3;

/// Where persisted state lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateBackend {
    /// One JSON file per key under `STATE_DIR`
    Json,
    /// A key-value table in the SQLite database at `DB_PATH`
    Sqlite,
}

impl FromStr for StateBackend {
    type Err = ModwatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(ModwatchError::Config(format!(
                "Invalid STATE_BACKEND '{}'. Expected 'json' or 'sqlite'.",
                other
            ))),
        }
    }
}

/// Configuration for the application, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Discord bot token
    pub discord_token: String,
    pub state_backend: StateBackend,
    /// Directory of the JSON state files
    pub state_dir: String,
    /// Path to SQLite database file
    pub db_path: String,
    /// Base URL of the mod portal API
    pub portal_api_url: String,
    /// Base URL of the mod portal website, used in links
    pub portal_url: String,
    /// Base URL of the thumbnail host
    pub assets_url: String,
    /// Delay between update cycles
    pub poll_interval: Duration,
    /// How long failed detail fetches are retried
    pub lookback: chrono::Duration,
    /// Runtime version used when a command does not name one
    pub default_runtime_version: String,
    /// Optional allowlist of runtime versions that get their own bucket
    pub known_runtime_versions: Option<BTreeSet<String>>,
    /// Attempts at decoding persisted state before giving up
    pub state_read_attempts: u32,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This will attempt to load a .env file if present using dotenv,
    /// then read the environment. Only `DISCORD_TOKEN` is required.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is missing or any variable is invalid.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use modwatch::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load configuration");
    /// println!("Polling {} every {:?}", config.portal_api_url, config.poll_interval);
    /// ```
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (ignore errors - it's optional)
        dotenv::dotenv().ok();

        let discord_token = env::var("DISCORD_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ModwatchError::Config(
                "Missing DISCORD_TOKEN environment variable. Set it in your environment or create a .env file (never commit this file).".to_string()
            ))?;

        let state_backend = match env::var("STATE_BACKEND") {
            Ok(raw) => raw.parse()?,
            Err(_) => StateBackend::Json,
        };
        let state_dir = env::var("STATE_DIR").unwrap_or_else(|_| "data".to_string());
        let db_path = Self::get_db_path()?;

        let portal_api_url = env::var("PORTAL_API_URL").unwrap_or_else(|_| DEFAULT_PORTAL_API_URL.to_string());
        Self::validate_http_url("PORTAL_API_URL", &portal_api_url)?;
        let portal_url = env::var("PORTAL_URL").unwrap_or_else(|_| DEFAULT_PORTAL_URL.to_string());
        Self::validate_http_url("PORTAL_URL", &portal_url)?;
        let assets_url = env::var("ASSETS_URL").unwrap_or_else(|_| DEFAULT_ASSETS_URL.to_string());
        Self::validate_http_url("ASSETS_URL", &assets_url)?;

        let poll_secs = Self::parse_positive("POLL_INTERVAL_SECS", env::var("POLL_INTERVAL_SECS").ok(), DEFAULT_POLL_INTERVAL_SECS)?;
        let lookback_hours = Self::parse_positive("LOOKBACK_HOURS", env::var("LOOKBACK_HOURS").ok(), DEFAULT_LOOKBACK_HOURS)?;
        let state_read_attempts = Self::parse_positive(
            "STATE_READ_ATTEMPTS",
            env::var("STATE_READ_ATTEMPTS").ok(),
            DEFAULT_STATE_READ_ATTEMPTS,
        )?;

        let default_runtime_version = match env::var("DEFAULT_RUNTIME_VERSION") {
            Ok(raw) => normalize_runtime_version(raw.trim()).ok_or_else(|| ModwatchError::Config(
                format!("Invalid DEFAULT_RUNTIME_VERSION '{}'. Expected a version like '2.0'.", raw)
            ))?,
            Err(_) => DEFAULT_RUNTIME_VERSION.to_string(),
        };
        let known_runtime_versions = match env::var("KNOWN_RUNTIME_VERSIONS") {
            Ok(raw) => Self::parse_version_list(&raw)?,
            Err(_) => None,
        };

        Ok(Self {
            discord_token,
            state_backend,
            state_dir,
            db_path,
            portal_api_url,
            portal_url,
            assets_url,
            poll_interval: Duration::from_secs(poll_secs),
            lookback: chrono::Duration::hours(lookback_hours),
            default_runtime_version,
            known_runtime_versions,
            state_read_attempts,
        })
    }

    /// Get the database path from environment or use default.
    fn get_db_path() -> Result<String> {
        match env::var("DB_PATH") {
            Ok(path) => Ok(path),
            Err(_) => {
                let mut path = env::current_dir()
                    .map_err(|e| ModwatchError::Config(
                        format!("Failed to determine current directory: {}", e)
                    ))?;

                path.push("data");
                path.push("modwatch.db");

                path.into_os_string()
                    .into_string()
                    .map_err(|os_str| ModwatchError::Config(
                        format!("Database path contains invalid Unicode: {:?}", os_str)
                    ))
            }
        }
    }

    /// Validate a base URL using proper URL parsing.
    fn validate_http_url(name: &str, url_str: &str) -> Result<()> {
        let parsed_url = Url::parse(url_str)
            .map_err(|e| ModwatchError::Config(
                format!("Invalid {} '{}': {}", name, url_str, e)
            ))?;

        // Ensure it's HTTP or HTTPS
        let scheme = parsed_url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(ModwatchError::Config(
                format!("{} must use http:// or https:// scheme, got: '{}'", name, scheme)
            ));
        }

        if parsed_url.host_str().is_none() {
            return Err(ModwatchError::Config(
                format!("{} must contain a valid host: '{}'", name, url_str)
            ));
        }

        Ok(())
    }

    /// Parse a strictly positive number, falling back to `default` when unset.
    fn parse_positive<T>(name: &str, raw: Option<String>, default: T) -> Result<T>
    where
        T: FromStr + PartialOrd + Default,
    {
        let Some(raw) = raw else {
            return Ok(default);
        };
        match raw.trim().parse::<T>() {
            Ok(value) if value > T::default() => Ok(value),
            _ => Err(ModwatchError::Config(
                format!("Invalid {} '{}'. Expected a positive whole number.", name, raw)
            )),
        }
    }

    /// Parse a comma-separated version list. An empty list means no allowlist.
    fn parse_version_list(raw: &str) -> Result<Option<BTreeSet<String>>> {
        let mut versions = BTreeSet::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let version = normalize_runtime_version(part).ok_or_else(|| ModwatchError::Config(
                format!("Invalid version '{}' in KNOWN_RUNTIME_VERSIONS", part)
            ))?;
            versions.insert(version);
        }
        Ok(if versions.is_empty() { None } else { Some(versions) })
    }
}
