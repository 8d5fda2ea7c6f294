//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/devpulse/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/devpulse/` (~/.config/devpulse/)
//! - Data: `$XDG_DATA_HOME/devpulse/` (~/.local/share/devpulse/)
//! - State/Logs: `$XDG_STATE_HOME/devpulse/` (~/.local/state/devpulse/)

use crate::error::{Error, Result};
use crate::types::Source;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug)]
pub struct Config {
    /// Database location override
    pub database: DatabaseConfig,

    /// Polling scheduler settings
    pub polling: PollingConfig,

    /// GitHub credentials and endpoint
    pub github: ProviderConfig,

    /// GitLab credentials and endpoint
    pub gitlab: ProviderConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Database location
#[derive(Debug, Deserialize, Default)]
pub struct DatabaseConfig {
    /// Path to the SQLite file (default: XDG data dir)
    pub path: Option<PathBuf>,
}

/// Polling scheduler configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    /// Minutes between poll cycles. Absent means polling is disabled.
    pub interval_minutes: Option<u64>,

    /// How far back each cycle looks for commits and merged requests
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u64,

    /// Upper bound for a single provider scan
    #[serde(default = "default_scan_timeout")]
    pub scan_timeout_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_minutes: None,
            lookback_hours: default_lookback_hours(),
            scan_timeout_secs: default_scan_timeout(),
        }
    }
}

impl PollingConfig {
    /// Interval between cycles, or `None` when polling is disabled.
    pub fn interval(&self) -> Option<Duration> {
        self.interval_minutes
            .map(|m| Duration::from_secs(m.saturating_mul(60)))
    }

    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::try_from(self.lookback_hours).unwrap_or(i64::MAX / 3600))
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }
}

fn default_lookback_hours() -> u64 {
    24
}

fn default_scan_timeout() -> u64 {
    300
}

/// Credentials and API endpoint for one source platform
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Personal access token (falls back to `token_env`)
    pub token: Option<String>,

    /// REST API base URL
    pub api_url: String,

    /// Environment variable consulted when `token` is not set
    pub token_env: String,

    /// HTTP request timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Default)]
struct ProviderConfigFile {
    token: Option<String>,
    api_url: Option<String>,
    token_env: Option<String>,
    timeout_secs: Option<u64>,
}

impl ProviderConfig {
    /// Defaults for github.com
    pub fn github() -> Self {
        Self {
            token: None,
            api_url: "https://api.github.com".to_string(),
            token_env: "GITHUB_PAT".to_string(),
            timeout_secs: default_request_timeout(),
        }
    }

    /// Defaults for gitlab.com
    pub fn gitlab() -> Self {
        Self {
            token: None,
            api_url: "https://gitlab.com/api/v4".to_string(),
            token_env: "GITLAB_PAT".to_string(),
            timeout_secs: default_request_timeout(),
        }
    }

    fn defaults_for(source: Source) -> Self {
        match source {
            Source::Gitlab => Self::gitlab(),
            _ => Self::github(),
        }
    }

    fn merge_file(source: Source, file: ProviderConfigFile) -> Self {
        let defaults = Self::defaults_for(source);
        Self {
            token: file.token,
            api_url: file.api_url.unwrap_or(defaults.api_url),
            token_env: file.token_env.unwrap_or(defaults.token_env),
            timeout_secs: file.timeout_secs.unwrap_or(defaults.timeout_secs),
        }
    }

    /// Resolve the token from config or the environment.
    ///
    /// Empty values count as unset.
    pub fn resolved_token(&self) -> Option<String> {
        self.token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| {
                std::env::var(&self.token_env)
                    .ok()
                    .filter(|t| !t.trim().is_empty())
            })
    }

    /// True when a credential is available.
    pub fn is_configured(&self) -> bool {
        self.resolved_token().is_some()
    }
}

fn default_request_timeout() -> u64 {
    30
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

/// Raw file layout; provider sections are merged onto per-platform defaults.
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    database: DatabaseConfig,
    #[serde(default)]
    polling: PollingConfig,
    github: Option<ProviderConfigFile>,
    gitlab: Option<ProviderConfigFile>,
    #[serde(default)]
    logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            polling: PollingConfig::default(),
            github: ProviderConfig::github(),
            gitlab: ProviderConfig::gitlab(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(Self {
            database: file.database,
            polling: file.polling,
            github: file
                .github
                .map(|f| ProviderConfig::merge_file(Source::Github, f))
                .unwrap_or_else(ProviderConfig::github),
            gitlab: file
                .gitlab
                .map(|f| ProviderConfig::merge_file(Source::Gitlab, f))
                .unwrap_or_else(ProviderConfig::gitlab),
            logging: file.logging,
        })
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.polling.interval_minutes == Some(0) {
            return Err(Error::Config(
                "polling.interval_minutes must be greater than 0 (omit it to disable polling)"
                    .to_string(),
            ));
        }
        if self.polling.lookback_hours == 0 {
            return Err(Error::Config(
                "polling.lookback_hours must be greater than 0".to_string(),
            ));
        }
        if self.polling.scan_timeout_secs == 0 {
            return Err(Error::Config(
                "polling.scan_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Provider settings for a source platform.
    pub fn provider(&self, source: Source) -> Option<&ProviderConfig> {
        match source {
            Source::Github => Some(&self.github),
            Source::Gitlab => Some(&self.gitlab),
            Source::Manual => None,
        }
    }

    /// Database path: the configured override or the XDG default.
    pub fn resolved_database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(Self::database_path)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/devpulse/config.toml` (~/.config/devpulse/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("devpulse").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    ///
    /// `$XDG_DATA_HOME/devpulse/` (~/.local/share/devpulse/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("devpulse")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/devpulse/` (~/.local/state/devpulse/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("devpulse")
    }

    /// Returns the default database file path
    ///
    /// `$XDG_DATA_HOME/devpulse/events.db` (~/.local/share/devpulse/events.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("events.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.polling.interval().is_none());
        assert_eq!(config.polling.lookback_hours, 24);
        assert_eq!(config.polling.scan_timeout_secs, 300);
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.gitlab.api_url, "https://gitlab.com/api/v4");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[polling]
interval_minutes = 15
lookback_hours = 48

[github]
token = "ghp_test"

[gitlab]
api_url = "https://gitlab.example.com/api/v4"

[logging]
level = "debug"
"#;
        let config = Config::parse(toml).unwrap();

        assert_eq!(
            config.polling.interval(),
            Some(Duration::from_secs(15 * 60))
        );
        assert_eq!(config.polling.lookback(), chrono::Duration::hours(48));
        assert_eq!(config.github.resolved_token().as_deref(), Some("ghp_test"));
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.gitlab.api_url, "https://gitlab.example.com/api/v4");
        assert_eq!(config.gitlab.token_env, "GITLAB_PAT");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = Config::parse("[polling]\ninterval_minutes = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_lookback_rejected() {
        let config = Config::parse("[polling]\nlookback_hours = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_token_falls_back_to_env() {
        let provider = ProviderConfig {
            token_env: "DEVPULSE_TEST_TOKEN_FALLBACK".to_string(),
            ..ProviderConfig::github()
        };
        assert!(!provider.is_configured());

        std::env::set_var("DEVPULSE_TEST_TOKEN_FALLBACK", "from-env");
        assert_eq!(provider.resolved_token().as_deref(), Some("from-env"));
        std::env::remove_var("DEVPULSE_TEST_TOKEN_FALLBACK");
    }

    #[test]
    fn test_blank_token_is_unconfigured() {
        let provider = ProviderConfig {
            token: Some("   ".to_string()),
            token_env: "DEVPULSE_TEST_TOKEN_UNSET".to_string(),
            ..ProviderConfig::gitlab()
        };
        assert!(!provider.is_configured());
    }

    #[test]
    fn test_provider_lookup() {
        let config = Config::default();
        assert!(config.provider(Source::Github).is_some());
        assert!(config.provider(Source::Manual).is_none());
    }
}
