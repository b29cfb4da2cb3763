//! Configuration: persisted at /etc/hostdash/config.toml
//!
//! Every field has a default, so a missing file or a partial one still
//! yields a usable configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

pub const DEFAULT_CONFIG_FILE: &str = "/etc/hostdash/config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Poll interval for host facts (uptime, users, processes)
    #[serde(default = "default_time_refresh")]
    pub time_refresh_ms: u64,
    /// Poll interval for slow-changing facts (disks, addresses)
    #[serde(default = "default_time_refresh_long")]
    pub time_refresh_long_ms: u64,
    /// Poll interval for charts; also the elapsed time used for counter rates
    #[serde(default = "default_time_refresh_net")]
    pub time_refresh_net_ms: u64,
    /// How long a single provider read may take before it counts as unavailable
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_ms: u64,

    /// Network interface to chart (default: first non-loopback)
    #[serde(default)]
    pub interface: Option<String>,
    /// Block device to chart (default: first physical disk)
    #[serde(default)]
    pub disk: Option<String>,

    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_username")]
    pub username: String,
    /// Argon2 PHC string (`hostdash --hash-password`); empty disables login
    #[serde(default)]
    pub password_hash: String,
    #[serde(default = "default_session_hours")]
    pub session_hours: u64,
}

fn default_time_refresh() -> u64 { 30_000 }
fn default_time_refresh_long() -> u64 { 120_000 }
fn default_time_refresh_net() -> u64 { 2_000 }
fn default_provider_timeout() -> u64 { 2_000 }
fn default_username() -> String { "admin".to_string() }
fn default_session_hours() -> u64 { 8 }

impl Default for Config {
    fn default() -> Self {
        Self {
            time_refresh_ms: default_time_refresh(),
            time_refresh_long_ms: default_time_refresh_long(),
            time_refresh_net_ms: default_time_refresh_net(),
            provider_timeout_ms: default_provider_timeout(),
            interface: None,
            disk: None,
            auth: AuthConfig::default(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            username: default_username(),
            password_hash: String::new(),
            session_hours: default_session_hours(),
        }
    }
}

impl Config {
    /// Seconds between chart polls, as used for rate derivation
    pub fn chart_interval_secs(&self) -> f64 {
        self.time_refresh_net_ms as f64 / 1000.0
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms.max(1))
    }

    pub fn session_lifetime(&self) -> Duration {
        Duration::from_secs(self.auth.session_hours.max(1).saturating_mul(3600))
    }

    pub fn auth_enabled(&self) -> bool {
        !self.auth.password_hash.trim().is_empty()
    }
}

pub fn parse_config(content: &str) -> Result<Config, String> {
    let config: Config = toml::from_str(content)
        .map_err(|e| format!("Failed to parse config: {}", e))?;
    if config.time_refresh_net_ms == 0 {
        return Err("time_refresh_net_ms must be greater than zero".to_string());
    }
    Ok(config)
}

/// Load the config file; a missing or broken file falls back to defaults
pub fn load_config(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(content) => match parse_config(&content) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                error!("{} ({}), using defaults", e, path.display());
                Config::default()
            }
        },
        Err(_) => {
            info!("No config at {}, using defaults", path.display());
            Config::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.time_refresh_ms, 30_000);
        assert_eq!(config.time_refresh_net_ms, 2_000);
        assert_eq!(config.chart_interval_secs(), 2.0);
        assert_eq!(config.auth.username, "admin");
        assert!(!config.auth_enabled());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = parse_config(
            r#"
            time_refresh_net_ms = 5000
            interface = "eth1"

            [auth]
            password_hash = "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHQ$aGFzaA"
            "#,
        )
        .unwrap();
        assert_eq!(config.chart_interval_secs(), 5.0);
        assert_eq!(config.interface.as_deref(), Some("eth1"));
        assert_eq!(config.time_refresh_long_ms, 120_000);
        assert_eq!(config.auth.session_hours, 8);
        assert!(config.auth_enabled());
        assert_eq!(config.session_lifetime(), Duration::from_secs(8 * 3600));
    }

    #[test]
    fn zero_chart_interval_is_rejected() {
        assert!(parse_config("time_refresh_net_ms = 0").is_err());
        assert!(parse_config("time_refresh_ms = \"soon\"").is_err());
    }

    #[test]
    fn huge_session_hours_saturate() {
        let config = parse_config("[auth]\nsession_hours = 9223372036854775807").unwrap();
        assert_eq!(config.session_lifetime(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn missing_file_falls_back() {
        let config = load_config(Path::new("/nonexistent/hostdash/config.toml"));
        assert_eq!(config.provider_timeout(), Duration::from_millis(2_000));
    }
}
