//! Remindr configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RemindrError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RemindrConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub email: EmailChannelConfig,
    #[serde(default)]
    pub webhook: WebhookChannelConfig,
}

impl RemindrConfig {
    /// Load config from the default path (~/.remindr/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            let mut config = Self::default();
            config.apply_env();
            Ok(config)
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RemindrError::Config(format!("Failed to read config: {e}")))?;
        let mut config: Self = toml::from_str(&content)
            .map_err(|e| RemindrError::Config(format!("Failed to parse config: {e}")))?;
        config.apply_env();
        config.scheduler.validate()?;
        Ok(config)
    }

    /// Save config to the given path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| RemindrError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Secrets may come from the environment instead of the file.
    fn apply_env(&mut self) {
        match std::env::var("REMINDR_SMTP_PASSWORD") {
            Ok(password) if !password.is_empty() => self.email.password = password,
            _ => {}
        }
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Remindr home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".remindr")
    }
}

/// Timing of the reminder loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Minutes before start_time at which a reminder is due.
    #[serde(default = "default_lead_minutes")]
    pub lead_minutes: u32,
    /// Extra lookahead so consecutive windows overlap instead of leaving gaps.
    #[serde(default = "default_margin_minutes")]
    pub margin_minutes: u32,
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Pause between two sends within one cycle.
    #[serde(default = "default_dispatch_delay")]
    pub dispatch_delay_ms: u64,
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,
}

fn default_lead_minutes() -> u32 { 5 }
fn default_margin_minutes() -> u32 { 1 }
fn default_tick_interval() -> u64 { 60 }
fn default_dispatch_delay() -> u64 { 1000 }
fn default_send_timeout() -> u64 { 30 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lead_minutes: default_lead_minutes(),
            margin_minutes: default_margin_minutes(),
            tick_interval_secs: default_tick_interval(),
            dispatch_delay_ms: default_dispatch_delay(),
            send_timeout_secs: default_send_timeout(),
        }
    }
}

impl SchedulerConfig {
    /// Reject timings that would leave gaps between windows.
    pub fn validate(&self) -> Result<()> {
        if self.lead_minutes == 0 {
            return Err(RemindrError::config("scheduler.lead_minutes must be at least 1"));
        }
        if self.tick_interval_secs == 0 {
            return Err(RemindrError::config("scheduler.tick_interval_secs must be at least 1"));
        }
        if self.tick_interval_secs > u64::from(self.margin_minutes) * 60 {
            return Err(RemindrError::config(format!(
                "scheduler.tick_interval_secs ({}) must not exceed margin_minutes ({}) in seconds",
                self.tick_interval_secs, self.margin_minutes
            )));
        }
        if self.send_timeout_secs == 0 {
            return Err(RemindrError::config("scheduler.send_timeout_secs must be at least 1"));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.tick_interval_secs)
    }

    pub fn dispatch_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.dispatch_delay_ms)
    }

    pub fn send_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.send_timeout_secs)
    }

    pub fn lead(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.lead_minutes))
    }

    pub fn margin(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.margin_minutes))
    }
}

/// SQLite database location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String { "~/.remindr/remindr.db".into() }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

impl DatabaseConfig {
    /// Path with `~` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).to_string())
    }
}

/// How times are rendered inside notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default = "default_time_format")]
    pub time_format: String,
}

fn default_time_format() -> String { "%A, %B %-d %Y at %H:%M".into() }

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            time_format: default_time_format(),
        }
    }
}

/// SMTP outbound channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailChannelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub from_address: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

fn default_smtp_port() -> u16 { 587 }

impl Default for EmailChannelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from_address: String::new(),
            display_name: None,
        }
    }
}

/// HTTP webhook outbound channel.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WebhookChannelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RemindrConfig::default();
        assert_eq!(config.scheduler.lead_minutes, 5);
        assert_eq!(config.scheduler.margin_minutes, 1);
        assert_eq!(config.scheduler.tick_interval_secs, 60);
        assert_eq!(config.scheduler.dispatch_delay_ms, 1000);
        assert!(config.scheduler.validate().is_ok());
        assert!(!config.email.enabled);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [scheduler]
            lead_minutes = 10
            margin_minutes = 2
            tick_interval_secs = 90

            [display]
            utc_offset_minutes = 420

            [email]
            enabled = true
            smtp_host = "smtp.example.com"
            from_address = "bot@example.com"
        "#;

        let config: RemindrConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.scheduler.lead_minutes, 10);
        assert_eq!(config.scheduler.dispatch_delay_ms, 1000);
        assert_eq!(config.display.utc_offset_minutes, 420);
        assert_eq!(config.email.smtp_port, 587);
        assert!(config.scheduler.validate().is_ok());
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config: RemindrConfig = toml::from_str("").unwrap();
        assert_eq!(config.scheduler.send_timeout_secs, 30);
        assert_eq!(config.database.path, "~/.remindr/remindr.db");
    }

    #[test]
    fn test_tick_longer_than_margin_rejected() {
        let sched = SchedulerConfig {
            tick_interval_secs: 61,
            ..SchedulerConfig::default()
        };
        assert!(matches!(sched.validate(), Err(RemindrError::Config(_))));
    }

    #[test]
    fn test_zero_lead_rejected() {
        let sched = SchedulerConfig {
            lead_minutes: 0,
            ..SchedulerConfig::default()
        };
        assert!(sched.validate().is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = RemindrConfig::default();
        config.scheduler.lead_minutes = 15;
        config.save_to(&path).unwrap();

        let loaded = RemindrConfig::load_from(&path).unwrap();
        assert_eq!(loaded.scheduler.lead_minutes, 15);
    }

    #[test]
    fn test_home_dir() {
        let home = RemindrConfig::home_dir();
        assert!(home.to_string_lossy().contains("remindr"));
    }
}
