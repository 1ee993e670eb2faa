//! Daemon settings.
//!
//! Layered, later sources winning:
//! - built-in defaults
//! - `nurseryd.toml` in the working directory (optional)
//! - environment variables prefixed `NURSERYD__`, e.g. `NURSERYD__NOTIFICATIONS__MODE=disabled`

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    /// Workspace opened at startup, so callers can skip `workspace.select`.
    #[serde(default)]
    pub workspace: Option<PathBuf>,

    #[serde(default)]
    pub attendance: AttendanceSettings,

    #[serde(default)]
    pub notifications: NotificationSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttendanceSettings {
    /// Recorded on every `late` mark; the base flow never asks for the real value.
    #[serde(default = "default_late_minutes")]
    pub late_minutes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifierMode {
    Log,
    Disabled,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationSettings {
    #[serde(default = "default_notifier_mode")]
    pub mode: NotifierMode,

    /// Upper bound on a synchronous delivery (payment reminders).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl NotificationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// `EnvFilter` directive, e.g. `info` or `nurseryd=debug`.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

fn default_late_minutes() -> u32 {
    15
}

fn default_notifier_mode() -> NotifierMode {
    NotifierMode::Log
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AttendanceSettings {
    fn default() -> Self {
        Self {
            late_minutes: default_late_minutes(),
        }
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            mode: default_notifier_mode(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        // A missing .env is normal.
        let _ = dotenvy::dotenv();

        Config::builder()
            .add_source(File::with_name("nurseryd").required(false))
            .add_source(
                Environment::with_prefix("NURSERYD")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
