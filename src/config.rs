//! Configuration loader and validator for the borrow service.
use crate::model::BorrowStatus;
use crate::notify::ESCALATION_BAND_SECS;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    #[serde(default)]
    pub borrow: BorrowPolicy,
    #[serde(default)]
    pub notify: Notify,
}

/// Process-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    #[serde(default)]
    pub database_url: Option<String>,
    pub sweep_interval_secs: u64,
    pub op_timeout_secs: u64,
}

/// Borrow workflow policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BorrowPolicy {
    #[serde(default = "default_initial_status")]
    pub initial_status: BorrowStatus,
    /// Reject status updates that move a record backwards in its lifecycle.
    /// Enforced by the update statement itself, so racing updates cannot slip past.
    #[serde(default = "default_true")]
    pub strict_transitions: bool,
    /// Reject creating a borrow for a book that still has an unreturned row.
    #[serde(default)]
    pub reject_books_on_loan: bool,
}

impl Default for BorrowPolicy {
    fn default() -> Self {
        Self {
            initial_status: default_initial_status(),
            strict_transitions: true,
            reject_books_on_loan: false,
        }
    }
}

/// Notification dispatch settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notify {
    /// Empty or absent means events are only logged.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

fn default_initial_status() -> BorrowStatus {
    BorrowStatus::Borrowed
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// `DATABASE_URL` wins over the configured URL, which wins over the default file.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .ok()
            .or_else(|| self.app.database_url.clone())
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| format!("sqlite://{}/borrowdesk.db", self.app.data_dir))
    }

    pub fn webhook_url(&self) -> Option<&str> {
        self.notify
            .webhook_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.sweep_interval_secs == 0 {
        return Err(ConfigError::Invalid("app.sweep_interval_secs must be > 0"));
    }
    if cfg.app.sweep_interval_secs > ESCALATION_BAND_SECS as u64 {
        return Err(ConfigError::Invalid(
            "app.sweep_interval_secs must not exceed the 216s escalation band",
        ));
    }
    if cfg.app.op_timeout_secs == 0 {
        return Err(ConfigError::Invalid("app.op_timeout_secs must be > 0"));
    }
    if cfg.borrow.initial_status == BorrowStatus::Returned {
        return Err(ConfigError::Invalid(
            "borrow.initial_status must be pending or borrowed",
        ));
    }
    if let Some(url) = cfg.webhook_url() {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid("notify.webhook_url must be an http(s) URL"));
        }
    }
    Ok(())
}

/// A complete, valid example document.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  sweep_interval_secs: 60
  op_timeout_secs: 30

borrow:
  initial_status: "borrowed"
  strict_transitions: true
  reject_books_on_loan: false

notify:
  webhook_url: ""
"#
}
