use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

const DEFAULT_CONFIG_NAME: &str = "k6-notify.toml";

pub const DEFAULT_SUMMARY_PATH: &str = "summary.json";
pub const DEFAULT_SLACK_API_URL: &str = "https://slack.com/api/chat.postMessage";

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub summary_path: PathBuf,
    pub slack: SlackSettings,
    pub dashboard: DashboardSettings,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SlackSettings {
    pub api_url: String,
    /// Upper bound for the single delivery attempt
    pub timeout_secs: u64,
}

/// Offsets used to widen the dashboard time window around the run.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DashboardSettings {
    /// Lag between k6 finishing and its metrics landing in the datasource
    pub delay_ms: i64,
    pub padding_ms: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            summary_path: PathBuf::from(DEFAULT_SUMMARY_PATH),
            slack: SlackSettings::default(),
            dashboard: DashboardSettings::default(),
        }
    }
}

impl Default for SlackSettings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_SLACK_API_URL.to_string(),
            timeout_secs: 10,
        }
    }
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            delay_ms: 15_000,
            padding_ms: 30_000,
        }
    }
}

impl SlackSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Load configuration from an explicit path, or search upward from current dir,
    /// then the user config dir. Falls back to defaults when nothing is found.
    pub fn load(path_override: Option<PathBuf>) -> Result<Self> {
        let path = match path_override {
            Some(p) => p,
            None => match find_upwards(DEFAULT_CONFIG_NAME).or_else(user_config_file) {
                Some(p) => p,
                None => {
                    debug!("no {DEFAULT_CONFIG_NAME} found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        debug!("loading config from {}", path.display());
        Self::from_file(&path)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Reading config file {}", path.display()))?;
        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Parsing TOML config {}", path.display()))?;
        Ok(cfg)
    }
}

fn find_upwards(file_name: &str) -> Option<PathBuf> {
    let mut dir = std::env::current_dir().ok()?;
    loop {
        let candidate = dir.join(file_name);
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            break;
        }
    }
    None
}

fn user_config_file() -> Option<PathBuf> {
    let candidate = dirs::config_dir()?.join("k6-notify").join("config.toml");
    candidate.exists().then_some(candidate)
}
