use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::mail::gmail::GMAIL_API_BASE;

pub const DEFAULT_SCOPE: &str = "https://mail.google.com/";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Provider-issued client configuration (credentials.json).
    pub client_secrets_path: Option<PathBuf>,
    /// Where the account's credential is cached.
    pub token_cache_path: Option<PathBuf>,
    pub user_id: String,
    pub scopes: Vec<String>,
    pub api_base_url: String,
    /// Loopback port for the OAuth redirect; 0 picks a free one.
    pub redirect_port: u16,
    pub auth_timeout_secs: u64,
    pub max_results: u32,
    pub time_window_hours: u32,
    pub poll_interval_secs: u64,
    /// Task description handed to the classifier with each batch.
    pub topic: String,
    /// External classifier: program followed by its arguments.
    pub classifier_command: Option<Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_secrets_path: None,
            token_cache_path: None,
            user_id: "me".to_string(),
            scopes: vec![DEFAULT_SCOPE.to_string()],
            api_base_url: GMAIL_API_BASE.to_string(),
            redirect_port: 0,
            auth_timeout_secs: 120,
            max_results: 10,
            time_window_hours: 24,
            poll_interval_secs: 300,
            topic: "Replies to job proposals".to_string(),
            classifier_command: None,
        }
    }
}

impl Config {
    pub fn client_secrets_path(&self) -> PathBuf {
        self.client_secrets_path
            .clone()
            .unwrap_or_else(|| default_file("credentials.json"))
    }

    pub fn token_cache_path(&self) -> PathBuf {
        self.token_cache_path
            .clone()
            .unwrap_or_else(|| default_file("token.json"))
    }
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("inbox_triage")
}

fn default_file(name: &str) -> PathBuf {
    config_dir().join(name)
}

pub fn config_path() -> PathBuf {
    default_file("config.toml")
}

/// Load the config from the default location, writing a template there
/// (and using defaults) on first run.
pub fn load_config() -> Result<Config> {
    let path = config_path();
    if !path.exists() {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let tom = toml::to_string_pretty(&Config::default())?;
        fs::write(&path, tom)?;
        info!("created template config at {}", path.display());
        return Ok(Config::default());
    }
    load_config_from(&path)
}

pub fn load_config_from(path: &Path) -> Result<Config> {
    let s = fs::read_to_string(path)?;
    let cfg: Config = toml::from_str(&s)?;
    Ok(cfg)
}
