use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Clone, Debug)]
pub struct Config {
    /// Root for label files and rendered assets.
    pub data_dir: PathBuf,
    /// Press target for text buttons without an `httpUrl` setting.
    pub default_action_url: Option<String>,
    pub request_timeout: Duration,
    /// Keys per row, used to derive a button index from grid coordinates.
    pub grid_columns: u32,
    pub reconnect_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            default_action_url: None,
            request_timeout: Duration::from_millis(10_000),
            grid_columns: 5,
            reconnect_delay: Duration::from_millis(3_000),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid HTTPBUTTON_REQUEST_TIMEOUT_MS: {0}")]
    InvalidRequestTimeout(String),
    #[error("invalid HTTPBUTTON_GRID_COLUMNS: {0}")]
    InvalidGridColumns(String),
    #[error("invalid HTTPBUTTON_RECONNECT_DELAY_MS: {0}")]
    InvalidReconnectDelay(String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset and blank values take defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let data_dir = value("HTTPBUTTON_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let default_action_url = value("HTTPBUTTON_DEFAULT_ACTION_URL");
        let request_timeout = match value("HTTPBUTTON_REQUEST_TIMEOUT_MS") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .ok_or(ConfigError::InvalidRequestTimeout(raw))?,
            None => defaults.request_timeout,
        };
        let grid_columns = match value("HTTPBUTTON_GRID_COLUMNS") {
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|columns| *columns > 0)
                .ok_or(ConfigError::InvalidGridColumns(raw))?,
            None => defaults.grid_columns,
        };
        let reconnect_delay = match value("HTTPBUTTON_RECONNECT_DELAY_MS") {
            Some(raw) => raw
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|error| ConfigError::InvalidReconnectDelay(format!("{raw}: {error}")))?,
            None => defaults.reconnect_delay,
        };

        Ok(Self {
            data_dir,
            default_action_url,
            request_timeout,
            grid_columns,
            reconnect_delay,
        })
    }
}
