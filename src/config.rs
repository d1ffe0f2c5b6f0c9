use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::{Error, Result};

pub const CONFIG_ENV: &str = "PEERLINK_CONFIG";

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api: Api,
    #[serde(default)]
    pub turn: Turn,
    #[serde(default)]
    pub channel: Channel,
    #[serde(default)]
    pub setup: Setup,
    #[serde(default)]
    pub log: Log,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Api {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,
}

impl Default for Api {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_api_timeout(),
        }
    }
}

impl Api {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_base_url() -> String {
    api::path::DEFAULT_BASE_URL.to_string()
}

fn default_api_timeout() -> u64 {
    libcalls::DEFAULT_TIMEOUT.as_secs()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Turn {
    /// Lifetime of issued relay credentials, in seconds.
    #[serde(default = "default_ttl")]
    pub ttl: u64,
    #[serde(default = "iceserver::cloudflare_relay_urls")]
    pub urls: Vec<String>,
    #[serde(default = "default_true")]
    pub relay_only: bool,
}

impl Default for Turn {
    fn default() -> Self {
        Self {
            ttl: default_ttl(),
            urls: iceserver::cloudflare_relay_urls(),
            relay_only: true,
        }
    }
}

fn default_ttl() -> u64 {
    86400
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Channel {
    #[serde(default = "default_channel_name")]
    pub name: String,
    /// In-band channel opened on every session before the offer. The offer
    /// only carries a data section when some channel exists at that point.
    #[serde(default = "default_system_channel")]
    pub system: String,
}

impl Default for Channel {
    fn default() -> Self {
        Self {
            name: default_channel_name(),
            system: default_system_channel(),
        }
    }
}

fn default_channel_name() -> String {
    "channel-one".to_string()
}

fn default_system_channel() -> String {
    "server-events".to_string()
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Setup {
    /// Bound for every setup wait. Unset waits indefinitely.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Setup {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Log {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for Log {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    std::env::var("LOG_LEVEL").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            tracing::Level::DEBUG.to_string().to_lowercase()
        } else {
            tracing::Level::INFO.to_string().to_lowercase()
        }
    })
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.turn.urls.is_empty() {
            return Err(Error::Config("turn.urls must not be empty".to_string()));
        }
        if self.channel.name.is_empty() || self.channel.system.is_empty() {
            return Err(Error::Config("channel names must not be empty".to_string()));
        }
        if self.channel.name == self.channel.system {
            return Err(Error::Config(
                "channel.name and channel.system must differ".to_string(),
            ));
        }
        if self.api.timeout_secs == 0 {
            return Err(Error::Config("api.timeout_secs must be positive".to_string()));
        }
        if self.setup.timeout_secs == Some(0) {
            return Err(Error::Config("setup.timeout_secs must be positive".to_string()));
        }
        Ok(())
    }
}

/// Reads `path`, then `./{name}.toml`, then `/etc/{name}/{name}.toml`.
/// A missing or unparsable file yields the defaults.
pub fn load<T>(name: &str, path: Option<String>) -> T
where
    T: serde::de::DeserializeOwned + Default,
{
    use std::fs::read_to_string;
    let result = path
        .map(read_to_string)
        .unwrap_or_else(|| read_to_string(format!("{name}.toml")))
        .or_else(|_| read_to_string(format!("/etc/{name}/{name}.toml")))
        .unwrap_or_default();
    match toml::from_str(result.as_str()) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("config load error: {}", err);
            Default::default()
        }
    }
}

/// Loads the config pointed to by `PEERLINK_CONFIG`, or the default locations.
pub fn load_env() -> Config {
    let path = std::env::var(CONFIG_ENV).ok();
    if let Some(path) = &path {
        info!("loading config from {}", path);
    }
    load("peerlink", path)
}
