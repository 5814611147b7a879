use std::time::Duration;

use anyhow::{Context, Error};
use config::Config;

#[derive(Debug, Clone, serde_derive::Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub listen: String,
    pub data_directory: String,
    pub records_directory: String,
    pub manifest_name: String,
    pub public_ip_url: String,
    pub caddy: CaddyConfig,
    pub cloudflare: CloudflareConfig,
    pub timeouts: TimeoutConfig,
}

#[derive(Debug, Clone, serde_derive::Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CaddyConfig {
    pub api: String,
    pub route_path: String,
    pub route_prefix: String,
    pub listen: String,
    pub auto_https: bool,
}

#[derive(Debug, Clone, Default, serde_derive::Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CloudflareConfig {
    pub api: String,
    pub token: Option<String>,
    pub zones: Vec<ZoneCredential>,
}

#[derive(Debug, Clone, serde_derive::Deserialize, PartialEq, Eq)]
pub struct ZoneCredential {
    pub zone: String,
    pub token: String,
}

#[derive(Debug, Clone, serde_derive::Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutConfig {
    pub status_secs: u64,
    pub provider_secs: u64,
    pub source_control_secs: u64,
    pub event_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen: "localhost:2020".to_string(),
            data_directory: "app_data".to_string(),
            records_directory: "configs".to_string(),
            manifest_name: "Rokkufile".to_string(),
            public_ip_url: "https://ident.me/".to_string(),
            caddy: CaddyConfig::default(),
            cloudflare: CloudflareConfig {
                api: "https://api.cloudflare.com/client/v4".to_string(),
                ..Default::default()
            },
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl Default for CaddyConfig {
    fn default() -> Self {
        Self {
            api: "http://localhost:2019".to_string(),
            route_path: "config/apps/http/servers/srv0/routes".to_string(),
            route_prefix: "rokku".to_string(),
            listen: ":80".to_string(),
            auto_https: false,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            status_secs: 10,
            provider_secs: 30,
            source_control_secs: 600,
            event_secs: 5,
        }
    }
}

impl TimeoutConfig {
    pub fn status(&self) -> Duration {
        Duration::from_secs(self.status_secs)
    }

    pub fn provider(&self) -> Duration {
        Duration::from_secs(self.provider_secs)
    }

    pub fn source_control(&self) -> Duration {
        Duration::from_secs(self.source_control_secs)
    }

    pub fn event(&self) -> Duration {
        Duration::from_secs(self.event_secs)
    }
}

impl CloudflareConfig {
    /// Token for a zone, falling back to the account-wide token.
    pub fn token_for(&self, zone: &str) -> Option<&str> {
        self.zones
            .iter()
            .find(|credential| credential.zone == zone)
            .map(|credential| credential.token.as_str())
            .or(self.token.as_deref())
    }
}

pub fn load_config() -> Result<AppConfig, Error> {
    let config = Config::builder()
        .add_source(config::File::with_name("rokku").required(false))
        .add_source(config::Environment::with_prefix("rokku").separator("__"))
        .build()
        .context("Can't load configuration")?;

    config
        .try_deserialize()
        .context("Can't deserialize AppConfig from loaded configuration")
}
