use std::path::Path;
use std::time::Duration;

use config::Config;
use config::ConfigError;
use config::File;
use pm_client::TransportConfig;
use pm_types::ResilienceConfig;
use serde::Deserialize;

/// Connection settings for the remote project-management service
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    pub base_url: String,
    pub api_token: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.example.com".to_string(),
            api_token: String::new(),
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
        }
    }
}

impl ServiceSettings {
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            base_url: self.base_url.clone(),
            api_token: self.api_token.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub resilience: ResilienceConfig,
}

pub fn load_app_config<P: AsRef<Path>>(path: P) -> Result<AppConfig, ConfigError> {
    let config = Config::builder().add_source(File::from(path.as_ref())).build()?;

    config.try_deserialize()
}

/// Load application config with fallback to defaults
pub fn load_app_config_or_default(path: &str) -> AppConfig {
    match load_app_config(path) {
        Ok(config) => {
            tracing::info!("Loaded config from {path}");
            config
        }
        Err(err) => {
            tracing::warn!("Failed to load config from {}: {}. Using defaults.", path, err);
            AppConfig::default()
        }
    }
}
