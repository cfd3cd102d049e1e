use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub tracking: TrackingConfig,

    #[serde(default)]
    pub refresh: RefreshConfig,

    #[serde(default)]
    pub web: WebConfig,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct TrackingConfig {
    /// Origin of the tracking portal. Overridable for testing against a
    /// local fixture server.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshConfig {
    /// How often the poller wakes up to see whether a refresh is due.
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,

    /// Tracking data older than this triggers a batch refresh.
    #[serde(default = "default_max_age")]
    pub max_age_seconds: u64,
}

#[derive(Debug, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_db_path() -> String {
    "rahgir.db".to_string()
}

fn default_base_url() -> String {
    "https://tracking.post.ir/".to_string()
}

fn default_check_interval() -> u64 {
    60
}

fn default_max_age() -> u64 {
    3600
}

fn default_port() -> u16 {
    8080
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self { base_url: default_base_url() }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            check_interval_seconds: default_check_interval(),
            max_age_seconds: default_max_age(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self { port: default_port() }
    }
}

/// Load configuration from config.toml and environment variables
pub fn load() -> Config {
    Figment::new()
        .merge(Toml::file("config.toml"))
        // Use double-underscore nesting for snake_case keys
        .merge(Env::prefixed("RAHGIR_").split("__"))
        .extract()
        .expect("Failed to load configuration")
}

/// Validate configuration and return a user-friendly error
pub fn validate(config: &Config) -> Result<(), String> {
    if config.database.path.is_empty() {
        return Err("database.path must not be empty".into());
    }

    if !config.tracking.base_url.starts_with("http") {
        return Err("tracking.base_url must be an http(s) URL".into());
    }

    if config.refresh.check_interval_seconds == 0 {
        return Err("refresh.check_interval_seconds must be greater than 0".into());
    }

    Ok(())
}
