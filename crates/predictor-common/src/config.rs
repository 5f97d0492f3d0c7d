//! Process configuration, loaded from environment variables.
//!
//! Field names and defaults mirror the reference system's
//! `pydantic.BaseSettings` layout (`MONGO_URL`, `REDIS_URL`, ...).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Platform-wide settings, loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub mongo_url: String,
    #[serde(default = "default_mongo_database_name")]
    pub mongo_database_name: String,
    pub redis_url: String,
    #[serde(default = "default_weights_path")]
    pub weights_path: String,
    #[serde(default = "default_queue_articles")]
    pub queue_articles: String,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default = "default_max_traffic_threshold")]
    pub max_traffic_threshold: u32,
    #[serde(default = "default_logging_level")]
    pub logging_level: String,
    #[serde(default = "default_unload_timeout_seconds")]
    pub unload_timeout_seconds: u64,
    #[serde(default = "default_concurrent_predictions")]
    pub concurrent_predictions: usize,
    #[serde(default = "default_event_batch_size")]
    pub event_batch_size: usize,
}

fn default_mongo_database_name() -> String {
    "news".to_string()
}
fn default_weights_path() -> String {
    "./weights".to_string()
}
fn default_queue_articles() -> String {
    "articles".to_string()
}
fn default_api_port() -> u16 {
    8001
}
fn default_max_traffic_threshold() -> u32 {
    50
}
fn default_logging_level() -> String {
    "info".to_string()
}
fn default_unload_timeout_seconds() -> u64 {
    300
}
fn default_concurrent_predictions() -> usize {
    1
}
fn default_event_batch_size() -> usize {
    10
}

impl Settings {
    /// Load settings from the process environment, applying the documented
    /// defaults for anything not set. Fails fast with `Error::Configuration`
    /// if a required field (`MONGO_URL`, `REDIS_URL`) is absent.
    pub fn from_env() -> Result<Self> {
        let source = config::Config::builder()
            .set_default("mongo_database_name", default_mongo_database_name())?
            .set_default("weights_path", default_weights_path())?
            .set_default("queue_articles", default_queue_articles())?
            .set_default("api_port", default_api_port())?
            .set_default("max_traffic_threshold", default_max_traffic_threshold())?
            .set_default("logging_level", default_logging_level())?
            .set_default("unload_timeout_seconds", default_unload_timeout_seconds())?
            .set_default("concurrent_predictions", default_concurrent_predictions() as i64)?
            .set_default("event_batch_size", default_event_batch_size() as i64)?
            .add_source(
                config::Environment::default()
                    .try_parsing(true)
                    .separator("__"),
            )
            .build()
            .map_err(|e| Error::Configuration(e.to_string()))?;

        source
            .try_deserialize::<RawSettings>()
            .map_err(|e| Error::Configuration(e.to_string()))
            .and_then(RawSettings::into_settings)
    }
}

/// Intermediate struct matching the exact environment variable names
/// (`MONGO_URL`, `REDIS_URL`, ...), which the `config` crate expects to be
/// lower-cased field names matched case-insensitively against env vars.
#[derive(Debug, Deserialize)]
struct RawSettings {
    mongo_url: Option<String>,
    mongo_database_name: String,
    redis_url: Option<String>,
    weights_path: String,
    queue_articles: String,
    api_port: u16,
    max_traffic_threshold: u32,
    logging_level: String,
    unload_timeout_seconds: u64,
    concurrent_predictions: usize,
    event_batch_size: usize,
}

impl RawSettings {
    fn into_settings(self) -> Result<Settings> {
        Ok(Settings {
            mongo_url: self
                .mongo_url
                .ok_or_else(|| Error::Configuration("MONGO_URL is required".into()))?,
            mongo_database_name: self.mongo_database_name,
            redis_url: self
                .redis_url
                .ok_or_else(|| Error::Configuration("REDIS_URL is required".into()))?,
            weights_path: self.weights_path,
            queue_articles: self.queue_articles,
            api_port: self.api_port,
            max_traffic_threshold: self.max_traffic_threshold,
            logging_level: self.logging_level,
            unload_timeout_seconds: self.unload_timeout_seconds,
            concurrent_predictions: self.concurrent_predictions,
            event_batch_size: self.event_batch_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn loads_defaults_with_required_vars_set() {
        std::env::set_var("MONGO_URL", "mongodb://localhost:27017");
        std::env::set_var("REDIS_URL", "redis://localhost:6379");
        std::env::remove_var("API_PORT");

        let settings = Settings::from_env().expect("settings should load");
        assert_eq!(settings.api_port, 8001);
        assert_eq!(settings.mongo_database_name, "news");
        assert_eq!(settings.max_traffic_threshold, 50);

        std::env::remove_var("MONGO_URL");
        std::env::remove_var("REDIS_URL");
    }

    #[test]
    #[serial]
    fn missing_required_var_fails() {
        std::env::remove_var("MONGO_URL");
        std::env::remove_var("REDIS_URL");
        assert!(Settings::from_env().is_err());
    }
}
