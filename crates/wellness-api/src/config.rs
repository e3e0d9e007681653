use std::collections::HashMap;
use std::env;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_path: String,
    pub external_api_url: String,
    pub external_api_timeout: Duration,
    pub external_api_retries: u32,
    pub sync_clients_interval: Duration,
    pub sync_appointments_interval: Duration,
    pub seed_demo: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "WELLNESS_BIND_ADDR", "127.0.0.1:8080");
        let database_path = value_or_default(&lookup, "WELLNESS_DATABASE_PATH", "wellness.db");

        let external_api_url = value_or_default(&lookup, "EXTERNAL_API_URL", "https://mock.api");
        if !is_http_url(&external_api_url) {
            return Err(ConfigError::Invalid(
                "EXTERNAL_API_URL must start with http:// or https://".to_string(),
            ));
        }

        let timeout_secs = value_or_default(&lookup, "EXTERNAL_API_TIMEOUT_SECS", "30")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::Invalid(
                    "EXTERNAL_API_TIMEOUT_SECS must be an integer in [1, 300]".to_string(),
                )
            })?;
        if !(1..=300).contains(&timeout_secs) {
            return Err(ConfigError::Invalid(
                "EXTERNAL_API_TIMEOUT_SECS must be in [1, 300]".to_string(),
            ));
        }

        let external_api_retries = value_or_default(&lookup, "EXTERNAL_API_RETRIES", "3")
            .parse::<u32>()
            .map_err(|_| {
                ConfigError::Invalid(
                    "EXTERNAL_API_RETRIES must be an integer in [0, 10]".to_string(),
                )
            })?;
        if external_api_retries > 10 {
            return Err(ConfigError::Invalid(
                "EXTERNAL_API_RETRIES must be in [0, 10]".to_string(),
            ));
        }

        let clients_interval_secs = interval_secs(&lookup, "SYNC_CLIENTS_INTERVAL_SECS", "1800")?;
        let appointments_interval_secs =
            interval_secs(&lookup, "SYNC_APPOINTMENTS_INTERVAL_SECS", "900")?;

        let seed_demo = truthy(&lookup, "WELLNESS_SEED_DEMO");

        Ok(Self {
            bind_addr,
            database_path,
            external_api_url,
            external_api_timeout: Duration::from_secs(timeout_secs),
            external_api_retries,
            sync_clients_interval: Duration::from_secs(clients_interval_secs),
            sync_appointments_interval: Duration::from_secs(appointments_interval_secs),
            seed_demo,
        })
    }
}

fn interval_secs(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: &str,
) -> Result<u64, ConfigError> {
    let secs = value_or_default(&lookup, name, default)
        .parse::<u64>()
        .map_err(|_| {
            ConfigError::Invalid(format!("{name} must be an integer in [60, 86400]"))
        })?;
    if !(60..=86_400).contains(&secs) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be in [60, 86400]"
        )));
    }
    Ok(secs)
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn truthy(lookup: impl Fn(&str) -> Option<String>, name: &str) -> bool {
    optional_trimmed(lookup, name)
        .is_some_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}
