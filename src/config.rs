//! Application configuration loaded from environment variables.

use crate::services::location::WatchOptions;
use std::env;

const DEFAULT_MAX_DEVICES: usize = 10_000;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Frontend URL allowed by CORS
    pub frontend_url: String,
    /// GCP project ID (Firestore)
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    /// JWT signing key used to verify identity tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// Options for location watches
    pub watch: WatchOptions,
    /// Most trackers hosted at once
    pub max_devices: usize,
}

impl Config {
    /// Config with fixed values, for tests.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            watch: WatchOptions::default(),
            max_devices: DEFAULT_MAX_DEVICES,
        }
    }

    /// Load configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = WatchOptions::default();
        let interval_ms = parse_var("TRACKER_INTERVAL_MS", defaults.interval_ms)?;

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: parse_var("PORT", 8080)?,
            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .trim()
                .as_bytes()
                .to_vec(),
            watch: WatchOptions {
                high_accuracy: parse_var("TRACKER_HIGH_ACCURACY", defaults.high_accuracy)?,
                min_distance_meters: parse_var(
                    "TRACKER_MIN_DISTANCE_METERS",
                    defaults.min_distance_meters,
                )?,
                interval_ms,
                fastest_interval_ms: interval_ms,
            },
            max_devices: parse_var("TRACKER_MAX_DEVICES", DEFAULT_MAX_DEVICES)?,
        })
    }
}

/// Read and parse an optional variable, falling back to `default` when unset.
fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, value)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable {0}: {1:?}")]
    Invalid(&'static str, String),
}
