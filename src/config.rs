//! Configuration module

use std::env;
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,

    /// Directory holding `scaler.json` and `isolation_forest.json`
    pub model_dir: PathBuf,

    /// Environment (development, production)
    pub environment: String,

    /// Request body limit for uploads and JSON payloads
    pub max_upload_bytes: usize,

    /// Largest batch accepted by the ad-hoc fit endpoint
    pub max_fit_rows: usize,

    /// Trees per ad-hoc isolation forest
    pub adhoc_trees: usize,

    /// Fixed seed for ad-hoc fits; unset means a fresh seed per call
    pub adhoc_random_seed: Option<u64>,

    /// Log output format ("pretty" or "json")
    pub log_format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),

            model_dir: env::var("MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("models")),

            environment: env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),

            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10 * 1024 * 1024),

            max_fit_rows: env::var("MAX_FIT_ROWS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100_000),

            adhoc_trees: env::var("ADHOC_TREES")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(100),

            adhoc_random_seed: env::var("ADHOC_RANDOM_SEED")
                .ok()
                .and_then(|v| v.parse().ok()),

            log_format: env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string()),
        }
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8000,
            model_dir: PathBuf::from("models"),
            environment: "development".to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
            max_fit_rows: 100_000,
            adhoc_trees: 100,
            adhoc_random_seed: None,
            log_format: "pretty".to_string(),
        }
    }
}
