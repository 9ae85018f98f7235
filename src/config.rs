//! Engine configuration loaded from environment variables

use std::env;

use anyhow::{Context, Result};

/// Process-level configuration for the cross-seed engine
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database path
    pub database_path: String,

    /// Default base directory for link destinations when an instance
    /// does not configure one
    pub link_base_dir: Option<String>,

    /// Per-instance HTTP timeout for client calls, seconds
    pub client_timeout_secs: u64,

    /// Capacity of each per-instance completion queue
    pub completion_queue_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            database_path: env::var("SEEDCROSS_DATABASE_PATH")
                .unwrap_or_else(|_| "./data/seedcross.db".to_string()),

            link_base_dir: env::var("SEEDCROSS_LINK_BASE_DIR").ok(),

            client_timeout_secs: env::var("SEEDCROSS_CLIENT_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("Invalid SEEDCROSS_CLIENT_TIMEOUT_SECS")?,

            completion_queue_capacity: env::var("SEEDCROSS_COMPLETION_QUEUE_CAPACITY")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .context("Invalid SEEDCROSS_COMPLETION_QUEUE_CAPACITY")?,
        })
    }
}
