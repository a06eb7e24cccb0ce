//! Configuration shape (§6, expanded in §10.3).
//!
//! Reading these values from a file, environment, or CLI flags is explicitly
//! left to the embedding application — this crate only defines the shape and
//! its defaults.

use serde::{Deserialize, Serialize};

/// Connection and schema placement. Consumed by the embedding application's
/// database session factory; the dispatcher itself only needs `schema`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub application_name: String,
    /// Schema the `events` table lives in. Default `pgebus`.
    pub schema: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            database: "postgres".to_string(),
            application_name: "pgebus".to_string(),
            schema: "pgebus".to_string(),
        }
    }
}

/// The `event_system.*` options from §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    /// Push channel name. Default `events`.
    pub channel: String,
    /// Worker pool size. Default 5.
    pub n_workers: usize,
    /// Fallback poll cadence, in seconds. Default 1.0.
    pub poll_interval_seconds: f64,
    /// Stale-lock threshold, in seconds. Default 300.
    pub stale_after_seconds: u64,
    /// Retry backoff base, in seconds. Default 2.
    pub backoff_base_seconds: u64,
    /// Retry backoff cap, in seconds. Default 300.
    pub backoff_cap_seconds: u64,
    /// Maximum attempts before dead-lettering. Default 5.
    pub max_attempts: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            channel: "events".to_string(),
            n_workers: 5,
            poll_interval_seconds: 1.0,
            stale_after_seconds: 300,
            backoff_base_seconds: 2,
            backoff_cap_seconds: 300,
            max_attempts: 5,
        }
    }
}

impl Config {
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.poll_interval_seconds)
    }

    pub fn stale_after(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.stale_after_seconds)
    }

    pub fn backoff_policy(&self) -> crate::backoff::BackoffPolicy {
        crate::backoff::BackoffPolicy {
            base: std::time::Duration::from_secs(self.backoff_base_seconds),
            cap: std::time::Duration::from_secs(self.backoff_cap_seconds),
            max_attempts: self.max_attempts,
        }
    }
}
