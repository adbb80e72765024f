//! Client configuration from the environment.

use std::path::PathBuf;
use std::time::Duration;

use flashcard_core::{Scheduler, Strategy};

use crate::sync::{RetryPolicy, SyncSettings};

/// Configuration errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a non-negative integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{var} must be greater than zero")]
    Zero { var: &'static str },

    #[error("Unknown scheduler strategy: {0}")]
    UnknownScheduler(String),
}

/// Supabase project settings. Absent when running offline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub url: String,
    pub anon_key: String,
    pub access_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub db_path: PathBuf,
    pub remote: Option<RemoteConfig>,
    pub strategy: Strategy,
    pub sync: SyncSettings,
    pub sync_interval: Option<Duration>,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            remote: None,
            strategy: Strategy::default(),
            sync: SyncSettings::default(),
            sync_interval: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("jirehs-flashcards")
        .join("flashcards.db")
}

impl ClientConfig {
    /// Read from process environment. Call `dotenvy::dotenv()` first to pick
    /// up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let remote = match (var("SUPABASE_URL"), var("SUPABASE_ANON_KEY")) {
            (Some(url), Some(anon_key)) => Some(RemoteConfig {
                url,
                anon_key,
                access_token: var("SUPABASE_ACCESS_TOKEN"),
            }),
            _ => None,
        };

        let strategy = match var("FLASHCARDS_SCHEDULER") {
            Some(name) => {
                Strategy::from_str(name.trim()).ok_or(ConfigError::UnknownScheduler(name))?
            }
            None => defaults.strategy,
        };

        let retry_defaults = defaults.sync.retry;
        let retry = RetryPolicy {
            max_attempts: positive(
                "FLASHCARDS_SYNC_MAX_ATTEMPTS",
                var("FLASHCARDS_SYNC_MAX_ATTEMPTS"),
            )?
            .map_or(retry_defaults.max_attempts, |n| n as u32),
            base_delay: number("FLASHCARDS_SYNC_BASE_DELAY_MS", var("FLASHCARDS_SYNC_BASE_DELAY_MS"))?
                .map_or(retry_defaults.base_delay, Duration::from_millis),
            max_delay: number("FLASHCARDS_SYNC_MAX_DELAY_MS", var("FLASHCARDS_SYNC_MAX_DELAY_MS"))?
                .map_or(retry_defaults.max_delay, Duration::from_millis),
        };
        let batch_size = positive("FLASHCARDS_SYNC_BATCH_SIZE", var("FLASHCARDS_SYNC_BATCH_SIZE"))?
            .map_or(defaults.sync.batch_size, |n| n as usize);

        let sync_interval = positive(
            "FLASHCARDS_SYNC_INTERVAL_SECS",
            var("FLASHCARDS_SYNC_INTERVAL_SECS"),
        )?
        .map(Duration::from_secs);
        let request_timeout = positive(
            "FLASHCARDS_REQUEST_TIMEOUT_SECS",
            var("FLASHCARDS_REQUEST_TIMEOUT_SECS"),
        )?
        .map_or(defaults.request_timeout, Duration::from_secs);

        Ok(Self {
            db_path: var("FLASHCARDS_DB_PATH").map_or(defaults.db_path, PathBuf::from),
            remote,
            strategy,
            sync: SyncSettings { retry, batch_size },
            sync_interval,
            request_timeout,
        })
    }

    pub fn scheduler(&self) -> Scheduler {
        Scheduler::for_strategy(self.strategy)
    }
}

fn number(var: &'static str, value: Option<String>) -> Result<Option<u64>, ConfigError> {
    value
        .map(|value| {
            value
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidNumber { var, value })
        })
        .transpose()
}

fn positive(var: &'static str, value: Option<String>) -> Result<Option<u64>, ConfigError> {
    match number(var, value)? {
        Some(0) => Err(ConfigError::Zero { var }),
        n => Ok(n),
    }
}
