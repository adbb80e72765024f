//! Offline-first flashcard client: local SQLite store, remote contract and
//! the sync engine between them.

pub mod commands;
pub mod config;
pub mod db;
pub mod remote;
pub mod state;
pub mod sync;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use config::{ClientConfig, ConfigError};
pub use state::AppState;

/// Install the global tracing subscriber, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
