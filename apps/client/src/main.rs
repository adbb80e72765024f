use std::sync::Arc;

use anyhow::Context;
use flashcards_client::db::SqliteRepository;
use flashcards_client::remote::{InMemoryRemote, RemoteStore, SupabaseRemote};
use flashcards_client::sync::{spawn_periodic, SyncError};
use flashcards_client::{init_tracing, AppState, ClientConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ClientConfig::from_env().context("invalid configuration")?;

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    tracing::info!("Opening database at {}", config.db_path.display());
    let repository = SqliteRepository::open(&config.db_path).context("failed to open database")?;

    let remote: Arc<dyn RemoteStore> = match &config.remote {
        Some(remote) => Arc::new(SupabaseRemote::new(
            &remote.url,
            remote.anon_key.clone(),
            remote.access_token.clone(),
            config.request_timeout,
        )?),
        None => {
            tracing::warn!("SUPABASE_URL or SUPABASE_ANON_KEY not set, syncing against an in-memory store");
            Arc::new(InMemoryRemote::default())
        }
    };

    let state = AppState::new(repository, config.scheduler(), remote, config.sync);

    match config.sync_interval {
        Some(interval) => {
            let handle = spawn_periodic(state.sync.clone(), interval);
            tokio::signal::ctrl_c().await?;
            tracing::info!("Shutting down");
            handle.abort();
        }
        None => match state.sync.sync().await {
            Ok(report) => tracing::info!(
                upserted = report.push.upserted,
                deleted = report.deletions.confirmed,
                pulled = report.pull.as_ref().map_or(0, |pull| pull.applied.applied),
                "Sync complete"
            ),
            Err(SyncError::NotAuthenticated) => {
                tracing::warn!("Not signed in, local changes stay queued")
            }
            Err(e) => return Err(e.into()),
        },
    }

    Ok(())
}
