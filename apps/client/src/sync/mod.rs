//! Sync engine for cloud synchronization.
//!
//! Local writes mark rows dirty and deletions leave tombstones; the engine
//! pushes both to the remote store and pulls the user's rows back. Delivery
//! is at-least-once: a row stays dirty until an upsert of the exact version
//! that was read is confirmed.

pub mod periodic;
pub mod retry;
pub mod wire;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use flashcard_core::{
    CustomDeckMetadata, Deck, EntityType, Flashcard, Progress, ValidationError,
};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::db::{
    ApplyReport, DbError, DeletionQueue, DirtyRow, DirtyTable, RemoteBatch, SqliteRepository,
    SyncRepository,
};
use crate::remote::{RemoteError, RemoteStore, RemoteTable};

pub use periodic::spawn_periodic;
pub use retry::RetryPolicy;
pub use wire::RejectedRow;

/// Sync errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Not authenticated - sign in before syncing")]
    NotAuthenticated,

    #[error("Sync already in progress")]
    AlreadyInProgress,

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Invalid record: {0}")]
    Validation(#[from] ValidationError),

    #[error("{0} deletions could not be confirmed")]
    DeletionsPending(usize),
}

/// Sync status for UI.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum SyncStatus {
    Idle,
    Syncing { stage: SyncStage },
    Completed { synced_at: String, report: SyncReport },
    Failed { error: String },
}

/// Current sync stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "name")]
pub enum SyncStage {
    Connecting,
    PushingChanges,
    PushingDeletions,
    PullingChanges,
}

/// Outcome of pushing dirty rows.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PushReport {
    pub upserted: usize,
    /// Rows whose dirty bit was cleared; rows edited mid-push stay dirty.
    pub cleared: usize,
    /// Children held back because their parent was rejected.
    pub deferred: usize,
    pub rejected: Vec<RejectedRow>,
}

/// Outcome of draining the tombstone queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeletionReport {
    pub confirmed: usize,
    /// Tombstones whose rows were already gone remotely.
    pub already_absent: usize,
    pub failed: usize,
}

/// Outcome of pulling remote rows.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PullReport {
    pub fetched: usize,
    pub applied: ApplyReport,
    pub rejected: Vec<RejectedRow>,
}

/// Outcome of a full sync.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub push: PushReport,
    pub deletions: DeletionReport,
    pub pull: Option<PullReport>,
}

/// Engine tuning.
#[derive(Debug, Clone, Copy)]
pub struct SyncSettings {
    pub retry: RetryPolicy,
    pub batch_size: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            batch_size: 100,
        }
    }
}

/// Inner state shared across clones.
struct SyncEngineInner {
    repository: Arc<Mutex<SqliteRepository>>,
    remote: Arc<dyn RemoteStore>,
    settings: SyncSettings,
    status: AsyncMutex<SyncStatus>,
    in_progress: AtomicBool,
}

/// Sync engine for managing cloud synchronization.
///
/// Clone-able because all state lives behind an `Arc`, so it can be moved
/// into tasks without holding the repository lock across await points.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<SyncEngineInner>,
}

/// Held while a sync pass runs; releases the engine on drop.
pub struct SyncGuard {
    inner: Arc<SyncEngineInner>,
}

impl Drop for SyncGuard {
    fn drop(&mut self) {
        self.inner.in_progress.store(false, Ordering::Release);
    }
}

/// Row ready to upsert, with the version it was read at.
struct Outgoing {
    key: String,
    version: String,
    row: Value,
}

fn record_of<T>(row: &DirtyRow<T>) -> &T {
    match &row.record {
        Ok(record) => record,
        Err(partial) => &partial.record,
    }
}

/// Encode valid rows; reject partial ones. Returns the rejected keys.
fn prepare<T>(
    table: RemoteTable,
    rows: Vec<DirtyRow<T>>,
    key: fn(&T) -> String,
    encode: impl Fn(&T) -> Result<Value, String>,
    report: &mut PushReport,
) -> (Vec<Outgoing>, HashSet<String>) {
    let mut outgoing = Vec::with_capacity(rows.len());
    let mut rejected = HashSet::new();
    for row in rows {
        match row.record {
            Ok(record) => match encode(&record) {
                Ok(value) => outgoing.push(Outgoing {
                    key: key(&record),
                    version: row.version,
                    row: value,
                }),
                Err(reason) => {
                    let id = key(&record);
                    report.rejected.push(RejectedRow::new(table.as_str(), Some(id.clone()), reason));
                    rejected.insert(id);
                }
            },
            Err(partial) => {
                let id = key(&partial.record);
                let reason = partial
                    .issues
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                report.rejected.push(RejectedRow::new(table.as_str(), Some(id.clone()), reason));
                rejected.insert(id);
            }
        }
    }
    (outgoing, rejected)
}

impl SyncEngine {
    /// Create a new sync engine.
    pub fn new(
        repository: Arc<Mutex<SqliteRepository>>,
        remote: Arc<dyn RemoteStore>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            inner: Arc::new(SyncEngineInner {
                repository,
                remote,
                settings: SyncSettings {
                    batch_size: settings.batch_size.max(1),
                    ..settings
                },
                status: AsyncMutex::new(SyncStatus::Idle),
                in_progress: AtomicBool::new(false),
            }),
        }
    }

    /// Get current sync status.
    pub async fn status(&self) -> SyncStatus {
        self.inner.status.lock().await.clone()
    }

    pub fn is_syncing(&self) -> bool {
        self.inner.in_progress.load(Ordering::Acquire)
    }

    /// Claim the engine for one pass, or fail if a pass is running.
    pub fn try_begin_sync(&self) -> Result<SyncGuard, SyncError> {
        self.inner
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SyncError::AlreadyInProgress)?;
        Ok(SyncGuard {
            inner: Arc::clone(&self.inner),
        })
    }

    /// Push dirty rows then deletions. Returns `false` if busy or if
    /// anything failed; failures leave dirty bits and tombstones in place.
    pub async fn sync_to_cloud(&self) -> bool {
        let Ok(_guard) = self.try_begin_sync() else {
            debug!("sync already running, push skipped");
            return false;
        };

        let result = async {
            let push = self.push_dirty().await?;
            let deletions = self.push_deletions().await?;
            Ok::<_, SyncError>(SyncReport {
                push,
                deletions,
                pull: None,
            })
        }
        .await;

        match result {
            Ok(report) if report.deletions.failed == 0 => {
                self.finish(report).await;
                true
            }
            Ok(report) => {
                let error = SyncError::DeletionsPending(report.deletions.failed);
                self.fail(error.to_string()).await;
                false
            }
            Err(e) => {
                self.fail(e.to_string()).await;
                false
            }
        }
    }

    /// Pull the user's rows into the local store.
    pub async fn sync_from_remote(&self, user_id: &str) -> Result<PullReport, SyncError> {
        let _guard = self.try_begin_sync()?;
        match self.pull_remote(user_id).await {
            Ok(report) => {
                self.finish(SyncReport {
                    pull: Some(report.clone()),
                    ..Default::default()
                })
                .await;
                Ok(report)
            }
            Err(e) => {
                self.fail(e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Full pass for the signed-in user: push, deletions, then pull.
    ///
    /// Tombstones that could not be confirmed fail the pass before the pull;
    /// they stay queued for the next one.
    pub async fn sync(&self) -> Result<SyncReport, SyncError> {
        let _guard = self.try_begin_sync()?;
        let result = async {
            let user_id = self.require_user().await?;
            let push = self.push_dirty().await?;
            let deletions = self.push_deletions().await?;
            if deletions.failed > 0 {
                return Err(SyncError::DeletionsPending(deletions.failed));
            }
            let pull = self.pull_remote(&user_id).await?;
            Ok::<_, SyncError>(SyncReport {
                push,
                deletions,
                pull: Some(pull),
            })
        }
        .await;

        match &result {
            Ok(report) => self.finish(report.clone()).await,
            Err(e) => self.fail(e.to_string()).await,
        }
        result
    }

    /// Upsert every dirty row, parents first, clearing dirty bits of rows
    /// unchanged since the snapshot.
    pub async fn push_dirty(&self) -> Result<PushReport, SyncError> {
        self.set_status(SyncStatus::Syncing {
            stage: SyncStage::Connecting,
        })
        .await;
        let user_id = self.require_user().await?;

        self.set_status(SyncStatus::Syncing {
            stage: SyncStage::PushingChanges,
        })
        .await;
        let snapshot = self.with_repo(|repo| repo.dirty_snapshot())?;
        if snapshot.is_empty() {
            debug!("nothing to push");
            return Ok(PushReport::default());
        }
        let mut report = PushReport::default();

        let (custom_decks, rejected_custom) = prepare(
            RemoteTable::CustomDecks,
            snapshot.custom_decks,
            |m: &CustomDeckMetadata| m.id.clone(),
            |m| wire::encode(RemoteTable::CustomDecks, m),
            &mut report,
        );
        let (decks, rejected_decks) = prepare(
            RemoteTable::UserDecks,
            snapshot.decks,
            |d: &Deck| d.id.clone(),
            |d| wire::encode(RemoteTable::UserDecks, d),
            &mut report,
        );
        let blocked_decks: HashSet<String> = rejected_custom.union(&rejected_decks).cloned().collect();

        let mut deferred_cards = HashSet::new();
        let cards: Vec<DirtyRow<Flashcard>> = snapshot
            .flashcards
            .into_iter()
            .filter(|row| {
                let card = record_of(row);
                if blocked_decks.contains(&card.deck_id) {
                    debug!(flashcard_id = %card.id, deck_id = %card.deck_id, "deferred until deck is valid");
                    deferred_cards.insert(card.id.clone());
                    false
                } else {
                    true
                }
            })
            .collect();
        let (cards, rejected_cards) = prepare(
            RemoteTable::Flashcards,
            cards,
            |c: &Flashcard| c.id.clone(),
            |c| wire::encode(RemoteTable::Flashcards, c),
            &mut report,
        );

        let progress: Vec<DirtyRow<Progress>> = snapshot
            .progress
            .into_iter()
            .filter(|row| {
                let p = record_of(row);
                let blocked = blocked_decks.contains(&p.deck_id)
                    || deferred_cards.contains(&p.flashcard_id)
                    || rejected_cards.contains(&p.flashcard_id);
                if blocked {
                    report.deferred += 1;
                }
                !blocked
            })
            .collect();
        report.deferred += deferred_cards.len();
        let (progress, _) = prepare(
            RemoteTable::Progress,
            progress,
            |p: &Progress| p.flashcard_id.clone(),
            |p| wire::encode_progress(&user_id, p),
            &mut report,
        );

        self.push_table(RemoteTable::CustomDecks, DirtyTable::CustomDeckMetadata, custom_decks, &mut report)
            .await?;
        self.push_table(RemoteTable::UserDecks, DirtyTable::Decks, decks, &mut report)
            .await?;
        self.push_table(RemoteTable::Flashcards, DirtyTable::Flashcards, cards, &mut report)
            .await?;
        self.push_table(RemoteTable::Progress, DirtyTable::Progress, progress, &mut report)
            .await?;

        info!(
            upserted = report.upserted,
            cleared = report.cleared,
            deferred = report.deferred,
            rejected = report.rejected.len(),
            "pushed local changes"
        );
        Ok(report)
    }

    /// Drain the tombstone queue oldest first. One failed entry does not
    /// block the rest; an authorization failure aborts the pass.
    pub async fn push_deletions(&self) -> Result<DeletionReport, SyncError> {
        let user_id = self.require_user().await?;
        self.set_status(SyncStatus::Syncing {
            stage: SyncStage::PushingDeletions,
        })
        .await;

        let pending = self.with_repo(|repo| repo.list_pending_deletions())?;
        let mut report = DeletionReport::default();

        for tombstone in pending {
            let tables: [RemoteTable; 2] = match tombstone.entity_type {
                EntityType::Flashcard => [RemoteTable::Progress, RemoteTable::Flashcards],
                EntityType::Deck => [RemoteTable::CustomDecks, RemoteTable::UserDecks],
            };
            let id = tombstone.entity_id.as_str();

            let mut outcome: Result<bool, RemoteError> = Ok(false);
            for table in tables {
                let deleted = self
                    .inner
                    .settings
                    .retry
                    .run("delete", || self.inner.remote.delete(table, id, &user_id))
                    .await;
                match deleted {
                    Ok(found) => outcome = outcome.map(|any| any || found),
                    Err(e) => {
                        outcome = Err(e);
                        break;
                    }
                }
            }

            match outcome {
                Ok(found) => {
                    self.with_repo(|repo| repo.clear_deletion(tombstone.entity_type, id))?;
                    if found {
                        report.confirmed += 1;
                    } else {
                        debug!(entity_id = id, "already absent remotely");
                        report.already_absent += 1;
                    }
                }
                Err(e @ RemoteError::Unauthorized(_)) => return Err(e.into()),
                Err(e) => {
                    warn!(
                        entity_type = tombstone.entity_type.as_str(),
                        entity_id = id,
                        error = %e,
                        "remote deletion failed, tombstone kept"
                    );
                    report.failed += 1;
                }
            }
        }

        if report != DeletionReport::default() {
            info!(
                confirmed = report.confirmed,
                already_absent = report.already_absent,
                failed = report.failed,
                "pushed deletions"
            );
        }
        Ok(report)
    }

    /// Fetch the user's rows, validate them one by one and merge the valid
    /// ones into the local store.
    pub async fn pull_remote(&self, user_id: &str) -> Result<PullReport, SyncError> {
        self.set_status(SyncStatus::Syncing {
            stage: SyncStage::PullingChanges,
        })
        .await;

        let mut report = PullReport::default();
        let mut batch = RemoteBatch::default();

        for table in RemoteTable::ALL {
            let rows = self
                .inner
                .settings
                .retry
                .run("select", || self.inner.remote.select_by_user(table, user_id))
                .await?;
            report.fetched += rows.len();

            let rejected = match table {
                RemoteTable::CustomDecks => {
                    let (rows, rejected) = wire::decode(table, rows);
                    batch.custom_decks = rows;
                    rejected
                }
                RemoteTable::UserDecks => {
                    let (rows, rejected) = wire::decode(table, rows);
                    batch.decks = rows;
                    rejected
                }
                RemoteTable::Flashcards => {
                    let (rows, rejected) = wire::decode(table, rows);
                    batch.flashcards = rows;
                    rejected
                }
                RemoteTable::Progress => {
                    let (rows, rejected) = wire::decode_progress(rows);
                    batch.progress = rows;
                    rejected
                }
            };
            report.rejected.extend(rejected);
        }

        report.applied = self.with_repo(|repo| repo.apply_remote(&batch, Utc::now()))?;
        info!(
            user_id,
            fetched = report.fetched,
            rejected = report.rejected.len(),
            "pulled remote changes"
        );
        Ok(report)
    }

    // === Private methods ===

    async fn set_status(&self, status: SyncStatus) {
        *self.inner.status.lock().await = status;
    }

    async fn finish(&self, report: SyncReport) {
        self.set_status(SyncStatus::Completed {
            synced_at: Utc::now().to_rfc3339(),
            report,
        })
        .await;
    }

    async fn fail(&self, error: String) {
        warn!(error = %error, "sync failed");
        self.set_status(SyncStatus::Failed { error }).await;
    }

    async fn require_user(&self) -> Result<String, SyncError> {
        self.inner
            .settings
            .retry
            .run("current_user", || self.inner.remote.current_user())
            .await?
            .ok_or(SyncError::NotAuthenticated)
    }

    /// Run synchronous repository work. The lock is never held across an
    /// await point.
    fn with_repo<T>(
        &self,
        f: impl FnOnce(&SqliteRepository) -> Result<T, DbError>,
    ) -> Result<T, SyncError> {
        let repo = self
            .inner
            .repository
            .lock()
            .map_err(|_| DbError::LockPoisoned)?;
        Ok(f(&*repo)?)
    }

    async fn push_table(
        &self,
        table: RemoteTable,
        local: DirtyTable,
        rows: Vec<Outgoing>,
        report: &mut PushReport,
    ) -> Result<(), SyncError> {
        for chunk in rows.chunks(self.inner.settings.batch_size) {
            let values: Vec<Value> = chunk.iter().map(|o| o.row.clone()).collect();
            self.inner
                .settings
                .retry
                .run(table.as_str(), || self.inner.remote.upsert(table, values.clone()))
                .await?;

            let confirmed: Vec<(String, String)> = chunk
                .iter()
                .map(|o| (o.key.clone(), o.version.clone()))
                .collect();
            report.upserted += chunk.len();
            report.cleared += self.with_repo(|repo| repo.clear_dirty(local, &confirmed))?;
            debug!(table = table.as_str(), rows = chunk.len(), "batch confirmed");
        }
        Ok(())
    }
}
