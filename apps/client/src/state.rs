//! Application state.

use std::sync::{Arc, Mutex, MutexGuard};

use flashcard_core::Scheduler;

use crate::db::{DbError, SqliteRepository};
use crate::remote::RemoteStore;
use crate::sync::{SyncEngine, SyncSettings};

/// State shared by the command handlers.
pub struct AppState {
    pub repository: Arc<Mutex<SqliteRepository>>,
    pub scheduler: Scheduler,
    pub sync: SyncEngine,
}

impl AppState {
    pub fn new(
        repository: SqliteRepository,
        scheduler: Scheduler,
        remote: Arc<dyn RemoteStore>,
        settings: SyncSettings,
    ) -> Self {
        let repository = Arc::new(Mutex::new(repository));
        let sync = SyncEngine::new(Arc::clone(&repository), remote, settings);
        Self {
            repository,
            scheduler,
            sync,
        }
    }

    /// Lock the repository for synchronous work.
    pub fn repo(&self) -> Result<MutexGuard<'_, SqliteRepository>, DbError> {
        self.repository.lock().map_err(|_| DbError::LockPoisoned)
    }
}
