//! Shared fixtures for client integration tests.
//!
//! Everything runs against an in-memory SQLite database and
//! [`InMemoryRemote`], so no external services are needed.

#![allow(dead_code)]

pub mod fixtures;

use std::sync::{Arc, MutexGuard};

use flashcard_core::{Deck, Flashcard, Scheduler};
use flashcards_client::db::{DeckRepository, FlashcardRepository, SqliteRepository};
use flashcards_client::remote::InMemoryRemote;
use flashcards_client::sync::{RetryPolicy, SyncEngine, SyncSettings};
use flashcards_client::AppState;

pub const USER: &str = "user-1";

/// Local store, remote store and engine wired together.
pub struct TestContext {
    pub state: AppState,
    pub remote: Arc<InMemoryRemote>,
}

impl TestContext {
    /// Signed in as [`USER`], retrying up to 3 times without delay.
    pub fn new() -> Self {
        Self::with_remote(InMemoryRemote::with_user(USER))
    }

    pub fn with_remote(remote: InMemoryRemote) -> Self {
        let remote = Arc::new(remote);
        let repository = SqliteRepository::open_in_memory().expect("in-memory database");
        let state = AppState::new(
            repository,
            Scheduler::default(),
            remote.clone(),
            SyncSettings {
                retry: RetryPolicy::immediate(3),
                batch_size: 2,
            },
        );
        Self { state, remote }
    }

    pub fn repo(&self) -> MutexGuard<'_, SqliteRepository> {
        self.state.repo().expect("repository lock")
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.state.sync
    }

    /// Custom deck with `count` cards, all dirty.
    pub fn seed_deck(&self, name: &str, count: usize) -> (Deck, Vec<Flashcard>) {
        let repo = self.repo();
        let deck = repo
            .create_custom_deck(USER, name, fixtures::now())
            .expect("create deck");
        let cards = (1..=count)
            .map(|i| {
                repo.create_flashcard(&deck.id, &fixtures::new_card(i), fixtures::now())
                    .expect("create card")
            })
            .collect();
        let deck = repo.get_deck(&deck.id).expect("load deck").expect("deck exists");
        (deck, cards)
    }

    /// Number of dirty rows across all tables.
    pub fn dirty_count(&self) -> usize {
        use flashcards_client::db::SyncRepository;
        self.repo().dirty_snapshot().expect("snapshot").len()
    }
}
