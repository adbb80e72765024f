//! Command handlers over a shared application state.

mod common;

use pretty_assertions::assert_eq;

use common::{TestContext, USER};
use flashcard_core::{ProgressStatus, StatusCounts};
use flashcards_client::commands;
use flashcards_client::db::{
    DeckEdit, DeckRepository, DeletionQueue, FlashcardEdit, FlashcardRepository, NewFlashcard,
};
use flashcards_client::remote::RemoteTable;
use flashcards_client::sync::SyncStatus;

fn card(front: &str, back: &str) -> NewFlashcard {
    NewFlashcard {
        front_text: front.into(),
        back_text: back.into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_deck_lifecycle() {
    let ctx = TestContext::new();
    let state = &ctx.state;

    let deck = commands::create_deck(state, USER, "  Verbs ".into()).await.unwrap();
    assert_eq!(deck.name, "Verbs");
    assert!(commands::create_deck(state, USER, "   ".into()).await.is_err());

    let deck = commands::update_deck(
        state,
        &deck.id,
        DeckEdit {
            description: Some("Irregular verbs".into()),
            tags: Some(vec!["grammar".into()]),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(deck.description.as_deref(), Some("Irregular verbs"));
    assert_eq!(deck.tags, vec!["grammar".to_string()]);

    let decks = commands::list_decks(state, USER).await.unwrap();
    assert_eq!(decks.len(), 1);
    assert!(commands::list_decks(state, "someone-else").await.unwrap().is_empty());

    assert!(commands::delete_deck(state, &deck.id).await.unwrap());
    assert!(!commands::delete_deck(state, &deck.id).await.unwrap());
    assert!(commands::list_decks(state, USER).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_flashcard_editing_and_order() {
    let ctx = TestContext::new();
    let state = &ctx.state;
    let deck = commands::create_deck(state, USER, "Capitals".into()).await.unwrap();

    let mut ids = Vec::new();
    for (front, back) in [("France", "Paris"), ("Spain", "Madrid"), ("Peru", "Lima")] {
        let created = commands::create_flashcard(state, &deck.id, card(front, back))
            .await
            .unwrap();
        ids.push(created.id);
    }

    let edited = commands::update_flashcard(
        state,
        &ids[1],
        FlashcardEdit {
            hint: Some("Starts with M".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(edited.hint.as_deref(), Some("Starts with M"));

    let reversed: Vec<String> = ids.iter().rev().cloned().collect();
    commands::reorder_flashcards(state, &deck.id, reversed.clone())
        .await
        .unwrap();
    let cards = commands::list_flashcards(state, &deck.id).await.unwrap();
    let order: Vec<(String, u32)> = cards.iter().map(|c| (c.id.clone(), c.position)).collect();
    assert_eq!(
        order,
        vec![
            (reversed[0].clone(), 1),
            (reversed[1].clone(), 2),
            (reversed[2].clone(), 3),
        ]
    );

    assert!(commands::reorder_flashcards(state, &deck.id, ids[..2].to_vec())
        .await
        .is_err());

    assert!(commands::delete_flashcard(state, &ids[0]).await.unwrap());
    let positions: Vec<u32> = commands::list_flashcards(state, &deck.id)
        .await
        .unwrap()
        .iter()
        .map(|c| c.position)
        .collect();
    assert_eq!(positions, vec![1, 2]);
}

#[tokio::test]
async fn test_study_flow() {
    let ctx = TestContext::new();
    let state = &ctx.state;
    let deck = commands::create_deck(state, USER, "Numbers".into()).await.unwrap();
    let one = commands::create_flashcard(state, &deck.id, card("uno", "one")).await.unwrap();
    commands::create_flashcard(state, &deck.id, card("dos", "two")).await.unwrap();

    assert_eq!(commands::get_due_count(state, &deck.id).await.unwrap(), 0);

    let outcome = commands::apply_answer(state, &deck.id, &one.id, true).await.unwrap();
    assert_eq!(outcome.previous_status, ProgressStatus::New);
    assert_eq!(outcome.progress.status, ProgressStatus::Learning);
    assert_eq!(outcome.stats, StatusCounts::new(1, 1, 0, 0));

    let queue = commands::get_study_queue(state, &deck.id).await.unwrap();
    assert_eq!(queue.len(), 2);
    assert_eq!(queue[0].status, ProgressStatus::Learning);
    assert!(queue[0].due);
    assert_eq!(queue[1].status, ProgressStatus::New);
    assert_eq!(commands::get_due_count(state, &deck.id).await.unwrap(), 1);

    assert!(commands::apply_answer(state, &deck.id, "missing", true).await.is_err());

    let stats = commands::recalculate_stats(state, &deck.id).await.unwrap();
    assert_eq!(stats, StatusCounts::new(1, 1, 0, 0));
    assert_eq!(
        commands::get_deck_stats(state, &deck.id).await.unwrap(),
        Some(stats)
    );
    assert!(commands::recalculate_stats(state, "missing").await.is_err());
}

#[tokio::test]
async fn test_sync_commands() {
    let ctx = TestContext::new();
    let state = &ctx.state;
    let deck = commands::create_deck(state, USER, "Colors".into()).await.unwrap();

    assert!(matches!(commands::get_sync_status(state).await, SyncStatus::Idle));
    assert!(commands::sync_to_cloud(state).await);
    assert!(matches!(
        commands::get_sync_status(state).await,
        SyncStatus::Completed { .. }
    ));

    let pulled = commands::sync_from_remote(state, USER).await.unwrap();
    assert_eq!(pulled.fetched, 2);

    assert!(commands::enqueue_deletion(state, "deck", &deck.id).await.unwrap());
    assert!(ctx.repo().get_deck(&deck.id).unwrap().is_none());
    assert!(!commands::enqueue_deletion(state, "deck", &deck.id).await.unwrap());
    assert!(commands::clear_deletion(state, "deck", &deck.id).await.unwrap());
    assert!(!commands::clear_deletion(state, "deck", &deck.id).await.unwrap());
    assert!(commands::enqueue_deletion(state, "card", &deck.id).await.is_err());
}

#[tokio::test]
async fn test_enqueued_deletions_converge_locally_and_remotely() {
    let ctx = TestContext::new();
    let state = &ctx.state;
    let (deck, cards) = ctx.seed_deck("Greek", 2);
    commands::apply_answer(state, &deck.id, &cards[0].id, true).await.unwrap();
    commands::apply_answer(state, &deck.id, &cards[1].id, true).await.unwrap();
    assert!(commands::sync_to_cloud(state).await);
    assert!(ctx.remote.row(RemoteTable::Progress, &cards[0].id).is_some());

    assert!(commands::enqueue_deletion(state, "flashcard", &cards[0].id).await.unwrap());
    assert!(commands::sync_to_cloud(state).await);

    assert!(ctx.repo().get_flashcard(&cards[0].id).unwrap().is_none());
    assert!(ctx.remote.row(RemoteTable::Flashcards, &cards[0].id).is_none());
    assert!(ctx.remote.row(RemoteTable::Progress, &cards[0].id).is_none());
    assert_eq!(ctx.repo().get_deck(&deck.id).unwrap().unwrap().flashcard_count, 1);

    assert!(commands::enqueue_deletion(state, "deck", &deck.id).await.unwrap());
    assert!(commands::sync_to_cloud(state).await);

    assert!(ctx.repo().get_deck(&deck.id).unwrap().is_none());
    assert!(ctx.repo().get_flashcard(&cards[1].id).unwrap().is_none());
    assert!(ctx.repo().list_pending_deletions().unwrap().is_empty());
    for table in RemoteTable::ALL {
        assert!(ctx.remote.rows(table).is_empty(), "{:?} not emptied", table);
    }

    let pulled = commands::sync_from_remote(state, USER).await.unwrap();
    assert_eq!(pulled.fetched, 0);
    assert!(commands::list_decks(state, USER).await.unwrap().is_empty());
}
