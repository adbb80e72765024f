//! Test fixtures and factory functions for creating test data.

use chrono::{DateTime, Duration, TimeZone, Utc};
use flashcards_client::db::NewFlashcard;

/// Fixed clock so stored versions are predictable.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
}

pub fn minutes_later(minutes: i64) -> DateTime<Utc> {
    now() + Duration::minutes(minutes)
}

pub fn new_card(i: usize) -> NewFlashcard {
    NewFlashcard {
        front_text: format!("Question {}?", i),
        back_text: format!("Answer {}.", i),
        ..Default::default()
    }
}
