//! Record validation shared by the local store and the sync engine.

use crate::error::ValidationError;
use crate::types::{CustomDeckMetadata, Deck, Flashcard, Progress, TemplateFlashcard};

/// Lowest easiness factor any record may carry.
pub const MINIMUM_EASINESS: f64 = 1.3;

/// Records that can check their own required fields.
pub trait Validate {
    /// Every problem found, empty when the record is valid.
    fn issues(&self) -> Vec<ValidationError>;

    /// First problem found.
    fn validate(&self) -> Result<(), ValidationError> {
        match self.issues().into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

struct Checker {
    entity: &'static str,
    id: String,
    issues: Vec<ValidationError>,
}

impl Checker {
    fn new(entity: &'static str, id: &str) -> Self {
        let mut checker = Self {
            entity,
            id: id.to_string(),
            issues: Vec::new(),
        };
        if id.trim().is_empty() {
            checker.missing("id");
        }
        checker
    }

    fn missing(&mut self, field: &'static str) {
        self.issues.push(ValidationError::MissingField {
            entity: self.entity,
            id: self.id.clone(),
            field,
        });
    }

    fn invalid(&mut self, field: &'static str, reason: impl Into<String>) {
        self.issues.push(ValidationError::InvalidValue {
            entity: self.entity,
            id: self.id.clone(),
            field,
            reason: reason.into(),
        });
    }

    fn required(&mut self, field: &'static str, value: &str) {
        if value.trim().is_empty() {
            self.missing(field);
        }
    }

    fn position(&mut self, position: u32) {
        if position == 0 {
            self.invalid("position", "positions start at 1");
        }
    }

    fn finish(self) -> Vec<ValidationError> {
        self.issues
    }
}

impl Validate for Deck {
    fn issues(&self) -> Vec<ValidationError> {
        let mut check = Checker::new("deck", &self.id);
        check.required("user_id", &self.user_id);
        check.required("name", &self.name);
        match &self.template_id {
            Some(template_id) if template_id.trim().is_empty() => {
                check.invalid("template_id", "empty template id");
            }
            Some(_) if self.is_custom => {
                check.invalid("is_custom", "a template deck cannot be custom");
            }
            _ => {}
        }
        check.finish()
    }
}

impl Validate for CustomDeckMetadata {
    fn issues(&self) -> Vec<ValidationError> {
        let mut check = Checker::new("custom_deck", &self.id);
        check.required("user_id", &self.user_id);
        check.required("name", &self.name);
        check.finish()
    }
}

impl Validate for Flashcard {
    fn issues(&self) -> Vec<ValidationError> {
        let mut check = Checker::new("flashcard", &self.id);
        check.required("deck_id", &self.deck_id);
        check.required("user_id", &self.user_id);
        check.required("front_text", &self.front_text);
        check.required("back_text", &self.back_text);
        check.position(self.position);
        check.finish()
    }
}

impl Validate for TemplateFlashcard {
    fn issues(&self) -> Vec<ValidationError> {
        let mut check = Checker::new("template_flashcard", &self.id);
        check.required("deck_id", &self.deck_id);
        check.required("front_text", &self.front_text);
        check.required("back_text", &self.back_text);
        check.position(self.position);
        check.finish()
    }
}

impl Validate for Progress {
    fn issues(&self) -> Vec<ValidationError> {
        let mut check = Checker::new("progress", &self.flashcard_id);
        check.required("deck_id", &self.deck_id);
        if !self.easiness_factor.is_finite() || self.easiness_factor < MINIMUM_EASINESS {
            check.invalid(
                "easiness_factor",
                format!("{} is below {}", self.easiness_factor, MINIMUM_EASINESS),
            );
        }
        if !self.interval_days.is_finite() || self.interval_days < 0.0 {
            check.invalid("interval_days", "must be a non-negative number");
        }
        check.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn card() -> Flashcard {
        let now = Utc::now();
        Flashcard {
            id: "card-1".to_string(),
            deck_id: "deck-1".to_string(),
            user_id: "user-1".to_string(),
            front_text: "hola".to_string(),
            back_text: "hello".to_string(),
            hint: None,
            front_image: None,
            back_image: None,
            front_audio: None,
            back_audio: None,
            position: 1,
            created_at: now,
            updated_at: now,
            is_dirty: true,
        }
    }

    #[test]
    fn valid_flashcard_has_no_issues() {
        assert!(card().issues().is_empty());
    }

    #[test]
    fn blank_text_and_zero_position_are_reported() {
        let mut card = card();
        card.back_text = "   ".to_string();
        card.position = 0;
        let issues = card.issues();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].record_id(), Some("card-1"));
    }

    #[test]
    fn template_deck_cannot_be_custom() {
        let mut deck = Deck::new_custom("d".into(), "u".into(), "Spanish".into(), Utc::now());
        deck.template_id = Some("tpl".into());
        assert!(deck.validate().is_err());
        deck.is_custom = false;
        assert!(deck.validate().is_ok());
    }

    #[test]
    fn progress_easiness_floor_is_enforced() {
        let mut progress = Progress::new("card-1", "deck-1", 2.5, Utc::now());
        assert!(progress.validate().is_ok());
        progress.easiness_factor = 1.1;
        assert!(matches!(
            progress.validate(),
            Err(ValidationError::InvalidValue { field: "easiness_factor", .. })
        ));
    }
}
