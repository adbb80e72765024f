//! Progress scheduling.
//!
//! A single state machine `new → learning → review → mastered` whose
//! thresholds and intervals come from a [`SchedulerConfig`]. The named
//! [`Strategy`] presets express the counter-threshold and SM-2 styles as
//! parameterizations of the same transitions.

pub mod config;

pub use config::{SchedulerConfig, Strategy};

use crate::error::ValidationError;
use crate::types::{Progress, ProgressStatus};
use chrono::{DateTime, Duration, Utc};

/// Result of scheduling a card after an answer.
#[derive(Debug, Clone)]
pub struct SchedulingResult {
    pub progress: Progress,
    pub previous_status: ProgressStatus,
}

impl SchedulingResult {
    pub fn status_changed(&self) -> bool {
        self.previous_status != self.progress.status
    }
}

/// Pure answer scheduler.
#[derive(Debug, Clone)]
pub struct Scheduler {
    strategy: Option<Strategy>,
    config: SchedulerConfig,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::for_strategy(Strategy::default())
    }
}

impl Scheduler {
    /// Scheduler with custom parameters.
    pub fn new(config: SchedulerConfig) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self {
            strategy: None,
            config,
        })
    }

    pub fn for_strategy(strategy: Strategy) -> Self {
        Self {
            strategy: Some(strategy),
            config: SchedulerConfig::for_strategy(strategy),
        }
    }

    /// Strategy identifier, `custom` for hand-built configs.
    pub fn name(&self) -> &'static str {
        self.strategy.map_or("custom", |s| s.as_str())
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Starting progress for a card with no stored row.
    pub fn initial_progress(&self, flashcard_id: &str, deck_id: &str, now: DateTime<Utc>) -> Progress {
        Progress::new(flashcard_id, deck_id, self.config.initial_ease, now)
    }

    /// Compute the next progress record for an answer. `current` is `None`
    /// for a card that was never answered.
    pub fn apply_answer(
        &self,
        current: Option<&Progress>,
        flashcard_id: &str,
        deck_id: &str,
        passed: bool,
        now: DateTime<Utc>,
    ) -> SchedulingResult {
        let mut next = match current {
            Some(progress) => progress.clone(),
            None => self.initial_progress(flashcard_id, deck_id, now),
        };
        let previous_status = next.status;

        if passed {
            next.correct_count += 1;
            self.on_pass(&mut next, now);
        } else {
            next.incorrect_count += 1;
            self.on_fail(&mut next, now);
        }

        next.last_reviewed_at = Some(now);
        next.updated_at = now;
        next.is_dirty = true;

        SchedulingResult {
            progress: next,
            previous_status,
        }
    }

    fn on_pass(&self, progress: &mut Progress, now: DateTime<Utc>) {
        let cfg = &self.config;
        match progress.status {
            ProgressStatus::New | ProgressStatus::Learning => {
                let was_new = progress.status == ProgressStatus::New;
                progress.repetition += 1;
                if progress.repetition >= cfg.learning_threshold {
                    progress.status = ProgressStatus::Review;
                    progress.interval_days = cfg.graduating_interval_days;
                    progress.next_review_at = Some(now + days(progress.interval_days));
                } else {
                    let step = if was_new {
                        cfg.new_step_minutes
                    } else {
                        cfg.learning_step_minutes
                    };
                    progress.status = ProgressStatus::Learning;
                    progress.interval_days = 0.0;
                    progress.next_review_at = Some(now + Duration::minutes(step));
                }
            }
            ProgressStatus::Review => {
                progress.repetition += 1;
                if progress.repetition >= cfg.mastery_threshold {
                    progress.status = ProgressStatus::Mastered;
                    progress.interval_days = 0.0;
                    progress.next_review_at = None;
                } else {
                    let growth = match cfg.interval_multiplier {
                        Some(multiplier) => multiplier.min(progress.easiness_factor),
                        None => progress.easiness_factor,
                    };
                    let previous = progress.interval_days.max(cfg.graduating_interval_days);
                    progress.interval_days = (previous * growth)
                        .max(previous + 1.0)
                        .min(cfg.maximum_interval_days);
                    progress.easiness_factor += cfg.ease_bonus;
                    progress.next_review_at = Some(now + days(progress.interval_days));
                }
            }
            ProgressStatus::Mastered => {}
        }
    }

    fn on_fail(&self, progress: &mut Progress, now: DateTime<Utc>) {
        let cfg = &self.config;
        progress.status = ProgressStatus::Learning;
        progress.repetition = 0;
        progress.interval_days = 0.0;
        progress.easiness_factor = (progress.easiness_factor - cfg.ease_penalty).max(cfg.minimum_ease);
        progress.next_review_at = Some(now + Duration::minutes(cfg.retry_minutes));
    }
}

/// Get a scheduler by strategy name.
pub fn get_scheduler(name: &str) -> Option<Scheduler> {
    Strategy::from_str(name).map(Scheduler::for_strategy)
}

fn days(interval_days: f64) -> Duration {
    Duration::seconds((interval_days * 86_400.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn answer(scheduler: &Scheduler, current: Option<&Progress>, passed: bool) -> Progress {
        scheduler
            .apply_answer(current, "card-1", "deck-1", passed, now())
            .progress
    }

    #[test]
    fn first_pass_enters_learning() {
        let scheduler = Scheduler::for_strategy(Strategy::Threshold);
        let result = scheduler.apply_answer(None, "card-1", "deck-1", true, now());
        assert_eq!(result.previous_status, ProgressStatus::New);
        assert_eq!(result.progress.status, ProgressStatus::Learning);
        assert_eq!(result.progress.repetition, 1);
        assert_eq!(result.progress.correct_count, 1);
        assert!(result.progress.is_dirty);
        assert!(result.progress.next_review_at.is_some());
    }

    #[test]
    fn second_pass_graduates_to_review() {
        let scheduler = Scheduler::for_strategy(Strategy::Threshold);
        let learning = answer(&scheduler, None, true);
        let review = answer(&scheduler, Some(&learning), true);
        assert_eq!(review.status, ProgressStatus::Review);
        assert_eq!(review.interval_days, 1.0);
    }

    #[test]
    fn learning_stays_until_threshold() {
        let config = SchedulerConfig {
            learning_threshold: 3,
            ..SchedulerConfig::threshold()
        };
        let scheduler = Scheduler::new(config).unwrap();
        let first = answer(&scheduler, None, true);
        let second = answer(&scheduler, Some(&first), true);
        assert_eq!(second.status, ProgressStatus::Learning);
        assert_eq!(second.repetition, 2);
        let third = answer(&scheduler, Some(&second), true);
        assert_eq!(third.status, ProgressStatus::Review);
    }

    #[test]
    fn review_interval_grows() {
        let scheduler = Scheduler::for_strategy(Strategy::Sm2);
        let mut progress = answer(&scheduler, None, true);
        progress = answer(&scheduler, Some(&progress), true);
        let before = progress.interval_days;
        progress = answer(&scheduler, Some(&progress), true);
        assert_eq!(progress.status, ProgressStatus::Review);
        assert!(progress.interval_days > before);
        assert!(progress.easiness_factor > 2.5);
    }

    #[test]
    fn threshold_growth_is_bounded_by_easiness() {
        let scheduler = Scheduler::for_strategy(Strategy::Threshold);
        let mut progress = answer(&scheduler, None, true);
        progress = answer(&scheduler, Some(&progress), true);
        progress.easiness_factor = 1.5;
        progress.interval_days = 10.0;
        let next = answer(&scheduler, Some(&progress), true);
        assert_eq!(next.interval_days, 15.0);
    }

    #[test]
    fn both_strategies_reach_mastery_in_configured_passes() {
        for strategy in [Strategy::Threshold, Strategy::Sm2] {
            let scheduler = Scheduler::for_strategy(strategy);
            let passes = scheduler.config().passes_to_mastery();
            let mut progress: Option<Progress> = None;
            for step in 1..=passes {
                let next = answer(&scheduler, progress.as_ref(), true);
                if step < passes {
                    assert_ne!(next.status, ProgressStatus::Mastered, "{strategy:?} step {step}");
                }
                progress = Some(next);
            }
            let mastered = progress.unwrap();
            assert_eq!(mastered.status, ProgressStatus::Mastered, "{strategy:?}");
            assert_eq!(mastered.next_review_at, None);
        }
    }

    #[test]
    fn mastered_pass_is_idempotent() {
        let scheduler = Scheduler::for_strategy(Strategy::Threshold);
        let mut progress = scheduler.initial_progress("card-1", "deck-1", now());
        progress.status = ProgressStatus::Mastered;
        progress.repetition = 5;
        let next = answer(&scheduler, Some(&progress), true);
        assert_eq!(next.status, ProgressStatus::Mastered);
        assert_eq!(next.repetition, 5);
        assert_eq!(next.correct_count, 1);
    }

    #[test]
    fn failure_returns_to_learning_from_any_state() {
        let scheduler = Scheduler::for_strategy(Strategy::Sm2);
        for status in ProgressStatus::ALL {
            let mut progress = scheduler.initial_progress("card-1", "deck-1", now());
            progress.status = status;
            progress.repetition = 4;
            progress.interval_days = 12.0;
            let next = answer(&scheduler, Some(&progress), false);
            assert_eq!(next.status, ProgressStatus::Learning, "from {status:?}");
            assert_eq!(next.repetition, 0);
            assert_eq!(next.interval_days, 0.0);
            assert_eq!(next.incorrect_count, 1);
        }
    }

    #[test]
    fn easiness_never_below_minimum() {
        let scheduler = Scheduler::for_strategy(Strategy::Sm2);
        let mut progress = scheduler.initial_progress("card-1", "deck-1", now());
        progress.easiness_factor = 1.4;
        let next = answer(&scheduler, Some(&progress), false);
        assert!(next.easiness_factor >= 1.3);
        let again = answer(&scheduler, Some(&next), false);
        assert_eq!(again.easiness_factor, 1.3);
    }

    #[test]
    fn get_scheduler_by_name() {
        assert_eq!(get_scheduler("sm2").map(|s| s.name()), Some("sm2"));
        assert!(get_scheduler("unknown").is_none());
    }
}
