//! Scheduler parameters and the named strategies built from them.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::validation::MINIMUM_EASINESS;

/// Named scheduling strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Fixed counter thresholds with doubling review intervals.
    Threshold,
    /// Easiness-factor driven intervals in the style of SuperMemo 2.
    Sm2,
}

impl Default for Strategy {
    fn default() -> Self {
        Self::Threshold
    }
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Threshold => "threshold",
            Self::Sm2 => "sm2",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "threshold" => Some(Self::Threshold),
            "sm2" => Some(Self::Sm2),
            _ => None,
        }
    }
}

/// Thresholds and intervals driving the progress state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Consecutive passes needed to leave `learning`.
    pub learning_threshold: u32,
    /// Consecutive passes needed to reach `mastered`.
    pub mastery_threshold: u32,
    pub new_step_minutes: i64,
    pub learning_step_minutes: i64,
    pub retry_minutes: i64,
    pub graduating_interval_days: f64,
    /// Upper bound on review interval growth per pass. `None` grows by the
    /// easiness factor alone.
    pub interval_multiplier: Option<f64>,
    pub maximum_interval_days: f64,
    pub initial_ease: f64,
    pub minimum_ease: f64,
    pub ease_bonus: f64,
    pub ease_penalty: f64,
}

impl SchedulerConfig {
    pub fn for_strategy(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Threshold => Self::threshold(),
            Strategy::Sm2 => Self::sm2(),
        }
    }

    pub fn threshold() -> Self {
        Self {
            learning_threshold: 2,
            mastery_threshold: 5,
            new_step_minutes: 10,
            learning_step_minutes: 5,
            retry_minutes: 1,
            graduating_interval_days: 1.0,
            interval_multiplier: Some(2.0),
            maximum_interval_days: 180.0,
            initial_ease: 2.5,
            minimum_ease: MINIMUM_EASINESS,
            ease_bonus: 0.0,
            ease_penalty: 0.2,
        }
    }

    pub fn sm2() -> Self {
        Self {
            learning_threshold: 2,
            mastery_threshold: 8,
            new_step_minutes: 1,
            learning_step_minutes: 10,
            retry_minutes: 10,
            graduating_interval_days: 1.0,
            interval_multiplier: None,
            maximum_interval_days: 365.0,
            initial_ease: 2.5,
            minimum_ease: MINIMUM_EASINESS,
            ease_bonus: 0.1,
            ease_penalty: 0.2,
        }
    }

    /// Consecutive passing answers that take a `new` card to `mastered`.
    pub fn passes_to_mastery(&self) -> u32 {
        self.mastery_threshold
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let fail = |reason: &str| Err(ValidationError::InvalidConfig(reason.to_string()));

        if self.learning_threshold == 0 {
            return fail("learning_threshold must be at least 1");
        }
        if self.mastery_threshold <= self.learning_threshold {
            return fail("mastery_threshold must exceed learning_threshold");
        }
        if self.new_step_minutes < 0 || self.learning_step_minutes < 0 || self.retry_minutes < 0 {
            return fail("step minutes cannot be negative");
        }
        if !(self.graduating_interval_days > 0.0) {
            return fail("graduating_interval_days must be positive");
        }
        if self.maximum_interval_days < self.graduating_interval_days {
            return fail("maximum_interval_days is below graduating_interval_days");
        }
        if let Some(multiplier) = self.interval_multiplier {
            if !(multiplier > 1.0) {
                return fail("interval_multiplier must be greater than 1");
            }
        }
        if self.minimum_ease < MINIMUM_EASINESS || self.initial_ease < self.minimum_ease {
            return fail("easiness factors must be at least 1.3");
        }
        if self.ease_bonus < 0.0 || self.ease_penalty < 0.0 {
            return fail("ease adjustments cannot be negative");
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::for_strategy(Strategy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid() {
        assert!(SchedulerConfig::threshold().validate().is_ok());
        assert!(SchedulerConfig::sm2().validate().is_ok());
    }

    #[test]
    fn mastery_must_exceed_learning() {
        let config = SchedulerConfig {
            mastery_threshold: 2,
            ..SchedulerConfig::threshold()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn strategy_names_round_trip() {
        for strategy in [Strategy::Threshold, Strategy::Sm2] {
            assert_eq!(Strategy::from_str(strategy.as_str()), Some(strategy));
        }
        assert_eq!(Strategy::from_str("fsrs"), None);
    }
}
