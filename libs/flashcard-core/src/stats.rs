//! Per-deck study counters.

use serde::{Deserialize, Serialize};

use crate::types::ProgressStatus;

/// Number of cards in each study status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub new: u32,
    pub learning: u32,
    pub review: u32,
    pub mastered: u32,
}

impl StatusCounts {
    pub fn new(new: u32, learning: u32, review: u32, mastered: u32) -> Self {
        Self {
            new,
            learning,
            review,
            mastered,
        }
    }

    /// Count statuses from scratch.
    pub fn from_statuses<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = ProgressStatus>,
    {
        let mut counts = Self::default();
        for status in statuses {
            *counts.bucket_mut(status) += 1;
        }
        counts
    }

    pub fn total(&self) -> u32 {
        self.new + self.learning + self.review + self.mastered
    }

    pub fn get(&self, status: ProgressStatus) -> u32 {
        match status {
            ProgressStatus::New => self.new,
            ProgressStatus::Learning => self.learning,
            ProgressStatus::Review => self.review,
            ProgressStatus::Mastered => self.mastered,
        }
    }

    fn bucket_mut(&mut self, status: ProgressStatus) -> &mut u32 {
        match status {
            ProgressStatus::New => &mut self.new,
            ProgressStatus::Learning => &mut self.learning,
            ProgressStatus::Review => &mut self.review,
            ProgressStatus::Mastered => &mut self.mastered,
        }
    }

    /// Move one card from `from` to `to`. The source bucket never goes
    /// below zero.
    pub fn apply_transition(&mut self, from: ProgressStatus, to: ProgressStatus) {
        if from == to {
            return;
        }
        let source = self.bucket_mut(from);
        *source = source.saturating_sub(1);
        *self.bucket_mut(to) += 1;
    }
}
