use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const GRADE_HISTORY_CAP: usize = 20;
pub const DEFAULT_STABILITY: f64 = 1.0;
pub const DEFAULT_DIFFICULTY: f64 = 5.0;
pub const DEFAULT_RETRIEVABILITY: f64 = 0.9;
pub const MIN_DIFFICULTY: f64 = 1.0;
pub const MAX_DIFFICULTY: f64 = 10.0;

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("grade must be between 1 and 4, got {0}")]
pub struct InvalidGrade(pub u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Grade {
    Again = 1,
    Hard = 2,
    Good = 3,
    Easy = 4,
}

impl Grade {
    pub fn value(self) -> u8 {
        self as u8
    }

    pub fn is_success(self) -> bool {
        self >= Self::Good
    }
}

impl TryFrom<u8> for Grade {
    type Error = InvalidGrade;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Again),
            2 => Ok(Self::Hard),
            3 => Ok(Self::Good),
            4 => Ok(Self::Easy),
            other => Err(InvalidGrade(other)),
        }
    }
}

impl From<Grade> for u8 {
    fn from(grade: Grade) -> Self {
        grade.value()
    }
}

/// Macro-state that governs the next stability transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryPhase {
    New,
    Stable,
    Lapsed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryState {
    #[serde(default)]
    pub item: String,
    #[serde(default = "default_stability")]
    pub stability: f64,
    #[serde(default = "default_difficulty")]
    pub difficulty: f64,
    #[serde(default = "default_retrievability")]
    pub retrievability: f64,
    #[serde(default)]
    pub last_review: Option<DateTime<Utc>>,
    #[serde(default)]
    pub review_count: u32,
    #[serde(default)]
    pub grade_history: Vec<u8>,
}

fn default_stability() -> f64 {
    DEFAULT_STABILITY
}

fn default_difficulty() -> f64 {
    DEFAULT_DIFFICULTY
}

fn default_retrievability() -> f64 {
    DEFAULT_RETRIEVABILITY
}

impl MemoryState {
    pub fn new(item: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            stability: DEFAULT_STABILITY,
            difficulty: DEFAULT_DIFFICULTY,
            retrievability: DEFAULT_RETRIEVABILITY,
            last_review: None,
            review_count: 0,
            grade_history: Vec::new(),
        }
    }

    pub fn is_new(&self) -> bool {
        self.review_count == 0 || self.last_review.is_none()
    }

    pub fn last_grade(&self) -> Option<Grade> {
        self.grade_history
            .last()
            .and_then(|g| Grade::try_from(*g).ok())
    }

    pub fn phase(&self) -> MemoryPhase {
        match self.last_grade() {
            None => MemoryPhase::New,
            Some(Grade::Again) => MemoryPhase::Lapsed,
            Some(_) => MemoryPhase::Stable,
        }
    }

    pub fn average_grade(&self) -> Option<f64> {
        if self.grade_history.is_empty() {
            return None;
        }
        let sum: u32 = self.grade_history.iter().map(|g| *g as u32).sum();
        Some(sum as f64 / self.grade_history.len() as f64)
    }

    pub fn elapsed_days(&self, now: DateTime<Utc>) -> f64 {
        match self.last_review {
            Some(last) => {
                let secs = (now - last).num_milliseconds() as f64 / 1000.0;
                (secs / SECONDS_PER_DAY).max(0.0)
            }
            None => 0.0,
        }
    }

    pub fn push_grade(&mut self, grade: Grade) {
        self.grade_history.push(grade.value());
        if self.grade_history.len() > GRADE_HISTORY_CAP {
            let overflow = self.grade_history.len() - GRADE_HISTORY_CAP;
            self.grade_history.drain(..overflow);
        }
    }

    /// Normalizes a record read from storage. Returns `None` when the record cannot
    /// describe a usable state (non-positive or non-finite stability).
    pub fn sanitized(mut self, key: &str) -> Option<Self> {
        if !self.stability.is_finite() || self.stability <= 0.0 {
            return None;
        }
        if self.item.is_empty() {
            self.item = key.to_string();
        }
        self.difficulty = if self.difficulty.is_finite() {
            self.difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
        } else {
            DEFAULT_DIFFICULTY
        };
        self.retrievability = if self.retrievability.is_finite() {
            self.retrievability.clamp(0.0, 1.0)
        } else {
            DEFAULT_RETRIEVABILITY
        };
        self.grade_history.retain(|g| (1..=4).contains(g));
        if self.grade_history.len() > GRADE_HISTORY_CAP {
            let overflow = self.grade_history.len() - GRADE_HISTORY_CAP;
            self.grade_history.drain(..overflow);
        }
        Some(self)
    }
}
