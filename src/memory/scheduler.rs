use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::state::{Grade, MemoryPhase, MemoryState, MAX_DIFFICULTY, MIN_DIFFICULTY};
use super::store::{LoadReport, MemoryStore};
use crate::persistence::PersistenceError;

const DECAY_SCALE: f64 = 9.0;
const STABILITY_EXPONENT: f64 = -0.15;
const LAPSE_DIFFICULTY_EXPONENT: f64 = 0.2;
/// Lowest stability a lapse can reach. Below `min_stability` each lapse halves
/// stability down to this bound, after which it stays put.
pub const STABILITY_EPSILON: f64 = 1e-3;
const MIN_INTERVAL_DAYS: f64 = 1.0;
const MAX_INTERVAL_DAYS: f64 = 36_500.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerParams {
    pub difficulty_step: f64,
    pub max_growth: f64,
    pub easy_bonus: f64,
    pub hard_growth: f64,
    pub relearning_damping: f64,
    pub lapse_factor: f64,
    pub min_stability: f64,
    pub max_stability: f64,
    pub desired_retention: f64,
    pub new_item_ratio: f64,
}

impl Default for SchedulerParams {
    fn default() -> Self {
        Self {
            difficulty_step: 0.5,
            max_growth: 3.0,
            easy_bonus: 1.3,
            hard_growth: 0.2,
            relearning_damping: 0.5,
            lapse_factor: 0.3,
            min_stability: 0.1,
            max_stability: 36_500.0,
            desired_retention: 0.9,
            new_item_ratio: 0.4,
        }
    }
}

impl SchedulerParams {
    pub fn with_retention(mut self, desired_retention: f64, new_item_ratio: f64) -> Self {
        if desired_retention.is_finite() && desired_retention > 0.0 && desired_retention < 1.0 {
            self.desired_retention = desired_retention;
        }
        if new_item_ratio.is_finite() {
            self.new_item_ratio = new_item_ratio.clamp(0.0, 1.0);
        }
        self
    }
}

/// `R = (1 + t / (9S))^-1`, with negative elapsed time treated as zero.
pub fn retrievability(stability: f64, elapsed_days: f64) -> f64 {
    if !stability.is_finite() || stability <= 0.0 {
        return 0.0;
    }
    let t = elapsed_days.max(0.0);
    (1.0 / (1.0 + t / (DECAY_SCALE * stability))).clamp(0.0, 1.0)
}

pub fn next_interval(stability: f64, desired_retention: f64) -> f64 {
    let r = desired_retention.clamp(0.01, 0.99);
    (DECAY_SCALE * stability * (1.0 / r - 1.0)).clamp(MIN_INTERVAL_DAYS, MAX_INTERVAL_DAYS)
}

fn next_difficulty(difficulty: f64, grade: Grade, params: &SchedulerParams) -> f64 {
    let delta = (grade.value() as f64 - 3.0) * params.difficulty_step;
    (difficulty - delta).clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
}

fn success_stability(
    stability: f64,
    difficulty: f64,
    r: f64,
    grade: Grade,
    relearning: bool,
    params: &SchedulerParams,
) -> f64 {
    let ease = (11.0 - difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)) / 10.0;
    let mut increase =
        params.max_growth * (1.1 - r) * ease * stability.powf(STABILITY_EXPONENT);
    if grade == Grade::Easy {
        increase *= params.easy_bonus;
    }
    if relearning {
        increase *= params.relearning_damping;
    }
    stability * (1.0 + increase.max(0.0))
}

fn lapse_stability(stability: f64, difficulty: f64, params: &SchedulerParams) -> f64 {
    let ease = (11.0 - difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)) / 10.0;
    let candidate = (stability * params.lapse_factor * ease.powf(LAPSE_DIFFICULTY_EXPONENT))
        .max(params.min_stability);
    if candidate < stability {
        candidate
    } else if stability > STABILITY_EPSILON {
        // already at or under the floor
        (stability * 0.5).max(STABILITY_EPSILON)
    } else {
        stability
    }
}

/// Pure transition for one review at `r_at_review`.
pub fn next_state(
    state: &MemoryState,
    grade: Grade,
    r_at_review: f64,
    now: DateTime<Utc>,
    params: &SchedulerParams,
) -> MemoryState {
    let stability = state.stability;
    let relearning = state.phase() == MemoryPhase::Lapsed;
    let cap = params.max_stability.max(stability);

    let new_stability = match grade {
        Grade::Again => lapse_stability(stability, state.difficulty, params),
        Grade::Hard => (stability * (1.0 + params.hard_growth * (1.0 - r_at_review))).min(cap),
        Grade::Good | Grade::Easy => success_stability(
            stability,
            state.difficulty,
            r_at_review,
            grade,
            relearning,
            params,
        )
        .min(cap),
    };

    let mut next = state.clone();
    next.stability = new_stability;
    next.difficulty = next_difficulty(state.difficulty, grade, params);
    next.retrievability = 1.0;
    next.last_review = Some(now);
    next.review_count = state.review_count.saturating_add(1);
    next.push_grade(grade);
    next
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DifficultyDistribution {
    pub easy: usize,
    pub medium: usize,
    pub hard: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LearningStatistics {
    pub total_items: usize,
    pub reviewed_items: usize,
    pub new_items: usize,
    pub due_items: usize,
    pub total_reviews: u64,
    pub average_stability: f64,
    pub average_difficulty: f64,
    pub average_retrievability: f64,
    pub difficulty_distribution: DifficultyDistribution,
}

pub struct SpacedRepetitionScheduler {
    store: Arc<MemoryStore>,
    params: SchedulerParams,
}

impl SpacedRepetitionScheduler {
    pub fn new(store: Arc<MemoryStore>, params: SchedulerParams) -> Self {
        Self { store, params }
    }

    pub fn params(&self) -> &SchedulerParams {
        &self.params
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Never-reviewed states keep their stored default.
    pub fn retrievability(&self, state: &MemoryState, now: DateTime<Utc>) -> f64 {
        if state.last_review.is_none() {
            return state.retrievability;
        }
        retrievability(state.stability, state.elapsed_days(now))
    }

    pub fn get_memory_state(&self, key: &str) -> MemoryState {
        self.get_memory_state_at(key, Utc::now())
    }

    pub fn get_memory_state_at(&self, key: &str, now: DateTime<Utc>) -> MemoryState {
        let mut state = self.store.get_or_create(key);
        state.retrievability = self.retrievability(&state, now);
        state
    }

    pub fn review(&self, key: &str, grade: Grade) -> MemoryState {
        self.review_at(key, grade, Utc::now())
    }

    pub fn review_at(&self, key: &str, grade: Grade, now: DateTime<Utc>) -> MemoryState {
        let result = self.store.apply::<std::convert::Infallible>(key, |current| {
            let r = self.retrievability(current, now);
            Ok(next_state(current, grade, r, now, &self.params))
        });
        let next = match result {
            Ok(state) => state,
            Err(never) => match never {},
        };
        debug!(
            item = key,
            grade = grade.value(),
            stability = next.stability,
            difficulty = next.difficulty,
            "review applied"
        );
        next
    }

    pub fn get_due_words<S: AsRef<str>>(&self, candidates: &[S], count: usize) -> Vec<String> {
        self.get_due_words_at(candidates, count, Utc::now())
    }

    pub fn get_due_words_at<S: AsRef<str>>(
        &self,
        candidates: &[S],
        count: usize,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        if count == 0 {
            return Vec::new();
        }

        let mut seen = HashSet::new();
        let mut fresh: Vec<String> = Vec::new();
        let mut reviewed: Vec<(f64, u32, String)> = Vec::new();

        for candidate in candidates {
            let key = candidate.as_ref();
            if key.is_empty() || !seen.insert(key.to_string()) {
                continue;
            }
            match self.store.get(key) {
                Some(state) if !state.is_new() => {
                    let r = self.retrievability(&state, now);
                    if r < self.params.desired_retention {
                        reviewed.push((r, state.review_count, key.to_string()));
                    }
                }
                _ => fresh.push(key.to_string()),
            }
        }

        fresh.sort();
        reviewed.sort_by(|a, b| {
            a.0.total_cmp(&b.0)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.2.cmp(&b.2))
        });

        let new_cap = ((count as f64 * self.params.new_item_ratio).ceil() as usize).max(1);
        let split = new_cap.min(fresh.len());
        let overflow = fresh.split_off(split);

        let mut due: Vec<String> = fresh;
        due.extend(reviewed.into_iter().map(|(_, _, key)| key));
        due.truncate(count);
        if due.len() < count {
            let missing = count - due.len();
            due.extend(overflow.into_iter().take(missing));
        }
        due
    }

    pub fn next_interval_days(&self, state: &MemoryState) -> f64 {
        next_interval(state.stability, self.params.desired_retention)
    }

    /// Projected retrievability for each of the next `days` days.
    pub fn forecast(&self, key: &str, days: u32) -> Vec<(u32, f64)> {
        let now = Utc::now();
        let state = self.store.get(key).unwrap_or_else(|| MemoryState::new(key));
        let elapsed = state.elapsed_days(now);
        (0..=days)
            .map(|day| (day, retrievability(state.stability, elapsed + day as f64)))
            .collect()
    }

    pub fn learning_statistics(&self) -> LearningStatistics {
        self.learning_statistics_at(Utc::now())
    }

    pub fn learning_statistics_at(&self, now: DateTime<Utc>) -> LearningStatistics {
        let states = self.store.snapshot();
        let mut stats = LearningStatistics {
            total_items: states.len(),
            ..Default::default()
        };
        if states.is_empty() {
            return stats;
        }

        let mut stability_sum = 0.0;
        let mut difficulty_sum = 0.0;
        let mut retrievability_sum = 0.0;
        for state in &states {
            let r = self.retrievability(state, now);
            if state.is_new() {
                stats.new_items += 1;
            } else {
                stats.reviewed_items += 1;
                if r < self.params.desired_retention {
                    stats.due_items += 1;
                }
            }
            stats.total_reviews += state.review_count as u64;
            stability_sum += state.stability;
            difficulty_sum += state.difficulty;
            retrievability_sum += r;

            match state.difficulty {
                d if d <= 3.5 => stats.difficulty_distribution.easy += 1,
                d if d <= 6.5 => stats.difficulty_distribution.medium += 1,
                _ => stats.difficulty_distribution.hard += 1,
            }
        }

        let n = states.len() as f64;
        stats.average_stability = stability_sum / n;
        stats.average_difficulty = difficulty_sum / n;
        stats.average_retrievability = retrievability_sum / n;
        stats
    }

    pub fn save(&self) -> Result<usize, PersistenceError> {
        self.store.save()
    }

    pub fn load(&self) -> LoadReport {
        self.store.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryStore;
    use chrono::Duration;

    fn scheduler() -> SpacedRepetitionScheduler {
        let store = Arc::new(MemoryStore::new(Arc::new(InMemoryStore::new())));
        SpacedRepetitionScheduler::new(store, SchedulerParams::default())
    }

    #[test]
    fn retrievability_is_one_at_review_time() {
        assert!((retrievability(2.0, 0.0) - 1.0).abs() < 1e-12);
        assert!((retrievability(1.0, 9.0) - 0.5).abs() < 1e-12);
        assert_eq!(retrievability(1.0, -5.0), 1.0);
        assert_eq!(retrievability(0.0, 1.0), 0.0);
    }

    #[test]
    fn default_state_for_unknown_item() {
        let s = scheduler();
        let state = s.get_memory_state("apple");
        assert_eq!(state.stability, 1.0);
        assert_eq!(state.difficulty, 5.0);
        assert_eq!(state.retrievability, 0.9);
        assert_eq!(state.review_count, 0);
        assert_eq!(s.store().len(), 1);
    }

    #[test]
    fn difficulty_moves_with_grade() {
        let s = scheduler();
        let now = Utc::now();
        assert_eq!(s.review_at("a", Grade::Easy, now).difficulty, 4.0);
        assert_eq!(s.review_at("b", Grade::Again, now).difficulty, 6.0);
        assert_eq!(s.review_at("c", Grade::Good, now).difficulty, 5.0);
    }

    #[test]
    fn again_strictly_shrinks_even_near_floor() {
        let params = SchedulerParams::default();
        let mut state = MemoryState::new("x");
        state.stability = 0.1;
        state.last_review = Some(Utc::now());
        state.review_count = 3;
        let next = next_state(&state, Grade::Again, 0.5, Utc::now(), &params);
        assert!(next.stability < 0.1);
        assert!(next.stability > 0.0);
    }

    #[test]
    fn repeated_lapses_stay_above_zero() {
        let s = scheduler();
        let now = Utc::now();
        let mut previous = s.get_memory_state("x").stability;
        for _ in 0..1200 {
            let next = s.review_at("x", Grade::Again, now).stability;
            assert!(next <= previous);
            assert!(next >= STABILITY_EPSILON);
            if previous > STABILITY_EPSILON {
                assert!(next < previous);
            }
            previous = next;
        }
        assert_eq!(previous, STABILITY_EPSILON);
    }

    #[test]
    fn relearning_growth_is_damped() {
        let params = SchedulerParams::default();
        let now = Utc::now();
        let mut stable = MemoryState::new("x");
        stable.stability = 2.0;
        stable.review_count = 4;
        stable.last_review = Some(now);
        stable.grade_history = vec![3];
        let mut lapsed = stable.clone();
        lapsed.grade_history = vec![1];

        let a = next_state(&stable, Grade::Good, 0.7, now, &params);
        let b = next_state(&lapsed, Grade::Good, 0.7, now, &params);
        assert!(b.stability < a.stability);
        assert!(b.stability > lapsed.stability);
    }

    #[test]
    fn due_words_cap_new_items() {
        let s = scheduler();
        let now = Utc::now();
        let past = now - Duration::days(30);
        for key in ["r1", "r2", "r3"] {
            s.review_at(key, Grade::Good, past);
        }
        let candidates = ["n1", "n2", "n3", "n4", "r1", "r2", "r3"];
        let due = s.get_due_words_at(&candidates, 5, now);
        assert_eq!(due.len(), 5);
        let new_count = due.iter().filter(|k| k.starts_with('n')).count();
        assert_eq!(new_count, 2);
        assert_eq!(&due[..2], &["n1".to_string(), "n2".to_string()]);
    }

    #[test]
    fn due_words_refill_with_new_items_when_reviews_run_out() {
        let s = scheduler();
        let due = s.get_due_words_at(&["c", "a", "b"], 3, Utc::now());
        assert_eq!(due, vec!["a", "b", "c"]);
    }

    #[test]
    fn recently_reviewed_items_are_not_due() {
        let s = scheduler();
        let now = Utc::now();
        s.review_at("fresh", Grade::Easy, now);
        assert!(s.get_due_words_at(&["fresh"], 3, now).is_empty());
    }

    #[test]
    fn interval_grows_with_stability() {
        assert!(next_interval(10.0, 0.9) > next_interval(2.0, 0.9));
        assert_eq!(next_interval(0.01, 0.9), MIN_INTERVAL_DAYS);
    }

    #[test]
    fn statistics_bucket_difficulty() {
        let s = scheduler();
        let now = Utc::now();
        s.review_at("easy", Grade::Easy, now);
        s.review_at("easy", Grade::Easy, now);
        s.review_at("easy", Grade::Easy, now);
        s.review_at("hard", Grade::Again, now);
        s.review_at("hard", Grade::Again, now);
        s.review_at("hard", Grade::Again, now);
        s.get_memory_state("medium");

        let stats = s.learning_statistics_at(now);
        assert_eq!(stats.total_items, 3);
        assert_eq!(stats.new_items, 1);
        assert_eq!(stats.total_reviews, 6);
        assert_eq!(
            stats.difficulty_distribution,
            DifficultyDistribution { easy: 1, medium: 1, hard: 1 }
        );
    }

    #[test]
    fn forecast_is_non_increasing() {
        let s = scheduler();
        s.review("apple", Grade::Good);
        let curve = s.forecast("apple", 10);
        assert_eq!(curve.len(), 11);
        assert!(curve.windows(2).all(|w| w[1].1 <= w[0].1));
    }
}
