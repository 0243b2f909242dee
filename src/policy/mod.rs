pub mod types;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::memory::MemoryState;

pub use types::*;

/// Lower bounds of each level on the combined difficulty scale.
const DIFFICULTY_BOUNDARIES: [(f64, DifficultyLevel); 5] = [
    (0.0, DifficultyLevel::VeryEasy),
    (3.0, DifficultyLevel::Easy),
    (5.0, DifficultyLevel::Medium),
    (7.0, DifficultyLevel::Hard),
    (9.0, DifficultyLevel::VeryHard),
];

const COMPLEX_TOPICS: [&str; 3] = ["comparatives", "passive voice", "relative clauses"];

struct StrategyBase {
    ai_enhancement: f64,
    complexity: SentenceComplexity,
    exercises: &'static [ExerciseKind],
    richness: ContextRichness,
}

fn strategy_base(strategy: GenerationStrategy) -> StrategyBase {
    use ExerciseKind::*;
    match strategy {
        GenerationStrategy::Introduction => StrategyBase {
            ai_enhancement: 0.3,
            complexity: SentenceComplexity::Simple,
            exercises: &[FillBlank],
            richness: ContextRichness::Minimal,
        },
        GenerationStrategy::Reinforcement => StrategyBase {
            ai_enhancement: 0.6,
            complexity: SentenceComplexity::Moderate,
            exercises: &[FillBlank, Translation],
            richness: ContextRichness::Standard,
        },
        GenerationStrategy::Review => StrategyBase {
            ai_enhancement: 0.4,
            complexity: SentenceComplexity::Simple,
            exercises: &[MultipleChoice, FillBlank],
            richness: ContextRichness::Standard,
        },
        GenerationStrategy::Challenge => StrategyBase {
            ai_enhancement: 0.9,
            complexity: SentenceComplexity::Complex,
            exercises: &[SentenceCompletion, GrammarCorrection],
            richness: ContextRichness::Rich,
        },
    }
}

fn is_complex_topic(topic: &str) -> bool {
    let normalized = topic.trim().to_lowercase().replace(['_', '-'], " ");
    COMPLEX_TOPICS.iter().any(|t| normalized == *t)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AdaptationStatistics {
    pub total_items: usize,
    pub strategy_distribution: BTreeMap<String, usize>,
    pub difficulty_distribution: BTreeMap<String, usize>,
    pub average_personalization_weight: f64,
}

/// Maps a memory state to the level, strategy and generation parameters for it.
/// Stateless; every method is a pure function of its inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrategyPolicy;

impl StrategyPolicy {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, state: &MemoryState) -> DifficultyLevel {
        let combined = state.difficulty * (1.0 - state.retrievability) * 2.0;
        if !combined.is_finite() {
            return DifficultyLevel::Medium;
        }
        DIFFICULTY_BOUNDARIES
            .iter()
            .rev()
            .find(|(lower, _)| combined >= *lower)
            .map(|(_, level)| *level)
            .unwrap_or(DifficultyLevel::VeryEasy)
    }

    pub fn select_strategy(&self, state: &MemoryState) -> GenerationStrategy {
        if state.review_count <= 2 {
            GenerationStrategy::Introduction
        } else if state.retrievability < 0.5 {
            GenerationStrategy::Reinforcement
        } else if state.retrievability > 0.8 {
            GenerationStrategy::Challenge
        } else {
            GenerationStrategy::Review
        }
    }

    pub fn analyze(&self, state: &MemoryState) -> (DifficultyLevel, GenerationStrategy) {
        (self.classify(state), self.select_strategy(state))
    }

    pub fn personalization_weight(&self, state: &MemoryState) -> f64 {
        match state.average_grade() {
            None => 0.5,
            Some(avg) if avg < 2.5 => 0.9,
            Some(avg) if avg > 3.5 => 0.3,
            Some(_) => 0.6,
        }
    }

    pub fn build_config(
        &self,
        state: &MemoryState,
        topic: &str,
        profile: Option<&UserProfile>,
    ) -> AdaptiveGenerationConfig {
        let (difficulty_level, strategy) = self.analyze(state);
        let base = strategy_base(strategy);

        let ai_enhancement_ratio = match profile {
            Some(profile) => (base.ai_enhancement
                * profile.learning_style.ratio_multiplier()
                * profile.difficulty_preference.ratio_multiplier())
            .clamp(0.1, 1.0),
            None => base.ai_enhancement,
        };

        let mut exercise_kinds = base.exercises.to_vec();
        // a weighted list, not a set: the repeat doubles grammar correction's share
        if strategy == GenerationStrategy::Challenge && is_complex_topic(topic) {
            exercise_kinds.push(ExerciseKind::GrammarCorrection);
        }

        AdaptiveGenerationConfig {
            difficulty_level,
            strategy,
            ai_enhancement_ratio,
            sentence_complexity: base.complexity,
            exercise_kinds,
            context_richness: base.richness,
            personalization_weight: self.personalization_weight(state),
        }
    }

    pub fn learning_suggestions(&self, config: &AdaptiveGenerationConfig) -> Vec<String> {
        let mut suggestions: Vec<&str> = match config.strategy {
            GenerationStrategy::Introduction => vec![
                "New word: repeat it several times in short sessions",
                "Focus on the core meaning and pronunciation first",
            ],
            GenerationStrategy::Reinforcement => vec![
                "This word is slipping: practise it more often",
                "Use it across different situations to anchor it",
            ],
            GenerationStrategy::Review => vec![
                "Review regularly to keep the memory fresh",
                "Concentrate on using it inside full sentences",
            ],
            GenerationStrategy::Challenge => vec![
                "Well retained: try more advanced usages",
                "Use the word actively in your own writing",
            ],
        };
        if config.difficulty_level.is_hard() {
            suggestions.push("This one is tough, take it slowly");
            suggestions.push("Try word roots or associations to help it stick");
        }
        suggestions.into_iter().map(String::from).collect()
    }

    /// Picks a scenario from the pool allowed by `richness`, matched against the item category.
    pub fn scenario_for(&self, richness: ContextRichness, category: Option<&str>) -> &'static str {
        let pool: &[&'static str] = match richness {
            ContextRichness::Minimal => &["daily_life"],
            ContextRichness::Standard => &["daily_life", "school", "family"],
            ContextRichness::Rich => &[
                "daily_life",
                "school",
                "family",
                "sports",
                "food",
                "travel",
                "technology",
            ],
        };

        let category = category.unwrap_or_default().to_lowercase();
        let preferred = if category.contains("food") {
            Some("food")
        } else if category.contains("sport") {
            Some("sports")
        } else if category.contains("school") {
            Some("school")
        } else if category.contains("travel") {
            Some("travel")
        } else if category.contains("tech") {
            Some("technology")
        } else {
            None
        };

        preferred
            .and_then(|p| pool.iter().copied().find(|s| *s == p))
            .unwrap_or(pool[0])
    }

    pub fn adaptation_statistics(&self, states: &[MemoryState]) -> AdaptationStatistics {
        let mut stats = AdaptationStatistics {
            total_items: states.len(),
            ..Default::default()
        };
        for strategy in GenerationStrategy::ALL {
            stats.strategy_distribution.insert(strategy.as_str().to_string(), 0);
        }
        for level in DifficultyLevel::ALL {
            stats.difficulty_distribution.insert(level.as_str().to_string(), 0);
        }
        if states.is_empty() {
            return stats;
        }

        let mut weight_sum = 0.0;
        for state in states {
            let (level, strategy) = self.analyze(state);
            *stats
                .strategy_distribution
                .entry(strategy.as_str().to_string())
                .or_default() += 1;
            *stats
                .difficulty_distribution
                .entry(level.as_str().to_string())
                .or_default() += 1;
            weight_sum += self.personalization_weight(state);
        }
        stats.average_personalization_weight = weight_sum / states.len() as f64;
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(difficulty: f64, retrievability: f64, review_count: u32) -> MemoryState {
        let mut s = MemoryState::new("apple");
        s.difficulty = difficulty;
        s.retrievability = retrievability;
        s.review_count = review_count;
        s
    }

    #[test]
    fn classify_uses_half_open_buckets() {
        let policy = StrategyPolicy::new();
        // combined = d * (1 - r) * 2
        assert_eq!(policy.classify(&state(5.0, 0.9, 0)), DifficultyLevel::VeryEasy);
        assert_eq!(policy.classify(&state(5.0, 0.7, 0)), DifficultyLevel::Easy);
        assert_eq!(policy.classify(&state(5.0, 0.5, 0)), DifficultyLevel::Medium);
        assert_eq!(policy.classify(&state(10.0, 0.6, 0)), DifficultyLevel::Hard);
        assert_eq!(policy.classify(&state(10.0, 0.0, 0)), DifficultyLevel::VeryHard);
    }

    #[test]
    fn strategy_thresholds() {
        let policy = StrategyPolicy::new();
        assert_eq!(
            policy.select_strategy(&state(5.0, 0.1, 2)),
            GenerationStrategy::Introduction
        );
        assert_eq!(
            policy.select_strategy(&state(5.0, 0.4, 3)),
            GenerationStrategy::Reinforcement
        );
        assert_eq!(
            policy.select_strategy(&state(5.0, 0.6, 3)),
            GenerationStrategy::Review
        );
        assert_eq!(
            policy.select_strategy(&state(5.0, 0.85, 3)),
            GenerationStrategy::Challenge
        );
    }

    #[test]
    fn profile_multipliers_are_clamped() {
        let policy = StrategyPolicy::new();
        let profile = UserProfile {
            user_id: "u1".into(),
            learning_style: LearningStyle::Visual,
            difficulty_preference: DifficultyPreference::Hard,
            interests: vec![],
        };
        let config = policy.build_config(&state(5.0, 0.9, 5), "tense", Some(&profile));
        assert_eq!(config.strategy, GenerationStrategy::Challenge);
        assert_eq!(config.ai_enhancement_ratio, 1.0);

        let easy = UserProfile {
            difficulty_preference: DifficultyPreference::Easy,
            ..profile
        };
        let config = policy.build_config(&state(5.0, 0.9, 0), "tense", Some(&easy));
        assert!((config.ai_enhancement_ratio - 0.3 * 1.2 * 0.8).abs() < 1e-9);
    }

    #[test]
    fn complex_topic_weights_grammar_correction_under_challenge() {
        let policy = StrategyPolicy::new();
        let challenge = state(5.0, 0.9, 5);
        let config = policy.build_config(&challenge, "passive_voice", None);
        let corrections = config
            .exercise_kinds
            .iter()
            .filter(|k| **k == ExerciseKind::GrammarCorrection)
            .count();
        assert_eq!(corrections, 2);

        let intro = policy.build_config(&state(5.0, 0.9, 0), "passive voice", None);
        assert_eq!(intro.exercise_kinds, vec![ExerciseKind::FillBlank]);
    }

    #[test]
    fn personalization_weight_follows_average_grade() {
        let policy = StrategyPolicy::new();
        let mut s = state(5.0, 0.9, 0);
        assert_eq!(policy.personalization_weight(&s), 0.5);
        s.grade_history = vec![1, 2, 2];
        assert_eq!(policy.personalization_weight(&s), 0.9);
        s.grade_history = vec![4, 4, 3];
        assert_eq!(policy.personalization_weight(&s), 0.3);
        s.grade_history = vec![3, 3];
        assert_eq!(policy.personalization_weight(&s), 0.6);
    }

    #[test]
    fn scenario_respects_richness_pool() {
        let policy = StrategyPolicy::new();
        assert_eq!(policy.scenario_for(ContextRichness::Minimal, Some("food")), "daily_life");
        assert_eq!(policy.scenario_for(ContextRichness::Rich, Some("fast food")), "food");
        assert_eq!(policy.scenario_for(ContextRichness::Standard, Some("school")), "school");
        assert_eq!(policy.scenario_for(ContextRichness::Standard, None), "daily_life");
    }

    #[test]
    fn hard_levels_get_extra_suggestions() {
        let policy = StrategyPolicy::new();
        let easy = policy.build_config(&state(5.0, 0.9, 0), "t", None);
        let hard = policy.build_config(&state(10.0, 0.2, 0), "t", None);
        assert_eq!(policy.learning_suggestions(&easy).len(), 2);
        assert_eq!(policy.learning_suggestions(&hard).len(), 4);
    }
}
