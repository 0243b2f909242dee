use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyLevel {
    VeryEasy,
    Easy,
    Medium,
    Hard,
    VeryHard,
}

impl DifficultyLevel {
    pub const ALL: [Self; 5] = [
        Self::VeryEasy,
        Self::Easy,
        Self::Medium,
        Self::Hard,
        Self::VeryHard,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VeryEasy => "very_easy",
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
            Self::VeryHard => "very_hard",
        }
    }

    pub fn is_hard(&self) -> bool {
        *self >= Self::Hard
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStrategy {
    Introduction,
    Reinforcement,
    Review,
    Challenge,
}

impl GenerationStrategy {
    pub const ALL: [Self; 4] = [
        Self::Introduction,
        Self::Reinforcement,
        Self::Review,
        Self::Challenge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Introduction => "introduction",
            Self::Reinforcement => "reinforcement",
            Self::Review => "review",
            Self::Challenge => "challenge",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentenceComplexity {
    Simple,
    Moderate,
    Complex,
}

impl SentenceComplexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Complex => "complex",
        }
    }

    pub fn sentence_count(&self) -> usize {
        match self {
            Self::Simple => 2,
            Self::Moderate => 3,
            Self::Complex => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextRichness {
    Minimal,
    Standard,
    Rich,
}

impl ContextRichness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Standard => "standard",
            Self::Rich => "rich",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseKind {
    FillBlank,
    Translation,
    MultipleChoice,
    SentenceCompletion,
    GrammarCorrection,
}

impl ExerciseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FillBlank => "fill_blank",
            Self::Translation => "translation",
            Self::MultipleChoice => "multiple_choice",
            Self::SentenceCompletion => "sentence_completion",
            Self::GrammarCorrection => "grammar_correction",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LearningStyle {
    Visual,
    Auditory,
    Kinesthetic,
    #[default]
    Balanced,
}

impl LearningStyle {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "visual" => Self::Visual,
            "auditory" => Self::Auditory,
            "kinesthetic" => Self::Kinesthetic,
            _ => Self::Balanced,
        }
    }

    pub fn ratio_multiplier(&self) -> f64 {
        match self {
            Self::Visual => 1.2,
            Self::Kinesthetic => 1.1,
            Self::Auditory | Self::Balanced => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyPreference {
    Easy,
    Medium,
    Hard,
    #[default]
    Adaptive,
}

impl DifficultyPreference {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "easy" => Self::Easy,
            "medium" => Self::Medium,
            "hard" => Self::Hard,
            _ => Self::Adaptive,
        }
    }

    pub fn ratio_multiplier(&self) -> f64 {
        match self {
            Self::Easy => 0.8,
            Self::Hard => 1.3,
            Self::Medium | Self::Adaptive => 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    #[serde(default)]
    pub learning_style: LearningStyle,
    #[serde(default)]
    pub difficulty_preference: DifficultyPreference,
    #[serde(default)]
    pub interests: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptiveGenerationConfig {
    pub difficulty_level: DifficultyLevel,
    pub strategy: GenerationStrategy,
    pub ai_enhancement_ratio: f64,
    pub sentence_complexity: SentenceComplexity,
    /// Weighted: a kind may appear more than once.
    pub exercise_kinds: Vec<ExerciseKind>,
    pub context_richness: ContextRichness,
    pub personalization_weight: f64,
}
