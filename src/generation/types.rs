use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::backend::BackendError;
use super::decoder::DecodeError;
use crate::policy::UserProfile;
use crate::quality::QualityIssue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Sentence,
    Exercise,
    Explanation,
    Review,
}

impl ContentType {
    pub const ALL: [Self; 4] = [Self::Sentence, Self::Exercise, Self::Explanation, Self::Review];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sentence => "sentence",
            Self::Exercise => "exercise",
            Self::Explanation => "explanation",
            Self::Review => "review",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sentence" => Ok(Self::Sentence),
            "exercise" => Ok(Self::Exercise),
            "explanation" => Ok(Self::Explanation),
            "review" => Ok(Self::Review),
            other => Err(ConfigurationError::UnknownContentType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    TemplateOnly,
    #[default]
    AiEnhanced,
    AdaptiveAi,
}

impl GenerationMode {
    pub const ALL: [Self; 3] = [Self::TemplateOnly, Self::AiEnhanced, Self::AdaptiveAi];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TemplateOnly => "template_only",
            Self::AiEnhanced => "ai_enhanced",
            Self::AdaptiveAi => "adaptive_ai",
        }
    }

    pub fn uses_backend(&self) -> bool {
        !matches!(self, Self::TemplateOnly)
    }
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenerationMode {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "template_only" | "template" => Ok(Self::TemplateOnly),
            "ai_enhanced" | "ai" => Ok(Self::AiEnhanced),
            "adaptive_ai" | "adaptive" => Ok(Self::AdaptiveAi),
            other => Err(ConfigurationError::UnknownMode(other.to_string())),
        }
    }
}

/// Caller-supplied facts about the item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationContext {
    #[serde(default)]
    pub meaning: Option<String>,
    #[serde(default)]
    pub part_of_speech: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub user_profile: Option<UserProfile>,
}

impl GenerationContext {
    pub fn with_meaning(mut self, meaning: impl Into<String>) -> Self {
        self.meaning = Some(meaning.into());
        self
    }

    pub fn with_part_of_speech(mut self, pos: impl Into<String>) -> Self {
        self.part_of_speech = Some(pos.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_profile(mut self, profile: UserProfile) -> Self {
        self.user_profile = Some(profile);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub content_type: ContentType,
    pub item: String,
    pub topic: String,
    pub mode: GenerationMode,
    pub context: GenerationContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedContent {
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub quality_score: f64,
    pub generation_mode: GenerationMode,
    #[serde(default)]
    pub is_fallback: bool,
    #[serde(default)]
    pub cache_hit: bool,
    #[serde(default)]
    pub downgraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    #[serde(default)]
    pub issues: Vec<QualityIssue>,
}

impl GeneratedContent {
    pub fn new(content: impl Into<String>, mode: GenerationMode) -> Self {
        Self {
            content: content.into(),
            metadata: Map::new(),
            quality_score: 0.0,
            generation_mode: mode,
            is_fallback: false,
            cache_hit: false,
            downgraded: false,
            failure: None,
            issues: Vec::new(),
        }
    }

    /// Zero-score marker for a request that could not be attempted.
    pub fn failed(mode: GenerationMode, failure: impl Into<String>) -> Self {
        let mut result = Self::new(String::new(), mode);
        result.failure = Some(failure.into());
        result
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Structured answer for exercises, if present.
    pub fn answer(&self) -> Option<&str> {
        self.metadata.get("answer").and_then(Value::as_str)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("unknown content type: {0}")]
    UnknownContentType(String),
    #[error("unknown generation mode: {0}")]
    UnknownMode(String),
    #[error("item must not be empty")]
    EmptyItem,
    #[error("quality threshold must be within [0, 1], got {0}")]
    InvalidThreshold(f64),
    #[error("no generator registered for mode {0}")]
    MissingGenerator(GenerationMode),
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_names() {
        assert_eq!("Exercise".parse::<ContentType>(), Ok(ContentType::Exercise));
        assert_eq!("adaptive_ai".parse::<GenerationMode>(), Ok(GenerationMode::AdaptiveAi));
        assert_eq!(
            "poem".parse::<ContentType>(),
            Err(ConfigurationError::UnknownContentType("poem".into()))
        );
        assert!("turbo".parse::<GenerationMode>().is_err());
    }

    #[test]
    fn failed_result_carries_marker() {
        let failed = GeneratedContent::failed(GenerationMode::TemplateOnly, "boom");
        assert_eq!(failed.quality_score, 0.0);
        assert_eq!(failed.failure.as_deref(), Some("boom"));
        assert!(failed.content.is_empty());
    }
}
