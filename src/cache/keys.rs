use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::generation::{ContentType, GenerationMode};

pub const TEMPLATE_TTL: Duration = Duration::from_secs(60 * 60);
pub const AI_ENHANCED_TTL: Duration = Duration::from_secs(30 * 60);
pub const ADAPTIVE_TTL: Duration = Duration::from_secs(15 * 60);

pub fn quality_bucket(threshold: f64) -> u32 {
    (threshold.clamp(0.0, 1.0) * 100.0).round() as u32
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub content_type: ContentType,
    pub item: String,
    pub topic: String,
    pub mode: GenerationMode,
    pub quality_bucket: u32,
}

impl CacheKey {
    pub fn new(
        content_type: ContentType,
        item: impl Into<String>,
        topic: impl Into<String>,
        mode: GenerationMode,
        quality_threshold: f64,
    ) -> Self {
        Self {
            content_type,
            item: item.into(),
            topic: topic.into(),
            mode,
            quality_bucket: quality_bucket(quality_threshold),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "content:{}:{}:{}:{}:q{}",
            self.content_type, self.item, self.topic, self.mode, self.quality_bucket
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeTtls {
    pub template_only: Duration,
    pub ai_enhanced: Duration,
    pub adaptive_ai: Duration,
}

impl Default for ModeTtls {
    fn default() -> Self {
        Self {
            template_only: TEMPLATE_TTL,
            ai_enhanced: AI_ENHANCED_TTL,
            adaptive_ai: ADAPTIVE_TTL,
        }
    }
}

impl ModeTtls {
    pub fn uniform(ttl: Duration) -> Self {
        Self {
            template_only: ttl,
            ai_enhanced: ttl,
            adaptive_ai: ttl,
        }
    }

    pub fn for_mode(&self, mode: GenerationMode) -> Duration {
        match mode {
            GenerationMode::TemplateOnly => self.template_only,
            GenerationMode::AiEnhanced => self.ai_enhanced,
            GenerationMode::AdaptiveAi => self.adaptive_ai,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_renders_all_components() {
        let key = CacheKey::new(
            ContentType::Sentence,
            "apple",
            "present_simple",
            GenerationMode::AiEnhanced,
            0.7,
        );
        assert_eq!(key.to_string(), "content:sentence:apple:present_simple:ai_enhanced:q70");
    }

    #[test]
    fn thresholds_in_same_bucket_share_keys() {
        assert_eq!(quality_bucket(0.701), quality_bucket(0.699));
        assert_ne!(quality_bucket(0.7), quality_bucket(0.8));
        assert_eq!(quality_bucket(3.0), 100);
    }
}
