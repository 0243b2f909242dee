use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::backend::{CompletionBackend, CompletionOptions};
use super::decoder::{decode, StructuredContent};
use super::prompts::build_prompt;
use super::template::BLANK;
use super::types::{ContentType, GeneratedContent, GenerationError, GenerationMode, GenerationRequest};
use super::ModeGenerator;
use crate::memory::MemoryState;
use crate::policy::{AdaptiveGenerationConfig, StrategyPolicy};

const AI_ENHANCED_TEMPERATURE: f64 = 0.7;
const MAX_TOKENS: u32 = 512;

fn temperature_for(ratio: f64) -> f64 {
    if ratio > 0.7 {
        0.9
    } else if ratio > 0.4 {
        0.7
    } else {
        0.3
    }
}

async fn complete(
    backend: &dyn CompletionBackend,
    request: &GenerationRequest,
    adaptive: Option<&AdaptiveGenerationConfig>,
    scenario: Option<&str>,
    temperature: f64,
) -> Result<StructuredContent, GenerationError> {
    let prompt = build_prompt(request, adaptive, scenario);
    let options = CompletionOptions {
        temperature,
        max_tokens: MAX_TOKENS,
    };
    let raw = backend.complete(&prompt, &options).await?;
    debug!(item = %request.item, backend = backend.name(), len = raw.len(), "completion received");
    Ok(decode(&raw)?)
}

fn assemble(
    request: &GenerationRequest,
    decoded: StructuredContent,
    mode: GenerationMode,
    max_sentences: usize,
) -> GeneratedContent {
    let mut decoded = decoded;
    decoded.sentences.truncate(max_sentences.max(1));

    let mut text = decoded.text();
    if request.content_type == ContentType::Exercise
        && text.contains(BLANK)
        && !text.to_lowercase().starts_with("fill in the blank")
    {
        text = format!("Fill in the blank: {text}");
    }

    let mut content = GeneratedContent::new(text, mode);
    if let Some(translation) = decoded.first_translation() {
        content = content.with_meta("translation", translation);
    }
    if decoded.sentences.len() > 1 {
        let translations: Vec<Value> = decoded
            .sentences
            .iter()
            .map(|s| s.translation.clone().map_or(Value::Null, Value::String))
            .collect();
        content = content.with_meta("translations", translations);
    }
    if let Some(note) = decoded.note {
        content = content.with_meta("note", note);
    }
    if request.content_type == ContentType::Exercise {
        let has_blank = content.content.contains(BLANK);
        let answer = decoded
            .answer
            .or_else(|| has_blank.then(|| request.item.clone()));
        if let Some(answer) = answer {
            content = content.with_meta("answer", answer);
        }
        content = content.with_meta("exercise_type", "fill_blank");
        if let Some(hint) = decoded.hint.or_else(|| request.context.meaning.clone()) {
            content = content.with_meta("hint", hint);
        }
    }
    content
}

/// One completion per request with a fixed temperature.
pub struct AiEnhancedGenerator {
    backend: Arc<dyn CompletionBackend>,
}

impl AiEnhancedGenerator {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ModeGenerator for AiEnhancedGenerator {
    fn mode(&self) -> GenerationMode {
        GenerationMode::AiEnhanced
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        _adaptive: Option<&AdaptiveGenerationConfig>,
    ) -> Result<GeneratedContent, GenerationError> {
        let decoded = complete(
            self.backend.as_ref(),
            request,
            None,
            None,
            AI_ENHANCED_TEMPERATURE,
        )
        .await?;
        Ok(assemble(request, decoded, GenerationMode::AiEnhanced, 1))
    }
}

/// Shapes the completion from the learner's memory state: difficulty, goal,
/// number of sentences, scenario and temperature all come from the adaptive config.
pub struct AdaptiveGenerator {
    backend: Arc<dyn CompletionBackend>,
    policy: StrategyPolicy,
}

impl AdaptiveGenerator {
    pub fn new(backend: Arc<dyn CompletionBackend>, policy: StrategyPolicy) -> Self {
        Self { backend, policy }
    }
}

#[async_trait]
impl ModeGenerator for AdaptiveGenerator {
    fn mode(&self) -> GenerationMode {
        GenerationMode::AdaptiveAi
    }

    fn uses_memory_state(&self) -> bool {
        true
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        adaptive: Option<&AdaptiveGenerationConfig>,
    ) -> Result<GeneratedContent, GenerationError> {
        let config = match adaptive {
            Some(config) => config.clone(),
            None => self.policy.build_config(
                &MemoryState::new(request.item.as_str()),
                &request.topic,
                request.context.user_profile.as_ref(),
            ),
        };
        let scenario = self
            .policy
            .scenario_for(config.context_richness, request.context.category.as_deref());

        let decoded = complete(
            self.backend.as_ref(),
            request,
            Some(&config),
            Some(scenario),
            temperature_for(config.ai_enhancement_ratio),
        )
        .await?;

        let count = match request.content_type {
            ContentType::Sentence => config.sentence_complexity.sentence_count(),
            _ => 1,
        };
        let suggestions = self.policy.learning_suggestions(&config);
        let mut content = assemble(request, decoded, GenerationMode::AdaptiveAi, count)
            .with_meta("scenario", scenario)
            .with_meta("strategy", config.strategy.as_str())
            .with_meta("difficulty_level", config.difficulty_level.as_str())
            .with_meta("learning_suggestions", suggestions);
        if let Ok(value) = serde_json::to_value(&config) {
            content = content.with_meta("adaptive_config", value);
        }
        Ok(content)
    }
}
