pub mod stats;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, ContentCache, FlightRole};
use crate::fallback::FallbackProvider;
use crate::flags::{FeatureFlags, StaticFeatureFlags, AI_GENERATION};
use crate::generation::{
    AdaptiveGenerator, AiEnhancedGenerator, CompletionBackend, ConfigurationError, ContentType,
    GeneratedContent, GenerationContext, GenerationError, GenerationMode, GenerationRequest,
    ModeGenerator, TemplateGenerator,
};
use crate::memory::{Grade, MemoryState, SpacedRepetitionScheduler};
use crate::policy::StrategyPolicy;
use crate::quality::QualityGate;

pub use stats::{GenerationStatistics, StatisticsSnapshot};

const FALLBACK_RATE_LIMIT: f64 = 20.0;
const QUALITY_FAILURE_RATE_LIMIT: f64 = 15.0;
const CACHE_HIT_RATE_TARGET: f64 = 80.0;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub default_mode: GenerationMode,
    pub quality_threshold: f64,
    pub generation_timeout: Duration,
    pub batch_concurrency: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_mode: GenerationMode::AiEnhanced,
            quality_threshold: 0.7,
            generation_timeout: Duration::from_secs(30),
            batch_concurrency: 8,
        }
    }
}

/// Untyped request as received from a batch caller; validated per entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub content_type: String,
    pub item: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub context: GenerationContext,
}

impl BatchRequest {
    pub fn new(content_type: &str, item: &str, topic: &str) -> Self {
        Self {
            content_type: content_type.to_string(),
            item: item.to_string(),
            topic: topic.to_string(),
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: &str) -> Self {
        self.mode = Some(mode.to_string());
        self
    }
}

struct Pipeline {
    scheduler: Arc<SpacedRepetitionScheduler>,
    policy: StrategyPolicy,
    cache: Arc<ContentCache>,
    gate: QualityGate,
    fallback: FallbackProvider,
    template: TemplateGenerator,
    flags: Arc<dyn FeatureFlags>,
    generators: HashMap<GenerationMode, Arc<dyn ModeGenerator>>,
    stats: GenerationStatistics,
    config: OrchestratorConfig,
}

impl Pipeline {
    fn fallback_for(&self, request: &GenerationRequest, reason: &str) -> GeneratedContent {
        self.stats.record_fallback();
        self.fallback
            .safe_content(request.content_type, &request.item, &request.context)
            .with_meta("fallback_reason", reason)
    }

    /// Leader path of a cache miss: generate, validate, store or downgrade.
    async fn produce(
        self: Arc<Self>,
        generator: Arc<dyn ModeGenerator>,
        request: GenerationRequest,
        key: CacheKey,
    ) -> GeneratedContent {
        let mode = request.mode;
        let threshold = self.config.quality_threshold;
        if mode.uses_backend() {
            self.stats.record_ai_generation();
        } else {
            self.stats.record_template_generation();
        }

        let adaptive = generator.uses_memory_state().then(|| {
            let state = self.scheduler.get_memory_state(&request.item);
            self.policy
                .build_config(&state, &request.topic, request.context.user_profile.as_ref())
        });

        let timeout = self.config.generation_timeout;
        let result = match tokio::time::timeout(timeout, generator.generate(&request, adaptive.as_ref())).await {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout(timeout)),
        };

        let mut content = match result {
            Ok(content) => {
                if mode.uses_backend() {
                    self.flags.record_outcome(true);
                }
                content
            }
            Err(e) => {
                if mode.uses_backend() {
                    self.flags.record_outcome(false);
                }
                warn!(item = %request.item, mode = %mode, error = %e, "generation failed, using fallback");
                return self.fallback_for(&request, &e.to_string());
            }
        };

        let report = self.gate.score(&content, request.content_type, &request.item);
        content.quality_score = report.score;
        content.issues = report.issues;
        content.generation_mode = mode;

        if self.gate.accept(content.quality_score, threshold) {
            let ttl = self.cache.ttl_for(mode);
            let stored = self
                .cache
                .put(key, content.clone(), content.quality_score, mode, ttl);
            debug!(item = %request.item, mode = %mode, score = content.quality_score, stored, "content accepted");
            return content;
        }

        self.stats.record_quality_failure();
        if mode == GenerationMode::TemplateOnly {
            debug!(item = %request.item, score = content.quality_score, "template below threshold, returned as is");
            return content;
        }

        info!(
            item = %request.item,
            mode = %mode,
            score = content.quality_score,
            threshold,
            "quality below threshold, downgrading to template"
        );
        self.stats.record_template_generation();
        let mut downgraded = self
            .template
            .render(&request)
            .with_meta("downgraded_from", mode.as_str());
        let report = self.gate.score(&downgraded, request.content_type, &request.item);
        downgraded.quality_score = report.score;
        downgraded.issues = report.issues;
        downgraded.downgraded = true;
        downgraded
    }
}

pub struct OrchestratorBuilder {
    scheduler: Arc<SpacedRepetitionScheduler>,
    cache: Arc<ContentCache>,
    backend: Option<Arc<dyn CompletionBackend>>,
    flags: Option<Arc<dyn FeatureFlags>>,
    generators: HashMap<GenerationMode, Arc<dyn ModeGenerator>>,
    config: OrchestratorConfig,
}

impl OrchestratorBuilder {
    pub fn backend(mut self, backend: Arc<dyn CompletionBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn flags(mut self, flags: Arc<dyn FeatureFlags>) -> Self {
        self.flags = Some(flags);
        self
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the generator registered for `generator.mode()`.
    pub fn generator(mut self, generator: Arc<dyn ModeGenerator>) -> Self {
        self.generators.insert(generator.mode(), generator);
        self
    }

    pub fn build(self) -> GenerationOrchestrator {
        let policy = StrategyPolicy::new();
        let mut generators = self.generators;
        generators
            .entry(GenerationMode::TemplateOnly)
            .or_insert_with(|| Arc::new(TemplateGenerator::new()));
        if let Some(backend) = self.backend {
            generators
                .entry(GenerationMode::AiEnhanced)
                .or_insert_with(|| Arc::new(AiEnhancedGenerator::new(Arc::clone(&backend))));
            generators
                .entry(GenerationMode::AdaptiveAi)
                .or_insert_with(|| Arc::new(AdaptiveGenerator::new(backend, policy)));
        }

        let default_mode = self.config.default_mode;
        let pipeline = Pipeline {
            scheduler: self.scheduler,
            policy,
            cache: self.cache,
            gate: QualityGate::new(),
            fallback: FallbackProvider::new(),
            template: TemplateGenerator::new(),
            flags: self
                .flags
                .unwrap_or_else(|| Arc::new(StaticFeatureFlags::new())),
            generators,
            stats: GenerationStatistics::new(),
            config: self.config,
        };

        GenerationOrchestrator {
            inner: Arc::new(pipeline),
            default_mode: RwLock::new(default_mode),
        }
    }
}

/// Entry point for content generation. Cheap to share behind an `Arc`; every
/// method takes `&self`.
pub struct GenerationOrchestrator {
    inner: Arc<Pipeline>,
    default_mode: RwLock<GenerationMode>,
}

impl GenerationOrchestrator {
    pub fn builder(
        scheduler: Arc<SpacedRepetitionScheduler>,
        cache: Arc<ContentCache>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            scheduler,
            cache,
            backend: None,
            flags: None,
            generators: HashMap::new(),
            config: OrchestratorConfig::default(),
        }
    }

    pub fn scheduler(&self) -> &Arc<SpacedRepetitionScheduler> {
        &self.inner.scheduler
    }

    pub fn cache(&self) -> &Arc<ContentCache> {
        &self.inner.cache
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    pub fn default_mode(&self) -> GenerationMode {
        *self.default_mode.read()
    }

    pub fn set_default_mode(&self, mode: GenerationMode) {
        let previous = std::mem::replace(&mut *self.default_mode.write(), mode);
        if previous != mode {
            info!(from = %previous, to = %mode, "default generation mode changed");
        }
    }

    pub fn supports(&self, mode: GenerationMode) -> bool {
        self.inner.generators.contains_key(&mode)
    }

    /// Like [`generate`](Self::generate) but surfaces configuration errors instead
    /// of returning a degraded result.
    pub async fn try_generate(
        &self,
        content_type: ContentType,
        item: &str,
        topic: &str,
        mode: Option<GenerationMode>,
        context: GenerationContext,
    ) -> Result<GeneratedContent, ConfigurationError> {
        let item = item.trim();
        if item.is_empty() {
            return Err(ConfigurationError::EmptyItem);
        }
        let threshold = self.inner.config.quality_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigurationError::InvalidThreshold(threshold));
        }
        let mode = mode.unwrap_or_else(|| self.default_mode());
        let pipeline = &self.inner;
        let request = GenerationRequest {
            content_type,
            item: item.to_string(),
            topic: topic.trim().to_string(),
            mode,
            context,
        };

        // checked before the generator lookup: a disabled flag needs no generator
        if !pipeline.flags.is_feature_enabled(AI_GENERATION) {
            pipeline.stats.record_request();
            debug!(item, "ai_generation disabled, serving fallback");
            return Ok(pipeline.fallback_for(&request, "ai_generation disabled"));
        }

        let generator = pipeline
            .generators
            .get(&mode)
            .cloned()
            .ok_or(ConfigurationError::MissingGenerator(mode))?;
        pipeline.stats.record_request();

        let key = CacheKey::new(
            content_type,
            item,
            request.topic.as_str(),
            mode,
            pipeline.config.quality_threshold,
        );
        let leader = Arc::clone(&self.inner).produce(generator, request, key.clone());
        let (content, role) = pipeline.cache.get_or_generate(key, leader).await;

        Ok(match role {
            FlightRole::Cached => {
                pipeline.stats.record_cache_hit();
                content
            }
            FlightRole::Leader => content,
            FlightRole::Follower => {
                if content.is_fallback {
                    pipeline.stats.record_fallback();
                }
                content.with_meta("joined", true)
            }
        })
    }

    /// Always returns content; configuration problems yield a zero-score result
    /// carrying a `failure` marker.
    pub async fn generate(
        &self,
        content_type: ContentType,
        item: &str,
        topic: &str,
        mode: Option<GenerationMode>,
        context: GenerationContext,
    ) -> GeneratedContent {
        let fallback_mode = mode.unwrap_or_else(|| self.default_mode());
        match self.try_generate(content_type, item, topic, mode, context).await {
            Ok(content) => content,
            Err(e) => {
                warn!(item, error = %e, "request rejected");
                GeneratedContent::failed(fallback_mode, e.to_string())
            }
        }
    }

    async fn generate_entry(&self, request: BatchRequest) -> GeneratedContent {
        let default_mode = self.default_mode();
        let parsed = request.content_type.parse::<ContentType>().and_then(|content_type| {
            let mode = request
                .mode
                .as_deref()
                .map(str::parse::<GenerationMode>)
                .transpose()?;
            Ok((content_type, mode))
        });

        match parsed {
            Ok((content_type, mode)) => {
                self.generate(content_type, &request.item, &request.topic, mode, request.context)
                    .await
            }
            Err(e) => {
                warn!(item = %request.item, error = %e, "malformed batch entry");
                GeneratedContent::failed(default_mode, e.to_string())
            }
        }
    }

    /// Runs each entry independently, at most `batch_concurrency` at a time.
    /// Output order matches input order.
    pub async fn batch_generate(&self, requests: Vec<BatchRequest>) -> Vec<GeneratedContent> {
        let concurrency = self.inner.config.batch_concurrency.max(1);
        let total = requests.len();
        let results: Vec<GeneratedContent> = stream::iter(requests)
            .map(|request| self.generate_entry(request))
            .buffered(concurrency)
            .collect()
            .await;
        let failed = results.iter().filter(|r| r.failure.is_some()).count();
        info!(total, failed, "batch generation finished");
        results
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.inner.stats.snapshot()
    }

    pub fn reset_statistics(&self) {
        self.inner.stats.reset();
    }

    /// Advisory only; the default mode is left unchanged.
    pub fn recommend_mode(&self, current: GenerationMode) -> GenerationMode {
        let stats = self.statistics();
        if stats.fallback_rate > FALLBACK_RATE_LIMIT {
            GenerationMode::TemplateOnly
        } else if stats.quality_failure_rate > QUALITY_FAILURE_RATE_LIMIT {
            GenerationMode::AiEnhanced
        } else if stats.cache_hit_rate > CACHE_HIT_RATE_TARGET {
            GenerationMode::AdaptiveAi
        } else {
            current
        }
    }

    /// Records a review and drops cached content for the item, whose strategy may have moved.
    pub fn review(&self, item: &str, grade: Grade) -> MemoryState {
        let state = self.inner.scheduler.review(item, grade);
        let dropped = self.inner.cache.invalidate_item(item);
        debug!(item, grade = grade.value(), dropped, "review recorded");
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, ModeTtls};
    use crate::generation::{BackendError, CompletionOptions, Prompt};
    use crate::memory::{MemoryStore, SchedulerParams};
    use crate::persistence::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        reply: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CompletionBackend for Fixed {
        async fn complete(&self, _: &Prompt, _: &CompletionOptions) -> Result<String, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.to_string())
        }
    }

    fn orchestrator(reply: &'static str) -> (GenerationOrchestrator, Arc<Fixed>) {
        let store = Arc::new(MemoryStore::new(Arc::new(InMemoryStore::new())));
        let scheduler = Arc::new(SpacedRepetitionScheduler::new(store, SchedulerParams::default()));
        let cache = Arc::new(ContentCache::new(CacheConfig {
            ttl_jitter_ratio: 0.0,
            ttls: ModeTtls::uniform(Duration::from_secs(60)),
            ..CacheConfig::default()
        }));
        let backend = Arc::new(Fixed {
            reply,
            calls: AtomicUsize::new(0),
        });
        let orchestrator = GenerationOrchestrator::builder(scheduler, cache)
            .backend(backend.clone())
            .build();
        (orchestrator, backend)
    }

    #[tokio::test]
    async fn accepted_content_is_cached() {
        let (orchestrator, backend) = orchestrator(r#"{"sentence": "I eat an apple every day."}"#);
        let first = orchestrator
            .generate(ContentType::Sentence, "apple", "t", None, GenerationContext::default())
            .await;
        assert!(!first.cache_hit);
        assert!(first.quality_score >= 0.7);

        let second = orchestrator
            .generate(ContentType::Sentence, "apple", "t", None, GenerationContext::default())
            .await;
        assert!(second.cache_hit);
        assert_eq!(second.content, first.content);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

        let stats = orchestrator.statistics();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.cache_hit_rate, 50.0);
    }

    #[tokio::test]
    async fn low_quality_downgrades_once() {
        let (orchestrator, backend) = orchestrator(r#"{"sentence": "bananas are yellow and long"}"#);
        let content = orchestrator
            .generate(
                ContentType::Sentence,
                "apple",
                "t",
                None,
                GenerationContext::default().with_part_of_speech("noun"),
            )
            .await;
        assert!(content.downgraded);
        assert_eq!(content.generation_mode, GenerationMode::TemplateOnly);
        assert!(content.content.contains("apple"));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert!(orchestrator.cache().is_empty());

        let stats = orchestrator.statistics();
        assert_eq!(stats.quality_failures, 1);
        assert_eq!(stats.fallbacks, 0);
    }

    #[tokio::test]
    async fn empty_item_is_a_configuration_error() {
        let (orchestrator, backend) = orchestrator("unused");
        let result = orchestrator
            .try_generate(ContentType::Sentence, "  ", "t", None, GenerationContext::default())
            .await;
        assert_eq!(result, Err(ConfigurationError::EmptyItem));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert_eq!(orchestrator.statistics().total_requests, 0);
    }

    #[tokio::test]
    async fn template_mode_never_calls_backend() {
        let (orchestrator, backend) = orchestrator("unused");
        let content = orchestrator
            .generate(
                ContentType::Exercise,
                "apple",
                "t",
                Some(GenerationMode::TemplateOnly),
                GenerationContext::default().with_part_of_speech("n"),
            )
            .await;
        assert_eq!(content.answer(), Some("apple"));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert_eq!(orchestrator.statistics().template_generations, 1);
    }

    #[tokio::test]
    async fn review_invalidates_cached_content() {
        let (orchestrator, _) = orchestrator(r#"{"sentence": "I eat an apple every day."}"#);
        orchestrator
            .generate(ContentType::Sentence, "apple", "t", None, GenerationContext::default())
            .await;
        assert_eq!(orchestrator.cache().len(), 1);
        let state = orchestrator.review("apple", Grade::Good);
        assert_eq!(state.review_count, 1);
        assert!(orchestrator.cache().is_empty());
    }

    #[tokio::test]
    async fn disabled_flag_needs_no_registered_generator() {
        let store = Arc::new(MemoryStore::new(Arc::new(InMemoryStore::new())));
        let scheduler = Arc::new(SpacedRepetitionScheduler::new(store, SchedulerParams::default()));
        let cache = Arc::new(ContentCache::new(CacheConfig::default()));
        let flags = Arc::new(StaticFeatureFlags::new().with(AI_GENERATION, false));
        let orchestrator = GenerationOrchestrator::builder(scheduler, cache)
            .flags(flags)
            .build();
        assert!(!orchestrator.supports(GenerationMode::AiEnhanced));

        let content = orchestrator
            .generate(
                ContentType::Sentence,
                "apple",
                "t",
                Some(GenerationMode::AiEnhanced),
                GenerationContext::default(),
            )
            .await;
        assert!(content.is_fallback);
        assert!(content.failure.is_none());
        assert_eq!(content.content, "This is an apple.");
        assert_eq!(orchestrator.statistics().fallbacks, 1);
    }

    #[tokio::test]
    async fn missing_generator_is_reported_when_enabled() {
        let store = Arc::new(MemoryStore::new(Arc::new(InMemoryStore::new())));
        let scheduler = Arc::new(SpacedRepetitionScheduler::new(store, SchedulerParams::default()));
        let cache = Arc::new(ContentCache::new(CacheConfig::default()));
        let orchestrator = GenerationOrchestrator::builder(scheduler, cache).build();
        let result = orchestrator
            .try_generate(
                ContentType::Sentence,
                "apple",
                "t",
                Some(GenerationMode::AdaptiveAi),
                GenerationContext::default(),
            )
            .await;
        assert_eq!(
            result,
            Err(ConfigurationError::MissingGenerator(GenerationMode::AdaptiveAi))
        );
    }

    #[tokio::test]
    async fn off_target_exercise_is_downgraded_not_cached() {
        let (orchestrator, backend) = orchestrator(r#"{"sentence": "I like bananas very much today."}"#);
        let content = orchestrator
            .generate(
                ContentType::Exercise,
                "apple",
                "t",
                None,
                GenerationContext::default().with_part_of_speech("noun"),
            )
            .await;
        assert!(content.downgraded);
        assert_eq!(content.answer(), Some("apple"));
        assert!(content.content.contains("_____"));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert!(orchestrator.cache().is_empty());
        assert_eq!(orchestrator.statistics().quality_failures, 1);
    }

    #[test]
    fn set_default_mode_is_visible() {
        let (orchestrator, _) = orchestrator("unused");
        orchestrator.set_default_mode(GenerationMode::AdaptiveAi);
        assert_eq!(orchestrator.default_mode(), GenerationMode::AdaptiveAi);
        assert!(orchestrator.supports(GenerationMode::AdaptiveAi));
    }
}
