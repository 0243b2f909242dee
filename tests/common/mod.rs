#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use lexis_engine::cache::{CacheConfig, ContentCache, ModeTtls};
use lexis_engine::flags::FeatureFlags;
use lexis_engine::generation::{BackendError, CompletionBackend, CompletionOptions, Prompt};
use lexis_engine::memory::{MemoryStore, SchedulerParams, SpacedRepetitionScheduler};
use lexis_engine::orchestrator::{GenerationOrchestrator, OrchestratorConfig};
use lexis_engine::persistence::InMemoryStore;

/// Mentions every item used by the integration tests, so it passes the gate for any of them.
pub const GOOD_REPLY: &str = r#"{"sentence": "I saw an apple, a book, a cat and a dog today.", "translation": "我今天看到了一个苹果、一本书、一只猫和一只狗。"}"#;

#[derive(Clone, Copy, Debug)]
pub enum Behavior {
    Reply(&'static str),
    Fail,
    Hang,
}

/// Counts calls, optionally sleeps before answering, and keeps the last prompt.
pub struct MockBackend {
    behavior: Behavior,
    delay: Duration,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<Prompt>>,
}

impl MockBackend {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Self::with_delay(behavior, Duration::ZERO)
    }

    pub fn with_delay(behavior: Behavior, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            delay,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<Prompt> {
        self.last_prompt.lock().clone()
    }
}

#[async_trait]
impl CompletionBackend for MockBackend {
    async fn complete(&self, prompt: &Prompt, _: &CompletionOptions) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock() = Some(prompt.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.behavior {
            Behavior::Reply(reply) => Ok(reply.to_string()),
            Behavior::Fail => Err(BackendError::Transient("connection reset".to_string())),
            Behavior::Hang => std::future::pending().await,
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

pub fn scheduler() -> Arc<SpacedRepetitionScheduler> {
    let store = Arc::new(MemoryStore::new(Arc::new(InMemoryStore::new())));
    Arc::new(SpacedRepetitionScheduler::new(store, SchedulerParams::default()))
}

pub fn cache_with_ttl(ttl: Duration) -> Arc<ContentCache> {
    Arc::new(ContentCache::new(CacheConfig {
        ttls: ModeTtls::uniform(ttl),
        ttl_jitter_ratio: 0.0,
        ..CacheConfig::default()
    }))
}

pub struct Harness {
    pub orchestrator: Arc<GenerationOrchestrator>,
    pub backend: Arc<MockBackend>,
}

pub fn harness(backend: Arc<MockBackend>) -> Harness {
    harness_with(backend, cache_with_ttl(Duration::from_secs(600)), None, OrchestratorConfig::default())
}

pub fn harness_with(
    backend: Arc<MockBackend>,
    cache: Arc<ContentCache>,
    flags: Option<Arc<dyn FeatureFlags>>,
    config: OrchestratorConfig,
) -> Harness {
    let mut builder = GenerationOrchestrator::builder(scheduler(), cache)
        .backend(backend.clone())
        .config(config);
    if let Some(flags) = flags {
        builder = builder.flags(flags);
    }
    Harness {
        orchestrator: Arc::new(builder.build()),
        backend,
    }
}
