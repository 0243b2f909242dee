pub mod cache;
pub mod config;
pub mod fallback;
pub mod flags;
pub mod generation;
pub mod logging;
pub mod memory;
pub mod orchestrator;
pub mod persistence;
pub mod policy;
pub mod quality;

pub use cache::{CacheConfig, CacheKey, ContentCache, FlightRole};
pub use config::{EngineConfig, LoggingConfig};
pub use fallback::FallbackProvider;
pub use flags::{DegradationMonitor, FeatureFlags, StaticFeatureFlags};
pub use generation::{
    CompletionBackend, ContentType, GeneratedContent, GenerationContext, GenerationMode,
};
pub use memory::{Grade, MemoryState, MemoryStore, SpacedRepetitionScheduler};
pub use orchestrator::{BatchRequest, GenerationOrchestrator, OrchestratorConfig, StatisticsSnapshot};
pub use persistence::{InMemoryStore, JsonFileStore, KeyValueStore, PersistenceError};
pub use policy::StrategyPolicy;
pub use quality::QualityGate;
