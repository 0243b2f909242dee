use std::sync::Arc;

use tokio::sync::broadcast;

use lexis_engine::cache::ContentCache;
use lexis_engine::config::EngineConfig;
use lexis_engine::flags::{DegradationMonitor, DegradationThresholds};
use lexis_engine::generation::{GenerationMode, LlmProvider};
use lexis_engine::logging::init_tracing;
use lexis_engine::memory::{MemoryStore, SpacedRepetitionScheduler};
use lexis_engine::orchestrator::{BatchRequest, GenerationOrchestrator};
use lexis_engine::persistence::JsonFileStore;

const DEFAULT_DUE_COUNT: usize = 20;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = EngineConfig::from_env();
    let _log_guard = init_tracing(&config.logging);

    let persistence = Arc::new(JsonFileStore::new(config.memory_store_path.clone()));
    let store = Arc::new(MemoryStore::new(persistence.clone()));
    let report = store.load();
    tracing::info!(loaded = report.loaded, skipped = report.skipped, "memory store loaded");

    let scheduler = Arc::new(SpacedRepetitionScheduler::new(
        Arc::clone(&store),
        config.scheduler_params(),
    ));

    let cache = Arc::new(ContentCache::new(config.cache_config()));
    cache.load(persistence.as_ref());
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let sweeper = cache.spawn_sweeper(shutdown_tx.subscribe());

    let mut orchestrator_config = config.orchestrator_config();
    let provider = LlmProvider::from_env();
    let mut builder = GenerationOrchestrator::builder(Arc::clone(&scheduler), Arc::clone(&cache))
        .flags(Arc::new(DegradationMonitor::new(DegradationThresholds::default())));
    if provider.is_available() {
        tracing::info!(model = provider.model(), "completion back-end configured");
        builder = builder.backend(Arc::new(provider));
    } else {
        tracing::warn!("LLM_API_KEY not set, generating from templates only");
        orchestrator_config.default_mode = GenerationMode::TemplateOnly;
    }
    let orchestrator = builder.config(orchestrator_config).build();

    let candidates: Vec<String> = std::env::args().skip(1).collect();
    if candidates.is_empty() {
        tracing::warn!("no candidate items given; usage: lexis-engine <item>...");
    }

    let due = scheduler.get_due_words(&candidates, DEFAULT_DUE_COUNT);
    println!("due items ({}):", due.len());
    for item in &due {
        let state = scheduler.get_memory_state(item);
        println!(
            "  {item}: reviews={} stability={:.2} next_in={:.1}d",
            state.review_count,
            state.stability,
            scheduler.next_interval_days(&state)
        );
    }

    let mode = orchestrator.default_mode();
    let requests = due
        .iter()
        .map(|item| BatchRequest::new("sentence", item, "").with_mode(mode.as_str()))
        .collect();
    for (item, content) in due.iter().zip(orchestrator.batch_generate(requests).await) {
        println!("  [{item}] {}", content.content);
    }

    let stats = orchestrator.statistics();
    tracing::info!(
        total = stats.total_requests,
        cache_hit_rate = stats.cache_hit_rate,
        fallback_rate = stats.fallback_rate,
        quality_failure_rate = stats.quality_failure_rate,
        recommended = %orchestrator.recommend_mode(mode),
        "generation statistics"
    );

    if let Err(e) = scheduler.save() {
        tracing::error!(error = %e, "failed to save memory store");
    }
    if let Err(e) = cache.save(persistence.as_ref()) {
        tracing::error!(error = %e, "failed to save content cache");
    }

    let _ = shutdown_tx.send(());
    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "cache sweeper task failed");
    }
    tracing::info!("shutdown complete");
}
