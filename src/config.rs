use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::cache::{CacheConfig, ModeTtls};
use crate::generation::GenerationMode;
use crate::memory::SchedulerParams;
use crate::orchestrator::OrchestratorConfig;

const DEFAULT_QUALITY_THRESHOLD: f64 = 0.7;
const DEFAULT_CACHE_CAPACITY: usize = 1024;
const DEFAULT_SWEEP_SECS: u64 = 60;
const DEFAULT_GENERATION_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_BATCH_CONCURRENCY: usize = 8;
const DEFAULT_STORE_PATH: &str = "./data";

pub(crate) fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub(crate) fn env_u64(key: &str) -> Option<u64> {
    env_string(key)?.trim().parse().ok()
}

fn env_f64(key: &str) -> Option<f64> {
    env_string(key)?.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn env_secs(key: &str, default: Duration) -> Duration {
    env_u64(key).map(Duration::from_secs).unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub file_logs: bool,
    pub log_dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_logs: false,
            log_dir: PathBuf::from("./logs"),
        }
    }
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            level: env_string("RUST_LOG").unwrap_or(defaults.level),
            file_logs: env_string("ENABLE_FILE_LOGS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            log_dir: env_string("LOG_DIR").map(PathBuf::from).unwrap_or(defaults.log_dir),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub generation_mode: GenerationMode,
    pub quality_threshold: f64,
    pub cache_capacity: usize,
    pub cache_ttls: ModeTtls,
    pub cache_sweep_interval: Duration,
    pub generation_timeout: Duration,
    pub batch_concurrency: usize,
    pub desired_retention: f64,
    pub new_item_ratio: f64,
    pub memory_store_path: PathBuf,
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let scheduler = SchedulerParams::default();
        Self {
            generation_mode: GenerationMode::default(),
            quality_threshold: DEFAULT_QUALITY_THRESHOLD,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttls: ModeTtls::default(),
            cache_sweep_interval: Duration::from_secs(DEFAULT_SWEEP_SECS),
            generation_timeout: Duration::from_millis(DEFAULT_GENERATION_TIMEOUT_MS),
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
            desired_retention: scheduler.desired_retention,
            new_item_ratio: scheduler.new_item_ratio,
            memory_store_path: PathBuf::from(DEFAULT_STORE_PATH),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Reads overrides from the environment. Invalid values keep the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let generation_mode = match env_string("GENERATION_MODE") {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                warn!(error = %e, "invalid GENERATION_MODE, using default");
                defaults.generation_mode
            }),
            None => defaults.generation_mode,
        };

        let quality_threshold = env_f64("QUALITY_THRESHOLD")
            .filter(|v| (0.0..=1.0).contains(v))
            .unwrap_or(defaults.quality_threshold);

        let cache_ttls = ModeTtls {
            template_only: env_secs("CACHE_TTL_TEMPLATE_SECS", defaults.cache_ttls.template_only),
            ai_enhanced: env_secs("CACHE_TTL_AI_SECS", defaults.cache_ttls.ai_enhanced),
            adaptive_ai: env_secs("CACHE_TTL_ADAPTIVE_SECS", defaults.cache_ttls.adaptive_ai),
        };

        Self {
            generation_mode,
            quality_threshold,
            cache_capacity: env_u64("CACHE_CAPACITY")
                .and_then(|v| usize::try_from(v).ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.cache_capacity),
            cache_ttls,
            cache_sweep_interval: env_secs("CACHE_SWEEP_SECS", defaults.cache_sweep_interval),
            generation_timeout: env_u64("GENERATION_TIMEOUT_MS")
                .filter(|v| *v > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.generation_timeout),
            batch_concurrency: env_u64("BATCH_CONCURRENCY")
                .and_then(|v| usize::try_from(v).ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.batch_concurrency),
            desired_retention: env_f64("DESIRED_RETENTION")
                .filter(|v| *v > 0.0 && *v < 1.0)
                .unwrap_or(defaults.desired_retention),
            new_item_ratio: env_f64("NEW_ITEM_RATIO")
                .filter(|v| (0.0..=1.0).contains(v))
                .unwrap_or(defaults.new_item_ratio),
            memory_store_path: env_string("MEMORY_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.memory_store_path),
            logging: LoggingConfig::from_env(),
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            capacity: self.cache_capacity,
            ttls: self.cache_ttls,
            sweep_interval: self.cache_sweep_interval,
            ..CacheConfig::default()
        }
    }

    pub fn scheduler_params(&self) -> SchedulerParams {
        SchedulerParams::default().with_retention(self.desired_retention, self.new_item_ratio)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            default_mode: self.generation_mode,
            quality_threshold: self.quality_threshold,
            generation_timeout: self.generation_timeout,
            batch_concurrency: self.batch_concurrency,
        }
    }
}
