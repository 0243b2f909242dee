use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct GenerationStatistics {
    total_requests: AtomicU64,
    cache_hits: AtomicU64,
    fallbacks: AtomicU64,
    ai_generations: AtomicU64,
    template_generations: AtomicU64,
    quality_failures: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsSnapshot {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub fallbacks: u64,
    pub ai_generations: u64,
    pub template_generations: u64,
    pub quality_failures: u64,
    pub cache_hit_rate: f64,
    pub fallback_rate: f64,
    pub ai_generation_rate: f64,
    pub template_generation_rate: f64,
    pub quality_failure_rate: f64,
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

impl GenerationStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ai_generation(&self) {
        self.ai_generations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_template_generation(&self) {
        self.template_generations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_quality_failure(&self) {
        self.quality_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        let total = self.total_requests.load(Ordering::Relaxed);
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let fallbacks = self.fallbacks.load(Ordering::Relaxed);
        let ai = self.ai_generations.load(Ordering::Relaxed);
        let template = self.template_generations.load(Ordering::Relaxed);
        let quality_failures = self.quality_failures.load(Ordering::Relaxed);

        StatisticsSnapshot {
            total_requests: total,
            cache_hits,
            fallbacks,
            ai_generations: ai,
            template_generations: template,
            quality_failures,
            cache_hit_rate: percent(cache_hits, total),
            fallback_rate: percent(fallbacks, total),
            ai_generation_rate: percent(ai, total),
            template_generation_rate: percent(template, total),
            quality_failure_rate: percent(quality_failures, total),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.total_requests,
            &self.cache_hits,
            &self.fallbacks,
            &self.ai_generations,
            &self.template_generations,
            &self.quality_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_are_zero_without_requests() {
        let snapshot = GenerationStatistics::new().snapshot();
        assert_eq!(snapshot, StatisticsSnapshot::default());
    }

    #[test]
    fn rates_are_percentages_of_requests() {
        let stats = GenerationStatistics::new();
        for _ in 0..4 {
            stats.record_request();
        }
        stats.record_cache_hit();
        stats.record_fallback();
        stats.record_fallback();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.cache_hit_rate, 25.0);
        assert_eq!(snapshot.fallback_rate, 50.0);

        stats.reset();
        assert_eq!(stats.snapshot().total_requests, 0);
    }
}
