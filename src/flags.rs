use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const AI_GENERATION: &str = "ai_generation";

const LEVEL_HISTORY_CAP: usize = 50;

pub trait FeatureFlags: Send + Sync {
    fn is_feature_enabled(&self, name: &str) -> bool;

    /// Outcome of a back-end call. Ignored by static flag sets.
    fn record_outcome(&self, _success: bool) {}
}

/// Fixed flag set; unknown names use `default_enabled`.
pub struct StaticFeatureFlags {
    overrides: RwLock<HashMap<String, bool>>,
    default_enabled: bool,
}

impl Default for StaticFeatureFlags {
    fn default() -> Self {
        Self {
            overrides: RwLock::new(HashMap::new()),
            default_enabled: true,
        }
    }
}

impl StaticFeatureFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, name: &str, enabled: bool) -> Self {
        self.set(name, enabled);
        self
    }

    pub fn set(&self, name: &str, enabled: bool) {
        self.overrides.write().insert(name.to_string(), enabled);
    }

    pub fn from_env() -> Self {
        let flags = Self::default();
        if let Ok(val) = std::env::var("FEATURE_AI_GENERATION") {
            flags.set(AI_GENERATION, parse_bool(&val).unwrap_or(true));
        }
        flags
    }
}

impl FeatureFlags for StaticFeatureFlags {
    fn is_feature_enabled(&self, name: &str) -> bool {
        self.overrides
            .read()
            .get(name)
            .copied()
            .unwrap_or(self.default_enabled)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackLevel {
    #[default]
    None,
    CacheOnly,
    TemplateOnly,
    Minimal,
    Emergency,
}

impl FallbackLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::CacheOnly => "cache_only",
            Self::TemplateOnly => "template_only",
            Self::Minimal => "minimal",
            Self::Emergency => "emergency",
        }
    }

    /// Any raised level switches generation off; the level itself records how
    /// long the back-end has been failing.
    pub fn allows(&self, feature: &str) -> bool {
        match feature {
            AI_GENERATION => *self == Self::None,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DegradationThresholds {
    pub cache_only: u32,
    pub template_only: u32,
    pub minimal: u32,
    pub emergency: u32,
    /// Time without failures after which automatic degradation lifts.
    pub recovery_after: Duration,
}

impl Default for DegradationThresholds {
    fn default() -> Self {
        Self {
            cache_only: 3,
            template_only: 5,
            minimal: 8,
            emergency: 12,
            recovery_after: Duration::from_secs(60),
        }
    }
}

impl DegradationThresholds {
    fn level_for(&self, consecutive_failures: u32) -> FallbackLevel {
        if consecutive_failures >= self.emergency {
            FallbackLevel::Emergency
        } else if consecutive_failures >= self.minimal {
            FallbackLevel::Minimal
        } else if consecutive_failures >= self.template_only {
            FallbackLevel::TemplateOnly
        } else if consecutive_failures >= self.cache_only {
            FallbackLevel::CacheOnly
        } else {
            FallbackLevel::None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelChange {
    pub from: FallbackLevel,
    pub to: FallbackLevel,
    pub reason: String,
    pub at: DateTime<Utc>,
}

struct MonitorState {
    level: FallbackLevel,
    manual: Option<FallbackLevel>,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    history: VecDeque<LevelChange>,
}

/// Flags driven by back-end health: consecutive failures raise the fallback level,
/// a success or a quiet `recovery_after` window resets it.
pub struct DegradationMonitor {
    thresholds: DegradationThresholds,
    state: Mutex<MonitorState>,
}

impl Default for DegradationMonitor {
    fn default() -> Self {
        Self::new(DegradationThresholds::default())
    }
}

impl DegradationMonitor {
    pub fn new(thresholds: DegradationThresholds) -> Self {
        Self {
            thresholds,
            state: Mutex::new(MonitorState {
                level: FallbackLevel::None,
                manual: None,
                consecutive_failures: 0,
                last_failure: None,
                history: VecDeque::new(),
            }),
        }
    }

    pub fn level(&self) -> FallbackLevel {
        let mut state = self.state.lock();
        self.maybe_recover(&mut state);
        state.manual.unwrap_or(state.level)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state.lock().consecutive_failures
    }

    /// Pins the level until `clear_manual` is called.
    pub fn set_manual(&self, level: FallbackLevel) {
        let mut state = self.state.lock();
        let from = state.manual.unwrap_or(state.level);
        state.manual = Some(level);
        push_change(&mut state, from, level, "manual override");
    }

    pub fn clear_manual(&self) {
        let mut state = self.state.lock();
        if let Some(from) = state.manual.take() {
            let to = state.level;
            push_change(&mut state, from, to, "manual override cleared");
        }
    }

    pub fn history(&self) -> Vec<LevelChange> {
        self.state.lock().history.iter().cloned().collect()
    }

    fn maybe_recover(&self, state: &mut MonitorState) {
        if state.level == FallbackLevel::None {
            return;
        }
        let quiet = state
            .last_failure
            .map_or(true, |t| t.elapsed() >= self.thresholds.recovery_after);
        if quiet {
            let from = state.level;
            state.level = FallbackLevel::None;
            state.consecutive_failures = 0;
            push_change(state, from, FallbackLevel::None, "recovery window elapsed");
        }
    }
}

fn push_change(state: &mut MonitorState, from: FallbackLevel, to: FallbackLevel, reason: &str) {
    if from == to {
        return;
    }
    if to > from {
        warn!(from = from.as_str(), to = to.as_str(), reason, "fallback level raised");
    } else {
        info!(from = from.as_str(), to = to.as_str(), reason, "fallback level lowered");
    }
    state.history.push_back(LevelChange {
        from,
        to,
        reason: reason.to_string(),
        at: Utc::now(),
    });
    if state.history.len() > LEVEL_HISTORY_CAP {
        state.history.pop_front();
    }
}

impl FeatureFlags for DegradationMonitor {
    fn is_feature_enabled(&self, name: &str) -> bool {
        self.level().allows(name)
    }

    fn record_outcome(&self, success: bool) {
        let mut state = self.state.lock();
        let from = state.level;
        if success {
            state.consecutive_failures = 0;
            state.level = FallbackLevel::None;
            push_change(&mut state, from, FallbackLevel::None, "backend recovered");
            return;
        }

        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_failure = Some(Instant::now());
        let to = self.thresholds.level_for(state.consecutive_failures).max(from);
        state.level = to;
        let reason = format!("{} consecutive failures", state.consecutive_failures);
        push_change(&mut state, from, to, &reason);
    }
}
