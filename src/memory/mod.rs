pub mod scheduler;
pub mod state;
pub mod store;

pub use scheduler::{
    next_interval, next_state, retrievability, DifficultyDistribution, LearningStatistics,
    SchedulerParams, SpacedRepetitionScheduler, STABILITY_EPSILON,
};
pub use state::{Grade, InvalidGrade, MemoryPhase, MemoryState};
pub use store::{LoadReport, MemoryStore, MEMORY_NAMESPACE};
