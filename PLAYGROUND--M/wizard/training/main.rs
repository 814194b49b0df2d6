//! Training: deterministic mock metrics, progress simulation, and the
//! backends a session can train against.

/// Remote/mock training backends.
pub mod backend;
/// Seeded mock metric generation.
pub mod engine;
/// Per-model progress state machine.
pub mod progress;

pub use backend::{FallbackTrainer, TrainingBackend, TrainingRequest};
pub use engine::{MockTrainingEngine, ModelResult, SeedPolicy, TrainingRunResult};
pub use progress::{ModelProgress, ModelStatus, TrainingProgress, TrainingSimulation};
