#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! ML playground wizard: upload → preprocess → select models → train → results.

/// Error taxonomy shared by every wizard component.
#[path = "../error.rs"]
pub mod error;

/// Telemetry builder/hook for wizard sessions.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// Dataset preview parser for CSV/JSON uploads.
#[path = "../preview.rs"]
pub mod preview;

/// Preprocessing configuration store.
#[path = "../preprocessing.rs"]
pub mod preprocessing;

/// Static model catalog grouped by phase.
#[path = "../catalog.rs"]
pub mod catalog;

/// Mock training engine, progress simulation, and training backends.
#[path = "../training/main.rs"]
pub mod training;

/// Results ranking, chart datasets, exports, and sharing.
#[path = "../results/main.rs"]
pub mod results;

/// Wizard state machine expressed as a pure reducer.
#[path = "../state.rs"]
pub mod state;

/// Async session driver executing reducer effects.
#[path = "../session.rs"]
pub mod session;

pub use catalog::{ModelCatalog, ModelCatalogEntry, Phase, TaskKind};
pub use error::{ParseError, WizardError};
pub use preprocessing::{
    EncodingMethod, MissingValueStrategy, PreprocessingConfig, PreprocessingOption,
    PreprocessingOptions, ScalingMethod,
};
pub use preview::{DatasetPreview, FileKind, UploadedFile};
pub use results::{
    share::{share_results, Clipboard, ShareOutcome, SharePayload, ShareSurface},
    ResultsAnalysis,
};
pub use session::{WizardSession, WizardSessionBuilder};
pub use state::{reduce, Effect, SelectedModels, Step, Transition, WizardEvent, WizardState, WizardTimings};
pub use telemetry::{WizardTelemetry, WizardTelemetryBuilder};
pub use training::{
    backend::{FallbackTrainer, TrainingBackend, TrainingRequest},
    engine::{MockTrainingEngine, ModelResult, SeedPolicy, TrainingRunResult},
    progress::{ModelStatus, TrainingProgress, TrainingSimulation},
};
