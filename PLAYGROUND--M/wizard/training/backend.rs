use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use shared_logging::LogLevel;

use super::engine::{MockTrainingEngine, TrainingRunResult};
use crate::{
    error::WizardError, preprocessing::PreprocessingOptions, preview::UploadedFile,
    telemetry::WizardTelemetry,
};

/// Everything a trainer needs for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingRequest {
    /// Uploaded dataset, if still held by the session.
    pub file: Option<UploadedFile>,
    /// Transformation knobs.
    pub preprocessing: PreprocessingOptions,
    /// Selected model ids in selection order.
    pub models: Vec<String>,
    /// Column to predict.
    pub target_column: Option<String>,
    /// Columns left out of the features.
    pub excluded_columns: Vec<String>,
}

impl TrainingRequest {
    /// Request over `models` with default knobs and no file.
    #[must_use]
    pub fn for_models<S: AsRef<str>>(models: &[S]) -> Self {
        Self {
            file: None,
            preprocessing: PreprocessingOptions::default(),
            models: models.iter().map(|id| id.as_ref().to_string()).collect(),
            target_column: None,
            excluded_columns: Vec::new(),
        }
    }
}

/// Something that can turn a request into metrics.
#[async_trait]
pub trait TrainingBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Trains every requested model.
    async fn train(&self, request: &TrainingRequest) -> Result<TrainingRunResult, WizardError>;
}

#[async_trait]
impl TrainingBackend for MockTrainingEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn train(&self, request: &TrainingRequest) -> Result<TrainingRunResult, WizardError> {
        if request.models.is_empty() {
            return Err(WizardError::validation("no models selected"));
        }
        Ok(self.run(&request.models))
    }
}

/// Tries a primary backend and falls back to the mock engine when it is
/// unreachable. Other failures are returned as-is.
pub struct FallbackTrainer {
    primary: Arc<dyn TrainingBackend>,
    fallback: MockTrainingEngine,
    telemetry: Option<WizardTelemetry>,
}

impl FallbackTrainer {
    /// Wraps `primary` with a mock fallback.
    #[must_use]
    pub fn new(primary: Arc<dyn TrainingBackend>, fallback: MockTrainingEngine) -> Self {
        Self {
            primary,
            fallback,
            telemetry: None,
        }
    }

    /// Records fallbacks through `telemetry`.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: WizardTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }
}

impl std::fmt::Debug for FallbackTrainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackTrainer")
            .field("primary", &self.primary.name())
            .field("fallback", &self.fallback)
            .finish()
    }
}

#[async_trait]
impl TrainingBackend for FallbackTrainer {
    fn name(&self) -> &str {
        self.primary.name()
    }

    async fn train(&self, request: &TrainingRequest) -> Result<TrainingRunResult, WizardError> {
        match self.primary.train(request).await {
            Err(WizardError::BackendUnavailable(reason)) => {
                if let Some(telemetry) = &self.telemetry {
                    let _ = telemetry.log(
                        LogLevel::Warn,
                        "training backend unavailable, using mock metrics",
                        json!({ "backend": self.primary.name(), "reason": reason }),
                    );
                    let _ = telemetry.event(
                        "wizard.training_fallback",
                        json!({ "backend": self.primary.name(), "reason": reason }),
                    );
                }
                self.fallback.train(request).await
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::engine::SeedPolicy;

    struct Offline;

    #[async_trait]
    impl TrainingBackend for Offline {
        fn name(&self) -> &str {
            "offline"
        }

        async fn train(&self, _: &TrainingRequest) -> Result<TrainingRunResult, WizardError> {
            Err(WizardError::BackendUnavailable("connection refused".into()))
        }
    }

    struct Rejecting;

    #[async_trait]
    impl TrainingBackend for Rejecting {
        fn name(&self) -> &str {
            "rejecting"
        }

        async fn train(&self, _: &TrainingRequest) -> Result<TrainingRunResult, WizardError> {
            Err(WizardError::validation("bad target"))
        }
    }

    #[tokio::test]
    async fn unavailable_backend_falls_back_to_mock() {
        let mock = MockTrainingEngine::new(SeedPolicy::Fixed(10));
        let trainer = FallbackTrainer::new(Arc::new(Offline), mock);
        let request = TrainingRequest::for_models(&["knn", "svm"]);
        let result = trainer.train(&request).await.unwrap();
        assert_eq!(result.models, mock.run(&request.models).models);
    }

    #[tokio::test]
    async fn other_errors_surface() {
        let trainer = FallbackTrainer::new(Arc::new(Rejecting), MockTrainingEngine::default());
        let err = trainer
            .train(&TrainingRequest::for_models(&["knn"]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[tokio::test]
    async fn mock_rejects_empty_selection() {
        let err = MockTrainingEngine::default()
            .train(&TrainingRequest::for_models::<&str>(&[]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }
}
