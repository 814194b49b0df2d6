//! Static registry of selectable model types.

use std::{fmt, str::FromStr};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::WizardError;

/// Catalog phase, ordered from beginner to advanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    /// Core pipeline.
    Basic = 1,
    /// Expanded suite.
    Intermediate = 2,
    /// Advanced features.
    Advanced = 3,
}

impl Phase {
    /// Every phase in display order.
    pub const ALL: [Self; 3] = [Self::Basic, Self::Intermediate, Self::Advanced];

    /// Phase number, 1 through 3.
    #[must_use]
    pub const fn number(self) -> u8 {
        self as u8
    }

    /// Key used in grouped JSON (`phase1`..`phase3`).
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Basic => "phase1",
            Self::Intermediate => "phase2",
            Self::Advanced => "phase3",
        }
    }

    /// Section heading.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Basic => "Phase 1: Core Pipeline",
            Self::Intermediate => "Phase 2: Expanded Suite",
            Self::Advanced => "Phase 3: Advanced Features",
        }
    }

    /// Section subheading.
    #[must_use]
    pub const fn subtitle(self) -> &'static str {
        match self {
            Self::Basic => "Essential models for beginners",
            Self::Intermediate => "Professional-grade models",
            Self::Advanced => "Deep learning and neural networks",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Phase {
    type Err = WizardError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1" | "phase1" | "basic" => Ok(Self::Basic),
            "2" | "phase2" | "intermediate" => Ok(Self::Intermediate),
            "3" | "phase3" | "advanced" => Ok(Self::Advanced),
            other => Err(WizardError::validation(format!("unknown phase: {other}"))),
        }
    }
}

impl Serialize for Phase {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.number())
    }
}

/// Task family a model supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TaskKind {
    /// Continuous targets.
    Regression,
    /// Discrete targets.
    Classification,
    /// Regression and classification.
    Both,
    /// Image inputs.
    Image,
    /// Sequential or time-series inputs.
    Sequence,
    /// Text inputs.
    #[serde(rename = "NLP")]
    Nlp,
}

impl TaskKind {
    /// Wire label, as served in the catalog JSON.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Regression => "Regression",
            Self::Classification => "Classification",
            Self::Both => "Both",
            Self::Image => "Image",
            Self::Sequence => "Sequence",
            Self::Nlp => "NLP",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

/// One selectable model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCatalogEntry {
    /// Unique key.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Owning phase.
    pub phase: Phase,
    /// Supported task family.
    #[serde(rename = "type")]
    pub supported_task: TaskKind,
    /// One-line description.
    pub description: &'static str,
}

const fn entry(
    id: &'static str,
    name: &'static str,
    phase: Phase,
    supported_task: TaskKind,
    description: &'static str,
) -> ModelCatalogEntry {
    ModelCatalogEntry {
        id,
        name,
        phase,
        supported_task,
        description,
    }
}

static MODELS: [ModelCatalogEntry; 18] = [
    entry("linear_regression", "Linear Regression", Phase::Basic, TaskKind::Regression, "Basic linear model for continuous predictions"),
    entry("logistic_regression", "Logistic Regression", Phase::Basic, TaskKind::Classification, "Linear model for binary and multi-class classification"),
    entry("decision_tree", "Decision Tree", Phase::Basic, TaskKind::Both, "Tree-based model that splits on feature values"),
    entry("random_forest", "Random Forest", Phase::Basic, TaskKind::Both, "Ensemble of decision trees for better accuracy"),
    entry("naive_bayes", "Naive Bayes", Phase::Basic, TaskKind::Classification, "Probabilistic classifier based on Bayes theorem"),
    entry("knn", "K-Nearest Neighbors", Phase::Basic, TaskKind::Both, "Instance-based learning algorithm"),
    entry("svm", "Support Vector Machine", Phase::Intermediate, TaskKind::Both, "Powerful classifier using support vectors"),
    entry("gradient_boosting", "Gradient Boosting", Phase::Intermediate, TaskKind::Both, "Sequential ensemble method"),
    entry("xgboost", "XGBoost", Phase::Intermediate, TaskKind::Both, "Optimized gradient boosting implementation"),
    entry("lightgbm", "LightGBM", Phase::Intermediate, TaskKind::Both, "Fast gradient boosting framework"),
    entry("ridge_regression", "Ridge Regression", Phase::Intermediate, TaskKind::Regression, "Linear regression with L2 regularization"),
    entry("lasso_regression", "Lasso Regression", Phase::Intermediate, TaskKind::Regression, "Linear regression with L1 regularization"),
    entry("neural_network", "Neural Network", Phase::Advanced, TaskKind::Both, "Multi-layer perceptron network"),
    entry("cnn", "Convolutional Neural Network", Phase::Advanced, TaskKind::Image, "Deep learning for image classification"),
    entry("rnn", "Recurrent Neural Network", Phase::Advanced, TaskKind::Sequence, "For sequential and time-series data"),
    entry("lstm", "LSTM Network", Phase::Advanced, TaskKind::Sequence, "Advanced RNN with memory cells"),
    entry("transformer", "Transformer", Phase::Advanced, TaskKind::Nlp, "State-of-the-art for NLP tasks"),
    entry("automl", "Auto-ML", Phase::Advanced, TaskKind::Both, "Automated model selection and hyperparameter tuning"),
];

/// Read-only view over the static catalog.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelCatalog;

impl ModelCatalog {
    /// Every model, phase by phase.
    #[must_use]
    pub fn all_models() -> &'static [ModelCatalogEntry] {
        &MODELS
    }

    /// Models of one phase in catalog order.
    pub fn models_in_phase(phase: Phase) -> impl Iterator<Item = &'static ModelCatalogEntry> {
        MODELS.iter().filter(move |model| model.phase == phase)
    }

    /// Ids of one phase in catalog order.
    #[must_use]
    pub fn phase_ids(phase: Phase) -> Vec<&'static str> {
        Self::models_in_phase(phase).map(|model| model.id).collect()
    }

    /// Finds an entry by id.
    #[must_use]
    pub fn lookup(id: &str) -> Option<&'static ModelCatalogEntry> {
        MODELS.iter().find(|model| model.id == id)
    }

    /// Display name for an id, falling back to the id itself.
    #[must_use]
    pub fn display_name(id: &str) -> String {
        Self::lookup(id).map_or_else(|| id.to_string(), |model| model.name.to_string())
    }

    /// `{phase1: [...], phase2: [...], phase3: [...]}` rendering.
    #[must_use]
    pub fn grouped_json() -> Value {
        let mut grouped = Map::new();
        for phase in Phase::ALL {
            let models = Self::models_in_phase(phase)
                .map(|model| {
                    serde_json::json!({
                        "id": model.id,
                        "name": model.name,
                        "type": model.supported_task,
                        "description": model.description,
                    })
                })
                .collect();
            grouped.insert(phase.key().to_string(), Value::Array(models));
        }
        Value::Object(grouped)
    }
}
