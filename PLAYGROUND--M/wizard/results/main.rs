//! Ranking and chart datasets derived from a completed run.

/// Exportable JSON and plain-text report.
pub mod report;
/// Share/clipboard fallback chain.
pub mod share;

use serde::Serialize;

use crate::training::engine::{ModelResult, TrainingRunResult};

/// Width of model names on comparison charts.
pub const COMPARISON_NAME_WIDTH: usize = 10;

/// One bar group of the comparison chart, percent-scaled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    /// Name truncated to [`COMPARISON_NAME_WIDTH`] characters.
    pub name: String,
    /// Accuracy percent, one decimal.
    pub accuracy: f64,
    /// Precision percent, one decimal.
    pub precision: f64,
    /// Recall percent, one decimal.
    pub recall: f64,
    /// F1 percent, one decimal.
    pub f1: f64,
}

/// One axis of the single-model radar chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadarPoint {
    /// Axis label.
    pub metric: &'static str,
    /// Percent value, one decimal.
    pub value: f64,
}

/// Count of models in one accuracy bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistributionBucket {
    /// Bucket label.
    pub name: &'static str,
    /// Number of models.
    pub value: usize,
}

/// Simulated deployment of a model.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    /// Deployed model id.
    pub model_id: String,
    /// Deployed model name.
    pub model_name: String,
    /// Accuracy at deploy time.
    pub accuracy: f64,
    /// Prediction endpoint path.
    pub endpoint: String,
    /// Deployment status.
    pub status: &'static str,
}

fn percent(value: f64) -> f64 {
    (value * 1000.0).round() / 10.0
}

/// Derived views over a [`TrainingRunResult`].
#[derive(Debug, Clone)]
pub struct ResultsAnalysis<'a> {
    result: &'a TrainingRunResult,
    ranked: Vec<&'a ModelResult>,
}

impl<'a> ResultsAnalysis<'a> {
    /// Ranks the result's models by accuracy, descending; ties keep run order.
    #[must_use]
    pub fn new(result: &'a TrainingRunResult) -> Self {
        let mut ranked: Vec<&ModelResult> = result.models.iter().collect();
        ranked.sort_by(|a, b| b.accuracy.total_cmp(&a.accuracy));
        Self { result, ranked }
    }

    /// Underlying run.
    #[must_use]
    pub const fn result(&self) -> &'a TrainingRunResult {
        self.result
    }

    /// Models ordered best first.
    #[must_use]
    pub fn ranked(&self) -> &[&'a ModelResult] {
        &self.ranked
    }

    /// Highest-accuracy model.
    #[must_use]
    pub fn best(&self) -> Option<&'a ModelResult> {
        self.ranked.first().copied()
    }

    /// Comparison chart rows in run order.
    #[must_use]
    pub fn comparison(&self) -> Vec<ComparisonRow> {
        self.result
            .models
            .iter()
            .map(|model| ComparisonRow {
                name: model.name.chars().take(COMPARISON_NAME_WIDTH).collect(),
                accuracy: percent(model.accuracy),
                precision: percent(model.precision),
                recall: percent(model.recall),
                f1: percent(model.f1_score),
            })
            .collect()
    }

    /// Radar axes for the best model.
    #[must_use]
    pub fn radar(&self) -> Vec<RadarPoint> {
        self.best().map(radar_for).unwrap_or_default()
    }

    /// High/medium/low accuracy buckets over the comparison percentages.
    #[must_use]
    pub fn distribution(&self) -> [DistributionBucket; 3] {
        let scaled: Vec<f64> = self.comparison().iter().map(|row| row.accuracy).collect();
        let count = |pred: &dyn Fn(f64) -> bool| scaled.iter().filter(|v| pred(**v)).count();
        [
            DistributionBucket {
                name: "High Performance (>80%)",
                value: count(&|v| v > 80.0),
            },
            DistributionBucket {
                name: "Medium Performance (60-80%)",
                value: count(&|v| (60.0..=80.0).contains(&v)),
            },
            DistributionBucket {
                name: "Low Performance (<60%)",
                value: count(&|v| v < 60.0),
            },
        ]
    }

    /// Simulated deployment of the best model.
    #[must_use]
    pub fn deploy_best(&self) -> Option<Deployment> {
        self.best().map(|model| Deployment {
            model_id: model.id.clone(),
            model_name: model.name.clone(),
            accuracy: model.accuracy,
            endpoint: format!("/api/predict/{}", model.id),
            status: "Active",
        })
    }
}

/// Radar axes for one model.
#[must_use]
pub fn radar_for(model: &ModelResult) -> Vec<RadarPoint> {
    vec![
        RadarPoint {
            metric: "Accuracy",
            value: percent(model.accuracy),
        },
        RadarPoint {
            metric: "Precision",
            value: percent(model.precision),
        },
        RadarPoint {
            metric: "Recall",
            value: percent(model.recall),
        },
        RadarPoint {
            metric: "F1 Score",
            value: percent(model.f1_score),
        },
    ]
}
