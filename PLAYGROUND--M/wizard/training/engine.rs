use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::ModelCatalog;

const BATCH_SIZES: [u64; 3] = [32, 64, 128];

// Result tables use the acronym where the catalog spells the network out.
const SHORT_RESULT_NAMES: [(&str, &str); 3] = [("cnn", "CNN"), ("rnn", "RNN"), ("lstm", "LSTM")];

/// Name shown for `id` in training results.
#[must_use]
pub fn result_name(id: &str) -> String {
    SHORT_RESULT_NAMES
        .iter()
        .find(|(short_id, _)| *short_id == id)
        .map_or_else(|| ModelCatalog::display_name(id), |(_, name)| (*name).to_string())
}

/// Metrics for one trained model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelResult {
    /// Catalog id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Accuracy in [0, 1].
    pub accuracy: f64,
    /// Precision in [0, 1].
    pub precision: f64,
    /// Recall in [0, 1].
    pub recall: f64,
    /// F1 score in [0, 1].
    pub f1_score: f64,
    /// Training time in milliseconds.
    pub training_time: u64,
    /// Hyperparameters reported by the trainer.
    #[serde(default)]
    pub parameters: IndexMap<String, Value>,
}

/// Outcome of one completed training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRunResult {
    /// ISO-8601 completion time.
    pub timestamp: String,
    /// Per-model metrics in selection order.
    pub models: Vec<ModelResult>,
}

impl TrainingRunResult {
    /// Parses the timestamp, if it is valid RFC 3339.
    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|value| value.with_timezone(&Utc))
    }
}

/// Where the time component of the metric seed comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeedPolicy {
    /// Current epoch milliseconds.
    #[default]
    WallClock,
    /// Pinned epoch milliseconds, for reproducible runs.
    Fixed(u64),
}

impl SeedPolicy {
    fn epoch_millis(self) -> u64 {
        match self {
            Self::WallClock => u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default(),
            Self::Fixed(millis) => millis,
        }
    }
}

/// `frac(sin(x) * 10000)`, in [0, 1).
#[must_use]
pub fn seeded_random(x: f64) -> f64 {
    let value = x.sin() * 10_000.0;
    value - value.floor()
}

/// Seed for a run: length of the concatenated ids plus `epoch_ms mod 1000`.
#[must_use]
pub fn mock_seed<S: AsRef<str>>(model_ids: &[S], epoch_millis: u64) -> u64 {
    let joined_len: usize = model_ids
        .iter()
        .map(|id| id.as_ref().encode_utf16().count())
        .sum();
    joined_len as u64 + epoch_millis % 1000
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn unit_metric(seed: f64) -> f64 {
    round4(seeded_random(seed).mul_add(0.4, 0.6))
}

/// Metrics for `model_ids`, a pure function of `(model_ids, seed)`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
#[must_use]
pub fn generate_metrics<S: AsRef<str>>(model_ids: &[S], seed: u64) -> Vec<ModelResult> {
    model_ids
        .iter()
        .enumerate()
        .map(|(index, id)| {
            let id = id.as_ref();
            let base = (seed + index as u64 * 100) as f64;
            let batch_index = ((seeded_random(base + 7.0) * 3.0).floor() as usize).min(2);
            let mut parameters = IndexMap::new();
            parameters.insert(
                "learningRate".to_string(),
                Value::String(format!("{:.4}", seeded_random(base + 5.0) * 0.01)),
            );
            parameters.insert(
                "epochs".to_string(),
                Value::from((seeded_random(base + 6.0) * 100.0).floor() as u64 + 50),
            );
            parameters.insert("batchSize".to_string(), Value::from(BATCH_SIZES[batch_index]));
            ModelResult {
                id: id.to_string(),
                name: result_name(id),
                accuracy: unit_metric(base),
                precision: unit_metric(base + 1.0),
                recall: unit_metric(base + 2.0),
                f1_score: unit_metric(base + 3.0),
                training_time: (seeded_random(base + 4.0) * 5000.0).floor() as u64 + 1000,
                parameters,
            }
        })
        .collect()
}

/// RFC 3339 timestamp with millisecond precision and a `Z` suffix.
#[must_use]
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Local stand-in for the backend trainer.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockTrainingEngine {
    policy: SeedPolicy,
}

impl MockTrainingEngine {
    /// Creates an engine using the given seed policy.
    #[must_use]
    pub const fn new(policy: SeedPolicy) -> Self {
        Self { policy }
    }

    /// Seed policy in use.
    #[must_use]
    pub const fn policy(&self) -> SeedPolicy {
        self.policy
    }

    /// Seed the next run over `model_ids` would use.
    #[must_use]
    pub fn seed_for<S: AsRef<str>>(&self, model_ids: &[S]) -> u64 {
        mock_seed(model_ids, self.policy.epoch_millis())
    }

    /// Produces a complete run result stamped with the current time.
    #[must_use]
    pub fn run<S: AsRef<str>>(&self, model_ids: &[S]) -> TrainingRunResult {
        let seed = self.seed_for(model_ids);
        TrainingRunResult {
            timestamp: iso_timestamp(Utc::now()),
            models: generate_metrics(model_ids, seed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_formula_uses_joined_length_and_millis() {
        let ids = ["decision_tree", "random_forest"];
        assert_eq!(mock_seed(&ids, 1_700_000_000_123), 26 + 123);
        assert_eq!(mock_seed::<&str>(&[], 999), 999);
    }

    #[test]
    fn metrics_are_deterministic_and_bounded() {
        let ids = ["decision_tree", "random_forest", "custom_model"];
        let first = generate_metrics(&ids, 4242);
        let second = generate_metrics(&ids, 4242);
        assert_eq!(first, second);
        for model in &first {
            for metric in [model.accuracy, model.precision, model.recall, model.f1_score] {
                assert!((0.6..=1.0).contains(&metric), "{metric}");
                assert!(((metric * 10_000.0).round() - metric * 10_000.0).abs() < 1e-6);
            }
            assert!((1000..6000).contains(&model.training_time));
            let epochs = model.parameters["epochs"].as_u64().unwrap();
            assert!((50..150).contains(&epochs));
            let batch = model.parameters["batchSize"].as_u64().unwrap();
            assert!(BATCH_SIZES.contains(&batch));
            let rate = model.parameters["learningRate"].as_str().unwrap();
            assert_eq!(rate.split('.').nth(1).unwrap().len(), 4);
        }
        assert_eq!(first[0].name, "Decision Tree");
        assert_eq!(first[2].name, "custom_model");
    }

    #[test]
    fn deep_models_use_acronyms_in_results() {
        let names: Vec<String> = generate_metrics(&["cnn", "rnn", "lstm", "knn"], 7)
            .into_iter()
            .map(|model| model.name)
            .collect();
        assert_eq!(names, ["CNN", "RNN", "LSTM", "K-Nearest Neighbors"]);
        assert_eq!(ModelCatalog::display_name("cnn"), "Convolutional Neural Network");
    }

    #[test]
    fn fixed_policy_pins_the_seed() {
        let engine = MockTrainingEngine::new(SeedPolicy::Fixed(500));
        let ids = ["knn"];
        assert_eq!(engine.seed_for(&ids), 503);
        assert_eq!(engine.run(&ids).models, engine.run(&ids).models);
    }

    #[test]
    fn result_serializes_camel_case() {
        let result = MockTrainingEngine::new(SeedPolicy::Fixed(0)).run(&["svm"]);
        let value = serde_json::to_value(&result).unwrap();
        assert!(value["models"][0].get("f1Score").is_some());
        assert!(value["models"][0].get("trainingTime").is_some());
        assert!(result.timestamp.ends_with('Z'));
        assert!(result.completed_at().is_some());
    }
}
