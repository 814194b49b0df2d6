use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::engine::result_name;

/// Lifecycle of one model inside a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    /// Waiting for earlier models.
    Queued,
    /// Currently advancing.
    Training,
    /// Reached 100%.
    Completed,
}

/// Progress of one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProgress {
    /// Catalog id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Lifecycle state.
    pub status: ModelStatus,
    /// Percent complete, 0 to 100.
    pub progress: f64,
}

/// Snapshot of a run's progress.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingProgress {
    /// Per-model state in selection order.
    pub models: Vec<ModelProgress>,
    /// Mean progress over all models.
    pub overall_percent: f64,
    /// True once every model completed.
    pub finished: bool,
}

impl TrainingProgress {
    /// Id of the model currently training.
    #[must_use]
    pub fn current_model(&self) -> Option<&str> {
        self.models
            .iter()
            .find(|model| model.status == ModelStatus::Training)
            .map(|model| model.id.as_str())
    }

    /// Number of completed models.
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.models
            .iter()
            .filter(|model| model.status == ModelStatus::Completed)
            .count()
    }
}

/// Estimated wall time label input: `ceil(n * 1.5)` minutes.
#[must_use]
pub const fn estimated_minutes(model_count: usize) -> usize {
    (model_count * 3).div_ceil(2)
}

/// Sequential per-model progress animation advanced one tick at a time.
#[derive(Debug)]
pub struct TrainingSimulation {
    models: Vec<ModelProgress>,
    current: usize,
    max_increment: f64,
    rng: SmallRng,
    stopped: bool,
}

impl TrainingSimulation {
    /// Queues `model_ids` and starts the first one.
    #[must_use]
    pub fn new<S: AsRef<str>>(model_ids: &[S], max_increment: f64, seed: u64) -> Self {
        let mut models: Vec<ModelProgress> = model_ids
            .iter()
            .map(|id| ModelProgress {
                id: id.as_ref().to_string(),
                name: result_name(id.as_ref()),
                status: ModelStatus::Queued,
                progress: 0.0,
            })
            .collect();
        if let Some(first) = models.first_mut() {
            first.status = ModelStatus::Training;
        }
        Self {
            models,
            current: 0,
            max_increment: max_increment.max(0.0),
            rng: SmallRng::seed_from_u64(seed),
            stopped: false,
        }
    }

    /// Advances the current model by a random increment below the maximum.
    /// Returns `true` once every model has completed.
    pub fn tick(&mut self) -> bool {
        if self.stopped || self.is_finished() {
            return self.is_finished();
        }
        let increment = self.rng.gen::<f64>() * self.max_increment;
        let model = &mut self.models[self.current];
        model.progress = (model.progress + increment).min(100.0);
        if model.progress >= 100.0 {
            model.status = ModelStatus::Completed;
            self.current += 1;
            if let Some(next) = self.models.get_mut(self.current) {
                next.status = ModelStatus::Training;
            }
        }
        self.is_finished()
    }

    /// Halts further progress.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    /// True after [`Self::stop`].
    #[must_use]
    pub const fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// True once every model completed.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.current >= self.models.len()
    }

    /// Current snapshot.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn snapshot(&self) -> TrainingProgress {
        let overall_percent = if self.models.is_empty() {
            100.0
        } else {
            self.models.iter().map(|model| model.progress).sum::<f64>() / self.models.len() as f64
        };
        TrainingProgress {
            models: self.models.clone(),
            overall_percent,
            finished: self.is_finished(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn models_complete_in_order() {
        let mut sim = TrainingSimulation::new(&["knn", "svm"], 30.0, 7);
        let first = sim.snapshot();
        assert_eq!(first.models[0].status, ModelStatus::Training);
        assert_eq!(first.models[1].status, ModelStatus::Queued);
        let mut ticks = 0;
        while !sim.tick() {
            ticks += 1;
            let snap = sim.snapshot();
            if snap.models[1].status != ModelStatus::Queued {
                assert_eq!(snap.models[0].status, ModelStatus::Completed);
            }
            assert!(snap.models.iter().all(|m| m.progress <= 100.0));
            assert!(ticks < 10_000);
        }
        let done = sim.snapshot();
        assert!(done.finished);
        assert_eq!(done.completed_count(), 2);
        assert!((done.overall_percent - 100.0).abs() < f64::EPSILON);
        assert!(done.current_model().is_none());
    }

    #[test]
    fn increments_stay_below_the_bound() {
        let mut sim = TrainingSimulation::new(&["lstm"], 30.0, 99);
        let mut previous = 0.0;
        while !sim.tick() {
            let progress = sim.snapshot().models[0].progress;
            assert!(progress - previous < 30.0);
            previous = progress;
        }
    }

    #[test]
    fn stop_freezes_progress() {
        let mut sim = TrainingSimulation::new(&["cnn"], 30.0, 1);
        assert_eq!(sim.snapshot().models[0].name, "CNN");
        sim.tick();
        sim.stop();
        let before = sim.snapshot();
        assert!(!sim.tick());
        assert_eq!(sim.snapshot(), before);
        assert!(sim.is_stopped());
    }

    #[test]
    fn estimate_rounds_up() {
        assert_eq!(estimated_minutes(0), 0);
        assert_eq!(estimated_minutes(1), 2);
        assert_eq!(estimated_minutes(2), 3);
        assert_eq!(estimated_minutes(3), 5);
    }
}
