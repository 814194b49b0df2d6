//! Runtime driver for one wizard session.
//!
//! [`WizardSession::dispatch`] runs the reducer under a lock and then executes
//! its effects on the Tokio runtime the session was built on. Dispatches are
//! serialized end to end, so effects apply in the order their transitions did. Spawned tasks
//! hold only a weak reference, so dropping the last session handle stops
//! every timer and scheduler.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Weak},
    time::Duration,
};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde_json::json;
use shared_logging::LogLevel;
use tokio::{
    runtime::Handle,
    sync::watch,
    task::JoinHandle,
    time::{interval_at, sleep, Instant},
};
use uuid::Uuid;

use crate::{
    error::WizardError,
    state::{reduce, Effect, Transition, WizardEvent, WizardState, WizardTimings},
    telemetry::WizardTelemetry,
    training::{
        backend::{TrainingBackend, TrainingRequest},
        engine::{MockTrainingEngine, TrainingRunResult},
        progress::TrainingSimulation,
    },
};

struct TrainingTask {
    run: u64,
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct SessionInner {
    id: String,
    // Held from reduce through effect execution; taken before `state`.
    dispatching: Mutex<()>,
    state: Mutex<WizardState>,
    telemetry: WizardTelemetry,
    trainer: Arc<dyn TrainingBackend>,
    runtime: Handle,
    advances: Mutex<HashMap<u64, JoinHandle<()>>>,
    training: Mutex<Option<TrainingTask>>,
    progress_seed: Option<u64>,
    revision: watch::Sender<u64>,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        for (_, handle) in self.advances.get_mut().drain() {
            handle.abort();
        }
        if let Some(task) = self.training.get_mut().take() {
            let _ = task.stop.send(true);
            task.handle.abort();
        }
    }
}

/// Handle to a running wizard session. Clones share the session.
#[derive(Clone)]
pub struct WizardSession {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for WizardSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WizardSession")
            .field("id", &self.inner.id)
            .field("trainer", &self.inner.trainer.name())
            .finish_non_exhaustive()
    }
}

impl WizardSession {
    /// Returns a builder.
    #[must_use]
    pub fn builder() -> WizardSessionBuilder {
        WizardSessionBuilder::default()
    }

    /// Session id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> WizardState {
        self.inner.state.lock().clone()
    }

    /// Latest completed run.
    #[must_use]
    pub fn results(&self) -> Option<TrainingRunResult> {
        self.inner.state.lock().results.clone()
    }

    /// Receiver bumped after every dispatched event.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    /// True while a training scheduler task is alive.
    #[must_use]
    pub fn has_running_scheduler(&self) -> bool {
        self.inner
            .training
            .lock()
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Applies `event`; a refused event is reported as the error while the
    /// session keeps running with the inline message recorded.
    pub fn dispatch(&self, event: WizardEvent) -> Result<(), WizardError> {
        let name = event.name();
        let _order = self.inner.dispatching.lock();
        let (previous, transition) = {
            let mut state = self.inner.state.lock();
            let transition = reduce(&state, event);
            let previous = std::mem::replace(&mut *state, transition.state.clone());
            (previous, transition)
        };
        let Transition {
            state: next,
            effects,
            rejection,
        } = transition;
        self.record(name, &previous, &next, rejection.as_ref());
        for effect in effects {
            self.execute(effect);
        }
        self.inner.revision.send_modify(|revision| *revision += 1);
        rejection.map_or(Ok(()), Err)
    }

    /// Waits until `predicate` holds and returns the matching state.
    pub async fn wait_for<F>(&self, predicate: F) -> WizardState
    where
        F: Fn(&WizardState) -> bool,
    {
        let mut revisions = self.subscribe();
        loop {
            let state = self.state();
            if predicate(&state) {
                return state;
            }
            if revisions.changed().await.is_err() {
                return self.state();
            }
        }
    }

    fn record(
        &self,
        event: &str,
        previous: &WizardState,
        next: &WizardState,
        rejection: Option<&WizardError>,
    ) {
        let telemetry = &self.inner.telemetry;
        if let Some(err) = rejection {
            let payload = json!({ "event": event, "kind": err.kind(), "message": err.to_string() });
            let _ = telemetry.log(LogLevel::Warn, "wizard.rejected", payload.clone());
            let _ = telemetry.event("wizard.rejected", payload);
        }
        if previous.current_step != next.current_step {
            let payload = json!({ "from": previous.current_step, "to": next.current_step, "cause": event });
            let _ = telemetry.log(LogLevel::Info, "wizard.step_changed", payload.clone());
            let _ = telemetry.event("wizard.step_changed", payload);
        }
        if previous.training_progress != next.training_progress && next.training_in_progress {
            if let Some(progress) = &next.training_progress {
                let _ = telemetry.event(
                    "wizard.training_progress",
                    json!({
                        "run": next.training_run(),
                        "overall": progress.overall_percent,
                        "current": progress.current_model(),
                    }),
                );
            }
        }
        if previous.training_in_progress && !next.training_in_progress {
            let outcome = if next.results != previous.results {
                "completed"
            } else if next.last_error != previous.last_error {
                "failed"
            } else {
                "stopped"
            };
            let payload = json!({
                "run": previous.training_run(),
                "outcome": outcome,
                "models": next.results.as_ref().map_or(0, |result| result.models.len()),
            });
            let _ = telemetry.log(LogLevel::Info, "wizard.training_finished", payload.clone());
            let _ = telemetry.event("wizard.training_finished", payload);
        }
    }

    fn execute(&self, effect: Effect) {
        match effect {
            Effect::ScheduleAdvance {
                token,
                target,
                delay,
            } => {
                let weak = Arc::downgrade(&self.inner);
                let mut advances = self.inner.advances.lock();
                let handle = self.inner.runtime.spawn(async move {
                    sleep(delay).await;
                    if let Some(inner) = weak.upgrade() {
                        inner.advances.lock().remove(&token);
                        let _ = WizardSession { inner }
                            .dispatch(WizardEvent::AutoAdvanceElapsed { token });
                    }
                });
                advances.insert(token, handle);
                drop(advances);
                let _ = self.inner.telemetry.log(
                    LogLevel::Debug,
                    "wizard.advance_scheduled",
                    json!({ "token": token, "target": target, "delay_ms": delay.as_millis() }),
                );
            }
            Effect::CancelAdvance { token } => {
                if let Some(handle) = self.inner.advances.lock().remove(&token) {
                    handle.abort();
                }
            }
            Effect::BeginTraining {
                run,
                request,
                tick,
                max_increment,
            } => self.begin_training(run, request, tick, max_increment),
            Effect::HaltTraining { run } => {
                let mut slot = self.inner.training.lock();
                if slot.as_ref().is_some_and(|task| task.run == run) {
                    if let Some(task) = slot.take() {
                        let _ = task.stop.send(true);
                        task.handle.abort();
                    }
                }
            }
        }
    }

    fn begin_training(&self, run: u64, request: TrainingRequest, tick: Duration, max_increment: f64) {
        let (stop, stop_rx) = watch::channel(false);
        let weak = Arc::downgrade(&self.inner);
        let trainer = Arc::clone(&self.inner.trainer);
        let seed = self.inner.progress_seed.unwrap_or_else(rand::random);
        let _ = self.inner.telemetry.event(
            "wizard.training_started",
            json!({ "run": run, "models": request.models, "trainer": trainer.name() }),
        );
        let handle = self.inner.runtime.spawn(run_training(
            weak,
            trainer,
            run,
            request,
            tick,
            max_increment,
            seed,
            stop_rx,
        ));
        let previous = self
            .inner
            .training
            .lock()
            .replace(TrainingTask { run, stop, handle });
        if let Some(task) = previous {
            let _ = task.stop.send(true);
            task.handle.abort();
        }
    }
}

fn dispatch_weak(weak: &Weak<SessionInner>, event: WizardEvent) -> bool {
    let Some(inner) = weak.upgrade() else {
        return false;
    };
    let _ = WizardSession { inner }.dispatch(event);
    true
}

/// One run: the trainer and the progress animation advance together; the
/// result is delivered once both are done.
#[allow(clippy::too_many_arguments)]
async fn run_training(
    weak: Weak<SessionInner>,
    trainer: Arc<dyn TrainingBackend>,
    run: u64,
    request: TrainingRequest,
    tick: Duration,
    max_increment: f64,
    seed: u64,
    mut stop: watch::Receiver<bool>,
) {
    let mut simulation = TrainingSimulation::new(&request.models, max_increment, seed);
    let training = trainer.train(&request);
    tokio::pin!(training);
    let mut ticker = interval_at(Instant::now() + tick, tick);
    let mut outcome: Option<TrainingRunResult> = None;
    loop {
        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    simulation.stop();
                    return;
                }
            }
            result = &mut training, if outcome.is_none() => match result {
                Ok(result) => outcome = Some(result),
                Err(err) => {
                    dispatch_weak(&weak, WizardEvent::TrainingFailed { run, message: err.user_message() });
                    return;
                }
            },
            _ = ticker.tick(), if !simulation.is_finished() => {
                simulation.tick();
                let progress = simulation.snapshot();
                if !dispatch_weak(&weak, WizardEvent::TrainingProgressed { run, progress }) {
                    return;
                }
            }
        }
        if simulation.is_finished() {
            if let Some(result) = outcome.take() {
                dispatch_weak(&weak, WizardEvent::TrainingCompleted { run, result });
                return;
            }
        }
    }
}

/// Builder for [`WizardSession`].
#[derive(Default)]
pub struct WizardSessionBuilder {
    id: Option<String>,
    timings: WizardTimings,
    trainer: Option<Arc<dyn TrainingBackend>>,
    telemetry: Option<WizardTelemetry>,
    progress_seed: Option<u64>,
}

impl WizardSessionBuilder {
    /// Overrides the generated session id.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets timer settings.
    #[must_use]
    pub fn timings(mut self, timings: WizardTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Sets the trainer; defaults to the mock engine.
    #[must_use]
    pub fn trainer(mut self, trainer: Arc<dyn TrainingBackend>) -> Self {
        self.trainer = Some(trainer);
        self
    }

    /// Sets telemetry; records are re-tagged with the session id.
    #[must_use]
    pub fn telemetry(mut self, telemetry: WizardTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Seeds the progress animation.
    #[must_use]
    pub fn progress_seed(mut self, seed: u64) -> Self {
        self.progress_seed = Some(seed);
        self
    }

    /// Builds the session on the current Tokio runtime.
    pub fn build(self) -> Result<WizardSession> {
        let runtime = Handle::try_current().context("wizard sessions require a tokio runtime")?;
        let id = self
            .id
            .unwrap_or_else(|| format!("sess-{}", Uuid::new_v4()));
        let telemetry = match self.telemetry {
            Some(telemetry) => telemetry.for_session(id.clone()),
            None => WizardTelemetry::builder("wizard").session(id.clone()).build()?,
        };
        let trainer = self
            .trainer
            .unwrap_or_else(|| Arc::new(MockTrainingEngine::default()));
        let (revision, _) = watch::channel(0);
        let _ = telemetry.log(
            LogLevel::Info,
            "wizard.session_started",
            json!({ "trainer": trainer.name() }),
        );
        Ok(WizardSession {
            inner: Arc::new(SessionInner {
                id,
                dispatching: Mutex::new(()),
                state: Mutex::new(WizardState::new(self.timings)),
                telemetry,
                trainer,
                runtime,
                advances: Mutex::new(HashMap::new()),
                training: Mutex::new(None),
                progress_seed: self.progress_seed,
                revision,
            }),
        })
    }
}
