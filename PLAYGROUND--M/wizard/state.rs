//! Wizard state machine.
//!
//! All mutation goes through [`reduce`], which never performs I/O. Timers and
//! the training scheduler are requested as [`Effect`]s and executed by the
//! session driver; their completions come back as events carrying the token
//! or run id they were issued with, so late arrivals are dropped.

use std::{fmt, str::FromStr, time::Duration};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::{
    catalog::{ModelCatalog, Phase},
    error::{ParseError, WizardError},
    preprocessing::{PreprocessingConfig, PreprocessingOption},
    preview::{preview_upload, DatasetPreview, UploadedFile},
    training::{
        backend::TrainingRequest,
        engine::TrainingRunResult,
        progress::{TrainingProgress, TrainingSimulation},
    },
};

/// Wizard steps in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    /// Dataset upload.
    #[default]
    Upload,
    /// Target/exclusion/knob configuration.
    Preprocess,
    /// Model selection.
    Models,
    /// Training.
    Train,
    /// Results.
    Results,
}

impl Step {
    /// Every step in order.
    pub const ALL: [Self; 5] = [
        Self::Upload,
        Self::Preprocess,
        Self::Models,
        Self::Train,
        Self::Results,
    ];

    /// Zero-based position.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Stable key.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Preprocess => "preprocess",
            Self::Models => "models",
            Self::Train => "train",
            Self::Results => "results",
        }
    }

    /// Step bar label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Upload => "Upload Data",
            Self::Preprocess => "Preprocess",
            Self::Models => "Select Models",
            Self::Train => "Train",
            Self::Results => "Results",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Step {
    type Err = WizardError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|step| step.key() == value)
            .ok_or_else(|| WizardError::validation(format!("unknown step: {value}")))
    }
}

/// Display status of a step relative to the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// The current step.
    Active,
    /// Before the current step.
    Completed,
    /// After the current step.
    Pending,
}

/// Insertion-ordered set of selected model ids.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectedModels(IndexSet<String>);

impl SelectedModels {
    /// True when `id` is selected.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    /// Flips membership; returns whether `id` is now selected.
    pub fn toggle(&mut self, id: &str) -> bool {
        if self.0.shift_remove(id) {
            false
        } else {
            self.0.insert(id.to_string());
            true
        }
    }

    /// Selects every model of `phase` unless all already are, in which
    /// case deselects them. Returns whether the phase is now selected.
    pub fn toggle_phase(&mut self, phase: Phase) -> bool {
        let ids = ModelCatalog::phase_ids(phase);
        if ids.iter().all(|id| self.0.contains(*id)) {
            for id in ids {
                self.0.shift_remove(id);
            }
            false
        } else {
            for id in ids {
                self.0.insert(id.to_string());
            }
            true
        }
    }

    /// Number of selected models.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when nothing is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Ids in selection order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Owned ids in selection order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

/// Delays and tick settings for a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WizardTimings {
    /// Delay between a successful upload and moving to preprocessing.
    pub upload_advance: Duration,
    /// Delay of the follow-up advance after proceeding from preprocessing.
    pub preprocess_advance: Duration,
    /// Training scheduler period.
    pub progress_tick: Duration,
    /// Upper bound (exclusive) of a single progress increment.
    pub max_increment: f64,
}

impl Default for WizardTimings {
    fn default() -> Self {
        Self {
            upload_advance: Duration::from_millis(1500),
            preprocess_advance: Duration::from_millis(1000),
            progress_tick: Duration::from_millis(300),
            max_increment: 30.0,
        }
    }
}

/// Session state.
#[derive(Debug, Clone, Default)]
pub struct WizardState {
    /// Step on screen.
    pub current_step: Step,
    /// Uploaded file.
    pub uploaded_file: Option<UploadedFile>,
    /// Preview of the uploaded file.
    pub data_preview: Option<DatasetPreview>,
    /// Preprocessing configuration.
    pub preprocessing: PreprocessingConfig,
    /// Selected models.
    pub selected_models: SelectedModels,
    /// True while a run is animating.
    pub training_in_progress: bool,
    /// Latest progress snapshot of the current or last run.
    pub training_progress: Option<TrainingProgress>,
    /// Latest completed run.
    pub results: Option<TrainingRunResult>,
    /// Inline error message from the last rejected action.
    pub last_error: Option<String>,
    /// Timer settings.
    pub timings: WizardTimings,
    pending_advance: Option<(u64, Step)>,
    next_token: u64,
    training_run: u64,
}

impl WizardState {
    /// Fresh state using `timings`.
    #[must_use]
    pub fn new(timings: WizardTimings) -> Self {
        Self {
            timings,
            ..Self::default()
        }
    }

    /// Whether a step's content preconditions hold.
    #[must_use]
    pub fn can_reach(&self, step: Step) -> bool {
        let has_file = self.uploaded_file.is_some();
        let has_models = !self.selected_models.is_empty();
        match step {
            Step::Upload | Step::Preprocess => has_file,
            Step::Models => has_file && has_models,
            Step::Train => has_models,
            Step::Results => self.results.is_some(),
        }
    }

    /// Display status of `step`.
    #[must_use]
    pub fn step_status(&self, step: Step) -> StepStatus {
        match step.index().cmp(&self.current_step.index()) {
            std::cmp::Ordering::Less => StepStatus::Completed,
            std::cmp::Ordering::Equal => StepStatus::Active,
            std::cmp::Ordering::Greater => StepStatus::Pending,
        }
    }

    /// Token and target of the pending auto-advance.
    #[must_use]
    pub const fn pending_advance(&self) -> Option<(u64, Step)> {
        self.pending_advance
    }

    /// Id of the latest training run (0 before the first).
    #[must_use]
    pub const fn training_run(&self) -> u64 {
        self.training_run
    }

    /// Request the trainer would receive for the current selections.
    #[must_use]
    pub fn training_request(&self) -> TrainingRequest {
        TrainingRequest {
            file: self.uploaded_file.clone(),
            preprocessing: self.preprocessing.options(),
            models: self.selected_models.to_vec(),
            target_column: self.preprocessing.target_column.clone(),
            excluded_columns: self.preprocessing.excluded_columns.iter().cloned().collect(),
        }
    }

    fn require_column(&self, column: &str) -> Result<(), WizardError> {
        let preview = self
            .data_preview
            .as_ref()
            .ok_or_else(|| WizardError::validation("upload a dataset first"))?;
        if preview.has_column(column) {
            Ok(())
        } else {
            Err(WizardError::validation(format!("unknown column: {column}")))
        }
    }

    fn schedule_advance(&mut self, effects: &mut Vec<Effect>, target: Step, delay: Duration) {
        self.cancel_advance(effects);
        let token = self.next_token;
        self.next_token += 1;
        self.pending_advance = Some((token, target));
        effects.push(Effect::ScheduleAdvance {
            token,
            target,
            delay,
        });
    }

    fn cancel_advance(&mut self, effects: &mut Vec<Effect>) {
        if let Some((token, _)) = self.pending_advance.take() {
            effects.push(Effect::CancelAdvance { token });
        }
    }

    fn is_live_run(&self, run: u64) -> bool {
        self.training_in_progress && run == self.training_run
    }
}

/// Inputs to the reducer.
#[derive(Debug, Clone)]
pub enum WizardEvent {
    /// A file was dropped or browsed.
    FileSelected(UploadedFile),
    /// The upload was removed.
    UploadCleared,
    /// A step was picked on the step bar.
    StepSelected(Step),
    /// Target column chosen.
    TargetSelected(String),
    /// Column exclusion flipped.
    ExclusionToggled(String),
    /// A preprocessing knob changed.
    OptionChanged(PreprocessingOption),
    /// Proceed from preprocessing.
    PreprocessProceed,
    /// One model flipped.
    ModelToggled(String),
    /// A phase header flipped.
    PhaseToggled(Phase),
    /// Proceed from model selection.
    ModelsProceed,
    /// Start training the selected models.
    TrainingStarted,
    /// Scheduler tick result.
    TrainingProgressed {
        /// Run the snapshot belongs to.
        run: u64,
        /// Snapshot.
        progress: TrainingProgress,
    },
    /// Run finished with metrics.
    TrainingCompleted {
        /// Run the result belongs to.
        run: u64,
        /// Metrics.
        result: TrainingRunResult,
    },
    /// Trainer failed.
    TrainingFailed {
        /// Run that failed.
        run: u64,
        /// Failure description.
        message: String,
    },
    /// Stop the current run.
    TrainingStopped,
    /// A scheduled advance fired.
    AutoAdvanceElapsed {
        /// Token it was scheduled with.
        token: u64,
    },
    /// Start over.
    Reset,
}

impl WizardEvent {
    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::FileSelected(_) => "file_selected",
            Self::UploadCleared => "upload_cleared",
            Self::StepSelected(_) => "step_selected",
            Self::TargetSelected(_) => "target_selected",
            Self::ExclusionToggled(_) => "exclusion_toggled",
            Self::OptionChanged(_) => "option_changed",
            Self::PreprocessProceed => "preprocess_proceed",
            Self::ModelToggled(_) => "model_toggled",
            Self::PhaseToggled(_) => "phase_toggled",
            Self::ModelsProceed => "models_proceed",
            Self::TrainingStarted => "training_started",
            Self::TrainingProgressed { .. } => "training_progressed",
            Self::TrainingCompleted { .. } => "training_completed",
            Self::TrainingFailed { .. } => "training_failed",
            Self::TrainingStopped => "training_stopped",
            Self::AutoAdvanceElapsed { .. } => "auto_advance_elapsed",
            Self::Reset => "reset",
        }
    }
}

/// Side effects requested by the reducer.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Fire [`WizardEvent::AutoAdvanceElapsed`] after `delay`.
    ScheduleAdvance {
        /// Token to echo back.
        token: u64,
        /// Step to move to.
        target: Step,
        /// Delay before firing.
        delay: Duration,
    },
    /// Drop a scheduled advance.
    CancelAdvance {
        /// Token of the advance.
        token: u64,
    },
    /// Start the progress scheduler and the trainer for a run.
    BeginTraining {
        /// Run id to tag events with.
        run: u64,
        /// Trainer input.
        request: TrainingRequest,
        /// Scheduler period.
        tick: Duration,
        /// Progress increment bound.
        max_increment: f64,
    },
    /// Stop the scheduler of a run.
    HaltTraining {
        /// Run id.
        run: u64,
    },
}

/// Reducer output.
#[derive(Debug, Clone)]
pub struct Transition {
    /// Next state.
    pub state: WizardState,
    /// Effects to execute, in order.
    pub effects: Vec<Effect>,
    /// Why the event was refused, if it was.
    pub rejection: Option<WizardError>,
}

/// Applies one event to `state`.
#[must_use]
pub fn reduce(state: &WizardState, event: WizardEvent) -> Transition {
    let mut next = state.clone();
    let mut effects = Vec::new();
    let outcome = apply(&mut next, &mut effects, event);
    match outcome {
        Ok(()) => Transition {
            state: next,
            effects,
            rejection: None,
        },
        Err(err) => {
            next.last_error = Some(err.user_message());
            Transition {
                state: next,
                effects,
                rejection: Some(err),
            }
        }
    }
}

fn apply(
    state: &mut WizardState,
    effects: &mut Vec<Effect>,
    event: WizardEvent,
) -> Result<(), WizardError> {
    match event {
        WizardEvent::FileSelected(file) => select_file(state, effects, file)?,
        WizardEvent::UploadCleared => {
            state.cancel_advance(effects);
            state.uploaded_file = None;
            state.data_preview = None;
            state.preprocessing.clear_columns();
        }
        WizardEvent::StepSelected(step) => {
            state.cancel_advance(effects);
            state.current_step = step;
        }
        WizardEvent::TargetSelected(column) => {
            state.require_column(&column)?;
            state.preprocessing.set_target(column);
        }
        WizardEvent::ExclusionToggled(column) => {
            state.require_column(&column)?;
            state.preprocessing.toggle_exclude(&column);
        }
        WizardEvent::OptionChanged(option) => state.preprocessing.set_option(option)?,
        WizardEvent::PreprocessProceed => {
            if !state.preprocessing.can_proceed() {
                return Err(WizardError::validation(
                    "select a target column that is not excluded",
                ));
            }
            state.current_step = Step::Models;
            let delay = state.timings.preprocess_advance;
            state.schedule_advance(effects, Step::Models, delay);
        }
        WizardEvent::ModelToggled(id) => {
            if ModelCatalog::lookup(&id).is_none() {
                return Err(WizardError::validation(format!("unknown model: {id}")));
            }
            state.selected_models.toggle(&id);
        }
        WizardEvent::PhaseToggled(phase) => {
            state.selected_models.toggle_phase(phase);
        }
        WizardEvent::ModelsProceed => {
            if state.selected_models.is_empty() {
                return Err(WizardError::validation("select at least one model"));
            }
            state.cancel_advance(effects);
            state.current_step = Step::Train;
        }
        WizardEvent::TrainingStarted => start_training(state, effects)?,
        WizardEvent::TrainingProgressed { run, progress } => {
            if state.is_live_run(run) {
                state.training_progress = Some(progress);
            }
        }
        WizardEvent::TrainingCompleted { run, result } => {
            if state.is_live_run(run) {
                state.training_in_progress = false;
                state.results = Some(result);
                state.cancel_advance(effects);
                state.current_step = Step::Results;
            }
        }
        WizardEvent::TrainingFailed { run, message } => {
            if state.is_live_run(run) {
                state.training_in_progress = false;
                effects.push(Effect::HaltTraining { run });
                state.last_error = Some(message);
            }
        }
        WizardEvent::TrainingStopped => {
            if state.training_in_progress {
                state.training_in_progress = false;
                effects.push(Effect::HaltTraining {
                    run: state.training_run,
                });
            }
        }
        WizardEvent::AutoAdvanceElapsed { token } => {
            if let Some((pending, target)) = state.pending_advance {
                if pending == token {
                    state.pending_advance = None;
                    state.current_step = target;
                }
            }
        }
        WizardEvent::Reset => {
            state.cancel_advance(effects);
            if state.training_in_progress {
                effects.push(Effect::HaltTraining {
                    run: state.training_run,
                });
            }
            *state = WizardState {
                timings: state.timings,
                next_token: state.next_token,
                training_run: state.training_run,
                ..WizardState::default()
            };
        }
    }
    Ok(())
}

fn select_file(
    state: &mut WizardState,
    effects: &mut Vec<Effect>,
    file: UploadedFile,
) -> Result<(), WizardError> {
    match preview_upload(&file) {
        Ok(preview) => {
            state.uploaded_file = Some(file);
            state.data_preview = Some(preview);
            state.preprocessing.clear_columns();
            state.last_error = None;
            let delay = state.timings.upload_advance;
            state.schedule_advance(effects, Step::Preprocess, delay);
            Ok(())
        }
        Err(err @ ParseError::UnsupportedType { .. }) => Err(err.into()),
        Err(err) => {
            state.cancel_advance(effects);
            state.uploaded_file = None;
            state.data_preview = None;
            state.preprocessing.clear_columns();
            Err(err.into())
        }
    }
}

fn start_training(state: &mut WizardState, effects: &mut Vec<Effect>) -> Result<(), WizardError> {
    if state.selected_models.is_empty() {
        return Err(WizardError::validation("select at least one model"));
    }
    if state.training_in_progress {
        return Err(WizardError::validation("training is already in progress"));
    }
    state.cancel_advance(effects);
    state.training_run += 1;
    state.training_in_progress = true;
    state.current_step = Step::Train;
    state.last_error = None;
    let models = state.selected_models.to_vec();
    state.training_progress =
        Some(TrainingSimulation::new(&models, state.timings.max_increment, 0).snapshot());
    effects.push(Effect::BeginTraining {
        run: state.training_run,
        request: state.training_request(),
        tick: state.timings.progress_tick,
        max_increment: state.timings.max_increment,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::engine::{MockTrainingEngine, SeedPolicy};

    fn csv_file() -> UploadedFile {
        let mut text = String::from("A,B\n");
        for idx in 0..6 {
            text.push_str(&format!("{idx},{}\n", idx * 2));
        }
        UploadedFile::new("data.csv", text.into_bytes())
    }

    fn step(state: &WizardState, event: WizardEvent) -> Transition {
        reduce(state, event)
    }

    fn accepted(state: &WizardState, event: WizardEvent) -> WizardState {
        let transition = step(state, event);
        assert!(transition.rejection.is_none(), "{:?}", transition.rejection);
        transition.state
    }

    fn uploaded() -> WizardState {
        accepted(&WizardState::default(), WizardEvent::FileSelected(csv_file()))
    }

    #[test]
    fn upload_schedules_advance_to_preprocess() {
        let transition = step(&WizardState::default(), WizardEvent::FileSelected(csv_file()));
        let state = &transition.state;
        let preview = state.data_preview.as_ref().unwrap();
        assert_eq!(preview.row_count, 6);
        assert_eq!(preview.rows.len(), 5);
        assert_eq!(preview.column_count, 2);
        assert_eq!(state.current_step, Step::Upload);
        let Some(Effect::ScheduleAdvance {
            token,
            target,
            delay,
        }) = transition.effects.first().cloned()
        else {
            panic!("expected scheduled advance");
        };
        assert_eq!(target, Step::Preprocess);
        assert_eq!(delay, Duration::from_millis(1500));
        let advanced = accepted(state, WizardEvent::AutoAdvanceElapsed { token });
        assert_eq!(advanced.current_step, Step::Preprocess);
    }

    #[test]
    fn unsupported_file_leaves_state_untouched() {
        let transition = step(
            &WizardState::default(),
            WizardEvent::FileSelected(UploadedFile::new("data.txt", b"A,B\n1,2".to_vec())),
        );
        assert!(matches!(
            transition.rejection,
            Some(WizardError::Parse(ParseError::UnsupportedType { .. }))
        ));
        assert!(transition.state.uploaded_file.is_none());
        assert!(transition.state.data_preview.is_none());
        assert!(transition.effects.is_empty());
        assert_eq!(
            transition.state.last_error.as_deref(),
            Some("Please upload a CSV or JSON file")
        );
    }

    #[test]
    fn parse_failure_clears_previous_preview() {
        let state = uploaded();
        let transition = step(
            &state,
            WizardEvent::FileSelected(UploadedFile::new("broken.json", b"{oops".to_vec())),
        );
        assert!(transition.rejection.is_some());
        assert!(transition.state.data_preview.is_none());
        assert!(transition.state.uploaded_file.is_none());
        assert!(transition.state.pending_advance().is_none());
    }

    #[test]
    fn navigating_away_makes_pending_advance_stale() {
        let transition = step(&WizardState::default(), WizardEvent::FileSelected(csv_file()));
        let (token, _) = transition.state.pending_advance().unwrap();
        let moved = step(&transition.state, WizardEvent::StepSelected(Step::Results));
        assert!(moved
            .effects
            .contains(&Effect::CancelAdvance { token }));
        let late = accepted(&moved.state, WizardEvent::AutoAdvanceElapsed { token });
        assert_eq!(late.current_step, Step::Results);
    }

    #[test]
    fn preprocess_proceed_is_gated() {
        let state = uploaded();
        let refused = step(&state, WizardEvent::PreprocessProceed);
        assert!(refused.rejection.is_some());
        assert_eq!(refused.state.current_step, Step::Upload);

        let state = accepted(&state, WizardEvent::TargetSelected("A".into()));
        let state = accepted(&state, WizardEvent::ExclusionToggled("A".into()));
        assert!(state.preprocessing.can_proceed());
        let proceed = step(&state, WizardEvent::PreprocessProceed);
        assert!(proceed.rejection.is_none());
        assert_eq!(proceed.state.current_step, Step::Models);
        assert!(proceed.effects.iter().any(|effect| matches!(
            effect,
            Effect::ScheduleAdvance { target: Step::Models, delay, .. }
                if *delay == Duration::from_millis(1000)
        )));
    }

    #[test]
    fn unknown_columns_and_models_are_rejected() {
        let state = uploaded();
        assert!(step(&state, WizardEvent::TargetSelected("Z".into()))
            .rejection
            .is_some());
        let refused = step(&state, WizardEvent::ModelToggled("quantum_forest".into()));
        assert_eq!(refused.rejection.unwrap().kind(), "validation");
        assert!(refused.state.selected_models.is_empty());
    }

    #[test]
    fn phase_toggle_is_all_or_nothing() {
        let mut state = accepted(
            &WizardState::default(),
            WizardEvent::ModelToggled("knn".into()),
        );
        for expected in [true, false, true] {
            state = accepted(&state, WizardEvent::PhaseToggled(Phase::Basic));
            let ids = ModelCatalog::phase_ids(Phase::Basic);
            let selected = ids.iter().filter(|id| state.selected_models.contains(id)).count();
            assert_eq!(selected, if expected { ids.len() } else { 0 });
        }
    }

    #[test]
    fn training_flow_reaches_results() {
        let state = accepted(&uploaded(), WizardEvent::TargetSelected("A".into()));
        let state = accepted(&state, WizardEvent::ModelToggled("decision_tree".into()));
        let state = accepted(&state, WizardEvent::ModelToggled("random_forest".into()));
        let state = accepted(&state, WizardEvent::ModelsProceed);
        assert_eq!(state.current_step, Step::Train);
        assert!(state.can_reach(Step::Train));

        let started = step(&state, WizardEvent::TrainingStarted);
        let Some(Effect::BeginTraining { run, request, .. }) = started
            .effects
            .iter()
            .find(|effect| matches!(effect, Effect::BeginTraining { .. }))
            .cloned()
        else {
            panic!("expected training to begin");
        };
        assert_eq!(request.models, vec!["decision_tree", "random_forest"]);
        assert_eq!(request.target_column.as_deref(), Some("A"));
        assert!(step(&started.state, WizardEvent::TrainingStarted)
            .rejection
            .is_some());

        let result = MockTrainingEngine::new(SeedPolicy::Fixed(0)).run(&request.models);
        let done = accepted(&started.state, WizardEvent::TrainingCompleted { run, result });
        assert_eq!(done.current_step, Step::Results);
        assert!(!done.training_in_progress);
        assert_eq!(done.results.as_ref().unwrap().models.len(), 2);
        assert_eq!(done.step_status(Step::Upload), StepStatus::Completed);
        assert_eq!(done.step_status(Step::Results), StepStatus::Active);
    }

    #[test]
    fn stale_run_events_are_ignored() {
        let state = accepted(&WizardState::default(), WizardEvent::ModelToggled("svm".into()));
        let started = accepted(&state, WizardEvent::TrainingStarted);
        let run = started.training_run();
        let stopped = step(&started, WizardEvent::TrainingStopped);
        assert_eq!(stopped.effects, vec![Effect::HaltTraining { run }]);
        let result = MockTrainingEngine::new(SeedPolicy::Fixed(0)).run(&["svm"]);
        let late = accepted(&stopped.state, WizardEvent::TrainingCompleted { run, result });
        assert!(late.results.is_none());
        assert_eq!(late.current_step, Step::Train);
    }

    #[test]
    fn training_requires_a_selection() {
        let refused = step(&WizardState::default(), WizardEvent::TrainingStarted);
        assert!(refused.rejection.is_some());
        assert!(!refused.state.training_in_progress);
        assert!(refused.effects.is_empty());
    }

    #[test]
    fn reset_keeps_counters_and_cancels_work() {
        let state = accepted(&uploaded(), WizardEvent::ModelToggled("svm".into()));
        let state = accepted(&state, WizardEvent::TrainingStarted);
        let transition = step(&state, WizardEvent::Reset);
        assert!(transition
            .effects
            .contains(&Effect::HaltTraining { run: 1 }));
        let fresh = transition.state;
        assert!(fresh.uploaded_file.is_none());
        assert!(fresh.selected_models.is_empty());
        assert_eq!(fresh.training_run(), 1);
        let again = accepted(&fresh, WizardEvent::ModelToggled("knn".into()));
        let restarted = accepted(&again, WizardEvent::TrainingStarted);
        assert_eq!(restarted.training_run(), 2);
    }

    #[test]
    fn steps_parse_and_label() {
        assert_eq!("models".parse::<Step>().unwrap(), Step::Models);
        assert!("deploy".parse::<Step>().is_err());
        assert_eq!(Step::Models.label(), "Select Models");
        let state = WizardState::default();
        assert!(!state.can_reach(Step::Preprocess));
        assert!(!state.can_reach(Step::Results));
    }
}
