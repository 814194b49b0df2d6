use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, TimeZone};

use super::ResultsAnalysis;
use crate::training::engine::TrainingRunResult;

const LOCAL_DATETIME: &str = "%-m/%-d/%Y, %-I:%M:%S %p";

/// Pretty-printed JSON of the raw run.
pub fn export_json(result: &TrainingRunResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("serializing training results")
}

/// `ml-training-results-<date>.json`.
#[must_use]
pub fn results_file_name(date: NaiveDate) -> String {
    format!("ml-training-results-{}.json", date.format("%Y-%m-%d"))
}

/// `ml-training-report-<date>.txt`.
#[must_use]
pub fn report_file_name(date: NaiveDate) -> String {
    format!("ml-training-report-{}.txt", date.format("%Y-%m-%d"))
}

fn pct(value: f64) -> String {
    format!("{:.2}", value * 100.0)
}

/// Plain-text report. Datetimes render in `generated_at`'s zone; `None` when
/// the run has no models.
#[must_use]
pub fn render_report<Tz>(result: &TrainingRunResult, generated_at: &DateTime<Tz>) -> Option<String>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let analysis = ResultsAnalysis::new(result);
    let best = analysis.best()?;
    let count = result.models.len();
    let completed = result.completed_at().map_or_else(
        || "Invalid Date".to_string(),
        |at| {
            at.with_timezone(&generated_at.timezone())
                .format(LOCAL_DATETIME)
                .to_string()
        },
    );
    let all_models = result
        .models
        .iter()
        .enumerate()
        .map(|(idx, model)| format!("{}. {}: {}% accuracy", idx + 1, model.name, pct(model.accuracy)))
        .collect::<Vec<_>>()
        .join("\n");

    let mut out = String::from("\nML Training Report\n==================\n\n");
    let _ = writeln!(out, "Generated on: {}", generated_at.format(LOCAL_DATETIME));
    let _ = writeln!(out, "Models Trained: {count}");
    out.push_str("\nBest Performing Model:\n");
    let _ = writeln!(out, "- Name: {}", best.name);
    let _ = writeln!(out, "- Accuracy: {}%", pct(best.accuracy));
    let _ = writeln!(out, "- Precision: {}%", pct(best.precision));
    let _ = writeln!(out, "- Recall: {}%", pct(best.recall));
    let _ = writeln!(out, "- F1 Score: {}%", pct(best.f1_score));
    out.push_str("\nAll Models Performance:\n");
    out.push_str(&all_models);
    out.push_str("\n\nTraining Summary:\n");
    let _ = writeln!(out, "- Total models: {count}");
    let _ = writeln!(out, "- Training completed: {completed}");
    let _ = writeln!(out, "- Best accuracy: {}%", pct(best.accuracy));
    out.push_str("    ");
    Some(out)
}

/// Files written by [`write_exports`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFiles {
    /// JSON results path.
    pub results: PathBuf,
    /// Text report path, absent for an empty run.
    pub report: Option<PathBuf>,
}

/// Writes the JSON export and text report into `dir`.
pub fn write_exports<Tz>(
    dir: &Path,
    result: &TrainingRunResult,
    now: &DateTime<Tz>,
) -> Result<ExportedFiles>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    fs::create_dir_all(dir).with_context(|| format!("creating export dir {}", dir.display()))?;
    let date = now.naive_utc().date();
    let results = dir.join(results_file_name(date));
    fs::write(&results, export_json(result)?)
        .with_context(|| format!("writing {}", results.display()))?;
    let report = match render_report(result, now) {
        Some(text) => {
            let path = dir.join(report_file_name(date));
            fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
            Some(path)
        }
        None => None,
    };
    Ok(ExportedFiles { results, report })
}
