use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;

use super::ResultsAnalysis;
use crate::{error::WizardError, training::engine::TrainingRunResult};

/// Title attached to every share.
pub const SHARE_TITLE: &str = "ML Training Results";

/// What gets handed to a share surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SharePayload {
    /// Share title.
    pub title: String,
    /// Summary sentence.
    pub text: String,
    /// Location of the results.
    pub url: String,
}

impl SharePayload {
    /// Builds the summary for `result`; `None` when it has no models.
    #[must_use]
    pub fn for_result(result: &TrainingRunResult, url: impl Into<String>) -> Option<Self> {
        let analysis = ResultsAnalysis::new(result);
        let best = analysis.best()?;
        Some(Self {
            title: SHARE_TITLE.to_string(),
            text: format!(
                "Check out my ML training results! Best model: {} with {:.1}% accuracy.",
                best.name,
                best.accuracy * 100.0
            ),
            url: url.into(),
        })
    }

    /// Text placed on the clipboard: summary, a space, then the url.
    #[must_use]
    pub fn clipboard_text(&self) -> String {
        format!("{} {}", self.text, self.url)
    }
}

/// Platform sharing facility.
#[async_trait]
pub trait ShareSurface: Send + Sync {
    /// Shares the payload.
    async fn share(&self, payload: &SharePayload) -> Result<()>;
}

/// Clipboard facility.
#[async_trait]
pub trait Clipboard: Send + Sync {
    /// Replaces the clipboard content.
    async fn write_text(&self, text: &str) -> Result<()>;
}

/// How the share request was satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareOutcome {
    /// The share surface accepted the payload.
    Shared,
    /// The clipboard now holds this text.
    CopiedToClipboard(String),
}

/// Share surface first, then clipboard, then [`WizardError::ShareUnsupported`].
pub async fn share_results(
    result: &TrainingRunResult,
    url: &str,
    surface: Option<&dyn ShareSurface>,
    clipboard: Option<&dyn Clipboard>,
) -> Result<ShareOutcome, WizardError> {
    let payload = SharePayload::for_result(result, url)
        .ok_or_else(|| WizardError::validation("no trained models to share"))?;
    if let Some(surface) = surface {
        if surface.share(&payload).await.is_ok() {
            return Ok(ShareOutcome::Shared);
        }
    }
    if let Some(clipboard) = clipboard {
        let text = payload.clipboard_text();
        if clipboard.write_text(&text).await.is_ok() {
            return Ok(ShareOutcome::CopiedToClipboard(text));
        }
    }
    Err(WizardError::ShareUnsupported)
}

/// Clipboard backed by a plain file, for headless use.
#[derive(Debug, Clone)]
pub struct FileClipboard {
    path: PathBuf,
}

impl FileClipboard {
    /// Clipboard writing to `path`.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl Clipboard for FileClipboard {
    async fn write_text(&self, text: &str) -> Result<()> {
        tokio::fs::write(&self.path, text)
            .await
            .with_context(|| format!("writing clipboard file {}", self.path.display()))
    }
}
