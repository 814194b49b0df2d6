use thiserror::Error;

/// Reasons an upload cannot be turned into a preview.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// File name does not end in `.csv` or `.json`.
    #[error("unsupported file type: {file_name}")]
    UnsupportedType {
        /// Name of the rejected file.
        file_name: String,
    },
    /// Upload bytes are not UTF-8 text.
    #[error("file is not valid UTF-8 text")]
    NotText,
    /// JSON payload failed to parse.
    #[error("invalid json: {0}")]
    InvalidJson(String),
    /// A JSON row was not an object.
    #[error("json row {index} is not an object")]
    NotARecord {
        /// Position of the offending row.
        index: usize,
    },
    /// CSV content has no non-empty lines.
    #[error("csv file is empty")]
    EmptyCsv,
}

impl ParseError {
    /// Inline message shown next to the upload control.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::UnsupportedType { .. } => "Please upload a CSV or JSON file",
            _ => "Failed to parse file. Please ensure it's valid CSV or JSON.",
        }
    }

    /// Unsupported types are rejected before any parsing happens.
    #[must_use]
    pub const fn is_rejected_upfront(&self) -> bool {
        matches!(self, Self::UnsupportedType { .. })
    }
}

/// Error taxonomy surfaced by wizard operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WizardError {
    /// Malformed or unsupported upload.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    /// A transition precondition was not met.
    #[error("validation error: {0}")]
    Validation(String),
    /// Backend health/proxy call failed.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    /// Neither a share surface nor a clipboard could take the payload.
    #[error("unable to share results: no share or clipboard facility available")]
    ShareUnsupported,
}

impl WizardError {
    /// Convenience constructor for validation failures.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Short machine-readable category.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Parse(_) => "parse",
            Self::Validation(_) => "validation",
            Self::BackendUnavailable(_) => "backend_unavailable",
            Self::ShareUnsupported => "share_unsupported",
        }
    }

    /// Message suitable for inline display.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Parse(err) => err.user_message().to_string(),
            Self::Validation(message) | Self::BackendUnavailable(message) => message.clone(),
            Self::ShareUnsupported => {
                "Unable to share results. Please copy the URL manually.".to_string()
            }
        }
    }
}
