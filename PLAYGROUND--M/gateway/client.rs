use std::time::Duration;

use async_trait::async_trait;
use mlpg_wizard::{
    FileKind, TrainingBackend, TrainingRequest, TrainingRunResult, UploadedFile, WizardError,
};
use reqwest::{
    multipart::{Form, Part},
    Client, StatusCode,
};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::time::sleep;

use crate::config::{GatewayConfig, RetryPolicy};

/// Failures talking to the training backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The HTTP client itself could not be built.
    #[error("building backend client: {0}")]
    Client(#[source] reqwest::Error),
    /// A multipart form could not be assembled.
    #[error("building request: {0}")]
    Request(#[source] reqwest::Error),
    /// Connection refused, timed out or otherwise never answered.
    #[error("{source}")]
    Transport {
        /// Endpoint that failed.
        url: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },
    /// The backend answered with a non-success status.
    #[error("Backend error: {reason}")]
    Status {
        /// Endpoint that answered.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Canonical reason phrase.
        reason: String,
    },
    /// The backend answered 2xx with a body that is not JSON.
    #[error("backend response from {url} was not JSON: {source}")]
    Decode {
        /// Endpoint that answered.
        url: String,
        /// Underlying decode error.
        #[source]
        source: reqwest::Error,
    },
}

impl BackendError {
    /// Transport failures and 5xx answers are worth another attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether the backend should be treated as absent rather than as refusing.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        !matches!(self, Self::Status { status, .. } if *status < 500)
    }

    fn status(url: &str, status: StatusCode) -> Self {
        Self::Status {
            url: url.to_string(),
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
        }
    }
}

impl From<BackendError> for WizardError {
    fn from(err: BackendError) -> Self {
        if err.is_unavailable() {
            Self::BackendUnavailable(err.to_string())
        } else {
            Self::Validation(err.to_string())
        }
    }
}

/// Outcome of a health check that reached the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendHealth {
    /// 2xx from `/health`.
    Connected,
    /// Any other status.
    Error(u16),
}

/// Uploaded file carried through a multipart form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetUpload {
    /// Client supplied file name.
    pub file_name: String,
    /// Client supplied content type.
    pub content_type: Option<String>,
    /// Full content.
    pub bytes: Vec<u8>,
}

impl DatasetUpload {
    /// Wraps a wizard upload, guessing the content type from its extension.
    #[must_use]
    pub fn from_upload(file: &UploadedFile) -> Self {
        let content_type = FileKind::from_file_name(file.name()).ok().map(|kind| match kind {
            FileKind::Csv => "text/csv".to_string(),
            FileKind::Json => "application/json".to_string(),
        });
        Self {
            file_name: file.name().to_string(),
            content_type,
            bytes: file.bytes().to_vec(),
        }
    }

    fn part(&self) -> Result<Part, BackendError> {
        let part = Part::bytes(self.bytes.clone()).file_name(self.file_name.clone());
        match &self.content_type {
            Some(mime) => part.mime_str(mime).map_err(BackendError::Request),
            None => Ok(part),
        }
    }
}

/// Fields forwarded to the backend's `/api/train`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainForm {
    /// Dataset.
    pub file: DatasetUpload,
    /// Preprocessing knobs as JSON.
    pub preprocessing: Value,
    /// Selected model ids as JSON.
    pub models: Value,
    /// Column to predict; empty when unset.
    pub target_column: String,
    /// Excluded columns as JSON.
    pub excluded_columns: Value,
}

impl TrainForm {
    /// Form for a wizard training request; `None` without a dataset.
    #[must_use]
    pub fn from_request(request: &TrainingRequest) -> Option<Self> {
        let file = request.file.as_ref()?;
        Some(Self {
            file: DatasetUpload::from_upload(file),
            preprocessing: json!(request.preprocessing),
            models: json!(request.models),
            target_column: request.target_column.clone().unwrap_or_default(),
            excluded_columns: json!(request.excluded_columns),
        })
    }

    fn to_multipart(&self) -> Result<Form, BackendError> {
        Ok(Form::new()
            .part("file", self.file.part()?)
            .text("preprocessing", self.preprocessing.to_string())
            .text("models", self.models.to_string())
            .text("target_column", self.target_column.clone())
            .text("excluded_columns", self.excluded_columns.to_string()))
    }
}

/// Fields forwarded to the backend's `/api/preprocess`.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessForm {
    /// Dataset.
    pub file: DatasetUpload,
    /// Preprocessing knobs as JSON.
    pub preprocessing: Value,
}

impl PreprocessForm {
    fn to_multipart(&self) -> Result<Form, BackendError> {
        Ok(Form::new()
            .part("file", self.file.part()?)
            .text("preprocessing", self.preprocessing.to_string()))
    }
}

/// HTTP client for the training backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: Client,
    base_url: String,
    health_timeout: Duration,
    retry: RetryPolicy,
}

impl BackendClient {
    /// Client honouring the config's timeouts and retry policy.
    pub fn new(config: &GatewayConfig) -> Result<Self, BackendError> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(BackendError::Client)?;
        Ok(Self {
            http,
            base_url: config.backend_endpoint(""),
            health_timeout: config.health_timeout(),
            retry: config.retry,
        })
    }

    /// Base URL, with a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Single request to `/health`.
    pub async fn health(&self) -> Result<BackendHealth, BackendError> {
        let url = self.endpoint("/health");
        let response = self
            .http
            .get(&url)
            .timeout(self.health_timeout)
            .send()
            .await
            .map_err(|source| BackendError::Transport { url, source })?;
        let status = response.status();
        if status.is_success() {
            Ok(BackendHealth::Connected)
        } else {
            Ok(BackendHealth::Error(status.as_u16()))
        }
    }

    /// Single fetch of `/api/models`.
    pub async fn models(&self) -> Result<Value, BackendError> {
        let url = self.endpoint("/api/models");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| BackendError::Transport {
                url: url.clone(),
                source,
            })?;
        Self::json_body(&url, response).await
    }

    /// Posts to `/api/train`, retrying transport failures and 5xx answers.
    pub async fn submit_training(&self, form: &TrainForm) -> Result<Value, BackendError> {
        self.post_with_retry("/api/train", || form.to_multipart()).await
    }

    /// Posts to `/api/preprocess`, retrying transport failures and 5xx answers.
    pub async fn submit_preprocessing(&self, form: &PreprocessForm) -> Result<Value, BackendError> {
        self.post_with_retry("/api/preprocess", || form.to_multipart()).await
    }

    async fn post_with_retry<F>(&self, path: &str, build: F) -> Result<Value, BackendError>
    where
        F: Fn() -> Result<Form, BackendError> + Send + Sync,
    {
        let url = self.endpoint(path);
        let mut attempt = 0;
        loop {
            match self.post_once(&url, build()?).await {
                Err(err) if err.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(%url, attempt, ?delay, error = %err, "backend call failed, retrying");
                    sleep(delay).await;
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    async fn post_once(&self, url: &str, form: Form) -> Result<Value, BackendError> {
        let response = self
            .http
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|source| BackendError::Transport {
                url: url.to_string(),
                source,
            })?;
        Self::json_body(url, response).await
    }

    async fn json_body(url: &str, response: reqwest::Response) -> Result<Value, BackendError> {
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::status(url, status));
        }
        response.json().await.map_err(|source| BackendError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

#[async_trait]
impl TrainingBackend for BackendClient {
    fn name(&self) -> &str {
        "backend"
    }

    async fn train(&self, request: &TrainingRequest) -> Result<TrainingRunResult, WizardError> {
        let form = TrainForm::from_request(request)
            .ok_or_else(|| WizardError::validation("no dataset uploaded"))?;
        let body = self.submit_training(&form).await?;
        serde_json::from_value(body).map_err(|err| {
            WizardError::BackendUnavailable(format!("unexpected training response: {err}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_errors_split_by_class() {
        let server = BackendError::status("http://b/api/train", StatusCode::INTERNAL_SERVER_ERROR);
        assert!(server.is_retryable());
        assert!(server.is_unavailable());
        assert_eq!(server.to_string(), "Backend error: Internal Server Error");

        let client = BackendError::status("http://b/api/train", StatusCode::UNPROCESSABLE_ENTITY);
        assert!(!client.is_retryable());
        assert!(matches!(WizardError::from(client), WizardError::Validation(_)));
    }

    #[test]
    fn train_form_needs_a_dataset() {
        let mut request = TrainingRequest::for_models(&["decision_tree"]);
        assert!(TrainForm::from_request(&request).is_none());

        request.file = Some(UploadedFile::new("data.csv", b"a,b\n1,2\n".to_vec()));
        request.target_column = Some("b".into());
        request.excluded_columns = vec!["a".into()];
        let form = TrainForm::from_request(&request).unwrap();
        assert_eq!(form.file.content_type.as_deref(), Some("text/csv"));
        assert_eq!(form.models, json!(["decision_tree"]));
        assert_eq!(form.excluded_columns, json!(["a"]));
        assert_eq!(form.preprocessing["trainTestSplit"], 80);
    }

    #[test]
    fn endpoints_join_cleanly() {
        let config = GatewayConfig {
            backend_url: "http://backend:8000/".into(),
            ..GatewayConfig::default()
        };
        let client = BackendClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "http://backend:8000/");
        assert_eq!(client.endpoint("/api/models"), "http://backend:8000/api/models");
    }
}
