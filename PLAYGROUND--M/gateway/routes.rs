use std::{collections::HashMap, fmt::Display, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use mlpg_wizard::{training::engine::iso_timestamp, ModelCatalog};
use serde_json::{json, Value};
use shared_logging::{JsonLogger, LogLevel, LogRecord};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::client::{BackendClient, BackendHealth, DatasetUpload, PreprocessForm, TrainForm};

const MODULE: &str = "gateway";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    client: BackendClient,
    logger: Option<Arc<JsonLogger>>,
    max_upload_bytes: usize,
}

impl AppState {
    /// State proxying through `client`.
    #[must_use]
    pub const fn new(client: BackendClient, max_upload_bytes: usize) -> Self {
        Self {
            client,
            logger: None,
            max_upload_bytes,
        }
    }

    /// Also records request outcomes as JSON lines.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<JsonLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    fn record(&self, level: LogLevel, message: &str, metadata: Value) {
        let Some(logger) = &self.logger else {
            return;
        };
        let record = LogRecord::new(MODULE, level, message).with_metadata(metadata);
        if let Err(err) = logger.log(&record) {
            tracing::warn!(error = %err, "failed to write gateway log record");
        }
    }
}

/// Router with every gateway route, tracing and permissive CORS.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let body_limit = state.max_upload_bytes;

    Router::new()
        .route("/health", get(health))
        .route("/models", get(models))
        .route("/train", post(train))
        .route("/preprocess", post(preprocess))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

type JsonReply = (StatusCode, Json<Value>);

fn failure(error: &str, details: impl Display) -> JsonReply {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": error, "details": details.to_string() })),
    )
}

fn no_file() -> JsonReply {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "No file provided" })),
    )
}

async fn health(State(state): State<AppState>) -> JsonReply {
    let timestamp = iso_timestamp(Utc::now());
    match state.client.health().await {
        Ok(BackendHealth::Connected) => (
            StatusCode::OK,
            Json(json!({ "status": "healthy", "backend": "connected", "timestamp": timestamp })),
        ),
        Ok(BackendHealth::Error(status)) => {
            tracing::warn!(status, "backend health check answered with an error");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unhealthy", "backend": "error", "timestamp": timestamp })),
            )
        }
        Err(err) => {
            tracing::warn!(error = %err, "backend health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "backend": "disconnected",
                    "details": err.to_string(),
                    "timestamp": timestamp,
                })),
            )
        }
    }
}

async fn models(State(state): State<AppState>) -> JsonReply {
    match state.client.models().await {
        Ok(models) => (StatusCode::OK, Json(models)),
        Err(err) => {
            tracing::warn!(error = %err, "could not fetch models from backend, using catalog");
            state.record(
                LogLevel::Warn,
                "models served from catalog",
                json!({ "error": err.to_string() }),
            );
            (StatusCode::OK, Json(ModelCatalog::grouped_json()))
        }
    }
}

async fn train(State(state): State<AppState>, multipart: Multipart) -> JsonReply {
    let form = match read_form(multipart).await.and_then(|fields| fields.train_form()) {
        Ok(Some(form)) => form,
        Ok(None) => return no_file(),
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "training request rejected");
            return failure("Training failed", format!("{err:#}"));
        }
    };
    match state.client.submit_training(&form).await {
        Ok(body) => {
            state.record(
                LogLevel::Info,
                "training proxied",
                json!({ "file": form.file.file_name, "models": form.models }),
            );
            (StatusCode::OK, Json(body))
        }
        Err(err) => {
            tracing::error!(error = %err, "training error");
            state.record(
                LogLevel::Error,
                "training failed",
                json!({ "file": form.file.file_name, "error": err.to_string() }),
            );
            failure("Training failed", err)
        }
    }
}

async fn preprocess(State(state): State<AppState>, multipart: Multipart) -> JsonReply {
    let form = match read_form(multipart)
        .await
        .and_then(|fields| fields.preprocess_form())
    {
        Ok(Some(form)) => form,
        Ok(None) => return no_file(),
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "preprocessing request rejected");
            return failure("Preprocessing failed", format!("{err:#}"));
        }
    };
    match state.client.submit_preprocessing(&form).await {
        Ok(body) => {
            state.record(
                LogLevel::Info,
                "preprocessing proxied",
                json!({ "file": form.file.file_name }),
            );
            (StatusCode::OK, Json(body))
        }
        Err(err) => {
            tracing::error!(error = %err, "preprocessing error");
            state.record(
                LogLevel::Error,
                "preprocessing failed",
                json!({ "file": form.file.file_name, "error": err.to_string() }),
            );
            failure("Preprocessing failed", err)
        }
    }
}

#[derive(Debug, Default)]
struct FormFields {
    file: Option<DatasetUpload>,
    text: HashMap<String, String>,
}

async fn read_form(mut multipart: Multipart) -> Result<FormFields> {
    let mut fields = FormFields::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .context("reading multipart body")?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await.context("reading file field")?;
            // Browsers send an empty unnamed part when nothing was chosen.
            if file_name.is_empty() && bytes.is_empty() {
                continue;
            }
            fields.file = Some(DatasetUpload {
                file_name,
                content_type,
                bytes: bytes.to_vec(),
            });
        } else {
            let value = field
                .text()
                .await
                .with_context(|| format!("reading field {name}"))?;
            fields.text.insert(name, value);
        }
    }
    Ok(fields)
}

impl FormFields {
    fn json(&self, name: &str) -> Result<Value> {
        self.text.get(name).map_or(Ok(Value::Null), |raw| {
            serde_json::from_str(raw).with_context(|| format!("field {name} is not valid JSON"))
        })
    }

    fn train_form(self) -> Result<Option<TrainForm>> {
        let preprocessing = self.json("preprocessing")?;
        let models = self.json("models")?;
        let excluded_columns = self.json("excludedColumns")?;
        let target_column = self.text.get("targetColumn").cloned().unwrap_or_default();
        Ok(self.file.map(|file| TrainForm {
            file,
            preprocessing,
            models,
            target_column,
            excluded_columns,
        }))
    }

    fn preprocess_form(self) -> Result<Option<PreprocessForm>> {
        let preprocessing = self.json("preprocessing")?;
        Ok(self.file.map(|file| PreprocessForm {
            file,
            preprocessing,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GatewayConfig, RetryPolicy};
    use std::{
        net::SocketAddr,
        sync::atomic::{AtomicUsize, Ordering},
    };
    use tokio::net::TcpListener;

    async fn spawn(app: Router) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    async fn unused_addr() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    }

    async fn gateway_for(backend: SocketAddr) -> String {
        let config = GatewayConfig {
            backend_url: format!("http://{backend}"),
            request_timeout_ms: 2_000,
            health_timeout_ms: 2_000,
            retry: RetryPolicy {
                max_retries: 2,
                base_delay_ms: 1,
                max_delay_ms: 5,
                multiplier: 2.0,
            },
            ..GatewayConfig::default()
        };
        let state = AppState::new(BackendClient::new(&config).unwrap(), config.max_upload_bytes);
        let addr = spawn(build_router(state)).await;
        format!("http://{addr}")
    }

    fn dataset_part() -> reqwest::multipart::Part {
        reqwest::multipart::Part::bytes(b"age,label\n31,yes\n".to_vec())
            .file_name("people.csv")
            .mime_str("text/csv")
            .unwrap()
    }

    async fn echo_form(mut multipart: Multipart) -> Json<Value> {
        let mut seen = serde_json::Map::new();
        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().unwrap().to_string();
            let file_name = field.file_name().map(str::to_string);
            let value = match file_name {
                Some(file_name) => Value::String(format!("file:{file_name}")),
                None => Value::String(field.text().await.unwrap()),
            };
            seen.insert(name, value);
        }
        Json(Value::Object(seen))
    }

    #[tokio::test]
    async fn health_reports_connected_backend() {
        let backend = spawn(Router::new().route("/health", get(|| async { "ok" }))).await;
        let gateway = gateway_for(backend).await;
        let response = reqwest::get(format!("{gateway}/health")).await.unwrap();
        assert_eq!(response.status().as_u16(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["backend"], "connected");
        assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn health_distinguishes_error_from_disconnected() {
        let failing = spawn(Router::new().route(
            "/health",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "down") }),
        ))
        .await;
        let gateway = gateway_for(failing).await;
        let response = reqwest::get(format!("{gateway}/health")).await.unwrap();
        assert_eq!(response.status().as_u16(), 503);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["backend"], "error");
        assert!(body.get("details").is_none());

        let gateway = gateway_for(unused_addr().await).await;
        let response = reqwest::get(format!("{gateway}/health")).await.unwrap();
        assert_eq!(response.status().as_u16(), 503);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["status"], "unhealthy");
        assert_eq!(body["backend"], "disconnected");
        assert!(body["details"].is_string());
    }

    #[tokio::test]
    async fn models_prefer_backend_then_catalog() {
        let backend = spawn(Router::new().route(
            "/api/models",
            get(|| async { Json(json!({ "phase1": [{ "id": "lstm" }] })) }),
        ))
        .await;
        let gateway = gateway_for(backend).await;
        let body: Value = reqwest::get(format!("{gateway}/models"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["phase1"][0]["id"], "lstm");

        let gateway = gateway_for(unused_addr().await).await;
        let response = reqwest::get(format!("{gateway}/models")).await.unwrap();
        assert_eq!(response.status().as_u16(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body, ModelCatalog::grouped_json());
    }

    #[tokio::test]
    async fn train_without_file_is_bad_request() {
        let gateway = gateway_for(unused_addr().await).await;
        let form = reqwest::multipart::Form::new()
            .text("models", "[\"decision_tree\"]")
            .text("targetColumn", "label");
        let response = reqwest::Client::new()
            .post(format!("{gateway}/train"))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body, json!({ "error": "No file provided" }));
    }

    #[tokio::test]
    async fn train_forwards_snake_case_fields() {
        let backend = spawn(Router::new().route("/api/train", post(echo_form))).await;
        let gateway = gateway_for(backend).await;
        let form = reqwest::multipart::Form::new()
            .part("file", dataset_part())
            .text("preprocessing", r#"{"handleMissing":"mean","trainTestSplit":80}"#)
            .text("models", r#"["decision_tree","random_forest"]"#)
            .text("targetColumn", "label")
            .text("excludedColumns", r#"["age"]"#);
        let response = reqwest::Client::new()
            .post(format!("{gateway}/train"))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["file"], "file:people.csv");
        assert_eq!(body["target_column"], "label");
        assert_eq!(body["excluded_columns"], r#"["age"]"#);
        assert_eq!(body["models"], r#"["decision_tree","random_forest"]"#);
        let preprocessing: Value =
            serde_json::from_str(body["preprocessing"].as_str().unwrap()).unwrap();
        assert_eq!(preprocessing["trainTestSplit"], 80);
        assert!(body.get("targetColumn").is_none());
    }

    #[tokio::test]
    async fn train_retries_then_reports_failure() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let backend = spawn(Router::new().route(
            "/api/train",
            post(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }
            }),
        ))
        .await;
        let gateway = gateway_for(backend).await;
        let form = reqwest::multipart::Form::new()
            .part("file", dataset_part())
            .text("models", "[]");
        let response = reqwest::Client::new()
            .post(format!("{gateway}/train"))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 500);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Training failed");
        assert_eq!(body["details"], "Backend error: Internal Server Error");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn malformed_json_field_fails_training() {
        let gateway = gateway_for(unused_addr().await).await;
        let form = reqwest::multipart::Form::new()
            .part("file", dataset_part())
            .text("models", "not json");
        let response = reqwest::Client::new()
            .post(format!("{gateway}/train"))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 500);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Training failed");
        assert!(body["details"].as_str().unwrap().contains("models"));
    }

    #[tokio::test]
    async fn preprocess_proxies_and_logs() {
        let backend = spawn(Router::new().route("/api/preprocess", post(echo_form))).await;
        let dir = tempfile::tempdir().unwrap();
        let logger = Arc::new(JsonLogger::new(dir.path().join("gateway.jsonl")).unwrap());
        let config = GatewayConfig {
            backend_url: format!("http://{backend}"),
            ..GatewayConfig::default()
        };
        let state = AppState::new(BackendClient::new(&config).unwrap(), config.max_upload_bytes)
            .with_logger(Arc::clone(&logger));
        let gateway = spawn(build_router(state)).await;

        let form = reqwest::multipart::Form::new()
            .part("file", dataset_part())
            .text("preprocessing", r#"{"scaling":"minmax"}"#);
        let response = reqwest::Client::new()
            .post(format!("http://{gateway}/preprocess"))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["file"], "file:people.csv");

        let records = logger.tail(10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "preprocessing proxied");

        let response = reqwest::Client::new()
            .post(format!("http://{gateway}/preprocess"))
            .multipart(reqwest::multipart::Form::new().text("preprocessing", "{}"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);
    }
}
