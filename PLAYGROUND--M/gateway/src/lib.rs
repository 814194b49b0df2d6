#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! HTTP gateway in front of the external training backend.

/// Layered gateway configuration.
#[path = "../config.rs"]
pub mod config;

/// reqwest client for the backend with bounded retry.
#[path = "../client.rs"]
pub mod client;

/// axum handlers for `/health`, `/models`, `/train` and `/preprocess`.
#[path = "../routes.rs"]
pub mod routes;

/// Tracing setup and the serve loop.
#[path = "../server.rs"]
pub mod server;

pub use client::{BackendClient, BackendError, BackendHealth, DatasetUpload, PreprocessForm, TrainForm};
pub use config::{ConfigError, ConfigOverrides, GatewayConfig, RetryPolicy};
pub use routes::{build_router, AppState};
pub use server::{app_state, init_tracing, serve, serve_with_shutdown};
