use std::{future::Future, sync::Arc};

use anyhow::{Context, Result};
use shared_logging::JsonLogger;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{
    client::BackendClient,
    config::GatewayConfig,
    routes::{build_router, AppState},
};

/// Installs the fmt subscriber; `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mlpg_gateway=info,tower_http=info".into()),
        )
        .try_init();
}

/// Validates `config` and assembles the handler state.
pub fn app_state(config: &GatewayConfig) -> Result<AppState> {
    config.validate()?;
    let client = BackendClient::new(config)?;
    let mut state = AppState::new(client, config.max_upload_bytes);
    if let Some(path) = &config.log_path {
        let logger = JsonLogger::new(path)
            .with_context(|| format!("opening gateway log {}", path.display()))?;
        state = state.with_logger(Arc::new(logger));
    }
    Ok(state)
}

/// Serves on an already bound listener until `shutdown` resolves.
pub async fn serve_with_shutdown<F>(
    listener: TcpListener,
    config: &GatewayConfig,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(app_state(config)?);
    let addr = listener.local_addr().context("reading listener address")?;
    tracing::info!(
        "mlpg-gateway v{} listening on {addr}, backend {}",
        env!("CARGO_PKG_VERSION"),
        config.backend_url
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("gateway server failed")
}

/// Binds `config.listen_addr` and serves until Ctrl-C.
pub async fn serve(config: GatewayConfig) -> Result<()> {
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    serve_with_shutdown(listener, &config, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for shutdown signal");
        }
    })
    .await
}
