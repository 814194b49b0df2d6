use std::{net::SocketAddr, path::PathBuf};

use anyhow::Result;
use clap::Parser;
use mlpg_gateway::{init_tracing, serve, ConfigOverrides, GatewayConfig};

#[derive(Parser, Debug)]
#[command(name = "mlpg-gateway", version, about = "ML playground HTTP gateway")]
struct Cli {
    /// TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Address to bind, e.g. 127.0.0.1:3000.
    #[arg(long)]
    listen: Option<SocketAddr>,
    /// Training backend base URL.
    #[arg(long)]
    backend_url: Option<String>,
    /// JSON-lines request log.
    #[arg(long)]
    log_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = GatewayConfig::load(cli.config.as_deref())?.with_overrides(ConfigOverrides {
        listen_addr: cli.listen,
        backend_url: cli.backend_url,
        log_path: cli.log_path,
    });
    config.validate()?;
    serve(config).await
}
