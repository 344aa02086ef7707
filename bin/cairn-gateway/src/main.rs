//! Cairn Gateway - S3 API Gateway
//!
//! This binary serves the S3-compatible HTTP API over the configured
//! metadata engine and data backends.

use anyhow::Result;
use cairn_common::Config;
use cairn_common::config::LogFormat;
use cairn_gateway::{build_app_state, build_authenticator, build_router};
use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormatArg {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "cairn-gateway")]
#[command(about = "Cairn S3 API Gateway")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "CAIRN_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address for the S3 API (overrides server.listen)
    #[arg(short, long)]
    listen: Option<String>,

    /// Log level (overrides log.level)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (overrides log.format)
    #[arg(long, value_enum)]
    log_format: Option<LogFormatArg>,
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log.level.clone()));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log.format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Text => registry.with(fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {e}"))?;
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    if let Some(level) = args.log_level {
        config.log.level = level;
    }
    if let Some(format) = args.log_format {
        config.log.format = match format {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        };
    }

    init_logging(&config);
    info!("Starting Cairn Gateway");
    if let Some(path) = &args.config {
        info!("Configuration file: {}", path.display());
    }
    info!(
        "Metadata: {} (owner: {})",
        config.metadata.path.display(),
        config.metadata.owner
    );

    let authenticator = build_authenticator(&config.auth)?;
    let state = build_app_state(&config, authenticator).await?;
    let app = build_router(state);

    let addr: SocketAddr = config
        .server
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address {}: {}", config.server.listen, e))?;

    info!("Starting S3 API server on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
    })
    .await?;

    info!("Gateway shut down gracefully");

    Ok(())
}
