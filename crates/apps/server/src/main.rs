use clap::Parser;
use photomesh::ServiceContext;
use photomesh_server::{
    create_router, spawn_model_loader, start_metrics_reporter, AppState, ServerConfig,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// photomesh HTTP server
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Address to bind (overrides PHOTOMESH_BIND)
    #[arg(long)]
    bind: Option<String>,

    /// Compute device: cpu, cuda or cuda:N (overrides PHOTOMESH_DEVICE)
    #[arg(long)]
    device: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = ServerConfig::from_env()?;
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(device) = args.device {
        config.device = device;
    }

    let context = Arc::new(ServiceContext::new(config.pipeline.clone()));
    spawn_model_loader(context.clone(), config.device.clone());

    let state = AppState::new(context, config.queue_capacity);
    if let Some(period) = config.metrics_interval {
        tokio::spawn(start_metrics_reporter(state.metrics.clone(), period));
    }

    let app = create_router(state, config.body_limit());
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!("photomesh server listening on {}", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
}
