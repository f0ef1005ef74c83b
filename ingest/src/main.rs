use envconfig::Envconfig;
use tokio::net::TcpListener;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use ingest::config::Config;
use ingest::server;

common_alloc::used!();

fn setup_tracing(environment: &str, log_level: &str) {
    let default_level: LevelFilter = log_level.parse().unwrap_or(LevelFilter::INFO);
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy()
        .add_directive("rdkafka=warn".parse().unwrap());

    if environment == "dev" || environment == "test" {
        let layer = tracing_subscriber::fmt::layer().with_filter(filter);
        tracing_subscriber::registry().with(layer).init();
    } else {
        let layer = tracing_subscriber::fmt::layer().json().with_filter(filter);
        tracing_subscriber::registry().with(layer).init();
    }
}

async fn shutdown_signal() {
    let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");
    tokio::select! {
        _ = term.recv() => {},
        _ = tokio::signal::ctrl_c() => {},
    };
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::init_from_env()?;
    setup_tracing(&config.environment, &config.log_level);
    info!("starting ingest");

    let bind = format!("{}:{}", config.bind_host, config.bind_port);
    let listener = TcpListener::bind(&bind).await?;

    server::serve(config, listener, shutdown_signal()).await;

    info!("ingest shut down");
    Ok(())
}
