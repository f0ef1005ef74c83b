use std::future::ready;
use std::time::Duration;

use axum::{routing::get, Router};
use envconfig::Envconfig;
use health::HealthRegistry;
use serve_metrics::{serve, setup_metrics_routes};
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

mod config;
mod consumer;
mod error;

use config::Config;
use consumer::IngestionConsumerLoop;

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

pub async fn index() -> &'static str {
    "worker"
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::init_from_env()?;
    setup_tracing(&config.environment, &config.log_level);
    info!("starting worker");

    let readiness = HealthRegistry::new_with_strategy("readiness", config.healthcheck_strategy.clone());
    let store_health = readiness
        .register("store".to_string(), Duration::from_secs(30))
        .await;

    let store = store::EventStore::connect(&config.database_url, config.database_max_connections)
        .await
        .expect("failed to connect to the event store");
    store.migrate().await.expect("failed to run store migrations");
    store.ping().await.expect("store failed startup ping");
    store_health.report_healthy().await;

    let consumer_health = readiness
        .register("kafka_consumer".to_string(), Duration::from_secs(30))
        .await;

    info!(
        topic = config.kafka_topic,
        group_id = config.kafka_group_id,
        batch_size = config.batch_size,
        "configuration loaded"
    );

    let bind = format!("{}:{}", config.bind_host, config.bind_port);
    let health_router = Router::new()
        .route("/", get(index))
        .route("/health/liveness", get(|| ready("ok")))
        .route(
            "/health/readiness",
            get(move || {
                let readiness = readiness.clone();
                async move { readiness.get_status() }
            }),
        );
    let health_router = setup_metrics_routes(health_router);

    tokio::spawn(async move {
        serve(health_router, &bind)
            .await
            .expect("failed to start health server");
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = term.recv() => {},
            _ = tokio::signal::ctrl_c() => {},
        };
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let consumer_loop = IngestionConsumerLoop::new(&config, store, consumer_health)?;
    consumer_loop.run(shutdown_rx).await?;

    info!("worker shut down");
    Ok(())
}
