use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::connect_info::IntoMakeServiceWithConnectInfo;
use axum::Router;
use health::HealthRegistry;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::Config;
use crate::dedup::RedisDedupCache;
use crate::handler::AppState;
use crate::queue::KafkaQueuePublisher;
use crate::rate_limit::RedisRateLimiter;
use crate::router;
use crate::time::SystemTime;
use common_redis::RedisClient;
use store::{AnalyticsEngine, EventStore};

/// Connects to every external dependency, wires the router, and returns a
/// make-service ready to hand to `axum::serve`. Startup failures are fatal:
/// there is no degraded-mode operation for a missing store or cache.
pub async fn build(config: Config) -> IntoMakeServiceWithConnectInfo<Router, SocketAddr> {
    let readiness = HealthRegistry::new_with_strategy("readiness", config.healthcheck_strategy.clone());

    let store_health = readiness
        .register("store".to_string(), Duration::from_secs(30))
        .await;
    let store = EventStore::connect(&config.database_url, config.database_max_connections)
        .await
        .expect("failed to connect to the event store");
    store.migrate().await.expect("failed to run store migrations");
    store.ping().await.expect("store failed startup ping");
    store_health.report_healthy().await;

    let redis_health = readiness
        .register("redis".to_string(), Duration::from_secs(30))
        .await;
    let redis = Arc::new(
        RedisClient::new(config.redis_url.clone())
            .await
            .expect("failed to connect to redis"),
    );
    redis_health.report_healthy().await;

    let kafka_health = readiness
        .register("kafka_producer".to_string(), Duration::from_secs(30))
        .await;
    let queue = KafkaQueuePublisher::new(&config.kafka.kafka_hosts, config.kafka_topic.clone(), kafka_health)
        .await
        .expect("failed to start kafka producer");

    info!(topic = config.kafka_topic, "configuration loaded");

    let analytics = AnalyticsEngine::new(store.pool().clone());

    let state = AppState {
        dedup: Arc::new(RedisDedupCache::new(redis.clone(), config.dedup_ttl_seconds)),
        rate_limiter: Arc::new(RedisRateLimiter::new(
            redis,
            config.rate_limit_enabled,
            config.rate_limit_max_requests,
            config.rate_limit_window_seconds,
        )),
        queue: Arc::new(queue),
        store: Arc::new(store),
        analytics: Arc::new(analytics),
        time_source: Arc::new(SystemTime),
    };

    let app = router::router(state, readiness);
    app.into_make_service_with_connect_info::<SocketAddr>()
}

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let app = build(config).await;
    info!(addr = ?listener.local_addr().unwrap(), "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .expect("server error");
}
