use std::future::ready;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use health::HealthRegistry;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handler::{self, AppState};

const BATCH_BODY_SIZE: usize = 20 * 1024 * 1024;

pub fn router(state: AppState, readiness: HealthRegistry) -> Router {
    let ingest_router = Router::new()
        .route("/events", post(handler::ingest_events))
        .layer(DefaultBodyLimit::max(BATCH_BODY_SIZE));

    let analytics_router = Router::new()
        .route("/events/count", get(handler::event_count))
        .route("/stats/dau", get(handler::dau))
        .route("/stats/top-events", get(handler::top_events))
        .route("/stats/retention", get(handler::retention));

    let health_router = Router::new()
        .route("/health/liveness", get(|| ready("ok")))
        .route(
            "/health/readiness",
            get({
                let readiness = readiness.clone();
                move || {
                    let readiness = readiness.clone();
                    async move { readiness.get_status() }
                }
            }),
        )
        .route(
            "/health",
            get(move || {
                let readiness = readiness.clone();
                async move { readiness.get_status() }
            }),
        );

    let router = Router::new()
        .merge(ingest_router)
        .merge(analytics_router)
        .merge(health_router)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    serve_metrics::setup_metrics_routes(router)
}
