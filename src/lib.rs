// Jaskier Shared Pattern — library root
// Module tree plus router assembly. `main.rs` is orchestration only; this
// crate is usable as a library for anything that wants to embed the engine.

pub mod actions;
pub mod config;
pub mod error;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod queue;
pub mod registry;
pub mod resilience;
pub mod rest_client;
pub mod services;
pub mod state;
pub mod worker;

use axum::routing::{get, post};
use axum::Router;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::GovernorLayer;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(handlers::health::health, handlers::metrics::metrics, handlers::dev::submit_dev_job),
    tags((name = "health"), (name = "metrics"), (name = "dev")),
)]
struct ApiDoc;

/// Builds the full HTTP router. `/dev/job` is only mounted when the state
/// carries a dev queue (i.e. `DEV_MODE=true`).
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/metrics", get(handlers::metrics::metrics));

    if state.dev_queue.is_some() {
        router = router.route("/dev/job", post(handlers::dev::submit_dev_job));
    }

    // Leaked once per process: tower_governor wants a `&'static GovernorConfig`.
    let governor_conf = Box::leak(Box::new(
        GovernorConfigBuilder::default()
            .per_second(2)
            .burst_size(10)
            .finish()
            .expect("static rate-limit config is always valid"),
    ));

    router
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(GovernorLayer { config: governor_conf })
        .layer(
            SetResponseHeaderLayer::if_not_present(
                axum::http::header::HeaderName::from_static("x-content-type-options"),
                axum::http::HeaderValue::from_static("nosniff"),
            ),
        )
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
