// Jaskier Shared Pattern — metrics handler
// `/metrics` is a plain pass-through to the Prometheus text encoder; no
// per-request allocation beyond what `render()` already does.

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/metrics",
    responses((status = 200, description = "Prometheus text exposition")),
    tag = "metrics",
)]
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let aggregate = state.health.snapshot().await.status;
    state.metrics.health_status.set(aggregate.as_gauge() as i64);

    let body = state.metrics.render();
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}
