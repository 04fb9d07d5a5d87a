// Jaskier Shared Pattern — health handler
// Thin HTTP adapter over `HealthRegistry::snapshot` — all the aggregation
// logic lives in the registry itself.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::health::Status;
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "aggregate health is GREEN or YELLOW"),
        (status = 503, description = "aggregate health is RED"),
    ),
    tag = "health",
)]
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.health.snapshot().await;
    let status_code = if snapshot.status == Status::Red {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status_code, Json(snapshot))
}
