// Jaskier Shared Pattern — dev-mode job submission
// Only mounted when `DEV_MODE` is set; lets a developer submit a job over
// HTTP and block for the result instead of standing up a queue backend.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::error::{AppError, JobErrorRecord};
use crate::queue::job::JobStatus;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct DevJobResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub results: Option<Value>,
    pub error: Option<JobErrorRecord>,
    pub runtime_ms: u128,
}

#[utoipa::path(
    post,
    path = "/dev/job",
    responses(
        (status = 200, description = "job completed"),
        (status = 422, description = "job failed"),
    ),
    tag = "dev",
)]
pub async fn submit_dev_job(State(state): State<AppState>, Json(payload): Json<Value>) -> impl IntoResponse {
    let Some(dev_queue) = state.dev_queue.clone() else {
        return AppError::ConfigInvalid("/dev/job is disabled outside DEV_MODE".to_string()).into_response();
    };

    let start = tokio::time::Instant::now();
    let job_id = dev_queue.submit(payload).await;

    let job = match dev_queue.wait_for_terminal(&job_id, state.job_timeout()).await {
        Ok(job) => job,
        Err(e) => return e.into_response(),
    };
    let runtime_ms = start.elapsed().as_millis();

    let status_code = if job.status == JobStatus::Completed {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };

    let body = DevJobResponse {
        job_id: job.id,
        status: job.status,
        results: job.result,
        error: job.error,
        runtime_ms,
    };
    (status_code, Json(body)).into_response()
}
