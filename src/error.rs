// Jaskier Shared Pattern — error
// Central error taxonomy. Every job-visible and HTTP-visible failure in the
// engine funnels through `AppError` so logs, job error records, and HTTP
// responses all agree on the same wire codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("payload missing or malformed 'action' field")]
    InvalidPayload,

    #[error("no action registered with name '{0}'")]
    UnknownAction(String),

    #[error("payload failed schema validation: {0}")]
    ValidationError(String),

    #[error("service '{0}' required by action is not registered")]
    DependencyUnresolved(String),

    #[error("action '{0}' is already registered")]
    DuplicateAction(String),

    #[error("service dependency graph has a cycle: {0}")]
    DependencyCycle(String),

    #[error("handler failed: {0}")]
    HandlerError(String),

    #[error("job exceeded its timeout")]
    JobTimeout,

    #[error("job was interrupted by shutdown")]
    ShutdownInterrupted,

    #[error("circuit is open for target '{0}'")]
    CircuitOpen(String),

    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("upstream returned a 5xx status: {0}")]
    Upstream5xx(u16),

    #[error("upstream returned a 4xx status: {0}")]
    Upstream4xx(u16),

    #[error("upstream request timed out")]
    UpstreamTimeout,

    #[error("upstream connection failed: {0}")]
    UpstreamConnect(String),

    #[error("queue backend unavailable: {0}")]
    QueueUnavailable(String),

    #[error("terminal transition attempted on non-existent or already-terminal job '{0}'")]
    QueueConsistency(String),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("health check '{0}' is not registered")]
    UnknownHealthCheck(String),
}

impl AppError {
    /// The stable wire code persisted in job error records and logs.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidPayload => "INVALID_PAYLOAD",
            AppError::UnknownAction(_) => "UNKNOWN_ACTION",
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::DependencyUnresolved(_) => "DEPENDENCY_UNRESOLVED",
            AppError::DuplicateAction(_) => "DUPLICATE_ACTION",
            AppError::DependencyCycle(_) => "DEPENDENCY_CYCLE",
            AppError::HandlerError(_) => "HANDLER_ERROR",
            AppError::JobTimeout => "JOB_TIMEOUT",
            AppError::ShutdownInterrupted => "SHUTDOWN_INTERRUPTED",
            AppError::CircuitOpen(_) => "CIRCUIT_OPEN",
            AppError::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            AppError::Upstream5xx(_) => "UPSTREAM_5XX",
            AppError::Upstream4xx(_) => "UPSTREAM_4XX",
            AppError::UpstreamTimeout => "UPSTREAM_TIMEOUT",
            AppError::UpstreamConnect(_) => "UPSTREAM_CONNECT",
            AppError::QueueUnavailable(_) => "QUEUE_UNAVAILABLE",
            AppError::QueueConsistency(_) => "QUEUE_CONSISTENCY",
            AppError::ConfigInvalid(_) => "CONFIG_INVALID",
            AppError::UnknownHealthCheck(_) => "UNKNOWN_HEALTH_CHECK",
        }
    }

    /// `{error_code, error_message}` pair stored on a job's terminal record.
    pub fn as_job_error(&self) -> JobErrorRecord {
        JobErrorRecord {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::CircuitOpen(_) | AppError::QueueUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            AppError::UnknownAction(_) | AppError::UnknownHealthCheck(_) => StatusCode::NOT_FOUND,
            AppError::InvalidPayload
            | AppError::ValidationError(_)
            | AppError::DuplicateAction(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::DependencyUnresolved(_)
            | AppError::HandlerError(_)
            | AppError::JobTimeout
            | AppError::ShutdownInterrupted => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Upstream5xx(_) | AppError::UpstreamTimeout | AppError::UpstreamConnect(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Upstream4xx(_) => StatusCode::BAD_GATEWAY,
            AppError::QueueConsistency(_) | AppError::DependencyCycle(_) | AppError::ConfigInvalid(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobErrorRecord {
    pub code: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({
            "error_code": self.code(),
            "error_message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
