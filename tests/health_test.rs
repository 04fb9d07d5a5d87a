// Jaskier Shared Pattern — HTTP integration test
// Exercises the router exactly as axum would serve it.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use tokio_util::sync::CancellationToken;

use forge_worker::actions::{builtin::register_builtin_actions, ActionRegistry};
use forge_worker::config::Config;
use forge_worker::health::HealthRegistry;
use forge_worker::metrics::MetricsCollector;
use forge_worker::queue::memory::MemoryQueue;
use forge_worker::queue::Queue;
use forge_worker::services::ServiceContainer;
use forge_worker::state::AppState;
use forge_worker::worker::{Worker, WorkerConfig};

struct TestApp {
    router: axum::Router,
    shutdown: CancellationToken,
    worker_handle: tokio::task::JoinHandle<()>,
}

impl TestApp {
    async fn stop(self) {
        self.shutdown.cancel();
        let _ = self.worker_handle.await;
    }
}

async fn test_app() -> TestApp {
    let actions = Arc::new(ActionRegistry::new());
    register_builtin_actions(&actions).await.unwrap();
    let queue = Arc::new(MemoryQueue::new());
    let health = Arc::new(HealthRegistry::new());
    let metrics = Arc::new(MetricsCollector::new());
    let container = Arc::new(ServiceContainer::new());

    let worker = Worker::new(
        queue.clone() as Arc<dyn Queue>,
        actions.clone(),
        container.clone(),
        health.clone(),
        metrics.clone(),
        WorkerConfig {
            worker_id: "test-worker".to_string(),
            poll_interval: Duration::from_millis(10),
            max_concurrent_jobs: 5,
            job_timeout: Duration::from_secs(2),
            shutdown_timeout: Duration::from_millis(200),
        },
    );
    let shutdown = CancellationToken::new();
    let worker_handle = tokio::spawn(worker.run(shutdown.clone()));

    let state = AppState {
        config: Arc::new(Config::for_test()),
        health,
        metrics,
        actions,
        container,
        queue: queue.clone() as Arc<dyn Queue>,
        dev_queue: Some(queue),
    };
    let router = forge_worker::create_router(state);

    TestApp { router, shutdown, worker_handle }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_endpoint_returns_ok_when_no_checks_registered() {
    let app = test_app().await;
    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "GREEN");
    app.stop().await;
}

#[tokio::test]
async fn metrics_endpoint_returns_prometheus_text() {
    let app = test_app().await;
    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/plain; version=0.0.4"
    );

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("jobs_processed_total"));
    // Aggregate health is GREEN with no checks registered; the gauge must
    // reflect that rather than sitting at its zero-initialized default.
    assert!(text.contains("health_status 2"));
    app.stop().await;
}

#[tokio::test]
async fn dev_job_happy_path_completes_synchronously() {
    let app = test_app().await;
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/dev/job")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"action":"greet","name":"World"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "completed");
    assert_eq!(body["results"]["message"], "Hello, World!");
    app.stop().await;
}

#[tokio::test]
async fn dev_job_validation_failure_returns_422() {
    let app = test_app().await;
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/dev/job")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"action":"greet"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    app.stop().await;
}
