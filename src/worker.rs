// Jaskier Shared Pattern — worker engine
// Poll loop, claim-and-dispatch, bounded concurrency, per-job timeout, and
// cooperative shutdown drain. This is the piece that turns a `Queue` and an
// `ActionRegistry` into a running service.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::actions::ActionRegistry;
use crate::error::AppError;
use crate::health::{HealthRegistry, Status};
use crate::metrics::MetricsCollector;
use crate::queue::Queue;
use crate::services::ServiceContainer;

const JOB_QUEUE_HEALTH_CHECK: &str = "job_queue";

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub poll_interval: Duration,
    pub max_concurrent_jobs: u32,
    pub job_timeout: Duration,
    pub shutdown_timeout: Duration,
}

pub struct Worker {
    queue: Arc<dyn Queue>,
    actions: Arc<ActionRegistry>,
    container: Arc<ServiceContainer>,
    health: Arc<HealthRegistry>,
    metrics: Arc<MetricsCollector>,
    config: WorkerConfig,
    in_flight: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn Queue>,
        actions: Arc<ActionRegistry>,
        container: Arc<ServiceContainer>,
        health: Arc<HealthRegistry>,
        metrics: Arc<MetricsCollector>,
        config: WorkerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            queue,
            actions,
            container,
            health,
            metrics,
            config,
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    /// Runs until `shutdown` is cancelled, then drains in-flight jobs for up
    /// to `shutdown_timeout` before hard-aborting stragglers.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        self.health.register(JOB_QUEUE_HEALTH_CHECK).await;
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_jobs as usize));

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let available = semaphore.available_permits() as u32;
            if available == 0 {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.config.poll_interval) => continue,
                }
            }

            match self.queue.poll(available, &self.config.worker_id).await {
                Ok(jobs) if jobs.is_empty() => {
                    let _ = self.health.update(JOB_QUEUE_HEALTH_CHECK, Status::Green, None).await;
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
                Ok(jobs) => {
                    let _ = self.health.update(JOB_QUEUE_HEALTH_CHECK, Status::Green, None).await;
                    for job in jobs {
                        let permit = semaphore.clone().acquire_owned().await.expect("semaphore is never closed");
                        self.metrics.active_jobs.inc();
                        let worker = self.clone();
                        let job_id = job.id.clone();
                        // Hold the lock across spawn+insert: the task's own
                        // removal takes the same lock, so it can't race ahead
                        // of this insert even if it finishes immediately.
                        let mut in_flight = self.in_flight.lock().await;
                        let handle = tokio::spawn(async move {
                            worker.dispatch(job, permit).await;
                        });
                        in_flight.insert(job_id, handle);
                    }
                }
                Err(e) => {
                    let mut details = serde_json::Map::new();
                    details.insert("detail".to_string(), json!(e.to_string()));
                    let _ = self.health.update(JOB_QUEUE_HEALTH_CHECK, Status::Red, Some(details)).await;
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
            }
        }

        self.drain().await;
    }

    async fn dispatch(self: Arc<Self>, job: crate::queue::job::Job, _permit: tokio::sync::OwnedSemaphorePermit) {
        let span = tracing::info_span!("job", job_id = %job.id);
        let _enter = span.enter();

        let outcome = self.dispatch_inner(&job).await;

        match outcome {
            Ok(result) => {
                if let Err(e) = self.queue.complete(&job.id, result).await {
                    tracing::error!(job_id = %job.id, error = %e, "failed to persist job completion");
                }
                self.metrics.jobs_processed_total.inc();
            }
            Err(app_err) => {
                let error_record = app_err.as_job_error();
                tracing::error!(
                    event = "job_failed",
                    error_code = error_record.code.as_str(),
                    error_message = error_record.message.as_str(),
                    token = job.id.as_str(),
                );
                if let Err(e) = self.queue.fail(&job.id, error_record).await {
                    tracing::error!(job_id = %job.id, error = %e, "failed to persist job failure");
                }
                self.metrics.jobs_errors_total.inc();
            }
        }

        self.metrics.active_jobs.dec();
        self.in_flight.lock().await.remove(&job.id);
    }

    async fn dispatch_inner(&self, job: &crate::queue::job::Job) -> Result<serde_json::Value, AppError> {
        self.queue.mark_processing(&job.id).await?;

        let dispatch_fut = self.actions.dispatch(job.payload.clone(), &self.container);
        match tokio::time::timeout(self.config.job_timeout, dispatch_fut).await {
            Ok(result) => result,
            Err(_) => Err(AppError::JobTimeout),
        }
    }

    /// Waits up to `shutdown_timeout` for every in-flight job to finish, then
    /// hard-aborts stragglers and fails their jobs with SHUTDOWN_INTERRUPTED.
    async fn drain(&self) {
        let deadline = tokio::time::Instant::now() + self.config.shutdown_timeout;

        loop {
            if self.in_flight.lock().await.is_empty() {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let stragglers: Vec<(String, JoinHandle<()>)> = self.in_flight.lock().await.drain().collect();
        for (job_id, handle) in stragglers {
            handle.abort();
            let _ = handle.await;
            tracing::warn!(job_id = %job_id, "aborted in-flight job at shutdown deadline");
            if let Err(e) = self
                .queue
                .fail(&job_id, AppError::ShutdownInterrupted.as_job_error())
                .await
            {
                tracing::error!(job_id = %job_id, error = %e, "failed to record shutdown-interrupted job");
            }
            self.metrics.active_jobs.dec();
            self.metrics.jobs_errors_total.inc();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::builtin::register_builtin_actions;
    use crate::metrics::MetricsCollector;
    use crate::queue::memory::MemoryQueue;
    use serde_json::json;

    async fn new_worker(config: WorkerConfig) -> (Arc<Worker>, Arc<MemoryQueue>, Arc<MetricsCollector>) {
        let queue = Arc::new(MemoryQueue::new());
        let actions = Arc::new(ActionRegistry::new());
        register_builtin_actions(&actions).await.unwrap();
        let container = Arc::new(ServiceContainer::new());
        let health = Arc::new(HealthRegistry::new());
        let metrics = Arc::new(MetricsCollector::new());

        let worker = Worker::new(queue.clone(), actions, container, health, metrics.clone(), config);
        (worker, queue, metrics)
    }

    fn test_config() -> WorkerConfig {
        WorkerConfig {
            worker_id: "test-worker".to_string(),
            poll_interval: Duration::from_millis(10),
            max_concurrent_jobs: 3,
            job_timeout: Duration::from_secs(1),
            shutdown_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn happy_path_completes_job_and_bumps_metric() {
        let (worker, queue, metrics) = new_worker(test_config()).await;
        let job_id = queue.submit(json!({"action": "greet", "name": "World"})).await;

        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();
        let run_handle = tokio::spawn(worker.clone().run(shutdown_clone));

        let job = queue.wait_for_terminal(&job_id, Duration::from_secs(2)).await.unwrap();
        assert_eq!(job.status, crate::queue::job::JobStatus::Completed);
        assert_eq!(job.result.unwrap(), json!({"message": "Hello, World!"}));
        assert_eq!(metrics.jobs_processed_total.get(), 1);

        shutdown.cancel();
        run_handle.await.unwrap();
    }

    #[tokio::test]
    async fn validation_failure_surfaces_as_job_error() {
        let (worker, queue, metrics) = new_worker(test_config()).await;
        let job_id = queue.submit(json!({"action": "greet"})).await;

        let shutdown = CancellationToken::new();
        let run_handle = tokio::spawn(worker.clone().run(shutdown.clone()));

        let job = queue.wait_for_terminal(&job_id, Duration::from_secs(2)).await.unwrap();
        assert_eq!(job.status, crate::queue::job::JobStatus::Failed);
        assert_eq!(job.error.unwrap().code, "VALIDATION_ERROR");
        assert_eq!(metrics.jobs_errors_total.get(), 1);

        shutdown.cancel();
        run_handle.await.unwrap();
    }

    #[tokio::test]
    async fn unknown_action_surfaces_as_job_error() {
        let (worker, queue, _metrics) = new_worker(test_config()).await;
        let job_id = queue.submit(json!({"action": "nope"})).await;

        let shutdown = CancellationToken::new();
        let run_handle = tokio::spawn(worker.clone().run(shutdown.clone()));

        let job = queue.wait_for_terminal(&job_id, Duration::from_secs(2)).await.unwrap();
        assert_eq!(job.error.unwrap().code, "UNKNOWN_ACTION");

        shutdown.cancel();
        run_handle.await.unwrap();
    }

    #[tokio::test]
    async fn concurrency_is_bounded_by_max_concurrent_jobs() {
        let queue = Arc::new(MemoryQueue::new());
        let actions = Arc::new(ActionRegistry::new());
        let peak = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let current = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        {
            let peak = peak.clone();
            let current = current.clone();
            let handler: crate::actions::ActionHandler = Arc::new(move |_input, _deps| {
                let peak = peak.clone();
                let current = current.clone();
                Box::pin(async move {
                    let now = current.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                    peak.fetch_max(now, std::sync::atomic::Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(150)).await;
                    current.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
                    Ok(json!({}))
                })
            });
            actions
                .register(
                    "slow",
                    crate::actions::schema::InputSchema::compile(&json!({"type": "object"})).unwrap(),
                    vec![],
                    handler,
                )
                .await
                .unwrap();
        }

        let container = Arc::new(ServiceContainer::new());
        let health = Arc::new(HealthRegistry::new());
        let metrics = Arc::new(MetricsCollector::new());
        let mut config = test_config();
        config.max_concurrent_jobs = 3;
        config.shutdown_timeout = Duration::from_secs(2);
        let worker = Worker::new(queue.clone(), actions, container, health, metrics, config);

        let mut job_ids = Vec::new();
        for _ in 0..10 {
            job_ids.push(queue.submit(json!({"action": "slow"})).await);
        }

        let shutdown = CancellationToken::new();
        let run_handle = tokio::spawn(worker.clone().run(shutdown.clone()));

        for id in &job_ids {
            let job = queue.wait_for_terminal(id, Duration::from_secs(5)).await.unwrap();
            assert_eq!(job.status, crate::queue::job::JobStatus::Completed);
        }

        assert!(peak.load(std::sync::atomic::Ordering::SeqCst) <= 3);

        shutdown.cancel();
        run_handle.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_fails_in_flight_job_with_shutdown_interrupted() {
        let queue = Arc::new(MemoryQueue::new());
        let actions = Arc::new(ActionRegistry::new());
        let handler: crate::actions::ActionHandler = Arc::new(|_input, _deps| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(json!({}))
            })
        });
        actions
            .register(
                "forever",
                crate::actions::schema::InputSchema::compile(&json!({"type": "object"})).unwrap(),
                vec![],
                handler,
            )
            .await
            .unwrap();

        let container = Arc::new(ServiceContainer::new());
        let health = Arc::new(HealthRegistry::new());
        let metrics = Arc::new(MetricsCollector::new());
        let mut config = test_config();
        config.shutdown_timeout = Duration::from_millis(150);
        let worker = Worker::new(queue.clone(), actions, container, health, metrics, config);

        let job_id = queue.submit(json!({"action": "forever"})).await;
        let shutdown = CancellationToken::new();
        let run_handle = tokio::spawn(worker.clone().run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();

        let start = tokio::time::Instant::now();
        run_handle.await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));

        let job = queue.wait_for_terminal(&job_id, Duration::from_millis(10)).await.unwrap();
        assert_eq!(job.status, crate::queue::job::JobStatus::Failed);
        assert_eq!(job.error.unwrap().code, "SHUTDOWN_INTERRUPTED");
    }
}
