// Jaskier Shared Pattern — orchestrator entrypoint
// Sequenced startup/shutdown per the application orchestrator design: load
// config, wire the ambient stack, build services, serve HTTP, run the
// worker, then tear everything down in reverse order on signal.

use std::sync::Arc;

use forge_worker::config::Config;
use forge_worker::health::HealthRegistry;
use forge_worker::metrics::MetricsCollector;
use forge_worker::queue::memory::MemoryQueue;
use forge_worker::queue::postgres::PostgresQueue;
use forge_worker::queue::Queue;
use forge_worker::registry::{spawn_heartbeat, LoggingFleetRegistry};
use forge_worker::services::ServiceContainer;
use forge_worker::state::AppState;
use forge_worker::worker::{Worker, WorkerConfig};
use forge_worker::{actions::builtin::register_builtin_actions, actions::ActionRegistry};
use tokio_util::sync::CancellationToken;

fn init_tracing(config: &Config) {
    use tracing_subscriber::EnvFilter;

    let default_level = if config.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if config.log_console_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };
    init_tracing(&config);
    let config = Arc::new(config);

    tracing::info!(
        service = config.microservice_name.as_str(),
        version = config.service_version.as_str(),
        dev_mode = config.dev_mode,
        "starting"
    );

    let metrics = Arc::new(MetricsCollector::new());
    let health = Arc::new(HealthRegistry::new());

    let (queue, dev_queue): (Arc<dyn Queue>, Option<Arc<MemoryQueue>>) = if config.dev_mode {
        let queue = Arc::new(MemoryQueue::new());
        (queue.clone() as Arc<dyn Queue>, Some(queue))
    } else {
        let dsn = match &config.oracle_dsn {
            Some(dsn) => dsn.clone(),
            None => {
                eprintln!("configuration error: ORACLE_DSN is required outside DEV_MODE");
                std::process::exit(1);
            }
        };
        let pool = match sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.max_concurrent_jobs + 1)
            .connect(&dsn)
            .await
        {
            Ok(pool) => pool,
            Err(e) => {
                eprintln!("failed to connect to queue backend: {e}");
                std::process::exit(1);
            }
        };
        (Arc::new(PostgresQueue::new(pool, config.oracle_table.clone())), None)
    };

    let actions = Arc::new(ActionRegistry::new());
    if let Err(e) = register_builtin_actions(&actions).await {
        eprintln!("failed to register builtin actions: {e}");
        std::process::exit(1);
    }

    let mut container = ServiceContainer::new();
    if let Err(e) = container.build() {
        eprintln!("service dependency graph is invalid: {e}");
        std::process::exit(1);
    }
    if let Err(e) = container.initialize(&health).await {
        eprintln!("service initialization failed: {e}");
        std::process::exit(1);
    }
    let container = Arc::new(container);

    let state = AppState {
        config: config.clone(),
        health: health.clone(),
        metrics: metrics.clone(),
        actions: actions.clone(),
        container: container.clone(),
        queue: queue.clone(),
        dev_queue,
    };

    let router = forge_worker::create_router(state);
    let listener = match tokio::net::TcpListener::bind((config.http_host.as_str(), config.http_port)).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("failed to bind {}:{}: {e}", config.http_host, config.http_port);
            std::process::exit(1);
        }
    };
    tracing::info!(addr = %listener.local_addr().unwrap(), "http server listening");

    let shutdown = CancellationToken::new();

    let http_shutdown = shutdown.clone();
    let http_handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { http_shutdown.cancelled().await })
            .await
    });

    let worker = Worker::new(
        queue.clone(),
        actions.clone(),
        container.clone(),
        health.clone(),
        metrics.clone(),
        WorkerConfig {
            worker_id: format!("{}-worker", config.microservice_name),
            poll_interval: config.polling_interval,
            max_concurrent_jobs: config.max_concurrent_jobs,
            job_timeout: config.job_timeout,
            shutdown_timeout: config.shutdown_timeout,
        },
    );
    let worker_shutdown = shutdown.clone();
    let worker_handle = tokio::spawn(worker.run(worker_shutdown));

    let heartbeat_handle = config.mongodb_uri.as_ref().map(|_| {
        let registry = Arc::new(LoggingFleetRegistry {
            service_name: config.microservice_name.clone(),
        });
        spawn_heartbeat(registry, health.clone(), config.mongodb_heartbeat_interval)
    });

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, draining");
    shutdown.cancel();

    let _ = worker_handle.await;
    if let Some(handle) = heartbeat_handle {
        handle.abort();
    }
    let _ = http_handle.await;

    container.teardown().await;
    if let Err(e) = queue.shutdown().await {
        tracing::error!(error = %e, "queue shutdown reported an error");
    }

    tracing::info!("shutdown complete");
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
