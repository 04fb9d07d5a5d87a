// Jaskier Shared Pattern — application state
// Single `Arc`-wrapped bundle shared between the HTTP router and the worker
// loop. No hidden process-wide statics: everything a handler needs travels
// through this struct.

use std::sync::Arc;
use std::time::Duration;

use crate::actions::ActionRegistry;
use crate::config::Config;
use crate::health::HealthRegistry;
use crate::metrics::MetricsCollector;
use crate::queue::memory::MemoryQueue;
use crate::queue::Queue;
use crate::services::ServiceContainer;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub health: Arc<HealthRegistry>,
    pub metrics: Arc<MetricsCollector>,
    pub actions: Arc<ActionRegistry>,
    pub container: Arc<ServiceContainer>,
    pub queue: Arc<dyn Queue>,
    /// Populated only in dev mode, where `queue` is a `MemoryQueue` and
    /// `/dev/job` needs the concrete type to submit and await jobs.
    pub dev_queue: Option<Arc<MemoryQueue>>,
}

impl AppState {
    pub fn job_timeout(&self) -> Duration {
        self.config.job_timeout
    }
}
