// Jaskier Shared Pattern — metrics
// In-process Prometheus metrics sink. Bring your own counters/gauges on top
// of the fixed core set; `render()` is the same text encoder a real
// Prometheus server would use to scrape this process.

use std::collections::HashMap;
use std::sync::Mutex;

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

use crate::error::AppError;

pub struct MetricsCollector {
    registry: Registry,
    pub jobs_processed_total: IntCounter,
    pub jobs_errors_total: IntCounter,
    pub active_jobs: IntGauge,
    pub health_status: IntGauge,
    custom_counters: Mutex<HashMap<String, IntCounter>>,
    custom_gauges: Mutex<HashMap<String, IntGauge>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        let registry = Registry::new();

        let jobs_processed_total =
            IntCounter::new("jobs_processed_total", "Total jobs completed successfully").unwrap();
        let jobs_errors_total =
            IntCounter::new("jobs_errors_total", "Total jobs that terminated in failure").unwrap();
        let active_jobs = IntGauge::new("active_jobs", "Jobs currently being processed").unwrap();
        let health_status =
            IntGauge::new("health_status", "Aggregate health status (0=RED 1=YELLOW 2=GREEN)").unwrap();

        registry.register(Box::new(jobs_processed_total.clone())).unwrap();
        registry.register(Box::new(jobs_errors_total.clone())).unwrap();
        registry.register(Box::new(active_jobs.clone())).unwrap();
        registry.register(Box::new(health_status.clone())).unwrap();

        Self {
            registry,
            jobs_processed_total,
            jobs_errors_total,
            active_jobs,
            health_status,
            custom_counters: Mutex::new(HashMap::new()),
            custom_gauges: Mutex::new(HashMap::new()),
        }
    }

    pub fn register_counter(&self, name: &str, help: &str) -> Result<IntCounter, AppError> {
        let counter = IntCounter::new(name, help)
            .map_err(|e| AppError::ConfigInvalid(format!("invalid metric '{name}': {e}")))?;
        self.registry
            .register(Box::new(counter.clone()))
            .map_err(|e| AppError::ConfigInvalid(format!("metric '{name}' already registered: {e}")))?;
        self.custom_counters.lock().unwrap().insert(name.to_string(), counter.clone());
        Ok(counter)
    }

    pub fn register_gauge(&self, name: &str, help: &str) -> Result<IntGauge, AppError> {
        let gauge = IntGauge::new(name, help)
            .map_err(|e| AppError::ConfigInvalid(format!("invalid metric '{name}': {e}")))?;
        self.registry
            .register(Box::new(gauge.clone()))
            .map_err(|e| AppError::ConfigInvalid(format!("metric '{name}' already registered: {e}")))?;
        self.custom_gauges.lock().unwrap().insert(name.to_string(), gauge.clone());
        Ok(gauge)
    }

    /// Prometheus text exposition format (`# HELP` / `# TYPE` + samples).
    pub fn render(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metric_families, &mut buffer).expect("prometheus encode never fails for well-formed families");
        String::from_utf8(buffer).expect("prometheus text encoder always emits UTF-8")
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_core_metrics_and_help_type_lines() {
        let metrics = MetricsCollector::new();
        metrics.jobs_processed_total.inc();
        metrics.active_jobs.set(3);

        let rendered = metrics.render();
        assert!(rendered.contains("# HELP jobs_processed_total"));
        assert!(rendered.contains("# TYPE jobs_processed_total counter"));
        assert!(rendered.contains("jobs_processed_total 1"));
        assert!(rendered.contains("active_jobs 3"));
    }

    #[test]
    fn counters_only_increase_across_snapshots() {
        let metrics = MetricsCollector::new();
        metrics.jobs_processed_total.inc();
        let first = metrics.render();
        metrics.jobs_processed_total.inc();
        let second = metrics.render();
        assert!(first.contains("jobs_processed_total 1"));
        assert!(second.contains("jobs_processed_total 2"));
    }

    #[test]
    fn custom_metrics_are_rendered() {
        let metrics = MetricsCollector::new();
        let custom = metrics.register_counter("widgets_total", "widgets produced").unwrap();
        custom.inc_by(5);
        assert!(metrics.render().contains("widgets_total 5"));
    }
}
