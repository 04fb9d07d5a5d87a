// Jaskier Shared Pattern — service container
// Long-lived dependency instances with topological init/teardown ordering.
// `ServiceProvider`/`RestAPIService` class hierarchies become composition: a
// `Service` trait plus a container that resolves instances by name.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AppError;
use crate::health::HealthRegistry;

#[async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &str;

    /// Enables downcasting a resolved `Arc<dyn Service>` back to its
    /// concrete type inside an action handler.
    fn as_any(&self) -> &dyn Any;

    async fn initialize(&self, _health: &HealthRegistry) -> Result<(), AppError> {
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), AppError> {
        Ok(())
    }
}

pub type ResolvedDeps = HashMap<String, Arc<dyn Service>>;
type Factory = Box<dyn Fn(&ResolvedDeps) -> Arc<dyn Service> + Send + Sync>;

pub struct ServiceDescriptor {
    pub name: String,
    pub depends_on: Vec<String>,
    factory: Factory,
}

impl ServiceDescriptor {
    pub fn new(
        name: impl Into<String>,
        depends_on: Vec<String>,
        factory: impl Fn(&ResolvedDeps) -> Arc<dyn Service> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            depends_on,
            factory: Box::new(factory),
        }
    }
}

/// Owns every long-lived service instance for the process lifetime and
/// orchestrates init/teardown in dependency order.
pub struct ServiceContainer {
    descriptors: Vec<ServiceDescriptor>,
    order: Vec<usize>,
    instances: ResolvedDeps,
}

impl ServiceContainer {
    pub fn new() -> Self {
        Self {
            descriptors: Vec::new(),
            order: Vec::new(),
            instances: HashMap::new(),
        }
    }

    pub fn register(&mut self, descriptor: ServiceDescriptor) {
        self.descriptors.push(descriptor);
    }

    /// Kahn's algorithm. Cycles (or a dependency on an unregistered name)
    /// surface as `DEPENDENCY_CYCLE` — fatal before the worker accepts jobs.
    pub fn build(&mut self) -> Result<(), AppError> {
        let index_by_name: HashMap<String, usize> = self
            .descriptors
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name.clone(), i))
            .collect();

        let mut in_degree = vec![0usize; self.descriptors.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.descriptors.len()];

        for (i, d) in self.descriptors.iter().enumerate() {
            for dep in &d.depends_on {
                let dep_idx = index_by_name.get(dep).ok_or_else(|| {
                    AppError::DependencyCycle(format!(
                        "service '{}' depends on unregistered service '{}'",
                        d.name, dep
                    ))
                })?;
                dependents[*dep_idx].push(i);
                in_degree[i] += 1;
            }
        }

        let mut ready: Vec<usize> = (0..self.descriptors.len()).filter(|&i| in_degree[i] == 0).collect();
        ready.sort_unstable();
        let mut order = Vec::with_capacity(self.descriptors.len());

        while let Some(idx) = ready.pop() {
            order.push(idx);
            let mut newly_ready = Vec::new();
            for &dependent in &dependents[idx] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    newly_ready.push(dependent);
                }
            }
            newly_ready.sort_unstable();
            ready.extend(newly_ready);
        }

        if order.len() != self.descriptors.len() {
            let stuck: HashSet<&str> = (0..self.descriptors.len())
                .filter(|i| !order.contains(i))
                .map(|i| self.descriptors[i].name.as_str())
                .collect();
            return Err(AppError::DependencyCycle(format!(
                "cycle among services: {stuck:?}"
            )));
        }

        for &idx in &order {
            let deps: ResolvedDeps = self.descriptors[idx]
                .depends_on
                .iter()
                .map(|name| (name.clone(), self.instances[name].clone()))
                .collect();
            let instance = (self.descriptors[idx].factory)(&deps);
            self.instances.insert(self.descriptors[idx].name.clone(), instance);
        }

        self.order = order;
        Ok(())
    }

    /// Calls `initialize` in topological order. On the first failure,
    /// already-initialized services are cleaned up in reverse order before
    /// the error propagates.
    pub async fn initialize(&self, health: &HealthRegistry) -> Result<(), AppError> {
        let mut initialized = Vec::new();
        for &idx in &self.order {
            let name = &self.descriptors[idx].name;
            let service = &self.instances[name];
            if let Err(e) = service.initialize(health).await {
                tracing::error!(service = name.as_str(), error = %e, "service initialize failed, rolling back");
                for prior_name in initialized.into_iter().rev() {
                    let prior: &Arc<dyn Service> = &self.instances[prior_name];
                    if let Err(cleanup_err) = prior.cleanup().await {
                        tracing::error!(service = prior_name, error = %cleanup_err, "rollback cleanup failed");
                    }
                }
                return Err(e);
            }
            initialized.push(name.as_str());
        }
        Ok(())
    }

    /// Runs `cleanup` in reverse order, swallowing individual errors so every
    /// hook still runs.
    pub async fn teardown(&self) {
        for &idx in self.order.iter().rev() {
            let name = &self.descriptors[idx].name;
            if let Err(e) = self.instances[name].cleanup().await {
                tracing::error!(service = name.as_str(), error = %e, "service cleanup failed during teardown");
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.instances.get(name).cloned()
    }
}

impl Default for ServiceContainer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain {
        name: String,
        initialized: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl Service for Plain {
        fn name(&self) -> &str {
            &self.name
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        async fn initialize(&self, _health: &HealthRegistry) -> Result<(), AppError> {
            self.initialized.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    fn plain(name: &str) -> Arc<dyn Service> {
        Arc::new(Plain {
            name: name.to_string(),
            initialized: std::sync::atomic::AtomicBool::new(false),
        })
    }

    #[tokio::test]
    async fn initializes_in_dependency_order() {
        let mut container = ServiceContainer::new();
        container.register(ServiceDescriptor::new("a", vec![], |_| plain("a")));
        container.register(ServiceDescriptor::new("b", vec!["a".into()], |_| plain("b")));
        container.build().unwrap();
        let health = HealthRegistry::new();
        container.initialize(&health).await.unwrap();
        assert!(container.get("a").is_some());
        assert!(container.get("b").is_some());
    }

    #[tokio::test]
    async fn cycle_is_rejected() {
        let mut container = ServiceContainer::new();
        container.register(ServiceDescriptor::new("a", vec!["b".into()], |_| plain("a")));
        container.register(ServiceDescriptor::new("b", vec!["a".into()], |_| plain("b")));
        let err = container.build().unwrap_err();
        assert_eq!(err.code(), "DEPENDENCY_CYCLE");
    }

    #[tokio::test]
    async fn unregistered_dependency_is_rejected() {
        let mut container = ServiceContainer::new();
        container.register(ServiceDescriptor::new("a", vec!["ghost".into()], |_| plain("a")));
        let err = container.build().unwrap_err();
        assert_eq!(err.code(), "DEPENDENCY_CYCLE");
    }
}
