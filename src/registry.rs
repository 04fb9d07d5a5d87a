// Jaskier Shared Pattern — fleet registry heartbeat
// The fleet-wide service registry is an external collaborator (interface
// only): this module owns the scheduling loop and health reporting, but the
// concrete Mongo-backed registration/heartbeat is out of scope.

use std::time::Duration;

use async_trait::async_trait;

use crate::health::{HealthRegistry, Status};

#[derive(Debug, thiserror::Error)]
#[error("fleet registry error: {0}")]
pub struct RegistryError(pub String);

#[async_trait]
pub trait FleetRegistry: Send + Sync {
    async fn register(&self) -> Result<(), RegistryError>;
    async fn heartbeat(&self) -> Result<(), RegistryError>;
}

/// No-op default: logs each tick instead of calling out to a real registry.
pub struct LoggingFleetRegistry {
    pub service_name: String,
}

#[async_trait]
impl FleetRegistry for LoggingFleetRegistry {
    async fn register(&self) -> Result<(), RegistryError> {
        tracing::info!(service = self.service_name.as_str(), "fleet_registry: register (no-op backend)");
        Ok(())
    }

    async fn heartbeat(&self) -> Result<(), RegistryError> {
        tracing::debug!(service = self.service_name.as_str(), "fleet_registry: heartbeat (no-op backend)");
        Ok(())
    }
}

const HEALTH_CHECK_NAME: &str = "fleet_registry";

/// Spawns the fire-and-forget heartbeat loop. Failures are logged and
/// recorded at YELLOW — a registry outage never affects job processing.
pub fn spawn_heartbeat(
    registry: std::sync::Arc<dyn FleetRegistry>,
    health: std::sync::Arc<HealthRegistry>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        health.register(HEALTH_CHECK_NAME).await;
        if let Err(e) = registry.register().await {
            tracing::warn!(error = %e, "fleet_registry: initial registration failed");
        }

        loop {
            tokio::time::sleep(interval).await;
            match registry.heartbeat().await {
                Ok(()) => {
                    let _ = health.update(HEALTH_CHECK_NAME, Status::Green, None).await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "fleet_registry: heartbeat failed");
                    let mut details = serde_json::Map::new();
                    details.insert("detail".to_string(), serde_json::json!(e.to_string()));
                    let _ = health.update(HEALTH_CHECK_NAME, Status::Yellow, Some(details)).await;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn heartbeat_updates_health_to_green() {
        let health = Arc::new(HealthRegistry::new());
        let registry: Arc<dyn FleetRegistry> = Arc::new(LoggingFleetRegistry {
            service_name: "svc".to_string(),
        });
        let handle = spawn_heartbeat(registry, health.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.abort();
        assert_eq!(health.snapshot().await.status, Status::Green);
    }
}
