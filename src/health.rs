// Jaskier Shared Pattern — health
// Three-tier health aggregation consumed by the `/health` HTTP probe and by
// every other component in the engine (queue, breakers, registry heartbeat).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::AppError;

/// Ordered so that `min()` over a set of statuses picks the worst one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Red = 0,
    Yellow = 1,
    Green = 2,
}

impl Status {
    pub fn as_gauge(&self) -> f64 {
        *self as i32 as f64
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub status: Status,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub details: serde_json::Map<String, serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct HealthSnapshot {
    pub status: Status,
    pub timestamp: DateTime<Utc>,
    pub checks: HashMap<String, HealthCheck>,
}

/// Thread-safe map of named checks. All reads and writes are serialized
/// through a single `RwLock` so `/health` never observes a half-applied
/// update.
#[derive(Default)]
pub struct HealthRegistry {
    checks: RwLock<HashMap<String, HealthCheck>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: re-registering an existing check is a no-op.
    pub async fn register(&self, name: &str) {
        let mut checks = self.checks.write().await;
        checks.entry(name.to_string()).or_insert_with(|| HealthCheck {
            status: Status::Green,
            details: serde_json::Map::new(),
            updated_at: Utc::now(),
        });
    }

    pub async fn update(
        &self,
        name: &str,
        status: Status,
        details: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<(), AppError> {
        let mut checks = self.checks.write().await;
        let check = checks
            .get_mut(name)
            .ok_or_else(|| AppError::UnknownHealthCheck(name.to_string()))?;
        check.status = status;
        check.details = details.unwrap_or_default();
        check.updated_at = Utc::now();
        Ok(())
    }

    pub async fn snapshot(&self) -> HealthSnapshot {
        let checks = self.checks.read().await;
        let aggregate = checks.values().map(|c| c.status).min().unwrap_or(Status::Green);
        HealthSnapshot {
            status: aggregate,
            timestamp: Utc::now(),
            checks: checks.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_registry_is_green() {
        let registry = HealthRegistry::new();
        assert_eq!(registry.snapshot().await.status, Status::Green);
    }

    #[tokio::test]
    async fn aggregate_is_min_over_checks() {
        let registry = HealthRegistry::new();
        registry.register("db").await;
        registry.register("queue").await;
        registry.update("db", Status::Green, None).await.unwrap();
        registry.update("queue", Status::Yellow, None).await.unwrap();
        assert_eq!(registry.snapshot().await.status, Status::Yellow);

        registry.update("db", Status::Red, None).await.unwrap();
        assert_eq!(registry.snapshot().await.status, Status::Red);
    }

    #[tokio::test]
    async fn update_unregistered_check_rejected() {
        let registry = HealthRegistry::new();
        let err = registry.update("missing", Status::Green, None).await.unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_HEALTH_CHECK");
    }

    #[tokio::test]
    async fn register_is_idempotent() {
        let registry = HealthRegistry::new();
        registry.register("db").await;
        registry.update("db", Status::Red, None).await.unwrap();
        registry.register("db").await;
        // Re-registering must not reset an existing check back to GREEN.
        assert_eq!(registry.snapshot().await.status, Status::Red);
    }
}
