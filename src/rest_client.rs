// Jaskier Shared Pattern — REST client template
// Composes a rate limiter, a circuit breaker, and a jittered retry loop
// around a plain `reqwest::Client`. `ServiceProvider`/`RestAPIService` class
// hierarchies become composition: capability is a set of methods on this
// struct, not a base class to inherit from.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::error::AppError;
use crate::health::{HealthRegistry, Status};
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, RateLimiter};
use crate::services::Service;

#[derive(Clone, Debug)]
pub struct RestApiClientConfig {
    pub base_url: String,
    pub rate_limit_capacity: f64,
    pub rate_limit_window: Duration,
    pub circuit_breaker: CircuitBreakerConfig,
    pub max_retries: u32,
    pub backoff_base: Duration,
}

pub struct RestApiClient {
    name: String,
    config: RestApiClientConfig,
    http: Client,
    rate_limiter: RateLimiter,
    circuit_breaker: CircuitBreaker,
    health_check_name: RwLock<Option<String>>,
}

impl RestApiClient {
    pub fn new(name: impl Into<String>, config: RestApiClientConfig) -> Self {
        let http = Client::builder()
            .pool_max_idle_per_host(10)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("reqwest client configuration is static and always valid");

        Self {
            name: name.into(),
            rate_limiter: RateLimiter::new(config.rate_limit_capacity, config.rate_limit_window),
            circuit_breaker: CircuitBreaker::new(config.circuit_breaker),
            config,
            http,
            health_check_name: RwLock::new(None),
        }
    }

    fn target(&self) -> &str {
        &self.config.base_url
    }

    async fn report_health(&self, health: &HealthRegistry, status: Status, detail: &str) {
        let Some(check_name) = self.health_check_name.read().await.clone() else {
            return;
        };
        let mut details = serde_json::Map::new();
        details.insert("detail".to_string(), json!(detail));
        let _ = health.update(&check_name, status, Some(details)).await;
    }

    /// GET `path` relative to `base_url`, applying rate limiting, circuit
    /// breaking, and jittered exponential-backoff retries.
    pub async fn get(&self, path: &str, health: &HealthRegistry) -> Result<Value, AppError> {
        let url = format!("{}{}", self.config.base_url, path);
        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if !self.circuit_breaker.can_execute(self.target()).await {
                self.report_health(health, Status::Red, "circuit open").await;
                return Err(AppError::CircuitOpen(self.target().to_string()));
            }

            self.rate_limiter.acquire().await;

            match self.http.get(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    self.circuit_breaker.record_success(self.target()).await;
                    self.report_health(health, Status::Green, "ok").await;
                    return response
                        .json::<Value>()
                        .await
                        .map_err(|e| AppError::UpstreamConnect(e.to_string()));
                }
                Ok(response) if response.status().is_server_error() => {
                    self.circuit_breaker.record_failure(self.target()).await;
                    last_err = Some(AppError::Upstream5xx(response.status().as_u16()));
                }
                Ok(response) => {
                    // 4xx is not retried.
                    self.circuit_breaker.record_success(self.target()).await;
                    return Err(AppError::Upstream4xx(response.status().as_u16()));
                }
                Err(e) if e.is_timeout() => {
                    self.circuit_breaker.record_failure(self.target()).await;
                    last_err = Some(AppError::UpstreamTimeout);
                }
                Err(e) => {
                    self.circuit_breaker.record_failure(self.target()).await;
                    last_err = Some(AppError::UpstreamConnect(e.to_string()));
                }
            }

            if attempt < self.config.max_retries {
                self.report_health(health, Status::Yellow, "retrying").await;
                let backoff = self.config.backoff_base.as_secs_f64() * 2f64.powi(attempt as i32);
                let jittered = rand::rng().random_range(0.0..=backoff);
                tokio::time::sleep(Duration::from_secs_f64(jittered)).await;
            }
        }

        self.report_health(health, Status::Red, "retries exhausted").await;
        Err(last_err.unwrap_or(AppError::UpstreamConnect("exhausted retries".to_string())))
    }
}

#[async_trait]
impl Service for RestApiClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn initialize(&self, health: &HealthRegistry) -> Result<(), AppError> {
        let check_name = format!("rest_client:{}", self.name);
        health.register(&check_name).await;
        *self.health_check_name.write().await = Some(check_name);
        Ok(())
    }
}
