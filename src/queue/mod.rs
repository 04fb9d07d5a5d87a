pub mod job;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{AppError, JobErrorRecord};
use job::Job;

/// Backend-polymorphic queue contract. Implementations must guarantee claim
/// exclusivity: two concurrent `poll` calls never return the same job.
#[async_trait]
pub trait Queue: Send + Sync {
    async fn poll(&self, batch_size: u32, worker_id: &str) -> Result<Vec<Job>, AppError>;
    async fn mark_processing(&self, job_id: &str) -> Result<(), AppError>;
    async fn complete(&self, job_id: &str, result: Value) -> Result<(), AppError>;
    async fn fail(&self, job_id: &str, error: JobErrorRecord) -> Result<(), AppError>;
    async fn shutdown(&self) -> Result<(), AppError>;
}
