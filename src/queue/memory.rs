// Jaskier Shared Pattern — in-memory queue
// Dev-mode backend. Claim exclusivity comes from a single mutex guarding the
// whole job table rather than SKIP LOCKED — there is only one process to
// race against.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use super::job::{Job, JobStatus};
use super::Queue;
use crate::error::{AppError, JobErrorRecord};

struct Entry {
    job: Job,
    notify: Arc<Notify>,
}

#[derive(Default)]
pub struct MemoryQueue {
    jobs: Mutex<HashMap<String, Entry>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn submit(&self, payload: Value) -> String {
        let id = Uuid::new_v4().to_string();
        let job = Job::new(id.clone(), payload);
        let mut jobs = self.jobs.lock().await;
        jobs.insert(
            id.clone(),
            Entry {
                job,
                notify: Arc::new(Notify::new()),
            },
        );
        id
    }

    /// Waits until `job_id` reaches a terminal state or `timeout` elapses.
    pub async fn wait_for_terminal(&self, job_id: &str, timeout: Duration) -> Result<Job, AppError> {
        let notify = {
            let jobs = self.jobs.lock().await;
            let entry = jobs
                .get(job_id)
                .ok_or_else(|| AppError::QueueConsistency(job_id.to_string()))?;
            if entry.job.status.is_terminal() {
                return Ok(entry.job.clone());
            }
            entry.notify.clone()
        };

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                let jobs = self.jobs.lock().await;
                return Ok(jobs[job_id].job.clone());
            }
            tokio::select! {
                _ = notify.notified() => {
                    let jobs = self.jobs.lock().await;
                    let job = &jobs[job_id].job;
                    if job.status.is_terminal() {
                        return Ok(job.clone());
                    }
                }
                _ = tokio::time::sleep(remaining) => {
                    let jobs = self.jobs.lock().await;
                    return Ok(jobs[job_id].job.clone());
                }
            }
        }
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn poll(&self, batch_size: u32, _worker_id: &str) -> Result<Vec<Job>, AppError> {
        let mut jobs = self.jobs.lock().await;
        let ready_ids: Vec<String> = jobs
            .values()
            .filter(|e| e.job.status == JobStatus::Ready)
            .take(batch_size as usize)
            .map(|e| e.job.id.clone())
            .collect();

        let mut claimed = Vec::with_capacity(ready_ids.len());
        for id in ready_ids {
            let entry = jobs.get_mut(&id).expect("id came from this same locked map");
            entry.job.status = JobStatus::Assigned;
            entry.job.attempts += 1;
            entry.job.claimed_at = Some(Utc::now());
            claimed.push(entry.job.clone());
        }
        Ok(claimed)
    }

    async fn mark_processing(&self, job_id: &str) -> Result<(), AppError> {
        let mut jobs = self.jobs.lock().await;
        let entry = jobs
            .get_mut(job_id)
            .ok_or_else(|| AppError::QueueConsistency(job_id.to_string()))?;
        if entry.job.status.is_terminal() {
            return Err(AppError::QueueConsistency(job_id.to_string()));
        }
        entry.job.status = JobStatus::Processing;
        Ok(())
    }

    async fn complete(&self, job_id: &str, result: Value) -> Result<(), AppError> {
        let mut jobs = self.jobs.lock().await;
        let entry = jobs
            .get_mut(job_id)
            .ok_or_else(|| AppError::QueueConsistency(job_id.to_string()))?;
        if entry.job.status.is_terminal() {
            return Err(AppError::QueueConsistency(job_id.to_string()));
        }
        entry.job.status = JobStatus::Completed;
        entry.job.result = Some(result);
        entry.job.completed_at = Some(Utc::now());
        entry.notify.notify_waiters();
        Ok(())
    }

    async fn fail(&self, job_id: &str, error: JobErrorRecord) -> Result<(), AppError> {
        let mut jobs = self.jobs.lock().await;
        let entry = jobs
            .get_mut(job_id)
            .ok_or_else(|| AppError::QueueConsistency(job_id.to_string()))?;
        if entry.job.status.is_terminal() {
            return Err(AppError::QueueConsistency(job_id.to_string()));
        }
        entry.job.status = JobStatus::Failed;
        entry.job.error = Some(error);
        entry.job.completed_at = Some(Utc::now());
        entry.notify.notify_waiters();
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), AppError> {
        Ok(())
    }
}
