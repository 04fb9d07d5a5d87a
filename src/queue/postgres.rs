// Jaskier Shared Pattern — durable queue
// Postgres-backed queue. Claims a batch atomically via
// `FOR UPDATE SKIP LOCKED` so concurrent workers never observe the same Ready
// row, then marks the claimed rows Assigned in the same statement.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Row};

use super::job::{Job, JobStatus};
use super::Queue;
use crate::error::{AppError, JobErrorRecord};

pub struct PostgresQueue {
    pool: PgPool,
    table: String,
}

impl PostgresQueue {
    pub fn new(pool: PgPool, table: impl Into<String>) -> Self {
        Self { pool, table: table.into() }
    }

    fn parse_status(raw: &str) -> JobStatus {
        match raw {
            "assigned" => JobStatus::Assigned,
            "processing" => JobStatus::Processing,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Ready,
        }
    }

    fn row_to_job(row: &sqlx::postgres::PgRow) -> Result<Job, AppError> {
        let status_raw: String = row.try_get("status").map_err(|e| AppError::QueueUnavailable(e.to_string()))?;
        Ok(Job {
            id: row.try_get("id").map_err(|e| AppError::QueueUnavailable(e.to_string()))?,
            payload: row.try_get("payload").map_err(|e| AppError::QueueUnavailable(e.to_string()))?,
            status: Self::parse_status(&status_raw),
            attempts: row.try_get::<i32, _>("attempts").map_err(|e| AppError::QueueUnavailable(e.to_string()))? as u32,
            claimed_at: row.try_get("claimed_at").ok(),
            completed_at: row.try_get("completed_at").ok(),
            result: row.try_get("result").ok(),
            error: {
                let code: Option<String> = row.try_get("error_code").ok();
                let message: Option<String> = row.try_get("error_message").ok();
                match (code, message) {
                    (Some(code), Some(message)) => Some(JobErrorRecord { code, message }),
                    _ => None,
                }
            },
        })
    }
}

#[async_trait]
impl Queue for PostgresQueue {
    async fn poll(&self, batch_size: u32, worker_id: &str) -> Result<Vec<Job>, AppError> {
        let query = format!(
            r#"
            UPDATE {table}
            SET status = 'assigned', claimed_by = $1, claimed_at = NOW(), attempts = attempts + 1
            WHERE id IN (
                SELECT id FROM {table}
                WHERE status = 'ready'
                ORDER BY id
                FOR UPDATE SKIP LOCKED
                LIMIT $2
            )
            RETURNING id, payload, status, attempts, claimed_at, completed_at, result, error_code, error_message
            "#,
            table = self.table
        );

        let rows = sqlx::query(&query)
            .bind(worker_id)
            .bind(batch_size as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::QueueUnavailable(e.to_string()))?;

        rows.iter().map(Self::row_to_job).collect()
    }

    async fn mark_processing(&self, job_id: &str) -> Result<(), AppError> {
        let query = format!(
            "UPDATE {table} SET status = 'processing' WHERE id = $1 AND status <> 'completed' AND status <> 'failed'",
            table = self.table
        );
        let result = sqlx::query(&query)
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::QueueUnavailable(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(AppError::QueueConsistency(job_id.to_string()));
        }
        Ok(())
    }

    async fn complete(&self, job_id: &str, result: Value) -> Result<(), AppError> {
        let query = format!(
            "UPDATE {table} SET status = 'completed', result = $1, completed_at = NOW() \
             WHERE id = $2 AND status <> 'completed' AND status <> 'failed'",
            table = self.table
        );
        let outcome = sqlx::query(&query)
            .bind(result)
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::QueueUnavailable(e.to_string()))?;
        if outcome.rows_affected() == 0 {
            return Err(AppError::QueueConsistency(job_id.to_string()));
        }
        Ok(())
    }

    async fn fail(&self, job_id: &str, error: JobErrorRecord) -> Result<(), AppError> {
        let query = format!(
            "UPDATE {table} SET status = 'failed', error_code = $1, error_message = $2, completed_at = NOW() \
             WHERE id = $3 AND status <> 'completed' AND status <> 'failed'",
            table = self.table
        );
        let outcome = sqlx::query(&query)
            .bind(error.code)
            .bind(error.message)
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::QueueUnavailable(e.to_string()))?;
        if outcome.rows_affected() == 0 {
            return Err(AppError::QueueConsistency(job_id.to_string()));
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), AppError> {
        self.pool.close().await;
        Ok(())
    }
}
