use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::JobErrorRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Ready,
    Assigned,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub payload: Value,
    pub status: JobStatus,
    pub attempts: u32,
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<Value>,
    pub error: Option<JobErrorRecord>,
}

impl Job {
    pub fn new(id: String, payload: Value) -> Self {
        Self {
            id,
            payload,
            status: JobStatus::Ready,
            attempts: 0,
            claimed_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }
}
