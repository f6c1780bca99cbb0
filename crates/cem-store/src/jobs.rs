//! Design-job history: one record per workflow run.

use std::fmt;
use std::str::FromStr;

use rusqlite::{OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use cem_core::time::now_iso8601;

use crate::error::{Result, StoreError};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(StoreError::InvalidData(format!("unknown job status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignJob {
    pub id: Uuid,
    pub prompt: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specification: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Store {
    pub fn create_job(&self, prompt: &str) -> Result<DesignJob> {
        let now = now_iso8601();
        let job = DesignJob {
            id: Uuid::new_v4(),
            prompt: prompt.to_string(),
            status: JobStatus::Pending,
            specification: None,
            result: None,
            error: None,
            created_at: now.clone(),
            updated_at: now,
        };
        self.conn().execute(
            "INSERT INTO design_jobs (id, prompt, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                job.id.to_string(),
                job.prompt,
                job.status.as_str(),
                job.created_at,
                job.updated_at
            ],
        )?;
        Ok(job)
    }

    pub fn mark_job_running(&self, id: Uuid, specification: &Value) -> Result<()> {
        self.update_job(
            id,
            "UPDATE design_jobs SET status = 'running', spec_json = ?2, updated_at = ?3
             WHERE id = ?1",
            Some(serde_json::to_string(specification)?),
        )
    }

    pub fn complete_job(&self, id: Uuid, result: &Value) -> Result<()> {
        self.update_job(
            id,
            "UPDATE design_jobs SET status = 'completed', result_json = ?2, error = NULL,
                 updated_at = ?3
             WHERE id = ?1",
            Some(serde_json::to_string(result)?),
        )
    }

    pub fn fail_job(&self, id: Uuid, error: &str) -> Result<()> {
        self.update_job(
            id,
            "UPDATE design_jobs SET status = 'failed', error = ?2, updated_at = ?3 WHERE id = ?1",
            Some(error.to_string()),
        )
    }

    fn update_job(&self, id: Uuid, sql: &str, payload: Option<String>) -> Result<()> {
        let n = self
            .conn()
            .execute(sql, params![id.to_string(), payload, now_iso8601()])?;
        if n == 0 {
            return Err(StoreError::InvalidData(format!("no design job {id}")));
        }
        Ok(())
    }

    pub fn get_job(&self, id: Uuid) -> Result<Option<DesignJob>> {
        let raw = self
            .conn()
            .query_row(
                "SELECT id, prompt, status, spec_json, result_json, error, created_at, updated_at
                 FROM design_jobs WHERE id = ?1",
                [id.to_string()],
                raw_job,
            )
            .optional()?;
        raw.map(RawJob::into_job).transpose()
    }

    /// Most recent first.
    pub fn recent_jobs(&self, limit: usize) -> Result<Vec<DesignJob>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, prompt, status, spec_json, result_json, error, created_at, updated_at
             FROM design_jobs ORDER BY created_at DESC, rowid DESC LIMIT ?1",
        )?;
        let raws = stmt
            .query_map([limit as i64], raw_job)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        raws.into_iter().map(RawJob::into_job).collect()
    }
}

struct RawJob {
    id: String,
    prompt: String,
    status: String,
    spec_json: Option<String>,
    result_json: Option<String>,
    error: Option<String>,
    created_at: String,
    updated_at: String,
}

fn raw_job(row: &Row<'_>) -> rusqlite::Result<RawJob> {
    Ok(RawJob {
        id: row.get(0)?,
        prompt: row.get(1)?,
        status: row.get(2)?,
        spec_json: row.get(3)?,
        result_json: row.get(4)?,
        error: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

impl RawJob {
    fn into_job(self) -> Result<DesignJob> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| StoreError::InvalidData(format!("bad job id {}: {e}", self.id)))?;
        Ok(DesignJob {
            id,
            prompt: self.prompt,
            status: self.status.parse()?,
            specification: self.spec_json.as_deref().map(serde_json::from_str).transpose()?,
            result: self.result_json.as_deref().map(serde_json::from_str).transpose()?,
            error: self.error,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
