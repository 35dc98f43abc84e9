use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use crate::error::SyncError;
use crate::job::{Job, JobStatus};

const JOB_COLUMNS: &str = r#"
    id, workflow_name, repo, branch, event_kind, commit_sha, request_id,
    status, started_at, completed_at, output, output_truncated, error
"#;

/// Persistent storage for workflow jobs using SQLite
#[derive(Clone)]
pub struct SqlJobStore {
    pool: SqlitePool,
}

impl SqlJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new job record
    pub async fn create_job(&self, job: &Job) -> Result<(), SyncError> {
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, workflow_name, repo, branch, event_kind,
                commit_sha, request_id, status, started_at, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.workflow_name)
        .bind(&job.repo)
        .bind(&job.branch)
        .bind(&job.event_kind)
        .bind(&job.commit_sha)
        .bind(&job.request_id)
        .bind(job.status.as_str())
        .bind(job.started_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::DatabaseError(format!("Failed to create job: {}", e)))?;

        Ok(())
    }

    /// Update job status
    pub async fn update_job_status(&self, id: &str, status: JobStatus) -> Result<(), SyncError> {
        sqlx::query("UPDATE jobs SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::DatabaseError(format!("Failed to update job status: {}", e)))?;

        Ok(())
    }

    /// Complete a job (success or failure)
    pub async fn complete_job(
        &self,
        id: &str,
        status: JobStatus,
        output: Option<String>,
        output_truncated: bool,
        error: Option<String>,
        completed_at: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        // Fetch started_at to calculate duration in Rust
        let started_at: (String,) = sqlx::query_as("SELECT started_at FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                SyncError::DatabaseError(format!("Failed to fetch job started_at: {}", e))
            })?;

        let duration_ms = DateTime::parse_from_rfc3339(&started_at.0)
            .map(|start| (completed_at - start.with_timezone(&Utc)).num_milliseconds())
            .unwrap_or(0);

        sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?,
                output = ?,
                output_truncated = ?,
                error = ?,
                completed_at = ?,
                duration_ms = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(output)
        .bind(output_truncated)
        .bind(error)
        .bind(completed_at.to_rfc3339())
        .bind(duration_ms)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::DatabaseError(format!("Failed to complete job: {}", e)))?;

        Ok(())
    }

    /// Get a job by ID
    pub async fn get_job(&self, id: &str) -> Result<Option<Job>, SyncError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?");
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SyncError::DatabaseError(format!("Failed to fetch job: {}", e)))?;

        Ok(row.map(|r| r.into()))
    }

    /// Get recent jobs
    pub async fn get_recent_jobs(&self, limit: i64) -> Result<Vec<Job>, SyncError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at DESC LIMIT ?");
        let rows = sqlx::query_as::<_, JobRow>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SyncError::DatabaseError(format!("Failed to fetch recent jobs: {}", e)))?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    /// Get jobs of one workflow
    pub async fn get_jobs_by_workflow(
        &self,
        workflow: &str,
        limit: i64,
    ) -> Result<Vec<Job>, SyncError> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE workflow_name = ? ORDER BY created_at DESC LIMIT ?"
        );
        let rows = sqlx::query_as::<_, JobRow>(&sql)
            .bind(workflow)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                SyncError::DatabaseError(format!("Failed to fetch workflow jobs: {}", e))
            })?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    /// Get jobs by status
    pub async fn get_jobs_by_status(
        &self,
        status: JobStatus,
        limit: i64,
    ) -> Result<Vec<Job>, SyncError> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE status = ? ORDER BY created_at DESC LIMIT ?"
        );
        let rows = sqlx::query_as::<_, JobRow>(&sql)
            .bind(status.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                SyncError::DatabaseError(format!("Failed to fetch jobs by status: {}", e))
            })?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    /// Count jobs in a given status
    pub async fn count_by_status(&self, status: JobStatus) -> Result<i64, SyncError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM jobs WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SyncError::DatabaseError(format!("Failed to count jobs: {}", e)))?;

        Ok(count.0)
    }
}

// Helper struct to map DB row to Job struct
#[derive(FromRow)]
struct JobRow {
    id: String,
    workflow_name: String,
    repo: String,
    branch: String,
    event_kind: String,
    commit_sha: Option<String>,
    request_id: Option<String>,
    status: String,
    started_at: String,
    completed_at: Option<String>,
    output: Option<String>,
    output_truncated: Option<bool>,
    error: Option<String>,
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        let status = JobStatus::parse(&row.status).unwrap_or(JobStatus::Failed);

        // Parse RFC 3339 datetime strings
        let started_at = DateTime::parse_from_rfc3339(&row.started_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        let completed_at = row.completed_at.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        });

        Job {
            id: row.id,
            workflow_name: row.workflow_name,
            repo: row.repo,
            branch: row.branch,
            event_kind: row.event_kind,
            commit_sha: row.commit_sha,
            request_id: row.request_id,
            status,
            started_at,
            completed_at,
            output: row.output,
            output_truncated: row.output_truncated.unwrap_or(false),
            error: row.error,
        }
    }
}
