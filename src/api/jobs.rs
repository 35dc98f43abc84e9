//! Jobs API endpoints

use axum::{
    Json,
    extract::{Path, Query, State as AxumState},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::SharedState;
use crate::job::{Job, JobStatus};

/// Query parameters for job listing
#[derive(Debug, Deserialize)]
pub struct JobsQuery {
    /// Filter by workflow name
    pub workflow: Option<String>,
    /// Filter by status (queued, running, success, failed)
    pub status: Option<String>,
    /// Number of items (default: 50, max: 100)
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct JobsResponse {
    pub jobs: Vec<Job>,
    pub total: i64,
    pub limit: i64,
}

/// GET /api/jobs - Recent workflow runs with filters
pub async fn get_jobs(
    AxumState(state): AxumState<SharedState>,
    Query(params): Query<JobsQuery>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(50).clamp(1, 100);

    let result = if let Some(workflow) = &params.workflow {
        state.job_store.get_jobs_by_workflow(workflow, limit).await
    } else if let Some(status_str) = &params.status {
        let Some(status) = JobStatus::parse(status_str) else {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "Invalid status. Use: queued, running, success, failed"})),
            )
                .into_response();
        };
        state.job_store.get_jobs_by_status(status, limit).await
    } else {
        state.job_store.get_recent_jobs(limit).await
    };

    match result {
        Ok(jobs) => {
            let total = jobs.len() as i64;
            Json(JobsResponse { jobs, total, limit }).into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

/// GET /api/jobs/{id} - Get a specific job by ID
pub async fn get_job(
    AxumState(state): AxumState<SharedState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.job_store.get_job(&id).await {
        Ok(Some(job)) => Json(job).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Job not found"})),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}
