use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum size for job output before truncation (1MB)
pub const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// Represents the status of a triggered workflow run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Success,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "queued" => Some(JobStatus::Queued),
            "running" => Some(JobStatus::Running),
            "success" => Some(JobStatus::Success),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// One workflow run started by a webhook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub workflow_name: String,
    pub repo: String,
    pub branch: String,
    pub event_kind: String,
    pub commit_sha: Option<String>,
    pub request_id: Option<String>,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output: Option<String>,
    pub output_truncated: bool,
    pub error: Option<String>,
}

impl Job {
    /// Create a new job in Queued status
    pub fn new(
        workflow_name: String,
        repo: String,
        branch: String,
        event_kind: String,
        commit_sha: Option<String>,
        request_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            workflow_name,
            repo,
            branch,
            event_kind,
            commit_sha,
            request_id,
            status: JobStatus::Queued,
            started_at: Utc::now(),
            completed_at: None,
            output: None,
            output_truncated: false,
            error: None,
        }
    }
}

/// Truncate output past [`MAX_OUTPUT_SIZE`], returning whether it was cut.
pub fn truncate_output(output: &mut String) -> bool {
    if output.len() <= MAX_OUTPUT_SIZE {
        return false;
    }
    let mut cut = MAX_OUTPUT_SIZE;
    while !output.is_char_boundary(cut) {
        cut -= 1;
    }
    output.truncate(cut);
    output.push_str("\n... (output truncated)");
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parse_round_trips() {
        for status in [
            JobStatus::Queued,
            JobStatus::Running,
            JobStatus::Success,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("RUNNING"), Some(JobStatus::Running));
        assert_eq!(JobStatus::parse("paused"), None);
    }

    #[test]
    fn truncates_large_output_on_char_boundary() {
        let mut small = "ok".to_string();
        assert!(!truncate_output(&mut small));
        assert_eq!(small, "ok");

        let mut big = "é".repeat(MAX_OUTPUT_SIZE);
        assert!(truncate_output(&mut big));
        assert!(big.ends_with("(output truncated)"));
        assert!(big.len() <= MAX_OUTPUT_SIZE + 32);
    }
}
