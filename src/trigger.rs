//! Hands normalized events to the workflow runner

use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::WorkflowConfig;
use crate::db::SqlJobStore;
use crate::error::{Result, SyncError};
use crate::event::CanonicalEvent;
use crate::job::{Job, JobStatus, truncate_output};
use crate::utils::matching_workflows;

/// Starts downstream workflows for an event.
#[async_trait]
pub trait WorkflowTrigger: Send + Sync {
    /// Returns once every matching workflow is accepted; the runs themselves
    /// continue in the background.
    async fn dispatch(&self, event: &CanonicalEvent, base_uri: &str, request_id: &str) -> Result<()>;
}

/// Runs the configured workflow scripts, one at a time, recording each run as a job.
pub struct ScriptWorkflowTrigger {
    workflows: Vec<WorkflowConfig>,
    job_store: SqlJobStore,
    execution_lock: Arc<Mutex<()>>,
}

/// Inputs of one script run, exported to the script as environment variables.
#[derive(Debug, Clone)]
struct RunContext {
    event_kind: String,
    repo: String,
    branch: String,
    commit_sha: String,
    base_uri: String,
    request_id: String,
}

impl RunContext {
    fn env(&self) -> [(&'static str, &str); 6] {
        [
            ("TRIGGER_EVENT", &self.event_kind),
            ("TRIGGER_REPO", &self.repo),
            ("TRIGGER_BRANCH", &self.branch),
            ("TRIGGER_COMMIT_SHA", &self.commit_sha),
            ("TRIGGER_BASE_URI", &self.base_uri),
            ("TRIGGER_REQUEST_ID", &self.request_id),
        ]
    }
}

impl ScriptWorkflowTrigger {
    pub fn new(workflows: Vec<WorkflowConfig>, job_store: SqlJobStore) -> Self {
        Self {
            workflows,
            job_store,
            execution_lock: Arc::new(Mutex::new(())),
        }
    }
}

#[async_trait]
impl WorkflowTrigger for ScriptWorkflowTrigger {
    async fn dispatch(&self, event: &CanonicalEvent, base_uri: &str, request_id: &str) -> Result<()> {
        let repo = &event.repository().name;
        let branch = event.branch();
        let kind = event.kind();

        let matched: Vec<&WorkflowConfig> =
            matching_workflows(&self.workflows, repo, branch, kind).collect();
        if matched.is_empty() {
            info!(
                "No workflow for {} event on repo '{}' branch '{}', skipping.",
                kind, repo, branch
            );
            return Ok(());
        }

        let ctx = RunContext {
            event_kind: kind.to_string(),
            repo: repo.clone(),
            branch: branch.to_string(),
            commit_sha: event.head_sha().to_string(),
            base_uri: base_uri.to_string(),
            request_id: request_id.to_string(),
        };

        for workflow in matched {
            let job = Job::new(
                workflow.name.clone(),
                ctx.repo.clone(),
                ctx.branch.clone(),
                ctx.event_kind.clone(),
                Some(ctx.commit_sha.clone()).filter(|s| !s.is_empty()),
                Some(ctx.request_id.clone()),
            );
            self.job_store.create_job(&job).await.map_err(|e| {
                SyncError::Trigger(format!("workflow '{}' not started: {}", workflow.name, e))
            })?;
            info!(
                "Created job {} for workflow '{}' ({} on '{}')",
                job.id, workflow.name, ctx.event_kind, ctx.branch
            );

            let script = workflow.get_run_script_for_branch(&ctx.branch).to_string();
            let working_dir = workflow.working_dir.clone();
            let store = self.job_store.clone();
            let lock = self.execution_lock.clone();
            let ctx = ctx.clone();
            let job_id = job.id;

            tokio::spawn(async move {
                // Only one workflow script runs at a time.
                let _guard = lock.lock().await;

                if let Err(e) = store.update_job_status(&job_id, JobStatus::Running).await {
                    error!("Failed to update job status to running: {}", e);
                    return;
                }

                let (status, mut output, failure) =
                    match run_script(&script, working_dir.as_ref(), &ctx).await {
                        Ok(output) => {
                            info!("Job {} completed successfully.", job_id);
                            (JobStatus::Success, output, None)
                        }
                        Err((output, e)) => {
                            error!("Job {} failed: {}", job_id, e);
                            (JobStatus::Failed, output, Some(e))
                        }
                    };
                let truncated = truncate_output(&mut output);
                if let Err(e) = store
                    .complete_job(&job_id, status, Some(output), truncated, failure, Utc::now())
                    .await
                {
                    error!("Failed to record completion of job {}: {}", job_id, e);
                }
            });
        }
        Ok(())
    }
}

/// Run a script (split by whitespace for command + args) and capture its output.
async fn run_script(
    run_script: &str,
    working_dir: Option<&PathBuf>,
    ctx: &RunContext,
) -> std::result::Result<String, (String, String)> {
    let mut parts = run_script.split_whitespace();
    let Some(program) = parts.next() else {
        return Err((String::new(), "run_script is empty".to_string()));
    };
    let args: Vec<&str> = parts.collect();

    info!("Running (cwd = {:?}): {}", working_dir, run_script);
    let mut cmd = Command::new(program);
    cmd.args(&args).envs(ctx.env());
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }

    let output = cmd
        .output()
        .await
        .map_err(|e| (String::new(), format!("run_script failed to start: {}", e)))?;

    let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.is_empty() {
        combined.push_str(&stderr);
    }

    if output.status.success() {
        Ok(combined)
    } else {
        warn!("run_script exited with {}", output.status);
        Err((combined, format!("run_script exited with {}", output.status)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::event::{Commit, Provider, PushEvent, Repository};
    use std::time::Duration;

    fn push(repo: &str, branch: &str) -> CanonicalEvent {
        CanonicalEvent::Push(PushEvent {
            provider: Provider::Gitlab,
            git_ref: format!("refs/heads/{branch}"),
            before: "0000".into(),
            after: "abc123".into(),
            repository: Repository {
                owner: "team".into(),
                name: repo.into(),
                clone_url: None,
            },
            commits: vec![Commit::default()],
        })
    }

    fn workflow(script: &str) -> WorkflowConfig {
        WorkflowConfig {
            name: "deploy".into(),
            repo: "shop".into(),
            branches: vec!["main".into()],
            run_script: script.into(),
            branch_scripts: None,
            working_dir: None,
            events: vec!["push".into()],
        }
    }

    async fn wait_for_completion(store: &SqlJobStore) -> Job {
        for _ in 0..100 {
            let jobs = store.get_recent_jobs(1).await.unwrap();
            if let Some(job) = jobs.into_iter().next() {
                if job.completed_at.is_some() {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("job did not complete");
    }

    #[tokio::test]
    async fn matching_push_runs_script_and_records_job() {
        let store = SqlJobStore::new(memory_pool().await.unwrap());
        let trigger = ScriptWorkflowTrigger::new(vec![workflow("echo deployed")], store.clone());

        trigger
            .dispatch(&push("shop", "main"), "https://cd.example.com", "req-1")
            .await
            .unwrap();

        let job = wait_for_completion(&store).await;
        assert_eq!(job.status, JobStatus::Success);
        assert_eq!(job.workflow_name, "deploy");
        assert_eq!(job.commit_sha.as_deref(), Some("abc123"));
        assert_eq!(job.request_id.as_deref(), Some("req-1"));
        assert!(job.output.unwrap().contains("deployed"));
    }

    #[tokio::test]
    async fn failing_script_marks_job_failed() {
        let store = SqlJobStore::new(memory_pool().await.unwrap());
        let trigger = ScriptWorkflowTrigger::new(vec![workflow("false")], store.clone());

        trigger.dispatch(&push("shop", "main"), "", "req-2").await.unwrap();

        let job = wait_for_completion(&store).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.is_some());
    }

    #[tokio::test]
    async fn unmatched_event_creates_no_job() {
        let store = SqlJobStore::new(memory_pool().await.unwrap());
        let trigger = ScriptWorkflowTrigger::new(vec![workflow("echo hi")], store.clone());

        trigger.dispatch(&push("shop", "dev"), "", "r").await.unwrap();
        trigger.dispatch(&push("cart", "main"), "", "r").await.unwrap();

        assert!(store.get_recent_jobs(10).await.unwrap().is_empty());
    }

    #[test]
    fn run_context_exports_event_fields() {
        let ctx = RunContext {
            event_kind: "tag".into(),
            repo: "shop".into(),
            branch: "v1.0".into(),
            commit_sha: "abc".into(),
            base_uri: "https://cd".into(),
            request_id: "id".into(),
        };
        let env = ctx.env();
        assert!(env.contains(&("TRIGGER_EVENT", "tag")));
        assert!(env.contains(&("TRIGGER_BASE_URI", "https://cd")));
    }
}
