//! HTTP handlers for webhook intake and the read/register API

pub mod jobs;
pub mod stats;
pub mod templates;
pub mod webhook;

use axum::{Router, routing};

use crate::SharedState;

// Re-export handlers
pub use jobs::{get_job, get_jobs};
pub use stats::{root, status};
pub use templates::{create_template, get_template_revisions, get_templates};
pub use webhook::handle_webhook;

/// All routes of the service.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", routing::get(root))
        .route("/status", routing::get(status))
        .route("/api/webhook/{provider}", routing::post(handle_webhook))
        .route("/api/templates", routing::get(get_templates).post(create_template))
        .route("/api/templates/{name}/revisions", routing::get(get_template_revisions))
        .route("/api/jobs", routing::get(get_jobs))
        .route("/api/jobs/{id}", routing::get(get_job))
        .with_state(state)
}

#[cfg(test)]
pub(crate) async fn test_state(
    secret: &str,
    trigger: std::sync::Arc<dyn crate::trigger::WorkflowTrigger>,
) -> SharedState {
    use crate::db::{SqlJobStore, SqlTemplateStore, memory_pool};
    use crate::fakes::RecordingUsers;
    use crate::pipeline::HookContext;
    use crate::{AppState, SyncConfig};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    let pool = memory_pool().await.unwrap();
    let templates = SqlTemplateStore::new(pool.clone());
    let hooks = HookContext {
        secret: secret.to_string(),
        deploy_type: crate::template::K8S_DEPLOY_TYPE.to_string(),
        timeout: Duration::from_secs(5),
        max_concurrency: 2,
        templates: Arc::new(templates.clone()),
        users: Arc::new(RecordingUsers::default()),
        clients: HashMap::new(),
        trigger,
    };
    Arc::new(AppState {
        config: SyncConfig::default(),
        hooks,
        templates,
        job_store: SqlJobStore::new(pool),
        start_time: Instant::now(),
        started_at: chrono::Utc::now(),
    })
}
