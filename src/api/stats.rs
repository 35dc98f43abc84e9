//! Health and status endpoints

use axum::{Json, extract::State as AxumState, response::IntoResponse};
use serde_json::json;

use crate::SharedState;
use crate::job::JobStatus;
use crate::pipeline::HookContext;

/// Providers with a configured client, sorted by name
fn configured_providers(hooks: &HookContext) -> Vec<&'static str> {
    let mut providers: Vec<&'static str> = hooks.clients.keys().map(|p| p.as_str()).collect();
    providers.sort_unstable();
    providers
}

/// GET / - Health check
pub async fn root() -> &'static str {
    "template_sync is running"
}

/// GET /status - Server summary with template and job counts
pub async fn status(AxumState(state): AxumState<SharedState>) -> impl IntoResponse {
    let templates = state
        .templates
        .list_latest()
        .await
        .map(|t| t.len())
        .unwrap_or(0);

    let mut jobs = serde_json::Map::new();
    for status in [
        JobStatus::Queued,
        JobStatus::Running,
        JobStatus::Success,
        JobStatus::Failed,
    ] {
        let count = state.job_store.count_by_status(status).await.unwrap_or(0);
        jobs.insert(status.as_str().to_string(), json!(count));
    }
    let recent = state.job_store.get_recent_jobs(10).await.unwrap_or_default();

    let providers = configured_providers(&state.hooks);

    Json(json!({
        "server": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "started_at": state.started_at,
            "uptime_seconds": state.start_time.elapsed().as_secs(),
        },
        "sync": {
            "deploy_type": state.hooks.deploy_type,
            "providers": providers,
            "templates": templates,
        },
        "jobs": {
            "counts": jobs,
            "recent": recent,
        },
        "config": {
            "total_workflows": state.config.workflow.len(),
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_state;
    use crate::event::Provider;
    use crate::fakes::{FakeProvider, RecordingTrigger};
    use crate::sync::ProviderClient;
    use axum::http::StatusCode;
    use std::sync::Arc;

    #[tokio::test]
    async fn status_reports_counts() {
        let state = test_state("", Arc::new(RecordingTrigger::default())).await;
        let resp = status(AxumState(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn providers_are_listed_in_name_order() {
        let state = test_state("", Arc::new(RecordingTrigger::default())).await;
        let mut hooks = state.hooks.clone();
        let client: Arc<dyn ProviderClient> = Arc::new(FakeProvider::default());
        for provider in [Provider::Gitlab, Provider::Github, Provider::Codehub] {
            hooks.clients.insert(provider, client.clone());
        }
        assert_eq!(configured_providers(&hooks), vec!["codehub", "github", "gitlab"]);
    }
}
