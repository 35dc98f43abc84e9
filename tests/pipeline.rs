use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use template_sync::db::{SqlTemplateStore, SqlUserRegistry, memory_pool};
use template_sync::error::{Result, SyncError, WebhookError};
use template_sync::event::{CanonicalEvent, Provider};
use template_sync::pipeline::{HookContext, Processed, process_webhook};
use template_sync::sync::{ProviderClient, TemplateRepository};
use template_sync::template::{CommitWatermark, ServiceTemplate, SourceLocation, TemplateContent};
use template_sync::trigger::WorkflowTrigger;
use template_sync::utils::sign_github_payload;

/// Upstream whose branch head can be moved between deliveries.
struct MovingHead {
    head: Mutex<String>,
    broken: Vec<String>,
}

#[async_trait]
impl ProviderClient for MovingHead {
    async fn latest_commit(&self, location: &SourceLocation) -> Result<CommitWatermark> {
        if self.broken.contains(&location.path) {
            return Err(SyncError::ProviderQuery {
                operation: "latest commit".into(),
                message: "503".into(),
            });
        }
        Ok(CommitWatermark {
            sha: self.head.lock().await.clone(),
            ..Default::default()
        })
    }

    async fn fetch_content(&self, location: &SourceLocation) -> Result<TemplateContent> {
        Ok(TemplateContent {
            yaml: format!("kind: Deployment # {}", location.path),
            files: vec![format!("{}/deploy.yaml", location.path)],
        })
    }
}

#[derive(Default)]
struct Dispatched(Mutex<Vec<String>>);

#[async_trait]
impl WorkflowTrigger for Dispatched {
    async fn dispatch(&self, event: &CanonicalEvent, _base_uri: &str, _request_id: &str) -> Result<()> {
        self.0.lock().await.push(event.kind().to_string());
        Ok(())
    }
}

struct Setup {
    ctx: HookContext,
    store: SqlTemplateStore,
    users: SqlUserRegistry,
    upstream: Arc<MovingHead>,
    trigger: Arc<Dispatched>,
}

async fn setup(secret: &str, broken: &[&str]) -> Setup {
    let pool = memory_pool().await.unwrap();
    let store = SqlTemplateStore::new(pool.clone());
    let users = SqlUserRegistry::new(pool);
    let upstream = Arc::new(MovingHead {
        head: Mutex::new("c1".into()),
        broken: broken.iter().map(|s| s.to_string()).collect(),
    });
    let trigger = Arc::new(Dispatched::default());

    let mut clients: HashMap<Provider, Arc<dyn ProviderClient>> = HashMap::new();
    clients.insert(Provider::Gitlab, upstream.clone());
    clients.insert(Provider::Github, upstream.clone());

    let ctx = HookContext {
        secret: secret.into(),
        deploy_type: "k8s".into(),
        timeout: Duration::from_secs(5),
        max_concurrency: 4,
        templates: Arc::new(store.clone()),
        users: Arc::new(users.clone()),
        clients,
        trigger: trigger.clone(),
    };
    Setup {
        ctx,
        store,
        users,
        upstream,
        trigger,
    }
}

async fn register(store: &SqlTemplateStore, provider: Provider, name: &str, host: &str) {
    let src = match provider {
        Provider::Gitlab => format!("https://{host}/team/mono/-/tree/main/{name}"),
        _ => format!("https://{host}/team/mono/tree/main/{name}"),
    };
    store
        .save(&ServiceTemplate::new(name, "shop", provider, src, "admin"))
        .await
        .unwrap();
}

fn gitlab_push(files: &[&str]) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "ref": "refs/heads/main",
        "before": "c0",
        "after": "c1",
        "project": {"path_with_namespace": "team/mono"},
        "commits": [{
            "id": "c1",
            "message": "change",
            "author": {"name": "Dev", "email": "dev@example.com"},
            "modified": files
        }]
    }))
    .unwrap()
}

fn gitlab_headers(event: &str, token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("X-Gitlab-Event", HeaderValue::from_str(event).unwrap());
    headers.insert("X-Gitlab-Token", HeaderValue::from_str(token).unwrap());
    headers.insert("X-Forwarded-Proto", HeaderValue::from_static("https"));
    headers.insert("X-Forwarded-Host", HeaderValue::from_static("cd.example.com"));
    headers
}

#[tokio::test]
async fn redelivery_without_upstream_change_writes_nothing() {
    let s = setup("tok", &[]).await;
    register(&s.store, Provider::Gitlab, "service-a", "gitlab.example.com").await;
    let body = gitlab_push(&["service-a/Dockerfile"]);
    let headers = gitlab_headers("Push Hook", "tok");

    let first = process_webhook(&s.ctx, Provider::Gitlab, &headers, &body, "r1").await;
    assert_eq!(first.unwrap(), Processed::Dispatched);
    let second = process_webhook(&s.ctx, Provider::Gitlab, &headers, &body, "r2").await;
    assert_eq!(second.unwrap(), Processed::Dispatched);

    let history = s.store.revisions("service-a").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].revision, 2);
    assert_eq!(history[0].commit_sha(), "c1");
    assert_eq!(history[0].created_by, "system");
    assert_eq!(s.users.count().await.unwrap(), 1);
    assert_eq!(s.trigger.0.lock().await.len(), 2);
}

#[tokio::test]
async fn revision_advances_by_one_across_skipped_commits() {
    let s = setup("", &[]).await;
    register(&s.store, Provider::Gitlab, "service-a", "gitlab.example.com").await;
    let headers = gitlab_headers("Push Hook", "");

    process_webhook(&s.ctx, Provider::Gitlab, &headers, &gitlab_push(&["service-a/x"]), "r1")
        .await
        .unwrap();
    *s.upstream.head.lock().await = "c9".into();
    process_webhook(&s.ctx, Provider::Gitlab, &headers, &gitlab_push(&["service-a/x"]), "r2")
        .await
        .unwrap();

    let latest = s.store.get_latest("service-a").await.unwrap().unwrap();
    assert_eq!(latest.revision, 3);
    assert_eq!(latest.commit_sha(), "c9");
}

#[tokio::test]
async fn one_broken_template_does_not_block_siblings() {
    let s = setup("", &["service-b"]).await;
    for name in ["service-a", "service-b", "service-c"] {
        register(&s.store, Provider::Gitlab, name, "gitlab.example.com").await;
    }

    let err = process_webhook(
        &s.ctx,
        Provider::Gitlab,
        &gitlab_headers("Push Hook", ""),
        &gitlab_push(&["service-a/x", "service-b/x", "service-c/x"]),
        "r",
    )
    .await
    .unwrap_err();

    let WebhookError::Failed(batch) = err else {
        panic!("expected aggregated failure");
    };
    assert_eq!(batch.len(), 1);
    assert!(batch.to_string().starts_with("1 error occurred:"));
    assert_eq!(s.store.get_latest("service-a").await.unwrap().unwrap().revision, 2);
    assert_eq!(s.store.get_latest("service-b").await.unwrap().unwrap().revision, 1);
    assert_eq!(s.store.get_latest("service-c").await.unwrap().unwrap().revision, 2);
    assert_eq!(s.trigger.0.lock().await.len(), 1);
}

#[tokio::test]
async fn templates_of_other_providers_are_untouched() {
    let s = setup("", &[]).await;
    register(&s.store, Provider::Gitlab, "service-a", "gitlab.example.com").await;
    register(&s.store, Provider::Github, "service-a-gh", "github.com").await;

    process_webhook(
        &s.ctx,
        Provider::Gitlab,
        &gitlab_headers("Push Hook", ""),
        &gitlab_push(&["service-a/x", "service-a-gh/x"]),
        "r",
    )
    .await
    .unwrap();

    assert_eq!(s.store.get_latest("service-a-gh").await.unwrap().unwrap().revision, 1);
}

#[tokio::test]
async fn github_push_requires_valid_signature() {
    let s = setup("hook-secret", &[]).await;
    register(&s.store, Provider::Github, "service-a", "github.com").await;
    let body = serde_json::to_vec(&json!({
        "ref": "refs/heads/main",
        "before": "c0",
        "after": "c1",
        "repository": {"name": "mono", "owner": {"login": "team"}},
        "commits": [{
            "id": "c1",
            "message": "change",
            "author": {"name": "Dev", "email": "dev@example.com"},
            "modified": ["service-a/app.yaml"]
        }]
    }))
    .unwrap();

    let mut headers = HeaderMap::new();
    headers.insert("X-GitHub-Event", HeaderValue::from_static("push"));
    headers.insert("X-Hub-Signature-256", HeaderValue::from_static("sha256=00"));
    let rejected = process_webhook(&s.ctx, Provider::Github, &headers, &body, "r").await;
    assert!(matches!(rejected, Err(WebhookError::Authentication(_))));
    assert!(s.trigger.0.lock().await.is_empty());

    let signature = sign_github_payload("hook-secret", &body).unwrap();
    headers.insert(
        "X-Hub-Signature-256",
        HeaderValue::from_str(&signature).unwrap(),
    );
    let accepted = process_webhook(&s.ctx, Provider::Github, &headers, &body, "r").await;
    assert_eq!(accepted.unwrap(), Processed::Dispatched);
    assert_eq!(s.store.get_latest("service-a").await.unwrap().unwrap().revision, 2);
}

#[tokio::test]
async fn tag_push_only_triggers() {
    let s = setup("", &[]).await;
    register(&s.store, Provider::Gitlab, "service-a", "gitlab.example.com").await;

    let result = process_webhook(
        &s.ctx,
        Provider::Gitlab,
        &gitlab_headers("Tag Push Hook", ""),
        &serde_json::to_vec(&json!({
            "ref": "refs/tags/v1.0.0",
            "after": "c1",
            "project": {"path_with_namespace": "team/mono"},
            "commits": []
        }))
        .unwrap(),
        "r",
    )
    .await;

    assert_eq!(result.unwrap(), Processed::Dispatched);
    assert_eq!(*s.trigger.0.lock().await, vec!["tag".to_string()]);
    assert_eq!(s.store.get_latest("service-a").await.unwrap().unwrap().revision, 1);
}
