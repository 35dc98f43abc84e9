//! In-memory collaborators shared by unit tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::{Result, SyncError};
use crate::event::{CanonicalEvent, Provider};
use crate::sync::{ProviderClient, TemplateRepository};
use crate::template::{CommitWatermark, ServiceTemplate, SourceLocation, TemplateContent};
use crate::trigger::WorkflowTrigger;
use crate::user::{UserRegistry, WebhookUser};

pub fn template(name: &str, sub_path: &str) -> ServiceTemplate {
    ServiceTemplate::new(
        name,
        "shop",
        Provider::Codehub,
        format!("https://codehub.example.com/team/mono/tree/main/{sub_path}"),
        "admin",
    )
}

#[derive(Default)]
struct ProviderState {
    head: String,
    fail_latest: HashSet<String>,
    fail_fetch: HashSet<String>,
    empty: HashSet<String>,
    delay: Option<Duration>,
    slow: HashMap<String, Duration>,
    latest_calls: usize,
    fetch_calls: usize,
}

/// Provider whose every location sits at the same head commit.
/// Failures are configured per location sub-path.
#[derive(Default)]
pub struct FakeProvider {
    state: Mutex<ProviderState>,
}

impl FakeProvider {
    pub fn with_head(sha: &str) -> Self {
        let provider = Self::default();
        provider.state.try_lock().unwrap().head = sha.to_string();
        provider
    }

    pub async fn set_head(&self, sha: &str) {
        self.state.lock().await.head = sha.to_string();
    }

    pub async fn fail_latest(&self, path: &str) {
        self.state.lock().await.fail_latest.insert(path.to_string());
    }

    pub async fn fail_fetch(&self, path: &str) {
        self.state.lock().await.fail_fetch.insert(path.to_string());
    }

    pub async fn empty_content(&self, path: &str) {
        self.state.lock().await.empty.insert(path.to_string());
    }

    pub async fn set_delay(&self, delay: Duration) {
        self.state.lock().await.delay = Some(delay);
    }

    /// Delays only the head lookup for one sub-path.
    pub async fn slow_path(&self, path: &str, delay: Duration) {
        self.state.lock().await.slow.insert(path.to_string(), delay);
    }

    pub async fn latest_calls(&self) -> usize {
        self.state.lock().await.latest_calls
    }

    pub async fn fetch_calls(&self) -> usize {
        self.state.lock().await.fetch_calls
    }
}

#[async_trait]
impl ProviderClient for FakeProvider {
    async fn latest_commit(&self, location: &SourceLocation) -> Result<CommitWatermark> {
        let (delay, outcome) = {
            let mut state = self.state.lock().await;
            state.latest_calls += 1;
            let outcome = if state.fail_latest.contains(&location.path) {
                Err(SyncError::ProviderQuery {
                    operation: "latest commit".into(),
                    message: format!("{} unreachable", location.path),
                })
            } else {
                Ok(CommitWatermark {
                    sha: state.head.clone(),
                    message: Some("update".into()),
                    author: Some("dev".into()),
                    committed_at: None,
                })
            };
            let delay = state.slow.get(&location.path).copied().or(state.delay);
            (delay, outcome)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        outcome
    }

    async fn fetch_content(&self, location: &SourceLocation) -> Result<TemplateContent> {
        let mut state = self.state.lock().await;
        state.fetch_calls += 1;
        if state.fail_fetch.contains(&location.path) {
            return Err(SyncError::ProviderQuery {
                operation: "fetch content".into(),
                message: format!("{} unreadable", location.path),
            });
        }
        if state.empty.contains(&location.path) {
            return Ok(TemplateContent::default());
        }
        Ok(TemplateContent {
            yaml: format!("kind: Deployment\n# {}@{}\n", location.path, state.head),
            files: vec![format!("{}/deploy.yaml", location.path)],
        })
    }
}

/// Revision-history store mirroring the SQLite repository's conflict rule.
#[derive(Default)]
pub struct MemoryTemplates {
    rows: Mutex<Vec<ServiceTemplate>>,
    saves: Mutex<usize>,
    list_delay: Mutex<Option<Duration>>,
    list_fails: Mutex<bool>,
}

impl MemoryTemplates {
    pub async fn insert(&self, template: ServiceTemplate) {
        self.rows.lock().await.push(template);
    }

    pub async fn latest(&self, name: &str) -> Option<ServiceTemplate> {
        self.rows
            .lock()
            .await
            .iter()
            .filter(|t| t.service_name == name)
            .max_by_key(|t| t.revision)
            .cloned()
    }

    pub async fn delay_listing(&self, delay: Duration) {
        *self.list_delay.lock().await = Some(delay);
    }

    pub async fn fail_listing(&self) {
        *self.list_fails.lock().await = true;
    }

    pub async fn save_calls(&self) -> usize {
        *self.saves.lock().await
    }
}

#[async_trait]
impl TemplateRepository for MemoryTemplates {
    async fn list_by_source_and_type(
        &self,
        source: Provider,
        deploy_type: &str,
    ) -> Result<Vec<ServiceTemplate>> {
        let delay = *self.list_delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.list_fails.lock().await {
            return Err(SyncError::DatabaseError("templates table unreadable".into()));
        }
        let rows = self.rows.lock().await;
        let mut names: Vec<&str> = Vec::new();
        for row in rows.iter() {
            if !names.contains(&row.service_name.as_str()) {
                names.push(&row.service_name);
            }
        }
        Ok(names
            .into_iter()
            .filter_map(|name| {
                rows.iter()
                    .filter(|t| t.service_name == name)
                    .max_by_key(|t| t.revision)
                    .cloned()
            })
            .filter(|t| t.source == source && t.deploy_type == deploy_type)
            .collect())
    }

    async fn save(&self, template: &ServiceTemplate) -> Result<()> {
        *self.saves.lock().await += 1;
        let mut rows = self.rows.lock().await;
        if rows
            .iter()
            .any(|t| t.service_name == template.service_name && t.revision == template.revision)
        {
            return Err(SyncError::Persistence(format!(
                "revision {} of {} already exists",
                template.revision, template.service_name
            )));
        }
        rows.push(template.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingUsers {
    pub upserts: Mutex<Vec<WebhookUser>>,
    pub fail: bool,
}

#[async_trait]
impl UserRegistry for RecordingUsers {
    async fn upsert(&self, user: &WebhookUser) -> Result<()> {
        self.upserts.lock().await.push(user.clone());
        if self.fail {
            return Err(SyncError::DatabaseError("users table locked".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingTrigger {
    pub dispatched: Mutex<Vec<(CanonicalEvent, String, String)>>,
    pub fail: bool,
    pub delay: Option<Duration>,
}

#[async_trait]
impl WorkflowTrigger for RecordingTrigger {
    async fn dispatch(&self, event: &CanonicalEvent, base_uri: &str, request_id: &str) -> Result<()> {
        self.dispatched
            .lock()
            .await
            .push((event.clone(), base_uri.to_string(), request_id.to_string()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(SyncError::Trigger("workflow engine unavailable".into()));
        }
        Ok(())
    }
}
