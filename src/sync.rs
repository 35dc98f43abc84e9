//! Watermark-guarded synchronization of service templates

use async_trait::async_trait;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::aggregate::ErrorList;
use crate::error::{Result, SyncError};
use crate::event::Provider;
use crate::template::{CommitWatermark, SYSTEM_CREATOR, ServiceTemplate, SourceLocation, TemplateContent};

/// Read access to a source-control provider.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Latest commit reachable at the location's branch.
    async fn latest_commit(&self, location: &SourceLocation) -> Result<CommitWatermark>;

    /// Manifests found at the location.
    async fn fetch_content(&self, location: &SourceLocation) -> Result<TemplateContent>;
}

/// Template persistence.
///
/// `save` must be all-or-nothing and must reject a write whose revision
/// already exists, so that two racing syncs of one template cannot both
/// succeed.
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    /// Latest revision of every template with the given source and deploy type.
    async fn list_by_source_and_type(
        &self,
        source: Provider,
        deploy_type: &str,
    ) -> Result<Vec<ServiceTemplate>>;

    async fn save(&self, template: &ServiceTemplate) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Watermark already at the provider's latest commit
    Unchanged,
    Updated { revision: i64 },
}

/// Synchronizes templates of one provider.
pub struct SyncCoordinator {
    provider: Provider,
    client: Arc<dyn ProviderClient>,
    repository: Arc<dyn TemplateRepository>,
    timeout: Duration,
}

impl SyncCoordinator {
    pub fn new(
        provider: Provider,
        client: Arc<dyn ProviderClient>,
        repository: Arc<dyn TemplateRepository>,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            client,
            repository,
            timeout,
        }
    }

    /// Bring `template` up to the provider's latest commit.
    ///
    /// Content is only fetched and a new revision only written when the
    /// latest commit differs from the stored watermark. On any error nothing
    /// is written.
    pub async fn sync(&self, template: &ServiceTemplate) -> Result<SyncOutcome> {
        if template.source != self.provider {
            return Err(SyncError::SourceMismatch {
                service: template.service_name.clone(),
                expected: self.provider.to_string(),
                actual: template.source.to_string(),
            });
        }
        let location = template.location()?;

        let before = template.commit_sha();
        let mut refreshed = template.clone();
        refreshed.commit = Some(
            self.bounded("latest commit", self.client.latest_commit(&location))
                .await?,
        );
        let after = refreshed.commit_sha();

        if before == after {
            info!(
                "Before and after SHA: {} remains the same, no need to sync {}",
                before, template.service_name
            );
            return Ok(SyncOutcome::Unchanged);
        }
        info!(
            "Syncing service template {} from {} ({} -> {})",
            template.service_name, location, before, after
        );

        let content = self
            .bounded("fetch content", self.client.fetch_content(&location))
            .await?;
        if content.yaml.trim().is_empty() {
            return Err(SyncError::Validation(format!(
                "no manifests found at {} for service {}",
                location, template.service_name
            )));
        }

        refreshed.content = content;
        refreshed.revision = template.revision + 1;
        refreshed.created_by = SYSTEM_CREATOR.to_string();
        refreshed.updated_at = Utc::now();
        self.bounded("save template", self.repository.save(&refreshed))
            .await?;

        info!(
            "End of sync service template {} from {}, revision {}",
            refreshed.service_name, refreshed.src_path, refreshed.revision
        );
        Ok(SyncOutcome::Updated {
            revision: refreshed.revision,
        })
    }

    async fn bounded<T>(&self, operation: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout {
                operation: operation.to_string(),
                secs: self.timeout.as_secs(),
            }),
        }
    }
}

/// Sync every template concurrently, at most `max_concurrency` at a time.
///
/// Failures are appended to `errors` in template order. Dropping the returned
/// future aborts the syncs still in flight; finished saves stay.
pub async fn sync_all(
    coordinator: Arc<SyncCoordinator>,
    templates: Vec<ServiceTemplate>,
    max_concurrency: usize,
    errors: &mut ErrorList,
) -> Vec<(String, SyncOutcome)> {
    let permits = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (idx, template) in templates.into_iter().enumerate() {
        let coordinator = Arc::clone(&coordinator);
        let permits = Arc::clone(&permits);
        tasks.spawn(async move {
            let result = match permits.acquire_owned().await {
                Ok(_permit) => coordinator.sync(&template).await,
                Err(e) => Err(SyncError::Internal(e.to_string())),
            };
            (idx, template.service_name, result)
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(entry) => results.push(entry),
            Err(e) => {
                error!("Sync task failed to complete: {}", e);
                errors.append("sync", SyncError::Internal(e.to_string()));
            }
        }
    }
    results.sort_by_key(|(idx, _, _)| *idx);

    let mut synced = Vec::new();
    for (_, name, result) in results {
        match result {
            Ok(outcome) => synced.push((name, outcome)),
            Err(e) => {
                error!("Sync of service template {} failed: {}", name, e);
                errors.append(format!("sync {}", name), e);
            }
        }
    }
    synced
}
