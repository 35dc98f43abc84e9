//! Webhook intake: authenticate, normalize, then sync templates and trigger workflows

use axum::http::HeaderMap;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::aggregate::{BatchError, ErrorList};
use crate::error::{SyncError, WebhookError};
use crate::event::{CanonicalEvent, Provider, PushEvent};
use crate::impact::affected_templates;
use crate::providers::{self, Normalized};
use crate::sync::{ProviderClient, SyncCoordinator, TemplateRepository, sync_all};
use crate::trigger::WorkflowTrigger;
use crate::user::{UserRegistry, WebhookUser};
use crate::utils::forwarded_base_uri;

/// Everything one webhook delivery needs; built once at startup.
#[derive(Clone)]
pub struct HookContext {
    pub secret: String,
    pub deploy_type: String,
    pub timeout: Duration,
    pub max_concurrency: usize,
    pub templates: Arc<dyn TemplateRepository>,
    pub users: Arc<dyn UserRegistry>,
    pub clients: HashMap<Provider, Arc<dyn ProviderClient>>,
    pub trigger: Arc<dyn WorkflowTrigger>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Processed {
    /// Event type not acted on; carries the hint that was received
    Skipped(String),
    Dispatched,
}

/// Handle one delivery.
///
/// Only a failed secret check stops early. Every other failure is collected
/// and returned together once both the sync and trigger sub-flows finished.
pub async fn process_webhook(
    ctx: &HookContext,
    provider: Provider,
    headers: &HeaderMap,
    body: &[u8],
    request_id: &str,
) -> Result<Processed, WebhookError> {
    if !providers::authenticate(provider, &ctx.secret, headers, body) {
        warn!("Rejected {} webhook {}: secret mismatch", provider, request_id);
        return Err(WebhookError::Authentication(format!(
            "{} webhook secret does not match",
            provider
        )));
    }

    let event_type = providers::event_type(provider, headers);
    let event = match providers::normalize(provider, &event_type, body) {
        Ok(Normalized::Event(event)) => event,
        Ok(Normalized::NotRecognized(hint)) => {
            info!("Ignoring {} event '{}'", provider, hint);
            return Ok(Processed::Skipped(hint));
        }
        Err(e) => {
            warn!("Request {}: unparseable {} payload: {}", request_id, provider, e);
            return Err(BatchError::single(format!("parse {} event", provider), e).into());
        }
    };

    let base_uri = forwarded_base_uri(headers);
    info!(
        "Request {}: {} {} event for {}/{} on '{}'",
        request_id,
        provider,
        event.kind(),
        event.repository().owner,
        event.repository().name,
        event.branch()
    );

    let sync_flow = async {
        let mut errors = ErrorList::new();
        if let CanonicalEvent::Push(push) = &event {
            if !push.commits.is_empty() {
                record_pusher(ctx, push, headers).await;
                sync_templates(ctx, push, &mut errors).await;
            }
        }
        errors
    };
    let trigger_flow = async {
        let dispatched = tokio::time::timeout(
            ctx.timeout,
            ctx.trigger.dispatch(&event, &base_uri, request_id),
        )
        .await;
        match dispatched {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout {
                operation: "trigger workflows".into(),
                secs: ctx.timeout.as_secs(),
            }),
        }
    };
    let (mut errors, triggered) = tokio::join!(sync_flow, trigger_flow);

    if let Err(e) = triggered {
        warn!("Request {}: trigger failed: {}", request_id, e);
        errors.append("trigger workflows", e);
    }
    errors.resolve()?;
    Ok(Processed::Dispatched)
}

/// Best-effort: a failed upsert is logged and never reported.
async fn record_pusher(ctx: &HookContext, push: &PushEvent, headers: &HeaderMap) {
    let domain = headers
        .get("X-Forwarded-Host")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let Some(user) = WebhookUser::from_push(push, domain, Utc::now().timestamp()) else {
        return;
    };
    match tokio::time::timeout(ctx.timeout, ctx.users.upsert(&user)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Failed to record webhook user {}: {}", user.email, e),
        Err(_) => warn!("Timed out recording webhook user {}", user.email),
    }
}

async fn sync_templates(ctx: &HookContext, push: &PushEvent, errors: &mut ErrorList) {
    let Some(client) = ctx.clients.get(&push.provider) else {
        errors.append(
            "sync templates",
            SyncError::Internal(format!("no client configured for {}", push.provider)),
        );
        return;
    };

    let listed = tokio::time::timeout(
        ctx.timeout,
        ctx.templates
            .list_by_source_and_type(push.provider, &ctx.deploy_type),
    )
    .await;
    let templates = match listed {
        Ok(Ok(templates)) => templates,
        Ok(Err(e)) => {
            errors.append("list templates", e);
            return;
        }
        Err(_) => {
            errors.append(
                "list templates",
                SyncError::Timeout {
                    operation: "list templates".into(),
                    secs: ctx.timeout.as_secs(),
                },
            );
            return;
        }
    };

    let affected = affected_templates(push, templates, errors);
    if affected.is_empty() {
        return;
    }

    let coordinator = Arc::new(SyncCoordinator::new(
        push.provider,
        Arc::clone(client),
        Arc::clone(&ctx.templates),
        ctx.timeout,
    ));
    let synced = sync_all(coordinator, affected, ctx.max_concurrency, errors).await;
    info!("Synced {} service template(s) for {}", synced.len(), push.repository.name);
}
