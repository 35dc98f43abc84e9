//! Service template API endpoints

use axum::{
    Json,
    extract::{Path, State as AxumState},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::SharedState;
use crate::event::Provider;
use crate::sync::TemplateRepository;
use crate::template::{ServiceTemplate, SourceLocation};

/// Body of a template registration
#[derive(Debug, Deserialize)]
pub struct NewTemplate {
    pub service_name: String,
    pub product_name: String,
    pub source: Provider,
    pub src_path: String,
    /// Defaults to the configured sync deploy type
    pub deploy_type: Option<String>,
    pub created_by: Option<String>,
}

fn internal_error(e: impl ToString) -> axum::response::Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": e.to_string()})),
    )
        .into_response()
}

/// GET /api/templates - Latest revision of every template
pub async fn get_templates(AxumState(state): AxumState<SharedState>) -> impl IntoResponse {
    match state.templates.list_latest().await {
        Ok(templates) => Json(json!({
            "templates": templates,
            "count": templates.len(),
        }))
        .into_response(),
        Err(e) => internal_error(e),
    }
}

/// POST /api/templates - Register a template at revision 1, not yet synced
pub async fn create_template(
    AxumState(state): AxumState<SharedState>,
    Json(body): Json<NewTemplate>,
) -> impl IntoResponse {
    if body.service_name.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "service_name must be non-empty"})),
        )
            .into_response();
    }
    if let Err(e) = SourceLocation::parse(&body.src_path) {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": e.to_string()}))).into_response();
    }

    match state.templates.get_latest(&body.service_name).await {
        Ok(Some(_)) => {
            return (
                StatusCode::CONFLICT,
                Json(json!({"error": format!("template '{}' already exists", body.service_name)})),
            )
                .into_response();
        }
        Ok(None) => {}
        Err(e) => return internal_error(e),
    }

    let mut template = ServiceTemplate::new(
        body.service_name,
        body.product_name,
        body.source,
        body.src_path,
        body.created_by.unwrap_or_else(|| "api".to_string()),
    );
    template.deploy_type = body
        .deploy_type
        .unwrap_or_else(|| state.config.sync.deploy_type.clone());

    match state.templates.save(&template).await {
        Ok(()) => {
            info!(
                "Registered service template {} ({} from {})",
                template.service_name, template.deploy_type, template.src_path
            );
            (StatusCode::CREATED, Json(template)).into_response()
        }
        Err(e) => (StatusCode::CONFLICT, Json(json!({"error": e.to_string()}))).into_response(),
    }
}

/// GET /api/templates/{name}/revisions - Revision history, newest first
pub async fn get_template_revisions(
    AxumState(state): AxumState<SharedState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.templates.revisions(&name).await {
        Ok(revisions) if revisions.is_empty() => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Template not found"})),
        )
            .into_response(),
        Ok(revisions) => Json(json!({
            "service_name": name,
            "revisions": revisions,
        }))
        .into_response(),
        Err(e) => internal_error(e),
    }
}
