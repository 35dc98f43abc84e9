//! Webhook intake endpoint

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State as AxumState},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::SharedState;
use crate::error::WebhookError;
use crate::event::Provider;
use crate::pipeline::{Processed, process_webhook};

/// POST /api/webhook/{provider} - Handles one provider webhook delivery.
pub async fn handle_webhook(
    AxumState(state): AxumState<SharedState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = Uuid::now_v7().to_string();

    let result = match provider.parse::<Provider>() {
        Ok(provider) => process_webhook(&state.hooks, provider, &headers, &body, &request_id).await,
        Err(unknown) => Err(WebhookError::UnknownProvider(unknown)),
    };

    match result {
        Ok(Processed::Dispatched) => {
            info!("Request {} handled", request_id);
            (
                StatusCode::OK,
                Json(json!({"status": "ok", "request_id": request_id})),
            )
                .into_response()
        }
        Ok(Processed::Skipped(event)) => {
            info!("Request {} skipped ({})", request_id, event);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => error_response(&request_id, e),
    }
}

fn error_response(request_id: &str, err: WebhookError) -> Response {
    match err {
        WebhookError::Authentication(message) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"status": "unauthorized", "request_id": request_id, "error": message})),
        )
            .into_response(),
        WebhookError::UnknownProvider(name) => {
            warn!("Request {} for unknown provider '{}'", request_id, name);
            (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "status": "not_found",
                    "request_id": request_id,
                    "error": format!("unknown provider '{}'", name),
                })),
            )
                .into_response()
        }
        WebhookError::Failed(batch) => {
            error!("Request {} failed: {}", request_id, batch);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": "failed",
                    "request_id": request_id,
                    "errors": batch.messages(),
                })),
            )
                .into_response()
        }
    }
}
