//! HTTP routes.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;

use dirsync_events::WebhookOutcome;
use dirsync_sync::{AuditReport, DepartmentSyncReport, FullSyncReport, UserSyncReport};

use crate::error::ApiError;
use crate::state::AppState;

/// Build the router.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/sync/departments", post(sync_departments))
        .route("/sync/users", post(sync_users))
        .route("/sync/all", post(sync_all))
        .route("/sync/audit", get(audit))
        .route("/events/feishu", post(feishu_event));

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": state.version,
        "uptime_seconds": state.uptime_secs(),
    }))
}

async fn sync_departments(
    State(state): State<AppState>,
) -> Result<Json<DepartmentSyncReport>, ApiError> {
    let _guard = state.sync_lock.lock().await;
    info!("Department sync triggered");
    Ok(Json(state.engine.sync_departments().await?))
}

async fn sync_users(State(state): State<AppState>) -> Result<Json<UserSyncReport>, ApiError> {
    let _guard = state.sync_lock.lock().await;
    info!("User sync triggered");
    Ok(Json(state.engine.sync_users().await?))
}

async fn sync_all(State(state): State<AppState>) -> Result<Json<FullSyncReport>, ApiError> {
    let _guard = state.sync_lock.lock().await;
    info!("Full sync triggered");
    Ok(Json(state.engine.sync_all().await?))
}

async fn audit(State(state): State<AppState>) -> Result<Json<AuditReport>, ApiError> {
    Ok(Json(state.auditor.audit().await?))
}

/// Webhook callback. Answers 200 for everything the caller should not
/// retry, which is all outcomes except a token mismatch.
async fn feishu_event(State(state): State<AppState>, body: Bytes) -> Response {
    match state.webhook.dispatch(&body).await {
        WebhookOutcome::Challenge(challenge) => {
            Json(json!({ "challenge": challenge })).into_response()
        }
        WebhookOutcome::Processed(outcome) => (
            StatusCode::OK,
            Json(json!({ "status": "processed", "outcome": outcome })),
        )
            .into_response(),
        WebhookOutcome::Failed(message) => (
            StatusCode::OK,
            Json(json!({ "status": "failed", "message": message })),
        )
            .into_response(),
        WebhookOutcome::Ignored(reason) => (
            StatusCode::OK,
            Json(json!({ "status": "ignored", "reason": reason })),
        )
            .into_response(),
        WebhookOutcome::Rejected => ApiError::InvalidToken.into_response(),
    }
}
