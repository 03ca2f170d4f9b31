//! API error type.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use dirsync_core::{RemoteError, StoreError, SyncError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("webhook verification token mismatch")]
    InvalidToken,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Sync(e) => sync_status(e),
            Self::InvalidToken => StatusCode::UNAUTHORIZED,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            Self::Sync(e) => e.kind(),
            Self::InvalidToken => "invalid_token",
        }
    }
}

fn sync_status(err: &SyncError) -> StatusCode {
    match err {
        SyncError::Operation(op) => sync_status(&op.source),
        SyncError::Mapping(_) | SyncError::Tree(_) | SyncError::Lookup(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        SyncError::Remote(RemoteError::Auth(_) | RemoteError::Api { .. }) => StatusCode::BAD_GATEWAY,
        SyncError::Remote(RemoteError::Request(_)) => StatusCode::GATEWAY_TIMEOUT,
        SyncError::Remote(RemoteError::Payload(_)) => StatusCode::BAD_GATEWAY,
        SyncError::Store(StoreError::AlreadyExists { .. }) => StatusCode::CONFLICT,
        SyncError::Store(StoreError::Directory { .. } | StoreError::Relational { .. }) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        SyncError::Store(StoreError::NotFound { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        let mut body = json!({
            "error": self.error_type(),
            "message": self.to_string(),
            "status": status.as_u16(),
        });
        if let Self::Sync(e) = &self {
            if let Some((phase, entity)) = e.context() {
                body["phase"] = json!(phase);
                body["entity"] = json!(entity);
            }
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirsync_core::{LookupError, LookupKind, SyncPhase};

    #[test]
    fn test_status_follows_innermost_error() {
        let err = SyncError::from(LookupError::new(LookupKind::ParentGroup, "feishu_d1"))
            .in_phase(SyncPhase::Departments, "Platform");
        assert_eq!(sync_status(&err), StatusCode::UNPROCESSABLE_ENTITY);

        let err = SyncError::from(StoreError::directory("connection reset"))
            .in_phase(SyncPhase::Users, "alice");
        assert_eq!(sync_status(&err), StatusCode::SERVICE_UNAVAILABLE);

        let err = SyncError::from(RemoteError::Request("timeout".into()));
        assert_eq!(sync_status(&err), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_invalid_token_is_unauthorized() {
        let response = ApiError::InvalidToken.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
