use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use court_core::CoreError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::AuthenticationError(_) => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            AppError::Core(err) => match err {
                CoreError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
                CoreError::SlotConflict { .. } => (StatusCode::CONFLICT, "slot_conflict"),
                CoreError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
                CoreError::InvalidState(_) => (StatusCode::CONFLICT, "invalid_state"),
                CoreError::AlreadyUsed { .. } => (StatusCode::CONFLICT, "already_used"),
                CoreError::OutsideWindow { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "outside_window"),
                CoreError::PaymentError(_) => (StatusCode::BAD_GATEWAY, "payment_error"),
                CoreError::PaymentDeclined(_) => (StatusCode::PAYMENT_REQUIRED, "payment_declined"),
                CoreError::ExpiredHold { .. } => (StatusCode::GONE, "expired_hold"),
                CoreError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
                CoreError::InvariantViolation(_) | CoreError::Storage(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal")
                }
            },
            AppError::Anyhow(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let error_message = match self {
            AppError::AuthenticationError(msg) => msg,
            AppError::Core(err) if status.is_server_error() => {
                tracing::error!("Internal Server Error: {}", err);
                "Internal Server Error".to_string()
            }
            AppError::Core(err) => err.to_string(),
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                "Internal Server Error".to_string()
            }
        };

        let body = Json(json!({
            "error": error_message,
            "code": code,
        }));

        (status, body).into_response()
    }
}
