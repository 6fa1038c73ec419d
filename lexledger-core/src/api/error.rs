use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use crate::error::LedgerError;

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        match self {
            LedgerError::NotFound { .. } => {
                json_error(StatusCode::NOT_FOUND, "not_found", self.to_string())
            }
            LedgerError::InvalidState(e) => {
                json_error(StatusCode::CONFLICT, "invalid_state", e.to_string())
            }
            LedgerError::Validation(msg) => {
                json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
            }
            LedgerError::Transaction(e) => {
                error!("Ledger transaction failed: {}", e);
                json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "transaction_error",
                    "the operation was rolled back",
                )
            }
        }
    }
}
