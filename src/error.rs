use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use derive_more::Display;
use rust_decimal::Decimal;
use serde_json::json;

/// Every failure a handler can surface. Rendered as
/// `{"success": false, "message": "..."}` with the matching status code.
#[derive(Debug, Display)]
pub enum AppError {
    #[display(fmt = "{}", _0)]
    Validation(String),

    #[display(fmt = "{}", _0)]
    NotFound(String),

    #[display(fmt = "{}", _0)]
    Conflict(String),

    #[display(fmt = "{}", _0)]
    MethodNotAllowed(String),

    #[display(fmt = "{}", _0)]
    Unauthorized(String),

    #[display(fmt = "{}", _0)]
    Forbidden(String),

    /// Outstanding advances cannot cover a repair; nothing was written.
    #[display(
        fmt = "Outstanding advances cannot cover {} still missing for salary record {}",
        unallocated,
        salary_record_id
    )]
    InsufficientAdvanceBalance {
        salary_record_id: u64,
        unallocated: Decimal,
    },

    #[display(fmt = "{}", _0)]
    Internal(String),

    #[display(fmt = "Database error: {}", _0)]
    Database(sqlx::Error),
}

impl AppError {
    pub fn not_found(entity: &str, id: u64) -> Self {
        AppError::NotFound(format!("{entity} {id} not found"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Database(e)
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) | AppError::InsufficientAdvanceBalance { .. } => {
                StatusCode::CONFLICT
            }
            AppError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Internal(_) | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
            "Internal Server Error".to_string()
        } else {
            self.to_string()
        };

        HttpResponse::build(status).json(json!({
            "success": false,
            "message": message
        }))
    }
}
