use crate::response::ApiResponse;
use anyhow::anyhow;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use deadpool_diesel::InteractError;
use deadpool_diesel::sqlite::PoolError;
use diesel::result::DatabaseErrorKind;
use thiserror::Error;
use tracing::{error, warn};

/// Failure of a course, homework or deadline request, rendered as an
/// `ApiResponse` envelope with no data.
///
/// Certificate rendering never surfaces here; a grade is committed even when
/// its certificate PDF could not be produced.
#[derive(Debug, Error)]
pub enum AppError {
    /// Empty or overlong fields, or a calendar month that does not exist.
    #[error("Bad Request: {0}")]
    BadRequest(String), // 400

    /// Login with an unknown username or a wrong password.
    #[error("Unauthorized: {0}")]
    Unauthorized(String), // 401

    /// Acting user lacks the role, enrollment or course ownership required.
    #[error("Forbidden: {0}")]
    Forbidden(String), // 403

    #[error("Not Found: {0}")]
    NotFound(String), // 404

    /// A taken username, or edits to a submission that is already graded.
    #[error("Conflict: {0}")]
    Conflict(String), // 409

    /// A grade outside 0..=100.
    #[error("Unprocessable Entity: {0}")]
    UnprocessableEntity(String), // 422

    #[error("Internal Server Error: {0}")]
    InternalServerError(#[from] anyhow::Error), // 500
}

impl From<PoolError> for AppError {
    fn from(err: PoolError) -> Self {
        error!("Database pool error encountered: {:?}", err);
        AppError::InternalServerError(anyhow::Error::new(err).context("Database pool error"))
    }
}

impl From<InteractError> for AppError {
    fn from(err: InteractError) -> Self {
        error!("Database interaction error encountered: {:?}", err);
        AppError::InternalServerError(anyhow!("Database interaction error: {}", err))
    }
}

impl From<diesel::result::Error> for AppError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => {
                warn!(
                    "Diesel NotFound error reached generic conversion: {:?}",
                    err
                );
                AppError::NotFound("Resource not found (database query)".to_string())
            }
            diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, ref info) => {
                warn!("Unique constraint violation: {}", info.message());
                AppError::Conflict("Resource already exists".to_string())
            }
            diesel::result::Error::DatabaseError(
                DatabaseErrorKind::ForeignKeyViolation,
                ref info,
            ) => {
                warn!("Foreign key violation: {}", info.message());
                AppError::NotFound("Referenced resource not found".to_string())
            }
            _ => {
                error!("Unhandled Diesel error encountered: {:?}", err);
                AppError::InternalServerError(
                    anyhow::Error::new(err).context("Database query error"),
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            AppError::Unauthorized(message) => (StatusCode::UNAUTHORIZED, message),
            AppError::Forbidden(message) => (StatusCode::FORBIDDEN, message),
            AppError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            AppError::Conflict(message) => (StatusCode::CONFLICT, message),
            AppError::UnprocessableEntity(message) => (StatusCode::UNPROCESSABLE_ENTITY, message),

            AppError::InternalServerError(source) => {
                error!(
                    "Responding with 500 Internal Server Error. Source: {:?}",
                    source
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = ApiResponse::<()> {
            status_code: status.as_u16(),
            status_message: error_message,
            data: None,
        };

        (status, body).into_response()
    }
}
