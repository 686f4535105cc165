//! Shared error handling utilities.

use axum::{http::StatusCode, Json};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::DbPool;

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    pub error: String,
    pub code: String,
}

impl ApiError {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }

    pub fn bad_request(
        error: impl Into<String>,
        code: impl Into<String>,
    ) -> (StatusCode, Json<Self>) {
        (StatusCode::BAD_REQUEST, Json(Self::new(error, code)))
    }

    pub fn unauthorized(
        error: impl Into<String>,
        code: impl Into<String>,
    ) -> (StatusCode, Json<Self>) {
        (StatusCode::UNAUTHORIZED, Json(Self::new(error, code)))
    }

    pub fn forbidden(
        error: impl Into<String>,
        code: impl Into<String>,
    ) -> (StatusCode, Json<Self>) {
        (StatusCode::FORBIDDEN, Json(Self::new(error, code)))
    }

    /// 403 for a caller that lacks a management flag.
    pub fn permission_denied() -> (StatusCode, Json<Self>) {
        Self::forbidden(
            "You do not have permission to perform this action",
            "PERMISSION_DENIED",
        )
    }

    pub fn not_found(
        error: impl Into<String>,
        code: impl Into<String>,
    ) -> (StatusCode, Json<Self>) {
        (StatusCode::NOT_FOUND, Json(Self::new(error, code)))
    }

    pub fn conflict(error: impl Into<String>, code: impl Into<String>) -> (StatusCode, Json<Self>) {
        (StatusCode::CONFLICT, Json(Self::new(error, code)))
    }

    pub fn payload_too_large(
        error: impl Into<String>,
        code: impl Into<String>,
    ) -> (StatusCode, Json<Self>) {
        (StatusCode::PAYLOAD_TOO_LARGE, Json(Self::new(error, code)))
    }

    pub fn locked(error: impl Into<String>, code: impl Into<String>) -> (StatusCode, Json<Self>) {
        (StatusCode::LOCKED, Json(Self::new(error, code)))
    }

    pub fn internal(error: impl Into<String>, code: impl Into<String>) -> (StatusCode, Json<Self>) {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(Self::new(error, code)),
        )
    }

    pub fn db_error() -> (StatusCode, Json<Self>) {
        Self::internal("Database error", "DB_ERROR")
    }

    /// Maps a diesel error onto a response: missing rows become 404, unique
    /// and foreign key violations become 409/400, everything else is logged as 500.
    pub fn from_db(e: DieselError) -> (StatusCode, Json<Self>) {
        match e {
            DieselError::NotFound => Self::not_found("Not found", "NOT_FOUND"),
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                Self::conflict(
                    format!("Duplicate value: {}", info.message()),
                    "ALREADY_EXISTS",
                )
            }
            DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
                Self::bad_request(
                    format!("Referenced record does not exist: {}", info.message()),
                    "INVALID_REFERENCE",
                )
            }
            other => {
                error!(error = %other, "Database error");
                Self::db_error()
            }
        }
    }
}

pub type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

pub fn get_db_conn(
    pool: &DbPool,
) -> Result<
    diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<diesel::PgConnection>>,
    (StatusCode, Json<ApiError>),
> {
    pool.get().map_err(|e| {
        error!(error = %e, "Database connection error");
        ApiError::internal("Database connection error", "DB_CONNECTION_ERROR")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_shape() {
        let (status, Json(body)) = ApiError::permission_denied();
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.code, "PERMISSION_DENIED");
    }

    #[test]
    fn test_from_db_not_found_is_404() {
        let (status, Json(body)) = ApiError::from_db(DieselError::NotFound);
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.code, "NOT_FOUND");
    }

    #[test]
    fn test_from_db_other_errors_are_500() {
        let (status, _) = ApiError::from_db(DieselError::RollbackTransaction);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_payload_too_large_status() {
        let (status, Json(body)) = ApiError::payload_too_large("too big", "FILE_TOO_LARGE");
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body.error, "too big");
    }
}
