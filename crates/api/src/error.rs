//! API error type and the uniform response envelope
//!
//! Every action returns `{success, data?, error?}`; callers never see a raw
//! exception. Authorization and validation failures are typed results;
//! provider failures carry their billing sub-code; everything else is
//! logged and surfaced as a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use opshq_billing::BillingError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    /// No session, or the session is expired/revoked.
    #[error("unauthorized")]
    Unauthorized,

    /// Authenticated but lacking the required role.
    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    /// Input schema violation; the first violation message is surfaced.
    #[error("{0}")]
    Validation(String),

    /// Invariant violations: last owner, self-action, duplicate slug/email.
    #[error("{0}")]
    Conflict(String),

    /// Payment backend failure, classified by the billing crate.
    #[error(transparent)]
    Provider(#[from] BillingError),

    /// Store failure. Logged with detail, surfaced generic.
    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("internal server error")]
    Internal,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Provider(BillingError::NotEnabled) => StatusCode::CONFLICT,
            ApiError::Provider(BillingError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Provider(_) => StatusCode::BAD_GATEWAY,
            ApiError::Database(_) | ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::Forbidden => "FORBIDDEN",
            ApiError::NotFound => "NOT_FOUND",
            ApiError::Validation(_) => "VALIDATION",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Provider(e) => e.code(),
            ApiError::Database(_) => "INTERNAL",
            ApiError::Internal => "INTERNAL",
        }
    }

    fn public_message(&self) -> String {
        match self {
            ApiError::Unauthorized => "authentication required".to_string(),
            ApiError::Forbidden => "insufficient permissions".to_string(),
            ApiError::NotFound => "resource not found".to_string(),
            ApiError::Validation(msg) | ApiError::Conflict(msg) => msg.clone(),
            ApiError::Provider(e) => e.to_string(),
            // Store/internal detail stays in the logs.
            ApiError::Database(_) | ApiError::Internal => "internal server error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Database(e) => {
                tracing::error!(error = ?e, "database error");
            }
            ApiError::Internal => {
                tracing::error!("internal error surfaced to caller");
            }
            ApiError::Provider(e) => {
                tracing::warn!(code = e.code(), error = %e, "provider error");
            }
            _ => {}
        }

        let status = self.status();
        let body = json!({
            "success": false,
            "error": {
                "code": self.code(),
                "message": self.public_message(),
            }
        });

        (status, Json(body)).into_response()
    }
}

/// Map a sqlx unique-constraint violation onto a domain conflict.
///
/// Used where an insert races a duplicate (workspace slug, member upsert).
pub fn conflict_on_unique(err: sqlx::Error, message: &str) -> ApiError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return ApiError::Conflict(message.to_string());
        }
    }
    ApiError::Database(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn billing_sub_codes_pass_through() {
        let err = ApiError::Provider(BillingError::NotEnabled);
        assert_eq!(err.code(), "BILLING_NOT_ENABLED");
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let err = ApiError::Provider(BillingError::InvalidCredentials("revoked".into()));
        assert_eq!(err.code(), "INVALID_CREDENTIALS");
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);

        let err = ApiError::Provider(BillingError::Timeout);
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn database_detail_never_reaches_the_caller() {
        let err = ApiError::Database(sqlx::Error::PoolTimedOut);
        assert_eq!(err.public_message(), "internal server error");
        assert_eq!(err.code(), "INTERNAL");
    }

    #[test]
    fn conflict_and_validation_surface_their_message() {
        let err = ApiError::Conflict("cannot delete your own account".into());
        assert_eq!(err.public_message(), "cannot delete your own account");
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let err = ApiError::Validation("email is required".into());
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
