//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and how each failure
//! is presented to the browser.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use killfeed_core::cookies::CookieError;
use killfeed_core::{PortError, SiteError};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::config::ConfigError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A failure reported by one of the core services.
    #[error(transparent)]
    Site(#[from] SiteError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// A cookie payload could not be signed.
    #[error("Cookie error: {0}")]
    Cookie(#[from] CookieError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// The JSON body of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Stable machine-readable code.
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
    /// Where to send the user when the action needs a login.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login: Option<&'static str>,
}

impl ErrorBody {
    fn new(error: &'static str, message: impl Into<String>) -> Self {
        Self {
            error,
            message: message.into(),
            field: None,
            login: None,
        }
    }
}

fn site_error_parts(err: SiteError) -> (StatusCode, ErrorBody) {
    match err {
        SiteError::NotFound(what) => (
            StatusCode::NOT_FOUND,
            ErrorBody::new("not_found", format!("{what} not found")),
        ),
        SiteError::Unauthorized => (
            StatusCode::UNAUTHORIZED,
            ErrorBody {
                login: Some("/auth/login"),
                ..ErrorBody::new("unauthorized", SiteError::Unauthorized.to_string())
            },
        ),
        SiteError::InvalidReactionKind(e) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorBody {
                field: Some("reaction"),
                ..ErrorBody::new("invalid_reaction_kind", e.to_string())
            },
        ),
        SiteError::InvalidVerificationCode => (
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorBody {
                field: Some("code"),
                ..ErrorBody::new("invalid_code", SiteError::InvalidVerificationCode.to_string())
            },
        ),
        SiteError::VerificationExpired => (
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorBody::new(
                "verification_expired",
                SiteError::VerificationExpired.to_string(),
            ),
        ),
        SiteError::Validation { field, message } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorBody {
                field: Some(field),
                ..ErrorBody::new("validation", message)
            },
        ),
        SiteError::Upstream(why) => {
            error!("Upstream failure: {}", why);
            (
                StatusCode::BAD_GATEWAY,
                ErrorBody::new(
                    "upstream_unavailable",
                    "A service we depend on is unavailable, please try again",
                ),
            )
        }
        SiteError::Internal(why) => {
            error!("Internal failure: {}", why);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new("internal", "Something went wrong"),
            )
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Site(e) => site_error_parts(e),
            ApiError::Port(e) => site_error_parts(e.into()),
            other => {
                error!("Request failed: {:?}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("internal", "Something went wrong"),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

/// A convenience type alias for handler results.
pub type ApiResult<T> = Result<T, ApiError>;
