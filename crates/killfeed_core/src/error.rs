//! crates/killfeed_core/src/error.rs
//!
//! The error taxonomy of the core services.
//!
//! Validation-shaped variants are meant to be shown to the user next to the form
//! that caused them. `Upstream` and `Internal` are infrastructure failures that
//! belong to the top-level error boundary.

use crate::domain::UnknownReactionKind;
use crate::ports::PortError;

#[derive(Debug, thiserror::Error)]
pub enum SiteError {
    #[error("{0} not found")]
    NotFound(String),

    /// The action needs a logged-in user. Callers answer with a login prompt.
    #[error("You must be logged in to do that")]
    Unauthorized,

    #[error(transparent)]
    InvalidReactionKind(#[from] UnknownReactionKind),

    #[error("Invalid code")]
    InvalidVerificationCode,

    /// The staging cookie is gone or past its window; the user has to start over.
    #[error("Verification process expired, please restart the process")]
    VerificationExpired,

    #[error("{message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("Upstream service unavailable: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SiteError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        SiteError::Validation {
            field,
            message: message.into(),
        }
    }
}

impl From<PortError> for SiteError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound(what) => SiteError::NotFound(what),
            PortError::Unavailable(why) => SiteError::Upstream(why),
            PortError::Unauthorized => SiteError::Unauthorized,
            PortError::Conflict(why) | PortError::Unexpected(why) => SiteError::Internal(why),
        }
    }
}

/// A convenience type alias for `Result<T, SiteError>`.
pub type SiteResult<T> = Result<T, SiteError>;
