//! services/api/src/web/middleware.rs
//!
//! Session middleware: every request learns who is asking, and protected routes
//! turn anonymous visitors away.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
    Extension,
};
use axum_extra::extract::cookie::CookieJar;
use killfeed_core::{PortError, SessionState};
use std::sync::Arc;
use tracing::{debug, error};

use crate::error::ApiResult;
use crate::web::cookies::SiteCookies;
use crate::web::state::AppState;

/// Resolves the session cookie through the store and inserts the resulting
/// `SessionState` into the request extensions.
///
/// A missing, tampered, unknown or expired session is simply `Anonymous`.
pub async fn resolve_session(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> ApiResult<Response> {
    let session = match SiteCookies::new(&state).session(&jar) {
        None => SessionState::Anonymous,
        Some(cookie) => match state.db.validate_auth_session(&cookie.session_id).await {
            Ok(user_id) => SessionState::Authenticated { user_id },
            Err(PortError::NotFound(_)) => {
                debug!("Session cookie does not match a live session");
                SessionState::Anonymous
            }
            Err(e) => {
                error!("Failed to validate auth session: {:?}", e);
                return Err(e.into());
            }
        },
    };

    req.extensions_mut().insert(session);
    Ok(next.run(req).await)
}

/// Rejects anonymous requests with 401 and a login hint.
pub async fn require_auth(
    Extension(session): Extension<SessionState>,
    req: Request,
    next: Next,
) -> ApiResult<Response> {
    session.require_user()?;
    Ok(next.run(req).await)
}
