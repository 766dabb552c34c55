//! services/api/src/web/password.rs
//!
//! Forgotten-password flow: request a code, verify it at /auth/verify, then choose
//! a new password.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Form, Json};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use killfeed_core::{SiteError, StagedFlow, Toast, VerificationType};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;

use crate::error::ApiResult;
use crate::web::auth::{check_password, hash_password, NextStep};
use crate::web::cookies::{SiteCookies, VERIFICATION_COOKIE};
use crate::web::emails;
use crate::web::state::AppState;

#[derive(Deserialize, ToSchema)]
pub struct ForgotPasswordForm {
    /// Email or username.
    pub login: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ResetPasswordForm {
    pub password: String,
    pub confirm_password: String,
}

/// POST /auth/forgot-password - Email a reset code
#[utoipa::path(
    post,
    path = "/auth/forgot-password",
    request_body(content = ForgotPasswordForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 202, description = "Code sent; continue at /auth/verify", body = NextStep),
        (status = 422, description = "No such user", body = crate::error::ErrorBody),
        (status = 502, description = "The email could not be sent", body = crate::error::ErrorBody)
    )
)]
pub async fn forgot_password_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<ForgotPasswordForm>,
) -> ApiResult<impl IntoResponse> {
    let login = form.login.trim().to_lowercase();
    let creds = state.db.find_credentials(&login).await?.ok_or_else(|| {
        SiteError::validation("login", "No user exists with this username or email")
    })?;

    let code = state
        .verification
        .issue(VerificationType::ResetPassword, &creds.email)
        .await?;
    emails::send_code(&state, VerificationType::ResetPassword, &creds.email, &code).await?;

    let flow = StagedFlow::ResetPassword {
        email: creds.email.clone(),
        verified: false,
    };
    let jar = SiteCookies::new(&state).with_staging(
        jar,
        &flow,
        Utc::now(),
        state.verification.ttl(),
    )?;

    info!("Password reset requested for user {}", creds.user_id);
    Ok((
        StatusCode::ACCEPTED,
        jar,
        Json(NextStep {
            next: "/auth/verify".to_string(),
            target: Some(creds.email),
        }),
    ))
}

/// POST /auth/reset-password - Set a new password after the code was verified
#[utoipa::path(
    post,
    path = "/auth/reset-password",
    request_body(content = ResetPasswordForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Password updated; continue at /auth/login", body = NextStep),
        (status = 422, description = "Invalid password, unverified code or expired verification", body = crate::error::ErrorBody)
    )
)]
pub async fn reset_password_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<ResetPasswordForm>,
) -> ApiResult<impl IntoResponse> {
    let cookies = SiteCookies::new(&state);

    let email = match cookies.staging(&jar, Utc::now()).require()? {
        StagedFlow::ResetPassword {
            email,
            verified: true,
        } => email,
        StagedFlow::ResetPassword {
            verified: false, ..
        } => {
            return Err(SiteError::validation(
                "code",
                "Enter the code from your email first",
            )
            .into())
        }
        _ => return Err(SiteError::VerificationExpired.into()),
    };

    check_password(&form.password)?;
    if form.password != form.confirm_password {
        return Err(SiteError::validation("confirm_password", "The passwords must match").into());
    }

    let user = state
        .db
        .find_user_by_email(&email)
        .await?
        .ok_or(SiteError::VerificationExpired)?;
    let password_hash = hash_password(&form.password)?;
    state.db.update_password(user.id, &password_hash).await?;

    let jar = cookies.remove(jar, VERIFICATION_COOKIE);
    let jar = cookies.with_toast(
        jar,
        &Toast::success("Password reset", "You can now log in with your new password"),
    )?;

    info!("Password reset completed for user {}", user.id);
    Ok((
        StatusCode::OK,
        jar,
        Json(NextStep {
            next: "/auth/login".to_string(),
            target: None,
        }),
    ))
}
