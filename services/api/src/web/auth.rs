//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for signup (with emailed code), login and logout, plus
//! the credential helpers shared with the password and OAuth flows.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Form, Json,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{Duration, Utc};
use killfeed_core::{
    NewUser, PortError, SiteError, SiteResult, StagedFlow, Toast, User, VerificationType,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::web::cookies::{SiteCookies, SESSION_COOKIE, SESSION_DAYS, VERIFICATION_COOKIE};
use crate::web::emails;
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupForm {
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
    pub password: String,
    /// Checkbox: any value other than `false`/`off` keeps the session for 30 days.
    #[serde(default)]
    pub remember: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct VerifyForm {
    pub code: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginForm {
    /// Email or username.
    pub login: String,
    pub password: String,
    #[serde(default)]
    pub remember: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub redirect: String,
}

impl AuthResponse {
    pub fn for_user(user: &User) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            redirect: "/".to_string(),
        }
    }
}

/// Answer for a step that continues elsewhere (enter the code, choose a password).
#[derive(Serialize, ToSchema)]
pub struct NextStep {
    pub next: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

//=========================================================================================
// Validation and Credentials
//=========================================================================================

const USERNAME_LEN: std::ops::RangeInclusive<usize> = 3..=20;
const NAME_LEN: std::ops::RangeInclusive<usize> = 1..=40;
const PASSWORD_LEN: std::ops::RangeInclusive<usize> = 6..=100;
const EMAIL_MAX_LEN: usize = 254;

pub fn normalize_email(raw: &str) -> SiteResult<String> {
    let email = raw.trim().to_lowercase();
    let well_formed = email.len() <= EMAIL_MAX_LEN
        && !email.contains(char::is_whitespace)
        && email.split_once('@').is_some_and(|(local, domain)| {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        });
    if well_formed {
        Ok(email)
    } else {
        Err(SiteError::validation("email", "Email is invalid"))
    }
}

pub fn normalize_username(raw: &str) -> SiteResult<String> {
    let username = raw.trim().to_lowercase();
    if !USERNAME_LEN.contains(&username.chars().count()) {
        return Err(SiteError::validation(
            "username",
            "Username must be between 3 and 20 characters",
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(SiteError::validation(
            "username",
            "Username can only include letters, numbers, and underscores",
        ));
    }
    Ok(username)
}

/// Blank means "no name"; anything else must fit the length limits.
pub fn normalize_name(raw: Option<&str>) -> SiteResult<Option<String>> {
    let Some(name) = raw.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };
    if !NAME_LEN.contains(&name.chars().count()) {
        return Err(SiteError::validation("name", "Name is too long"));
    }
    Ok(Some(name.to_string()))
}

pub fn check_password(password: &str) -> SiteResult<()> {
    let len = password.chars().count();
    if len < *PASSWORD_LEN.start() {
        return Err(SiteError::validation("password", "Password is too short"));
    }
    if len > *PASSWORD_LEN.end() {
        return Err(SiteError::validation("password", "Password is too long"));
    }
    Ok(())
}

pub fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            ApiError::Internal("Failed to hash password".to_string())
        })
}

fn password_matches(stored_hash: &str, password: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            error!("Stored password hash is unreadable: {:?}", e);
            false
        }
    }
}

pub fn is_checked(value: Option<&str>) -> bool {
    value.is_some_and(|v| !matches!(v.trim(), "" | "false" | "off" | "0"))
}

/// Rejects an email or username that already belongs to an account.
pub async fn ensure_available(
    state: &AppState,
    email: Option<&str>,
    username: &str,
) -> ApiResult<()> {
    if let Some(email) = email {
        if state.db.find_user_by_email(email).await?.is_some() {
            return Err(SiteError::validation("email", "A user already exists with this email").into());
        }
    }
    if state.db.find_user_by_username(username).await?.is_some() {
        return Err(
            SiteError::validation("username", "A user already exists with this username").into(),
        );
    }
    Ok(())
}

/// Creates the user, reporting a lost uniqueness race as a validation error.
pub async fn create_user(state: &AppState, new_user: NewUser) -> ApiResult<User> {
    state.db.create_user(new_user).await.map_err(|e| match e {
        PortError::Conflict(_) => SiteError::validation(
            "username",
            "A user already exists with this username or email",
        )
        .into(),
        other => other.into(),
    })
}

/// Persists a new auth session and sets its cookie.
pub async fn start_session(
    state: &AppState,
    jar: CookieJar,
    user_id: Uuid,
    remember: bool,
) -> ApiResult<CookieJar> {
    let auth_session_id = Uuid::new_v4().to_string();
    let expires_at = Utc::now() + Duration::days(SESSION_DAYS);

    state
        .db
        .create_auth_session(&auth_session_id, user_id, expires_at)
        .await
        .map_err(|e| {
            error!("Failed to create auth session: {:?}", e);
            e
        })?;

    SiteCookies::new(state).with_session(jar, &auth_session_id, remember)
}

/// Session, welcome toast and confetti for a freshly created account.
pub async fn welcome(
    state: &AppState,
    jar: CookieJar,
    user: &User,
    remember: bool,
) -> ApiResult<CookieJar> {
    let cookies = SiteCookies::new(state);
    let jar = start_session(state, jar, user.id, remember).await?;
    let jar = cookies.remove(jar, VERIFICATION_COOKIE);
    let greeting = user.name.as_deref().unwrap_or(&user.username);
    let jar = cookies.with_toast(
        jar,
        &Toast::success("Welcome", format!("Thanks for signing up, {greeting}!")),
    )?;
    cookies.with_confetti(jar)
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Stage a new account and email the verification code
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body(content = SignupForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 202, description = "Code sent; continue at /auth/verify", body = NextStep),
        (status = 422, description = "Invalid or taken details", body = crate::error::ErrorBody),
        (status = 502, description = "The email could not be sent", body = crate::error::ErrorBody)
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<SignupForm>,
) -> ApiResult<impl IntoResponse> {
    // 1. Validate and normalize the submitted details
    let email = normalize_email(&form.email)?;
    let username = normalize_username(&form.username)?;
    let name = normalize_name(form.name.as_deref())?;
    check_password(&form.password)?;
    ensure_available(&state, Some(&email), &username).await?;

    // 2. Hash now so the password itself never sits in a cookie
    let password_hash = hash_password(&form.password)?;

    // 3. Issue and send the code
    let code = state
        .verification
        .issue(VerificationType::Onboarding, &email)
        .await?;
    emails::send_code(&state, VerificationType::Onboarding, &email, &code).await?;

    // 4. Stage the account until the code comes back
    let flow = StagedFlow::Signup {
        email: email.clone(),
        username,
        name,
        password_hash,
        remember: is_checked(form.remember.as_deref()),
    };
    let jar = SiteCookies::new(&state).with_staging(
        jar,
        &flow,
        Utc::now(),
        state.verification.ttl(),
    )?;

    info!("Signup staged for {}", email);
    Ok((
        StatusCode::ACCEPTED,
        jar,
        Json(NextStep {
            next: "/auth/verify".to_string(),
            target: Some(email),
        }),
    ))
}

/// POST /auth/verify - Check the emailed code for the staged flow
#[utoipa::path(
    post,
    path = "/auth/verify",
    request_body(content = VerifyForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 201, description = "Account created and logged in", body = AuthResponse),
        (status = 200, description = "Reset code accepted; continue at /auth/reset-password", body = NextStep),
        (status = 422, description = "Invalid code or expired verification", body = crate::error::ErrorBody)
    )
)]
pub async fn verify_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<VerifyForm>,
) -> ApiResult<Response> {
    let cookies = SiteCookies::new(&state);
    let now = Utc::now();

    match cookies.staging(&jar, now).require()? {
        StagedFlow::Signup {
            email,
            username,
            name,
            password_hash,
            remember,
        } => {
            if !state
                .verification
                .verify(VerificationType::Onboarding, &email, &form.code)
                .await?
            {
                return Err(SiteError::InvalidVerificationCode.into());
            }

            let user = create_user(
                &state,
                NewUser {
                    email,
                    username,
                    name,
                    hashed_password: Some(password_hash),
                },
            )
            .await?;
            info!("New account {} verified", user.id);

            let jar = welcome(&state, jar, &user, remember).await?;
            Ok((StatusCode::CREATED, jar, Json(AuthResponse::for_user(&user))).into_response())
        }
        StagedFlow::ResetPassword { email, .. } => {
            if !state
                .verification
                .verify(VerificationType::ResetPassword, &email, &form.code)
                .await?
            {
                return Err(SiteError::InvalidVerificationCode.into());
            }

            let flow = StagedFlow::ResetPassword {
                email,
                verified: true,
            };
            let jar = cookies.with_staging(jar, &flow, now, state.verification.ttl())?;
            Ok((
                StatusCode::OK,
                jar,
                Json(NextStep {
                    next: "/auth/reset-password".to_string(),
                    target: None,
                }),
            )
                .into_response())
        }
        StagedFlow::OAuth { profile } => Err(SiteError::validation(
            "code",
            format!(
                "Nothing to verify, finish signing in at /auth/{}/onboarding",
                profile.provider_name
            ),
        )
        .into()),
    }
}

/// POST /auth/login - Login with email or username
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 422, description = "Invalid credentials", body = crate::error::ErrorBody)
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> ApiResult<impl IntoResponse> {
    let invalid = || SiteError::validation("password", "Invalid username or password");

    // 1. Look up the credentials by email or username
    let login = form.login.trim().to_lowercase();
    let creds = state
        .db
        .find_credentials(&login)
        .await?
        .ok_or_else(invalid)?;

    // 2. Verify the password; OAuth-only accounts have none
    let matches = creds
        .hashed_password
        .as_deref()
        .is_some_and(|hash| password_matches(hash, &form.password));
    if !matches {
        return Err(invalid().into());
    }

    // 3. Start the session
    let user = state.db.get_user_by_id(creds.user_id).await?;
    let jar = start_session(&state, jar, user.id, is_checked(form.remember.as_deref())).await?;

    info!("User {} logged in", user.id);
    Ok((StatusCode::OK, jar, Json(AuthResponse::for_user(&user))))
}

/// POST /auth/logout - Destroy the current session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logged out (also when there was no session)", body = NextStep)
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> ApiResult<impl IntoResponse> {
    let cookies = SiteCookies::new(&state);

    if let Some(session) = cookies.session(&jar) {
        state
            .db
            .delete_auth_session(&session.session_id)
            .await
            .map_err(|e| {
                error!("Failed to delete auth session: {:?}", e);
                e
            })?;
    }

    let jar = cookies.remove(jar, SESSION_COOKIE);
    let jar = cookies.with_toast(jar, &Toast::message("You have been logged out"))?;

    Ok((
        StatusCode::OK,
        jar,
        Json(NextStep {
            next: "/".to_string(),
            target: None,
        }),
    ))
}
