//! services/api/src/web/oauth.rs
//!
//! Third-party login: redirect to the provider, handle its callback, and finish
//! onboarding for profiles that have no local account yet.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Form, Json,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use killfeed_core::{NewUser, SiteError, StagedFlow, Toast};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::error::ApiResult;
use crate::web::auth::{
    create_user, ensure_available, is_checked, normalize_name, normalize_username, start_session,
    welcome, AuthResponse,
};
use crate::web::cookies::{SiteCookies, OAUTH_STATE_COOKIE};
use crate::web::state::AppState;

#[derive(Serialize, ToSchema)]
pub struct AuthorizeResponse {
    pub authorize_url: String,
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub code: String,
    pub state: String,
}

/// What the onboarding form should be prefilled with.
#[derive(Serialize, ToSchema)]
pub struct OnboardingPrompt {
    pub next: String,
    pub email: String,
    pub username: Option<String>,
    pub name: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct OnboardingForm {
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub remember: Option<String>,
}

/// GET /auth/{provider} - Start a provider login
#[utoipa::path(
    get,
    path = "/auth/{provider}",
    params(("provider" = String, Path, description = "Provider name, e.g. github")),
    responses(
        (status = 200, description = "Where to send the browser", body = AuthorizeResponse),
        (status = 404, description = "Unknown provider", body = crate::error::ErrorBody)
    )
)]
pub async fn oauth_start_handler(
    State(state): State<Arc<AppState>>,
    Path(provider_name): Path<String>,
    jar: CookieJar,
) -> ApiResult<impl IntoResponse> {
    let provider = state.oauth_provider(&provider_name)?;

    let csrf_state = hex::encode(rand::random::<[u8; 16]>());
    let jar = SiteCookies::new(&state).with_oauth_state(jar, &csrf_state, Utc::now())?;

    Ok((
        jar,
        Json(AuthorizeResponse {
            authorize_url: provider.authorize_url(&csrf_state),
        }),
    ))
}

/// GET /auth/{provider}/callback - Finish a provider login
#[utoipa::path(
    get,
    path = "/auth/{provider}/callback",
    params(
        ("provider" = String, Path, description = "Provider name, e.g. github"),
        ("code" = String, Query, description = "Authorization code"),
        ("state" = String, Query, description = "CSRF state issued by /auth/{provider}")
    ),
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 202, description = "No account yet; continue with onboarding", body = OnboardingPrompt),
        (status = 401, description = "The provider refused the code", body = crate::error::ErrorBody),
        (status = 422, description = "State mismatch", body = crate::error::ErrorBody)
    )
)]
pub async fn oauth_callback_handler(
    State(state): State<Arc<AppState>>,
    Path(provider_name): Path<String>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> ApiResult<Response> {
    let provider = state.oauth_provider(&provider_name)?;
    let cookies = SiteCookies::new(&state);
    let now = Utc::now();

    // 1. The state must be the one we handed out, and is single use
    let expected = cookies.oauth_state(&jar, now);
    let jar = cookies.remove(jar, OAUTH_STATE_COOKIE);
    if expected.as_deref() != Some(query.state.as_str()) {
        warn!("OAuth callback for {} with a mismatched state", provider_name);
        return Err(
            SiteError::validation("state", "Login attempt expired, please try again").into(),
        );
    }

    // 2. Exchange the code for the provider's profile
    let profile = provider.exchange_code(&query.code).await.map_err(|e| {
        error!("OAuth code exchange with {} failed: {:?}", provider_name, e);
        e
    })?;

    // 3. A known connection logs straight in
    if let Some(user_id) = state
        .db
        .find_connection(&profile.provider_name, &profile.provider_id)
        .await?
    {
        let user = state.db.get_user_by_id(user_id).await?;
        let jar = start_session(&state, jar, user.id, true).await?;
        let jar = cookies.with_toast(
            jar,
            &Toast::message(format!("You're logged in with {provider_name}")),
        )?;
        info!("User {} logged in with {}", user.id, provider_name);
        return Ok((StatusCode::OK, jar, Json(AuthResponse::for_user(&user))).into_response());
    }

    // 4. An account with the same email gets the connection linked
    if let Some(user) = state.db.find_user_by_email(&profile.email).await? {
        state
            .db
            .create_connection(&profile.provider_name, &profile.provider_id, user.id)
            .await?;
        let jar = start_session(&state, jar, user.id, true).await?;
        let jar = cookies.with_toast(
            jar,
            &Toast::success(
                "Connected",
                format!("Your {provider_name} account has been connected"),
            ),
        )?;
        info!("Linked {} to existing user {}", provider_name, user.id);
        return Ok((StatusCode::OK, jar, Json(AuthResponse::for_user(&user))).into_response());
    }

    // 5. Otherwise stage the profile for onboarding
    let prompt = OnboardingPrompt {
        next: format!("/auth/{provider_name}/onboarding"),
        email: profile.email.clone(),
        username: profile.username.clone(),
        name: profile.name.clone(),
        image_url: profile.image_url.clone(),
    };
    let jar = cookies.with_staging(
        jar,
        &StagedFlow::OAuth { profile },
        now,
        state.verification.ttl(),
    )?;
    Ok((StatusCode::ACCEPTED, jar, Json(prompt)).into_response())
}

/// POST /auth/{provider}/onboarding - Create the account for a staged provider profile
#[utoipa::path(
    post,
    path = "/auth/{provider}/onboarding",
    params(("provider" = String, Path, description = "Provider name, e.g. github")),
    request_body(content = OnboardingForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 201, description = "Account created and logged in", body = AuthResponse),
        (status = 422, description = "Invalid details or expired onboarding", body = crate::error::ErrorBody)
    )
)]
pub async fn oauth_onboarding_handler(
    State(state): State<Arc<AppState>>,
    Path(provider_name): Path<String>,
    jar: CookieJar,
    Form(form): Form<OnboardingForm>,
) -> ApiResult<impl IntoResponse> {
    let profile = match SiteCookies::new(&state).staging(&jar, Utc::now()).require()? {
        StagedFlow::OAuth { profile } if profile.provider_name == provider_name => profile,
        _ => return Err(SiteError::VerificationExpired.into()),
    };

    let username = normalize_username(&form.username)?;
    let name = normalize_name(form.name.as_deref())?;
    ensure_available(&state, Some(&profile.email), &username).await?;

    let user = create_user(
        &state,
        NewUser {
            email: profile.email.clone(),
            username,
            name,
            hashed_password: None,
        },
    )
    .await?;
    state
        .db
        .create_connection(&profile.provider_name, &profile.provider_id, user.id)
        .await?;

    let jar = welcome(&state, jar, &user, is_checked(form.remember.as_deref())).await?;
    info!("New account {} onboarded from {}", user.id, provider_name);
    Ok((StatusCode::CREATED, jar, Json(AuthResponse::for_user(&user))))
}
