//! services/api/src/web/rest.rs
//!
//! The health probe and the master definition for the OpenAPI specification.

use axum::response::Json;
use serde::Serialize;
use utoipa::{OpenApi, ToSchema};

use crate::error::ErrorBody;
use crate::web::{auth, oauth, pages, password, preferences, reactions};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        pages::home_handler,
        pages::post_handler,
        pages::category_handler,
        pages::author_handler,
        pages::static_page_handler,
        pages::me_handler,
        reactions::toggle_reaction_handler,
        auth::signup_handler,
        auth::verify_handler,
        auth::login_handler,
        auth::logout_handler,
        password::forgot_password_handler,
        password::reset_password_handler,
        oauth::oauth_start_handler,
        oauth::oauth_callback_handler,
        oauth::oauth_onboarding_handler,
        preferences::theme_handler,
        preferences::breakpoint_handler,
    ),
    components(
        schemas(
            Health,
            ErrorBody,
            reactions::ReactionForm,
            auth::SignupForm,
            auth::VerifyForm,
            auth::LoginForm,
            auth::AuthResponse,
            auth::NextStep,
            password::ForgotPasswordForm,
            password::ResetPasswordForm,
            oauth::AuthorizeResponse,
            oauth::OnboardingPrompt,
            oauth::OnboardingForm,
            preferences::ThemeForm,
            preferences::BreakpointForm,
            preferences::Preferences,
        )
    ),
    tags(
        (name = "Killfeed API", description = "Esports news pages, reactions and accounts.")
    )
)]
pub struct ApiDoc;

#[derive(Serialize, ToSchema)]
pub struct Health {
    status: &'static str,
}

/// GET /health - Liveness probe
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "The service is up", body = Health))
)]
pub async fn health_handler() -> Json<Health> {
    Json(Health { status: "ok" })
}
