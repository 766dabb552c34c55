pub mod auth;
pub mod cookies;
pub mod emails;
pub mod middleware;
pub mod oauth;
pub mod pages;
pub mod password;
pub mod preferences;
pub mod reactions;
pub mod rest;
pub mod state;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub use middleware::{require_auth, resolve_session};
pub use state::AppState;

/// Builds every route of the site. Transport layers (CORS, tracing, Swagger UI)
/// are added by the binary.
pub fn router(state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(rest::health_handler))
        .route("/", get(pages::home_handler))
        .route("/posts/{category}/{slug}", get(pages::post_handler))
        .route(
            "/posts/{category}/{slug}/reactions",
            post(reactions::toggle_reaction_handler),
        )
        .route("/categories/{slug}", get(pages::category_handler))
        .route("/authors/{slug}", get(pages::author_handler))
        .route("/pages/{slug}", get(pages::static_page_handler))
        .route("/auth/signup", post(auth::signup_handler))
        .route("/auth/verify", post(auth::verify_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/forgot-password", post(password::forgot_password_handler))
        .route("/auth/reset-password", post(password::reset_password_handler))
        .route("/auth/{provider}", get(oauth::oauth_start_handler))
        .route("/auth/{provider}/callback", get(oauth::oauth_callback_handler))
        .route(
            "/auth/{provider}/onboarding",
            post(oauth::oauth_onboarding_handler),
        )
        .route("/preferences/theme", post(preferences::theme_handler))
        .route("/preferences/breakpoint", post(preferences::breakpoint_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/me", get(pages::me_handler))
        .route_layer(axum_middleware::from_fn(require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            resolve_session,
        ))
        .with_state(state)
}
