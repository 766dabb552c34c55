//! services/api/src/web/preferences.rs
//!
//! Display preferences kept in cookies: color theme and the large-breakpoint hint.

use axum::{extract::State, Form, Json};
use axum_extra::extract::cookie::CookieJar;
use killfeed_core::Theme;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::error::ApiResult;
use crate::web::auth::is_checked;
use crate::web::cookies::SiteCookies;
use crate::web::state::AppState;

#[derive(Deserialize, ToSchema)]
pub struct ThemeForm {
    /// `system`, `light` or `dark`.
    pub theme: String,
}

#[derive(Deserialize, ToSchema)]
pub struct BreakpointForm {
    #[serde(default)]
    pub past_lg: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct Preferences {
    #[schema(value_type = String)]
    pub theme: Theme,
    pub past_lg: bool,
}

/// POST /preferences/theme
#[utoipa::path(
    post,
    path = "/preferences/theme",
    request_body(content = ThemeForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Theme saved", body = Preferences),
        (status = 422, description = "Unknown theme", body = crate::error::ErrorBody)
    )
)]
pub async fn theme_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<ThemeForm>,
) -> ApiResult<(CookieJar, Json<Preferences>)> {
    let theme: Theme = form.theme.parse()?;
    let cookies = SiteCookies::new(&state);
    let past_lg = cookies.past_lg(&jar);
    let jar = cookies.with_theme(jar, theme)?;
    Ok((jar, Json(Preferences { theme, past_lg })))
}

/// POST /preferences/breakpoint
#[utoipa::path(
    post,
    path = "/preferences/breakpoint",
    request_body(content = BreakpointForm, content_type = "application/x-www-form-urlencoded"),
    responses((status = 200, description = "Hint saved", body = Preferences))
)]
pub async fn breakpoint_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<BreakpointForm>,
) -> ApiResult<(CookieJar, Json<Preferences>)> {
    let past_lg = is_checked(form.past_lg.as_deref());
    let cookies = SiteCookies::new(&state);
    let theme = cookies.theme(&jar);
    let jar = cookies.with_past_lg(jar, past_lg)?;
    Ok((jar, Json(Preferences { theme, past_lg })))
}
