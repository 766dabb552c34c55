//! services/api/src/web/pages.rs
//!
//! Read-only page endpoints. Every page answers the same envelope: the viewer,
//! their display preferences, any pending toast or confetti, and the page data.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use axum_extra::extract::cookie::CookieJar;
use killfeed_core::{
    AuthorPage, CategoryPage, ContentPost, PortError, PostSummary, ReactionCounts, ReactionKind,
    SessionState, StaticPage, Theme, Toast, User,
};
use serde::Serialize;
use std::sync::Arc;

use crate::error::ApiResult;
use crate::web::cookies::{SiteCookies, CONFETTI_COOKIE, TOAST_COOKIE};
use crate::web::state::AppState;

const HOME_POST_LIMIT: usize = 12;

//=========================================================================================
// Envelope
//=========================================================================================

#[derive(Debug, Serialize)]
pub struct PageEnvelope<T> {
    pub user: Option<User>,
    pub theme: Theme,
    pub past_lg: bool,
    pub toast: Option<Toast>,
    pub confetti: Option<String>,
    pub data: T,
}

pub type Page<T> = ApiResult<(CookieJar, Json<PageEnvelope<T>>)>;

/// Wraps page data in the envelope and clears the toast and confetti cookies it
/// consumed, so each is shown at most once.
pub async fn render<T: Serialize>(
    state: &AppState,
    session: &SessionState,
    jar: CookieJar,
    data: T,
) -> Page<T> {
    let cookies = SiteCookies::new(state);
    let theme = cookies.theme(&jar);
    let past_lg = cookies.past_lg(&jar);
    let toast = cookies.toast(&jar).take();
    let confetti = cookies.confetti(&jar).take();

    let mut jar = jar;
    if toast.is_some() {
        jar = cookies.remove(jar, TOAST_COOKIE);
    }
    if confetti.is_some() {
        jar = cookies.remove(jar, CONFETTI_COOKIE);
    }

    let user = match session.user_id() {
        None => None,
        Some(user_id) => match state.db.get_user_by_id(user_id).await {
            Ok(user) => Some(user),
            // The account is gone but the session row outlived it.
            Err(PortError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        },
    };

    Ok((
        jar,
        Json(PageEnvelope {
            user,
            theme,
            past_lg,
            toast,
            confetti,
            data,
        }),
    ))
}

//=========================================================================================
// Page Data
//=========================================================================================

#[derive(Debug, Serialize)]
pub struct HomePage {
    pub posts: Vec<PostSummary>,
}

#[derive(Debug, Serialize)]
pub struct PostPage {
    pub post: ContentPost,
    pub reactions: ReactionCounts,
    pub viewer_reaction: Option<ReactionKind>,
    pub read_more: Option<PostSummary>,
}

#[derive(Debug, Serialize)]
pub struct MePage {
    pub user: User,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET / - Latest posts
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Latest posts"),
        (status = 502, description = "Content source unavailable", body = crate::error::ErrorBody)
    )
)]
pub async fn home_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionState>,
    jar: CookieJar,
) -> Page<HomePage> {
    let posts = state.content.latest_posts(HOME_POST_LIMIT).await?;
    render(&state, &session, jar, HomePage { posts }).await
}

/// GET /posts/{category}/{slug} - Post detail with reactions and a read-more link
#[utoipa::path(
    get,
    path = "/posts/{category}/{slug}",
    params(
        ("category" = String, Path, description = "Category slug"),
        ("slug" = String, Path, description = "Post slug")
    ),
    responses(
        (status = 200, description = "Post detail"),
        (status = 404, description = "No such post", body = crate::error::ErrorBody),
        (status = 502, description = "Content source unavailable", body = crate::error::ErrorBody)
    )
)]
pub async fn post_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionState>,
    Path((category, slug)): Path<(String, String)>,
    jar: CookieJar,
) -> Page<PostPage> {
    let resolved = state.content.resolve_post(&category, &slug).await?;
    let post_id = resolved.local.id.as_str();

    let reactions = state.reactions.aggregate_counts(post_id).await?;
    let viewer_reaction = match session.user_id() {
        Some(user_id) => state.reactions.user_reaction(user_id, post_id).await?,
        None => None,
    };
    let read_more = state.content.read_more(Some(&category), post_id).await;

    let page = PostPage {
        reactions,
        viewer_reaction,
        read_more,
        post: resolved.post,
    };
    render(&state, &session, jar, page).await
}

/// GET /categories/{slug}
#[utoipa::path(
    get,
    path = "/categories/{slug}",
    params(("slug" = String, Path, description = "Category slug")),
    responses(
        (status = 200, description = "Category with its posts"),
        (status = 404, description = "No such category", body = crate::error::ErrorBody)
    )
)]
pub async fn category_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionState>,
    Path(slug): Path<String>,
    jar: CookieJar,
) -> Page<CategoryPage> {
    let page = state.content.category_page(&slug).await?;
    render(&state, &session, jar, page).await
}

/// GET /authors/{slug}
#[utoipa::path(
    get,
    path = "/authors/{slug}",
    params(("slug" = String, Path, description = "Author slug")),
    responses(
        (status = 200, description = "Author with their posts"),
        (status = 404, description = "No such author", body = crate::error::ErrorBody)
    )
)]
pub async fn author_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionState>,
    Path(slug): Path<String>,
    jar: CookieJar,
) -> Page<AuthorPage> {
    let page = state.content.author_page(&slug).await?;
    render(&state, &session, jar, page).await
}

/// GET /pages/{slug} - Static editorial page
#[utoipa::path(
    get,
    path = "/pages/{slug}",
    params(("slug" = String, Path, description = "Page slug")),
    responses(
        (status = 200, description = "Static page"),
        (status = 404, description = "No such page", body = crate::error::ErrorBody)
    )
)]
pub async fn static_page_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionState>,
    Path(slug): Path<String>,
    jar: CookieJar,
) -> Page<StaticPage> {
    let page = state.content.static_page(&slug).await?;
    render(&state, &session, jar, page).await
}

/// GET /me - The logged-in user's account
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Current user"),
        (status = 401, description = "Not logged in", body = crate::error::ErrorBody)
    )
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionState>,
    jar: CookieJar,
) -> Page<MePage> {
    let user = state.db.get_user_by_id(session.require_user()?).await?;
    render(&state, &session, jar, MePage { user }).await
}
