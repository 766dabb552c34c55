//! services/api/src/web/reactions.rs
//!
//! The reaction toggle endpoint.

use axum::{
    extract::{Path, State},
    Extension, Form, Json,
};
use killfeed_core::{ReactionCounts, SessionState, ToggleOutcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::error::ApiResult;
use crate::web::state::AppState;

#[derive(Deserialize, ToSchema)]
pub struct ReactionForm {
    /// Emoji or name of the reaction kind, e.g. `🔥` or `fire`.
    pub reaction: String,
}

#[derive(Debug, Serialize)]
pub struct ReactionResponse {
    pub applied: bool,
    #[serde(flatten)]
    pub outcome: ToggleOutcome,
    pub counts: ReactionCounts,
}

/// POST /posts/{category}/{slug}/reactions - Toggle the viewer's reaction
#[utoipa::path(
    post,
    path = "/posts/{category}/{slug}/reactions",
    params(
        ("category" = String, Path, description = "Category slug"),
        ("slug" = String, Path, description = "Post slug")
    ),
    request_body(content = ReactionForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Reaction toggled; counts are fresh"),
        (status = 401, description = "Login required", body = crate::error::ErrorBody),
        (status = 404, description = "No such post", body = crate::error::ErrorBody),
        (status = 422, description = "Unknown reaction kind", body = crate::error::ErrorBody)
    )
)]
pub async fn toggle_reaction_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionState>,
    Path((category, slug)): Path<(String, String)>,
    Form(form): Form<ReactionForm>,
) -> ApiResult<Json<ReactionResponse>> {
    // Anonymous visitors get the login prompt before any content lookup.
    session.require_user()?;

    let resolved = state.content.resolve_post(&category, &slug).await?;
    let post_id = resolved.local.id.as_str();

    let outcome = state
        .reactions
        .toggle(&session, post_id, &form.reaction)
        .await?;
    let counts = state.reactions.aggregate_counts(post_id).await?;

    Ok(Json(ReactionResponse {
        applied: outcome.applied(),
        outcome,
        counts,
    }))
}
