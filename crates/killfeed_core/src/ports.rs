//! crates/killfeed_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the relational store, the CMS, the mail provider and the
//! OAuth providers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    AuthorPage, CategoryPage, ContentPost, LocalPostRecord, NewUser, OAuthProfile, PostSummary,
    ReactionKind, StaticPage, User, UserCredentials, VerificationSecret, VerificationType,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A uniqueness constraint rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),
    /// The remote system could not be reached or answered with a server error.
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- User Management ---
    /// Fails with `Conflict` when the email or username is already taken.
    async fn create_user(&self, user: NewUser) -> PortResult<User>;

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User>;

    async fn find_user_by_email(&self, email: &str) -> PortResult<Option<User>>;

    async fn find_user_by_username(&self, username: &str) -> PortResult<Option<User>>;

    /// Looks a user up by email or username.
    async fn find_credentials(&self, login: &str) -> PortResult<Option<UserCredentials>>;

    async fn update_password(&self, user_id: Uuid, hashed_password: &str) -> PortResult<()>;

    // --- OAuth Connections ---
    async fn find_connection(
        &self,
        provider_name: &str,
        provider_id: &str,
    ) -> PortResult<Option<Uuid>>;

    async fn create_connection(
        &self,
        provider_name: &str,
        provider_id: &str,
        user_id: Uuid,
    ) -> PortResult<()>;

    // --- Auth Sessions ---
    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Returns the owning user, or `NotFound` when the session is unknown or expired.
    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    /// Deleting an unknown session is not an error.
    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Local Post Mirrors ---
    async fn get_local_post(&self, post_id: &str) -> PortResult<Option<LocalPostRecord>>;

    /// Fails with `Conflict` when a record with the same id already exists.
    async fn insert_local_post(&self, record: &LocalPostRecord) -> PortResult<()>;

    // --- Reactions ---
    /// Idempotently makes sure every reaction kind has a row in the store.
    async fn seed_reaction_kinds(&self, kinds: &[ReactionKind]) -> PortResult<()>;

    async fn get_reaction(&self, user_id: Uuid, post_id: &str) -> PortResult<Option<ReactionKind>>;

    /// Fails with `Conflict` when the user already has a reaction on the post.
    async fn insert_reaction(
        &self,
        user_id: Uuid,
        post_id: &str,
        kind: ReactionKind,
    ) -> PortResult<()>;

    /// Switches the reaction only if it still holds `from`. Returns whether a row changed.
    async fn update_reaction(
        &self,
        user_id: Uuid,
        post_id: &str,
        from: ReactionKind,
        to: ReactionKind,
    ) -> PortResult<bool>;

    /// Removes the reaction only if it still holds `kind`. Returns whether a row changed.
    async fn delete_reaction(
        &self,
        user_id: Uuid,
        post_id: &str,
        kind: ReactionKind,
    ) -> PortResult<bool>;

    /// Counts per kind for one post. Kinds without reactions may be omitted.
    async fn count_reactions(&self, post_id: &str) -> PortResult<Vec<(ReactionKind, u64)>>;

    // --- Verification Secrets ---
    /// Creates or replaces the secret for its (type, target) pair.
    async fn upsert_verification(&self, secret: &VerificationSecret) -> PortResult<()>;

    async fn get_verification(
        &self,
        kind: VerificationType,
        target: &str,
    ) -> PortResult<Option<VerificationSecret>>;

    /// Bumps the failed-attempt counter and returns the new count.
    /// Answers `Ok(0)` when no secret is on file.
    async fn record_failed_verification(
        &self,
        kind: VerificationType,
        target: &str,
    ) -> PortResult<u32>;
}

/// The external system of record for editorial content.
///
/// Lookups answer `Ok(None)` for unknown slugs and `Err(PortError::Unavailable)` when the
/// source cannot be reached.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch_post(
        &self,
        category_slug: &str,
        post_slug: &str,
    ) -> PortResult<Option<ContentPost>>;

    async fn fetch_author(&self, author_slug: &str) -> PortResult<Option<AuthorPage>>;

    async fn fetch_category(&self, category_slug: &str) -> PortResult<Option<CategoryPage>>;

    async fn fetch_static_page(&self, page_slug: &str) -> PortResult<Option<StaticPage>>;

    async fn latest_posts(&self, limit: usize) -> PortResult<Vec<PostSummary>>;

    /// The most recently created post other than `exclude_id`, optionally within a category.
    async fn latest_other_post(
        &self,
        category_slug: Option<&str>,
        exclude_id: &str,
    ) -> PortResult<Option<PostSummary>>;
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Sends one HTML email. Failures are reported, never retried.
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> PortResult<()>;
}

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// The provider name used as the connection key (e.g. `github`).
    fn name(&self) -> &str;

    /// The URL the browser is sent to in order to start the flow.
    fn authorize_url(&self, state: &str) -> String;

    /// Exchanges an authorization code for the provider's view of the user.
    async fn exchange_code(&self, code: &str) -> PortResult<OAuthProfile>;
}
