//! crates/killfeed_core/src/memory.rs
//!
//! In-memory implementations of the ports, used by the test suites and for running
//! the service without infrastructure.
//!
//! `InMemoryStore` mirrors the constraints of the relational schema: unique emails and
//! usernames, one local post per id, one reaction per (user, post) and a foreign key
//! from reactions to local posts. Every call yields to the scheduler before touching
//! the tables so concurrent callers interleave the way they would against a database.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    AuthorPage, CategoryPage, ContentPost, LocalPostRecord, NewUser, OAuthProfile, PostSummary,
    ReactionKind, StaticPage, User, UserCredentials, VerificationSecret, VerificationType,
};
use crate::ports::{
    ContentSource, DatabaseService, Mailer, OAuthProvider, PortError, PortResult,
};

//=========================================================================================
// Relational Store
//=========================================================================================

struct UserRow {
    user: User,
    hashed_password: Option<String>,
}

#[derive(Default)]
struct Tables {
    users: Vec<UserRow>,
    sessions: HashMap<String, (Uuid, DateTime<Utc>)>,
    connections: HashMap<(String, String), Uuid>,
    posts: HashMap<String, LocalPostRecord>,
    reaction_kinds: BTreeSet<ReactionKind>,
    reactions: HashMap<(Uuid, String), ReactionKind>,
    verifications: HashMap<(VerificationType, String), VerificationSecret>,
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> PortResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|e| PortError::Unexpected(format!("store lock poisoned: {e}")))
    }

    pub fn local_post_count(&self) -> usize {
        self.tables().map(|t| t.posts.len()).unwrap_or(0)
    }

    /// Every reaction row for a post, as (user, kind).
    pub fn reaction_rows(&self, post_id: &str) -> Vec<(Uuid, ReactionKind)> {
        self.tables()
            .map(|t| {
                t.reactions
                    .iter()
                    .filter(|((_, post), _)| post == post_id)
                    .map(|((user, _), kind)| (*user, *kind))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn seeded_reaction_kinds(&self) -> Vec<ReactionKind> {
        self.tables()
            .map(|t| t.reaction_kinds.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DatabaseService for InMemoryStore {
    async fn create_user(&self, user: NewUser) -> PortResult<User> {
        tokio::task::yield_now().await;
        let mut tables = self.tables()?;
        let email = user.email.to_lowercase();
        let username = user.username.to_lowercase();
        if tables
            .users
            .iter()
            .any(|row| row.user.email == email || row.user.username == username)
        {
            return Err(PortError::Conflict(format!(
                "user with email {email} or username {username} exists"
            )));
        }
        let created = User {
            id: Uuid::new_v4(),
            email,
            username,
            name: user.name,
            created_at: Utc::now(),
        };
        tables.users.push(UserRow {
            user: created.clone(),
            hashed_password: user.hashed_password,
        });
        Ok(created)
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        tokio::task::yield_now().await;
        self.tables()?
            .users
            .iter()
            .find(|row| row.user.id == user_id)
            .map(|row| row.user.clone())
            .ok_or_else(|| PortError::NotFound(format!("User {user_id} not found")))
    }

    async fn find_user_by_email(&self, email: &str) -> PortResult<Option<User>> {
        tokio::task::yield_now().await;
        let email = email.to_lowercase();
        Ok(self
            .tables()?
            .users
            .iter()
            .find(|row| row.user.email == email)
            .map(|row| row.user.clone()))
    }

    async fn find_user_by_username(&self, username: &str) -> PortResult<Option<User>> {
        tokio::task::yield_now().await;
        let username = username.to_lowercase();
        Ok(self
            .tables()?
            .users
            .iter()
            .find(|row| row.user.username == username)
            .map(|row| row.user.clone()))
    }

    async fn find_credentials(&self, login: &str) -> PortResult<Option<UserCredentials>> {
        tokio::task::yield_now().await;
        let login = login.to_lowercase();
        Ok(self
            .tables()?
            .users
            .iter()
            .find(|row| row.user.email == login || row.user.username == login)
            .map(|row| UserCredentials {
                user_id: row.user.id,
                email: row.user.email.clone(),
                username: row.user.username.clone(),
                hashed_password: row.hashed_password.clone(),
            }))
    }

    async fn update_password(&self, user_id: Uuid, hashed_password: &str) -> PortResult<()> {
        tokio::task::yield_now().await;
        let mut tables = self.tables()?;
        let row = tables
            .users
            .iter_mut()
            .find(|row| row.user.id == user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {user_id} not found")))?;
        row.hashed_password = Some(hashed_password.to_string());
        Ok(())
    }

    async fn find_connection(
        &self,
        provider_name: &str,
        provider_id: &str,
    ) -> PortResult<Option<Uuid>> {
        tokio::task::yield_now().await;
        Ok(self
            .tables()?
            .connections
            .get(&(provider_name.to_string(), provider_id.to_string()))
            .copied())
    }

    async fn create_connection(
        &self,
        provider_name: &str,
        provider_id: &str,
        user_id: Uuid,
    ) -> PortResult<()> {
        tokio::task::yield_now().await;
        let mut tables = self.tables()?;
        let key = (provider_name.to_string(), provider_id.to_string());
        if tables.connections.contains_key(&key) {
            return Err(PortError::Conflict(format!(
                "{provider_name} account {provider_id} is already connected"
            )));
        }
        tables.connections.insert(key, user_id);
        Ok(())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        tokio::task::yield_now().await;
        self.tables()?
            .sessions
            .insert(session_id.to_string(), (user_id, expires_at));
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        tokio::task::yield_now().await;
        match self.tables()?.sessions.get(session_id) {
            Some((user_id, expires_at)) if *expires_at > Utc::now() => Ok(*user_id),
            _ => Err(PortError::NotFound(format!("Session {session_id} not found"))),
        }
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        tokio::task::yield_now().await;
        self.tables()?.sessions.remove(session_id);
        Ok(())
    }

    async fn get_local_post(&self, post_id: &str) -> PortResult<Option<LocalPostRecord>> {
        tokio::task::yield_now().await;
        Ok(self.tables()?.posts.get(post_id).cloned())
    }

    async fn insert_local_post(&self, record: &LocalPostRecord) -> PortResult<()> {
        tokio::task::yield_now().await;
        let mut tables = self.tables()?;
        if tables.posts.contains_key(&record.id) {
            return Err(PortError::Conflict(format!("Post {} exists", record.id)));
        }
        tables.posts.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn seed_reaction_kinds(&self, kinds: &[ReactionKind]) -> PortResult<()> {
        tokio::task::yield_now().await;
        self.tables()?.reaction_kinds.extend(kinds.iter().copied());
        Ok(())
    }

    async fn get_reaction(&self, user_id: Uuid, post_id: &str) -> PortResult<Option<ReactionKind>> {
        tokio::task::yield_now().await;
        Ok(self
            .tables()?
            .reactions
            .get(&(user_id, post_id.to_string()))
            .copied())
    }

    async fn insert_reaction(
        &self,
        user_id: Uuid,
        post_id: &str,
        kind: ReactionKind,
    ) -> PortResult<()> {
        tokio::task::yield_now().await;
        let mut tables = self.tables()?;
        if !tables.posts.contains_key(post_id) {
            return Err(PortError::NotFound(format!("Post {post_id} not found")));
        }
        let key = (user_id, post_id.to_string());
        if tables.reactions.contains_key(&key) {
            return Err(PortError::Conflict(format!(
                "User {user_id} already reacted to {post_id}"
            )));
        }
        tables.reactions.insert(key, kind);
        Ok(())
    }

    async fn update_reaction(
        &self,
        user_id: Uuid,
        post_id: &str,
        from: ReactionKind,
        to: ReactionKind,
    ) -> PortResult<bool> {
        tokio::task::yield_now().await;
        let mut tables = self.tables()?;
        match tables.reactions.get_mut(&(user_id, post_id.to_string())) {
            Some(current) if *current == from => {
                *current = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_reaction(
        &self,
        user_id: Uuid,
        post_id: &str,
        kind: ReactionKind,
    ) -> PortResult<bool> {
        tokio::task::yield_now().await;
        let mut tables = self.tables()?;
        let key = (user_id, post_id.to_string());
        if tables.reactions.get(&key) == Some(&kind) {
            tables.reactions.remove(&key);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn count_reactions(&self, post_id: &str) -> PortResult<Vec<(ReactionKind, u64)>> {
        tokio::task::yield_now().await;
        let tables = self.tables()?;
        let mut counts: HashMap<ReactionKind, u64> = HashMap::new();
        for ((_, post), kind) in tables.reactions.iter() {
            if post == post_id {
                *counts.entry(*kind).or_insert(0) += 1;
            }
        }
        Ok(counts.into_iter().collect())
    }

    async fn upsert_verification(&self, secret: &VerificationSecret) -> PortResult<()> {
        tokio::task::yield_now().await;
        self.tables()?
            .verifications
            .insert((secret.kind, secret.target.clone()), secret.clone());
        Ok(())
    }

    async fn get_verification(
        &self,
        kind: VerificationType,
        target: &str,
    ) -> PortResult<Option<VerificationSecret>> {
        tokio::task::yield_now().await;
        Ok(self
            .tables()?
            .verifications
            .get(&(kind, target.to_string()))
            .cloned())
    }

    async fn record_failed_verification(
        &self,
        kind: VerificationType,
        target: &str,
    ) -> PortResult<u32> {
        tokio::task::yield_now().await;
        let mut tables = self.tables()?;
        Ok(match tables.verifications.get_mut(&(kind, target.to_string())) {
            Some(secret) => {
                secret.attempts = secret.attempts.saturating_add(1);
                secret.attempts
            }
            None => 0,
        })
    }
}

//=========================================================================================
// Content Source
//=========================================================================================

/// A fixed catalogue of documents. `set_unavailable` simulates an unreachable CMS.
#[derive(Clone, Default)]
pub struct StaticContentSource {
    posts: Arc<Mutex<Vec<ContentPost>>>,
    authors: Arc<Mutex<Vec<AuthorPage>>>,
    categories: Arc<Mutex<Vec<CategoryPage>>>,
    pages: Arc<Mutex<Vec<StaticPage>>>,
    unavailable: Arc<Mutex<bool>>,
}

impl StaticContentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_posts(posts: Vec<ContentPost>) -> Self {
        let source = Self::default();
        if let Ok(mut stored) = source.posts.lock() {
            *stored = posts;
        }
        source
    }

    pub fn add_author(&self, page: AuthorPage) {
        if let Ok(mut authors) = self.authors.lock() {
            authors.push(page);
        }
    }

    pub fn add_category(&self, page: CategoryPage) {
        if let Ok(mut categories) = self.categories.lock() {
            categories.push(page);
        }
    }

    pub fn add_page(&self, page: StaticPage) {
        if let Ok(mut pages) = self.pages.lock() {
            pages.push(page);
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        if let Ok(mut flag) = self.unavailable.lock() {
            *flag = unavailable;
        }
    }

    fn check_available(&self) -> PortResult<()> {
        match self.unavailable.lock() {
            Ok(flag) if *flag => Err(PortError::Unavailable("content source offline".into())),
            Ok(_) => Ok(()),
            Err(e) => Err(PortError::Unexpected(e.to_string())),
        }
    }

    fn sorted_summaries(&self) -> PortResult<Vec<PostSummary>> {
        let posts = self
            .posts
            .lock()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let mut summaries: Vec<PostSummary> = posts.iter().filter_map(summarize).collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }
}

fn summarize(post: &ContentPost) -> Option<PostSummary> {
    Some(PostSummary {
        id: post.resolvable_id()?.to_string(),
        slug: post.slug.clone(),
        title: post.title.clone(),
        subtitle: post.subtitle.clone(),
        category: post.category.clone(),
        author: post.author.clone(),
        banner: post.banner.clone(),
        created_at: post.created_at,
    })
}

#[async_trait]
impl ContentSource for StaticContentSource {
    async fn fetch_post(
        &self,
        category_slug: &str,
        post_slug: &str,
    ) -> PortResult<Option<ContentPost>> {
        self.check_available()?;
        let posts = self
            .posts
            .lock()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(posts
            .iter()
            .find(|post| {
                post.slug == post_slug
                    && post.category.as_ref().map(|c| c.slug.as_str()) == Some(category_slug)
            })
            .cloned())
    }

    async fn fetch_author(&self, author_slug: &str) -> PortResult<Option<AuthorPage>> {
        self.check_available()?;
        let authors = self
            .authors
            .lock()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(authors
            .iter()
            .find(|page| page.author.slug == author_slug)
            .cloned())
    }

    async fn fetch_category(&self, category_slug: &str) -> PortResult<Option<CategoryPage>> {
        self.check_available()?;
        let categories = self
            .categories
            .lock()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(categories
            .iter()
            .find(|page| page.category.slug == category_slug)
            .cloned())
    }

    async fn fetch_static_page(&self, page_slug: &str) -> PortResult<Option<StaticPage>> {
        self.check_available()?;
        let pages = self
            .pages
            .lock()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(pages.iter().find(|page| page.slug == page_slug).cloned())
    }

    async fn latest_posts(&self, limit: usize) -> PortResult<Vec<PostSummary>> {
        self.check_available()?;
        Ok(self.sorted_summaries()?.into_iter().take(limit).collect())
    }

    async fn latest_other_post(
        &self,
        category_slug: Option<&str>,
        exclude_id: &str,
    ) -> PortResult<Option<PostSummary>> {
        self.check_available()?;
        Ok(self.sorted_summaries()?.into_iter().find(|post| {
            post.id != exclude_id
                && category_slug.map_or(true, |slug| {
                    post.category.as_ref().map(|c| c.slug.as_str()) == Some(slug)
                })
        }))
    }
}

//=========================================================================================
// Mail
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// Keeps every message instead of sending it. `set_failing` makes `send` fail.
#[derive(Clone, Default)]
pub struct OutboxMailer {
    sent: Arc<Mutex<Vec<SentMail>>>,
    failing: Arc<Mutex<bool>>,
}

impl OutboxMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut flag) = self.failing.lock() {
            *flag = failing;
        }
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn last_to(&self, to: &str) -> Option<SentMail> {
        self.sent().into_iter().rev().find(|mail| mail.to == to)
    }
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> PortResult<()> {
        let failing = self.failing.lock().map(|f| *f).unwrap_or(false);
        if failing {
            return Err(PortError::Unavailable("mail provider rejected the message".into()));
        }
        self.sent
            .lock()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .push(SentMail {
                to: to.to_string(),
                subject: subject.to_string(),
                html_body: html_body.to_string(),
            });
        Ok(())
    }
}

//=========================================================================================
// OAuth
//=========================================================================================

/// Answers a fixed profile for each known authorization code.
#[derive(Clone)]
pub struct FixedOAuthProvider {
    name: String,
    profiles: Arc<Mutex<HashMap<String, OAuthProfile>>>,
}

impl FixedOAuthProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            profiles: Arc::default(),
        }
    }

    pub fn insert(&self, code: &str, profile: OAuthProfile) {
        if let Ok(mut profiles) = self.profiles.lock() {
            profiles.insert(code.to_string(), profile);
        }
    }
}

#[async_trait]
impl OAuthProvider for FixedOAuthProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn authorize_url(&self, state: &str) -> String {
        format!("https://auth.invalid/{}/authorize?state={state}", self.name)
    }

    async fn exchange_code(&self, code: &str) -> PortResult<OAuthProfile> {
        self.profiles
            .lock()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .get(code)
            .cloned()
            .ok_or(PortError::Unauthorized)
    }
}
