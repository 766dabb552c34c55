//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use std::collections::HashMap;
use std::sync::Arc;

use killfeed_core::ports::{ContentSource, DatabaseService, Mailer, OAuthProvider};
use killfeed_core::{
    ContentResolver, CookieCodec, ReactionAggregator, SiteError, SiteResult, VerificationFlow,
};

use crate::config::Config;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
///
/// Every infrastructure client is constructed by the caller and injected here, so the
/// binary owns their lifetime and tests can swap in the in-memory adapters.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub content: ContentResolver,
    pub reactions: ReactionAggregator,
    pub verification: VerificationFlow,
    pub mailer: Arc<dyn Mailer>,
    pub oauth: HashMap<String, Arc<dyn OAuthProvider>>,
    pub cookies: CookieCodec,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        db: Arc<dyn DatabaseService>,
        content_source: Arc<dyn ContentSource>,
        mailer: Arc<dyn Mailer>,
        oauth_providers: Vec<Arc<dyn OAuthProvider>>,
    ) -> Self {
        let oauth = oauth_providers
            .into_iter()
            .map(|provider| (provider.name().to_string(), provider))
            .collect();

        Self {
            content: ContentResolver::new(content_source, db.clone()),
            reactions: ReactionAggregator::new(db.clone()),
            verification: VerificationFlow::new(db.clone()),
            cookies: CookieCodec::new(config.session_secret.as_bytes()),
            db,
            config,
            mailer,
            oauth,
        }
    }

    pub fn oauth_provider(&self, name: &str) -> SiteResult<Arc<dyn OAuthProvider>> {
        self.oauth
            .get(name)
            .cloned()
            .ok_or_else(|| SiteError::NotFound(format!("Login provider {name}")))
    }
}
