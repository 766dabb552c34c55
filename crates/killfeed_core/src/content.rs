//! crates/killfeed_core/src/content.rs
//!
//! The Content Resolver: fetches editorial documents from the content source and
//! guarantees every viewed post has a local identity before anything local (a
//! reaction) refers to it.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::{AuthorPage, CategoryPage, LocalPostRecord, PostSummary, ResolvedPost, StaticPage};
use crate::error::{SiteError, SiteResult};
use crate::ports::{ContentSource, DatabaseService, PortError};

#[derive(Clone)]
pub struct ContentResolver {
    content: Arc<dyn ContentSource>,
    db: Arc<dyn DatabaseService>,
}

impl ContentResolver {
    pub fn new(content: Arc<dyn ContentSource>, db: Arc<dyn DatabaseService>) -> Self {
        Self { content, db }
    }

    /// Fetches a post for its detail page and ensures its local record.
    ///
    /// A document without a usable id is reported as `NotFound` and leaves the
    /// store untouched.
    pub async fn resolve_post(
        &self,
        category_slug: &str,
        post_slug: &str,
    ) -> SiteResult<ResolvedPost> {
        let post = self
            .content
            .fetch_post(category_slug, post_slug)
            .await?
            .ok_or_else(|| SiteError::NotFound(format!("Post {category_slug}/{post_slug}")))?;

        let Some(post_id) = post.resolvable_id().map(str::to_string) else {
            warn!(category_slug, post_slug, "Content source returned a post without an id");
            return Err(SiteError::NotFound(format!(
                "Post {category_slug}/{post_slug}"
            )));
        };

        let local = self.ensure_local_post(&post_id, &post.slug).await?;
        Ok(ResolvedPost { post, local })
    }

    /// Returns the local record for `post_id`, creating it if needed.
    ///
    /// Losing a creation race to a concurrent request is success: the winner's row
    /// is read back and returned.
    pub async fn ensure_local_post(&self, post_id: &str, slug: &str) -> SiteResult<LocalPostRecord> {
        if let Some(existing) = self.db.get_local_post(post_id).await? {
            return Ok(existing);
        }

        let record = LocalPostRecord {
            id: post_id.to_string(),
            slug: slug.to_string(),
        };
        match self.db.insert_local_post(&record).await {
            Ok(()) => {
                info!(post_id, slug, "Created local post record");
                Ok(record)
            }
            Err(PortError::Conflict(_)) => {
                debug!(post_id, "Local post record created concurrently");
                self.db.get_local_post(post_id).await?.ok_or_else(|| {
                    SiteError::Internal(format!("post {post_id} vanished after a conflict"))
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The newest other post for a "read more" link. Nothing to link to is not an
    /// error, and neither is a content source hiccup: the link is simply omitted.
    pub async fn read_more(
        &self,
        category_slug: Option<&str>,
        exclude_id: &str,
    ) -> Option<PostSummary> {
        match self.content.latest_other_post(category_slug, exclude_id).await {
            Ok(post) => post,
            Err(e) => {
                warn!(error = %e, exclude_id, "Read-more lookup failed");
                None
            }
        }
    }

    pub async fn latest_posts(&self, limit: usize) -> SiteResult<Vec<PostSummary>> {
        Ok(self.content.latest_posts(limit).await?)
    }

    pub async fn author_page(&self, author_slug: &str) -> SiteResult<AuthorPage> {
        self.content
            .fetch_author(author_slug)
            .await?
            .ok_or_else(|| SiteError::NotFound(format!("Author {author_slug}")))
    }

    pub async fn category_page(&self, category_slug: &str) -> SiteResult<CategoryPage> {
        self.content
            .fetch_category(category_slug)
            .await?
            .ok_or_else(|| SiteError::NotFound(format!("Category {category_slug}")))
    }

    pub async fn static_page(&self, page_slug: &str) -> SiteResult<StaticPage> {
        self.content
            .fetch_static_page(page_slug)
            .await?
            .ok_or_else(|| SiteError::NotFound(format!("Page {page_slug}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CategoryRef, ContentPost};
    use crate::memory::{InMemoryStore, StaticContentSource};
    use chrono::{Duration, Utc};

    fn post(id: Option<&str>, slug: &str, category: &str, age_hours: i64) -> ContentPost {
        ContentPost {
            id: id.map(str::to_string),
            slug: slug.to_string(),
            title: slug.replace('-', " "),
            subtitle: None,
            body: serde_json::json!([]),
            author: None,
            category: Some(CategoryRef {
                title: category.to_uppercase(),
                slug: category.to_string(),
            }),
            banner: None,
            created_at: Utc::now() - Duration::hours(age_hours),
        }
    }

    fn resolver(posts: Vec<ContentPost>) -> (ContentResolver, InMemoryStore, StaticContentSource) {
        let store = InMemoryStore::new();
        let source = StaticContentSource::with_posts(posts);
        let resolver = ContentResolver::new(Arc::new(source.clone()), Arc::new(store.clone()));
        (resolver, store, source)
    }

    #[tokio::test]
    async fn first_view_creates_exactly_one_local_record() {
        let (resolver, store, _) = resolver(vec![post(Some("p1"), "major-final", "cs2", 1)]);

        let first = resolver.resolve_post("cs2", "major-final").await.unwrap();
        assert_eq!(first.local.id, "p1");
        assert_eq!(store.local_post_count(), 1);

        let again = resolver.resolve_post("cs2", "major-final").await.unwrap();
        assert_eq!(again.local, first.local);
        assert_eq!(store.local_post_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_first_views_do_not_fail() {
        let (resolver, store, _) = resolver(vec![post(Some("p1"), "major-final", "cs2", 1)]);

        let views = (0..8).map(|_| {
            let resolver = resolver.clone();
            tokio::spawn(async move { resolver.resolve_post("cs2", "major-final").await })
        });
        for view in futures::future::join_all(views).await {
            assert_eq!(view.unwrap().unwrap().local.id, "p1");
        }
        assert_eq!(store.local_post_count(), 1);
    }

    #[tokio::test]
    async fn post_without_id_is_not_found_and_creates_nothing() {
        let (resolver, store, _) = resolver(vec![post(Some("  "), "ghost", "valorant", 1)]);

        let err = resolver.resolve_post("valorant", "ghost").await.unwrap_err();
        assert!(matches!(err, SiteError::NotFound(_)));
        assert_eq!(store.local_post_count(), 0);
    }

    #[tokio::test]
    async fn unknown_slug_is_not_found() {
        let (resolver, _, _) = resolver(vec![]);
        let err = resolver.resolve_post("cs2", "nope").await.unwrap_err();
        assert!(matches!(err, SiteError::NotFound(_)));
    }

    #[tokio::test]
    async fn unreachable_source_is_upstream_failure() {
        let (resolver, store, source) = resolver(vec![post(Some("p1"), "a", "cs2", 1)]);
        source.set_unavailable(true);

        let err = resolver.resolve_post("cs2", "a").await.unwrap_err();
        assert!(matches!(err, SiteError::Upstream(_)));
        assert_eq!(store.local_post_count(), 0);
    }

    #[tokio::test]
    async fn read_more_picks_newest_other_post_in_category() {
        let (resolver, _, _) = resolver(vec![
            post(Some("p1"), "old", "cs2", 48),
            post(Some("p2"), "newer", "cs2", 2),
            post(Some("p3"), "current", "cs2", 1),
            post(Some("p4"), "other-game", "dota2", 0),
        ]);

        let next = resolver.read_more(Some("cs2"), "p3").await.unwrap();
        assert_eq!(next.id, "p2");

        let anywhere = resolver.read_more(None, "p3").await.unwrap();
        assert_eq!(anywhere.id, "p4");
    }

    #[tokio::test]
    async fn read_more_degrades_to_nothing() {
        let (resolver, _, source) = resolver(vec![post(Some("p1"), "only", "cs2", 1)]);
        assert_eq!(resolver.read_more(Some("cs2"), "p1").await, None);

        source.set_unavailable(true);
        assert_eq!(resolver.read_more(Some("cs2"), "p1").await, None);
    }
}
