//! services/api/src/adapters/cms.rs
//!
//! An adapter that implements the `ContentSource` port against the headless CMS's
//! JSON delivery API.

use async_trait::async_trait;
use killfeed_core::domain::{AuthorPage, CategoryPage, ContentPost, PostSummary, StaticPage};
use killfeed_core::ports::{ContentSource, PortError, PortResult};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Clone)]
pub struct CmsAdapter {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl CmsAdapter {
    pub fn new(client: Client, base_url: &str, token: Option<String>) -> PortResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| PortError::Unexpected(format!("invalid CMS url '{base_url}': {e}")))?;
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// Builds `{base}/{segments...}` with every segment percent-encoded.
    fn url(&self, segments: &[&str]) -> PortResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| PortError::Unexpected("CMS url cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GETs a JSON document. A 404 is `Ok(None)`; transport failures and server
    /// errors are `Unavailable`.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, &str)],
    ) -> PortResult<Option<T>> {
        debug!("CMS request: {}", url);
        let mut request = self.client.get(url).query(query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PortError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_server_error() => Err(PortError::Unavailable(format!(
                "content source answered {status}"
            ))),
            status if !status.is_success() => Err(PortError::Unexpected(format!(
                "content source answered {status}"
            ))),
            _ => response
                .json::<T>()
                .await
                .map(Some)
                .map_err(|e| PortError::Unexpected(format!("malformed CMS document: {e}"))),
        }
    }
}

//=========================================================================================
// `ContentSource` Trait Implementation
//=========================================================================================

#[async_trait]
impl ContentSource for CmsAdapter {
    async fn fetch_post(
        &self,
        category_slug: &str,
        post_slug: &str,
    ) -> PortResult<Option<ContentPost>> {
        let url = self.url(&["posts", category_slug, post_slug])?;
        self.get_json(url, &[]).await
    }

    async fn fetch_author(&self, author_slug: &str) -> PortResult<Option<AuthorPage>> {
        let url = self.url(&["authors", author_slug])?;
        self.get_json(url, &[]).await
    }

    async fn fetch_category(&self, category_slug: &str) -> PortResult<Option<CategoryPage>> {
        let url = self.url(&["categories", category_slug])?;
        self.get_json(url, &[]).await
    }

    async fn fetch_static_page(&self, page_slug: &str) -> PortResult<Option<StaticPage>> {
        let url = self.url(&["pages", page_slug])?;
        self.get_json(url, &[]).await
    }

    async fn latest_posts(&self, limit: usize) -> PortResult<Vec<PostSummary>> {
        let url = self.url(&["posts"])?;
        let limit = limit.to_string();
        Ok(self
            .get_json::<Vec<PostSummary>>(url, &[("limit", limit.as_str())])
            .await?
            .unwrap_or_default())
    }

    async fn latest_other_post(
        &self,
        category_slug: Option<&str>,
        exclude_id: &str,
    ) -> PortResult<Option<PostSummary>> {
        let url = self.url(&["posts", "read-more"])?;
        let mut query = vec![("exclude", exclude_id)];
        if let Some(category) = category_slug {
            query.push(("category", category));
        }
        self.get_json(url, &query).await
    }
}
