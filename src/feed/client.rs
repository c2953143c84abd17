use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::auth::{request_timestamp, RequestSigner, SignableRequest};
use crate::config::{ApiConfig, Location};
use crate::feed::types::{Channel, Item};

/// Items requested per page. There is no point asking for less, and the
/// exhaustion check keys off this value rather than any fixed server maximum.
pub const PAGE_LIMIT: usize = 100;

/// Errors that can occur while fetching feed data.
///
/// Every variant fails the whole channel fetch (and with it the cycle);
/// pages are never retried individually.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Non-2xx response, e.g. 401 when the token expired mid-fetch
    #[error("feed endpoint returned status {0}")]
    HttpStatus(u16),
    /// 2xx response whose body is missing the expected structure
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// The transport contract the scraper core is written against.
#[async_trait]
pub trait FeedApi: Send + Sync {
    /// Fetches one ordered page of `channel`, starting after the item id in
    /// `after` (or from the top when `None`).
    async fn fetch_page(
        &self,
        token: &str,
        channel: Channel,
        location: &Location,
        after: Option<&str>,
    ) -> Result<Vec<Item>, FetchError>;

    /// Fetches per-item detail. `Ok(None)` means the item is gone (deleted
    /// or expired), which is a valid result rather than a failure.
    async fn fetch_one(&self, token: &str, id: &str) -> Result<Option<Item>, FetchError>;

    /// Pages `channel` to exhaustion and concatenates the pages in fetch
    /// order, advancing the cursor to the last item of each page.
    async fn fetch_all(
        &self,
        token: &str,
        channel: Channel,
        location: &Location,
    ) -> Result<Vec<Item>, FetchError> {
        let mut items = Vec::new();
        let mut after: Option<String> = None;
        loop {
            let page = self
                .fetch_page(token, channel, location, after.as_deref())
                .await?;
            // A page shorter than what we asked for means the feed is
            // drained. The `<`-relation (rather than checking for an empty
            // page) keeps this correct if the server ever lowers its
            // maximum page size below PAGE_LIMIT.
            let exhausted = page.len() < PAGE_LIMIT;
            after = page.last().map(|item| item.id.clone());
            items.extend(page);
            if exhausted {
                return Ok(items);
            }
        }
    }
}

/// Wire shape of one feed page.
#[derive(Deserialize)]
struct FeedPage {
    posts: Vec<Item>,
}

/// [`FeedApi`] over HTTP with signed requests.
pub struct HttpFeedClient {
    client: reqwest::Client,
    config: ApiConfig,
    signer: Arc<dyn RequestSigner>,
}

impl HttpFeedClient {
    pub fn new(client: reqwest::Client, config: ApiConfig, signer: Arc<dyn RequestSigner>) -> Self {
        Self {
            client,
            config,
            signer,
        }
    }

    fn signed_get(&self, url: Url, token: &str) -> reqwest::RequestBuilder {
        let timestamp = request_timestamp();
        let signature = self.signer.sign(&SignableRequest {
            method: "GET",
            url: &url,
            token: Some(token),
            timestamp: &timestamp,
            body: "",
        });
        self.client
            .get(url)
            .header("User-Agent", self.config.user_agent())
            .header("X-Client-Type", self.config.client_type())
            .header("X-Api-Version", "0.2")
            .header("X-Timestamp", &timestamp)
            .header("X-Authorization", format!("HMAC {signature}"))
            .header("Authorization", format!("Bearer {token}"))
    }
}

#[async_trait]
impl FeedApi for HttpFeedClient {
    async fn fetch_page(
        &self,
        token: &str,
        channel: Channel,
        location: &Location,
        after: Option<&str>,
    ) -> Result<Vec<Item>, FetchError> {
        let mut segments = vec!["posts", "location"];
        if let Some(suffix) = channel.path_suffix() {
            segments.push(suffix);
        }
        let mut url = self.config.endpoint(&segments);
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("lat", &location.latitude.to_string())
                .append_pair("lng", &location.longitude.to_string())
                .append_pair("limit", &PAGE_LIMIT.to_string());
            if let Some(after) = after {
                query.append_pair("after", after);
            }
        }

        let response = self.signed_get(url, token).send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                channel = %channel,
                status = status.as_u16(),
                "feed page request rejected"
            );
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let text = response.text().await?;
        let page: FeedPage =
            serde_json::from_str(&text).map_err(|e| FetchError::Malformed(e.to_string()))?;
        Ok(page.posts)
    }

    async fn fetch_one(&self, token: &str, id: &str) -> Result<Option<Item>, FetchError> {
        let url = self.config.endpoint(&["posts", id]);
        let response = self.signed_get(url, token).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!(id = %id, "item gone, dropping from batch");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let text = response.text().await?;
        let item =
            serde_json::from_str(&text).map_err(|e| FetchError::Malformed(e.to_string()))?;
        Ok(Some(item))
    }
}
