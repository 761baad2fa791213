use std::time::Duration;

use futures_util::StreamExt;
use harvest_core::{ListedItem, ThreadSnapshot};
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use url::Url;

use crate::{FeedError, FeedFailureKind};

/// Access to the social feed. Implementations already hold valid credentials.
pub trait FeedClient {
    /// Most recent items, newest first, at most `limit` of them.
    fn list_recent(&mut self, limit: usize) -> Result<Vec<ListedItem>, FeedError>;

    /// Full thread (root item plus replies) for one item.
    fn fetch_details(&mut self, post_id: &str) -> Result<ThreadSnapshot, FeedError>;
}

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub base_url: String,
    pub access_token: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_bytes: u64,
}

impl FeedSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            access_token: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            max_bytes: 5 * 1024 * 1024,
        }
    }
}

#[derive(Deserialize)]
struct RecentPosts {
    posts: Vec<ListedItem>,
}

/// JSON-over-HTTP feed client.
///
/// Requests run on a private tokio runtime and block the caller, which keeps
/// the harvest loop strictly sequential.
pub struct HttpFeedClient {
    settings: FeedSettings,
    base: Url,
    client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
}

impl HttpFeedClient {
    pub fn new(settings: FeedSettings) -> Result<Self, FeedError> {
        let base = Url::parse(&settings.base_url)
            .map_err(|err| FeedError::new(FeedFailureKind::InvalidUrl, err.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(FeedError::new(
                FeedFailureKind::InvalidUrl,
                format!("{base} cannot be used as a base url"),
            ));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| FeedError::new(FeedFailureKind::Network, err.to_string()))?;
        let runtime = tokio::runtime::Runtime::new()
            .map_err(|err| FeedError::new(FeedFailureKind::Network, err.to_string()))?;
        Ok(Self {
            settings,
            base,
            client,
            runtime,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // Checked in `new`: the base url can carry path segments.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn get_bytes(&self, url: Url) -> Result<Vec<u8>, FeedError> {
        self.runtime.block_on(get_bytes(
            &self.client,
            url,
            self.settings.access_token.as_deref(),
            self.settings.max_bytes,
        ))
    }
}

impl FeedClient for HttpFeedClient {
    fn list_recent(&mut self, limit: usize) -> Result<Vec<ListedItem>, FeedError> {
        let mut url = self.endpoint(&["posts", "location", "recent"]);
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        let bytes = self.get_bytes(url)?;
        let recent: RecentPosts = serde_json::from_slice(&bytes)
            .map_err(|err| FeedError::new(FeedFailureKind::Decode, err.to_string()))?;
        Ok(recent.posts)
    }

    fn fetch_details(&mut self, post_id: &str) -> Result<ThreadSnapshot, FeedError> {
        let url = self.endpoint(&["posts", post_id, "details"]);
        let bytes = self.get_bytes(url)?;
        let body: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|err| FeedError::new(FeedFailureKind::Decode, err.to_string()))?;
        if !body.is_object() {
            return Err(FeedError::new(
                FeedFailureKind::Decode,
                format!("thread {post_id} is not a JSON object"),
            ));
        }
        Ok(ThreadSnapshot::new(post_id, body))
    }
}

async fn get_bytes(
    client: &reqwest::Client,
    url: Url,
    access_token: Option<&str>,
    max_bytes: u64,
) -> Result<Vec<u8>, FeedError> {
    let mut request = client.get(url);
    if let Some(token) = access_token {
        request = request.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    let response = request.send().await.map_err(map_reqwest_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(FeedError::new(
            FeedFailureKind::HttpStatus(status.as_u16()),
            status.to_string(),
        ));
    }

    if let Some(content_len) = response.content_length() {
        if content_len > max_bytes {
            return Err(FeedError::new(
                FeedFailureKind::TooLarge {
                    max_bytes,
                    actual: Some(content_len),
                },
                "response too large",
            ));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(map_reqwest_error)?;
        let next_len = bytes.len() as u64 + chunk.len() as u64;
        if next_len > max_bytes {
            return Err(FeedError::new(
                FeedFailureKind::TooLarge {
                    max_bytes,
                    actual: Some(next_len),
                },
                "response too large",
            ));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

fn map_reqwest_error(err: reqwest::Error) -> FeedError {
    if err.is_timeout() {
        return FeedError::new(FeedFailureKind::Timeout, err.to_string());
    }
    if err.is_decode() {
        return FeedError::new(FeedFailureKind::Decode, err.to_string());
    }
    FeedError::new(FeedFailureKind::Network, err.to_string())
}
