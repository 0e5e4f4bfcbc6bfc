//! Metadata Fetcher
//!
//! Best-effort enrichment from the YouTube Data API. The video and channel
//! lookups run concurrently and fail independently: a failed lookup is logged
//! and replaced by an empty snippet, never propagated.

use std::time::Duration;

use serde::Deserialize;

use crate::models::PublisherMetadata;

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// Why one enrichment lookup was dropped. Non-fatal by construction.
#[derive(Debug, thiserror::Error)]
pub enum MetadataFailure {
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("API answered with status {0}")]
    Status(reqwest::StatusCode),
    #[error("malformed response body: {0}")]
    Body(#[source] reqwest::Error),
}

#[derive(Debug, Default, Deserialize)]
struct ListResponse {
    #[serde(default)]
    items: Vec<ListItem>,
}

#[derive(Debug, Deserialize)]
struct ListItem {
    #[serde(default)]
    snippet: Snippet,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    pub channel_title: Option<String>,
    #[serde(default)]
    pub thumbnails: Thumbnails,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Thumbnails {
    pub default: Option<Thumbnail>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thumbnail {
    pub url: String,
}

impl Snippet {
    fn default_thumbnail_url(&self) -> Option<String> {
        self.thumbnails.default.as_ref().map(|t| t.url.clone())
    }
}

#[derive(Debug, Clone)]
pub struct MetadataClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl MetadataClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Look up the video and its channel concurrently.
    pub async fn fetch_video_and_channel(
        &self,
        video_id: &str,
        channel_id: &str,
    ) -> PublisherMetadata {
        let (video, channel) = tokio::join!(
            self.fetch_snippet("videos", video_id),
            self.fetch_snippet("channels", channel_id),
        );

        let video = video.unwrap_or_else(|e| {
            log::warn!("Video metadata degraded for {}: {}", video_id, e);
            Snippet::default()
        });
        let channel = channel.unwrap_or_else(|e| {
            log::warn!("Channel metadata degraded for {}: {}", channel_id, e);
            Snippet::default()
        });

        PublisherMetadata {
            video_channel_title: video.channel_title,
            publisher_thumbnail_url: channel.default_thumbnail_url(),
        }
    }

    /// First `items[].snippet` of `GET {base}/{resource}?part=snippet&id=..`.
    ///
    /// An empty `items` array is not an error; it yields an empty snippet.
    async fn fetch_snippet(&self, resource: &str, id: &str) -> Result<Snippet, MetadataFailure> {
        let url = format!("{}/{}", self.base_url, resource);

        // `without_url` keeps the API key out of logged errors.
        let response = self
            .http
            .get(&url)
            .query(&[("part", "snippet"), ("id", id), ("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| MetadataFailure::Request(e.without_url()))?;

        if !response.status().is_success() {
            return Err(MetadataFailure::Status(response.status()));
        }

        let list: ListResponse = response
            .json()
            .await
            .map_err(|e| MetadataFailure::Body(e.without_url()))?;

        Ok(list
            .items
            .into_iter()
            .next()
            .map(|item| item.snippet)
            .unwrap_or_default())
    }
}
