//! Proxy Streamer
//!
//! Relays remote images (thumbnails, channel avatars) to the browser so the
//! frontend never talks to the CDN directly. Bodies are forwarded chunk by
//! chunk; nothing is buffered in full.

use std::time::Duration;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;

use crate::error::AppError;
use crate::url_utils::normalize_http_url;

const IMAGE_MEDIA_PREFIX: &str = "image/";

/// An upstream image whose headers have been checked and whose body is
/// still in flight.
pub struct ProxiedImage {
    pub content_type: String,
    pub content_length: Option<u64>,
    pub body: BoxStream<'static, Result<Bytes, AppError>>,
}

impl std::fmt::Debug for ProxiedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxiedImage")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

fn is_image_content_type(value: &str) -> bool {
    value
        .trim_start()
        .get(..IMAGE_MEDIA_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(IMAGE_MEDIA_PREFIX))
}

#[derive(Debug, Clone)]
pub struct ImageProxy {
    http: reqwest::Client,
}

impl ImageProxy {
    /// Only connecting is bounded; a slow but live transfer is left alone.
    pub fn new(connect_timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self { http })
    }

    /// Fetch `url` and check it is an image before any byte is relayed.
    pub async fn fetch(&self, url: &str) -> Result<ProxiedImage, AppError> {
        let target = normalize_http_url(url).ok_or_else(|| AppError::InvalidParameter {
            name: "url",
            value: url.to_string(),
        })?;

        log::debug!("Proxying {}", target);

        let response = self
            .http
            .get(&target)
            .send()
            .await
            .map_err(|e| AppError::RemoteFetch {
                url: target.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::UpstreamRejected {
                url: target,
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let content_type = match content_type {
            Some(ct) if is_image_content_type(&ct) => ct,
            other => {
                return Err(AppError::UnsupportedContentType {
                    url: target,
                    content_type: other,
                })
            }
        };

        let content_length = response.content_length();
        let relay_url = target;
        let body = response
            .bytes_stream()
            .map(move |chunk| {
                chunk.map_err(|e| {
                    let err = AppError::RelayInterrupted {
                        url: relay_url.clone(),
                        reason: e.to_string(),
                    };
                    log::error!("{}", err);
                    err
                })
            })
            .boxed();

        Ok(ProxiedImage {
            content_type,
            content_length,
            body,
        })
    }
}
