use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderValue, Method},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::StreamExt;
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::download::{parse_download_request, Downloader};
use crate::error::{ApiError, AppError};
use crate::metadata::MetadataClient;
use crate::models::ResolvedMedia;
use crate::proxy::ImageProxy;
use crate::resolver::Resolver;
use crate::ytdlp::{YtDlpConfig, YtDlpRunner};

/// Per-process services shared by all handlers. Nothing in here is mutated
/// after startup.
#[derive(Debug, Clone)]
pub struct AppState {
    pub resolver: Arc<Resolver>,
    pub downloader: Arc<Downloader>,
    pub proxy: Arc<ImageProxy>,
}

impl AppState {
    pub fn new(resolver: Resolver, downloader: Downloader, proxy: ImageProxy) -> Self {
        Self {
            resolver: Arc::new(resolver),
            downloader: Arc::new(downloader),
            proxy: Arc::new(proxy),
        }
    }

    /// Wire the real yt-dlp runner and HTTP clients from startup config.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut ytdlp_cfg = YtDlpConfig::new(config.yt_dlp_path.clone());
        ytdlp_cfg.metadata_timeout = config.metadata_timeout;
        ytdlp_cfg.output_dir = config.download_dir.clone();
        let ytdlp = YtDlpRunner::new(ytdlp_cfg);

        let metadata = MetadataClient::new(
            config.api_key.clone(),
            config.api_base_url.clone(),
            config.http_timeout,
        )
        .context("Failed to build metadata API client")?;

        let proxy =
            ImageProxy::new(config.http_timeout).context("Failed to build image proxy client")?;

        Ok(Self::new(
            Resolver::new(ytdlp.clone(), metadata),
            Downloader::new(ytdlp, config.download_timeout),
            proxy,
        ))
    }
}

/// Create the router. Only `allowed_origin` may call it cross-origin, and only with GET.
pub fn build_router(state: AppState, allowed_origin: HeaderValue) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(allowed_origin)
        .allow_methods([Method::GET]);

    Router::new()
        .route("/video-info", get(video_info))
        .route("/download", get(download))
        .route("/dl", get(proxy_image))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct UrlQuery {
    url: Option<String>,
}

impl UrlQuery {
    fn url(&self) -> Result<&str, AppError> {
        self.url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or(AppError::MissingParameter("url"))
    }
}

#[derive(Debug, Deserialize)]
struct DownloadQuery {
    url: Option<String>,
    quality: Option<String>,
    extension: Option<String>,
}

async fn video_info(
    State(state): State<AppState>,
    Query(query): Query<UrlQuery>,
) -> Result<Json<ResolvedMedia>, ApiError> {
    let url = query.url()?;
    let media = state.resolver.resolve(url).await?;
    Ok(Json(media))
}

/// Streams newline-delimited progress events until yt-dlp exits.
async fn download(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ApiError> {
    let req = parse_download_request(
        query.url.as_deref(),
        query.quality.as_deref(),
        query.extension.as_deref(),
    )
    .map_err(|e| ApiError::from(e).with_message_key())?;

    let events = state
        .downloader
        .start(&req)
        .await
        .map_err(|e| ApiError::from(e).with_message_key())?;

    let body = Body::from_stream(events.map(|event| event.to_ndjson_line()));

    Ok((
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response())
}

/// Relay an image; headers go out once the upstream has been checked.
async fn proxy_image(
    State(state): State<AppState>,
    Query(query): Query<UrlQuery>,
) -> Result<Response, ApiError> {
    let url = query.url()?;
    let image = state.proxy.fetch(url).await?;

    let mut response = Body::from_stream(image.body).into_response();
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&image.content_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Some(len) = image.content_length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }
    Ok(response)
}
