use serde::{Deserialize, Serialize};

/// Structured document emitted by `yt-dlp --dump-json` for a single video.
///
/// Only the fields this service reads are declared; everything else in the
/// (very large) document is ignored. `id`, `channel_id`, `title` and `formats`
/// are mandatory: a document without them is treated as unparseable output.
#[derive(Debug, Clone, Deserialize)]
pub struct RawExtractionRecord {
    pub id: String,
    pub channel_id: String,
    pub title: String,
    pub duration: Option<f64>,
    pub thumbnail: Option<String>,
    pub uploader: Option<String>,
    pub channel_url: Option<String>,
    /// Direct media URL, present when yt-dlp resolved a single combined format.
    pub url: Option<String>,
    pub webpage_url: Option<String>,
    pub formats: Vec<StreamFormatCandidate>,
}

/// One entry of the record's `formats` array.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamFormatCandidate {
    #[serde(default)]
    pub format_id: String,
    pub ext: Option<String>,
    pub resolution: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub filesize: Option<f64>,
    pub abr: Option<f64>,
    pub url: Option<String>,
}

/// Display-ready view of a [`StreamFormatCandidate`]. Recomputed per request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayFormat {
    pub format_id: String,
    pub resolution: String,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub file_size: String,
    pub video_quality: String,
    pub audio_bitrate: String,
    pub ext: String,
    /// Playback URL, or the `"Unknown"` sentinel.
    pub url: String,
}

/// Best-effort enrichment from the metadata API.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublisherMetadata {
    pub video_channel_title: Option<String>,
    pub publisher_thumbnail_url: Option<String>,
}

/// Unified `/video-info` response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedMedia {
    #[serde(rename = "url")]
    pub canonical_url: Option<String>,
    pub title: String,
    #[serde(rename = "duration")]
    pub duration_seconds: Option<f64>,
    #[serde(rename = "thumbnail")]
    pub thumbnail_url: Option<String>,
    #[serde(rename = "author")]
    pub author_name: String,
    #[serde(rename = "authorImg")]
    pub author_image_url: String,
    #[serde(rename = "channelUrl")]
    pub channel_url: Option<String>,
    pub formats: Vec<DisplayFormat>,
    /// Always one of `formats[].url`, or null.
    #[serde(rename = "videoUrl")]
    pub selected_playback_url: Option<String>,
}

/// Validated `/download` parameters. All three are required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub quality_ceiling_height: u32,
    pub container_format: String,
}
