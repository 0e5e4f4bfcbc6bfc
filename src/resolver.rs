//! Resolution Orchestrator
//!
//! validate -> yt-dlp info dump -> metadata enrichment -> format selection -> response.
//! Any hard failure short-circuits; only the enrichment step degrades.

use crate::error::AppError;
use crate::formats::{derive_display_formats, pick_playback_url, UNKNOWN};
use crate::metadata::MetadataClient;
use crate::models::{PublisherMetadata, RawExtractionRecord, ResolvedMedia};
use crate::url_utils::is_acceptable_source;
use crate::ytdlp::YtDlpRunner;

#[derive(Debug, Clone)]
pub struct Resolver {
    ytdlp: YtDlpRunner,
    metadata: MetadataClient,
}

impl Resolver {
    pub fn new(ytdlp: YtDlpRunner, metadata: MetadataClient) -> Self {
        Self { ytdlp, metadata }
    }

    pub async fn resolve(&self, url: &str) -> Result<ResolvedMedia, AppError> {
        if !is_acceptable_source(url) {
            return Err(AppError::InvalidSource(url.to_string()));
        }

        log::info!("Fetching video details for {}", url);

        let record = self.ytdlp.fetch_record(url).await.map_err(|e| {
            log::error!("Extraction failed for {}: {}", url, e);
            e
        })?;

        let publisher = self
            .metadata
            .fetch_video_and_channel(&record.id, &record.channel_id)
            .await;

        let media = assemble(record, publisher);
        log::info!(
            "Resolved {} ({} formats, playback url {})",
            url,
            media.formats.len(),
            if media.selected_playback_url.is_some() { "selected" } else { "absent" }
        );
        Ok(media)
    }
}

/// Merge the extraction record with enrichment data.
pub fn assemble(record: RawExtractionRecord, publisher: PublisherMetadata) -> ResolvedMedia {
    let formats = derive_display_formats(&record.formats);
    let selected_playback_url = pick_playback_url(&formats);

    let author_name = record
        .uploader
        .or(publisher.video_channel_title)
        .unwrap_or_else(|| UNKNOWN.to_string());

    ResolvedMedia {
        canonical_url: record.url.or(record.webpage_url),
        title: record.title,
        duration_seconds: record.duration,
        thumbnail_url: record.thumbnail,
        author_name,
        author_image_url: publisher
            .publisher_thumbnail_url
            .unwrap_or_else(|| UNKNOWN.to_string()),
        channel_url: record.channel_url,
        formats,
        selected_playback_url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StreamFormatCandidate;
    use crate::process::ScriptedRunner;
    use crate::ytdlp::YtDlpConfig;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    fn record() -> RawExtractionRecord {
        RawExtractionRecord {
            id: "abc".into(),
            channel_id: "UC1".into(),
            title: "Title".into(),
            duration: Some(212.0),
            thumbnail: Some("https://i.ytimg.com/vi/abc/maxres.jpg".into()),
            uploader: None,
            channel_url: Some("https://www.youtube.com/channel/UC1".into()),
            url: None,
            webpage_url: Some("https://www.youtube.com/watch?v=abc".into()),
            formats: vec![StreamFormatCandidate {
                format_id: "18".into(),
                height: Some(360),
                width: Some(640),
                url: Some("https://rr5---sn.googlevideo.com/videoplayback".into()),
                ..Default::default()
            }],
        }
    }

    #[test]
    fn assemble_defaults_missing_enrichment_to_unknown() {
        let media = assemble(record(), PublisherMetadata::default());
        assert_eq!(media.author_name, "Unknown");
        assert_eq!(media.author_image_url, "Unknown");
        assert_eq!(
            media.canonical_url.as_deref(),
            Some("https://www.youtube.com/watch?v=abc")
        );
        assert_eq!(
            media.selected_playback_url.as_deref(),
            Some("https://rr5---sn.googlevideo.com/videoplayback")
        );
    }

    #[test]
    fn assemble_prefers_uploader_over_channel_title() {
        let mut r = record();
        r.uploader = Some("Uploader".into());
        let media = assemble(
            r,
            PublisherMetadata {
                video_channel_title: Some("Channel".into()),
                ..Default::default()
            },
        );
        assert_eq!(media.author_name, "Uploader");

        let media = assemble(
            record(),
            PublisherMetadata {
                video_channel_title: Some("Channel".into()),
                publisher_thumbnail_url: Some("https://yt3.ggpht.com/x".into()),
            },
        );
        assert_eq!(media.author_name, "Channel");
        assert_eq!(media.author_image_url, "https://yt3.ggpht.com/x");
    }

    #[tokio::test]
    async fn invalid_source_never_reaches_the_tool() {
        let script = ScriptedRunner::exiting(0);
        let resolver = Resolver::new(
            YtDlpRunner::with_runner(
                YtDlpConfig::new(PathBuf::from("yt-dlp")),
                Arc::new(script.clone()),
            ),
            MetadataClient::new("k", "http://127.0.0.1:9", Duration::from_millis(100)).unwrap(),
        );

        let err = resolver.resolve("https://vimeo.com/1").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidSource(_)));
        assert!(script.calls().is_empty());
    }
}
