//! Format Selector
//!
//! Turns raw yt-dlp format entries into display rows and picks the direct
//! playback URL handed to the player.

use url::Url;

use crate::models::{DisplayFormat, StreamFormatCandidate};

/// Sentinel for any display field whose source value is missing.
pub const UNKNOWN: &str = "Unknown";
/// Resolution label for entries without video dimensions.
pub const AUDIO_ONLY_RESOLUTION: &str = "audio-only";
/// Quality label for entries without a height.
pub const AUDIO_ONLY_QUALITY: &str = "Audio Only";
/// Host prefix of primary-tier delivery nodes (`rr1---sn-....googlevideo.com`).
pub const PRIMARY_TIER_HOST_PREFIX: &str = "rr";

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|v| !v.is_empty())
}

/// Derive the display row for one candidate.
///
/// Zero sizes, heights and bitrates count as unknown, as do empty strings.
pub fn derive_display_format(candidate: &StreamFormatCandidate) -> DisplayFormat {
    let height = candidate.height.filter(|h| *h > 0);
    let width = candidate.width.filter(|w| *w > 0);

    let resolution = match (non_empty(&candidate.resolution), width, height) {
        (Some(label), _, _) => label.to_string(),
        (None, Some(w), Some(h)) => format!("{w}x{h}"),
        _ => AUDIO_ONLY_RESOLUTION.to_string(),
    };

    let video_quality = match height {
        Some(h) => format!("{h}p"),
        None => AUDIO_ONLY_QUALITY.to_string(),
    };

    let file_size = match candidate.filesize.filter(|b| *b > 0.0) {
        Some(bytes) => format!("{:.2} MB", bytes / 1e6),
        None => UNKNOWN.to_string(),
    };

    let audio_bitrate = match candidate.abr.filter(|a| *a > 0.0) {
        Some(abr) => format!("{abr} kbps"),
        None => UNKNOWN.to_string(),
    };

    DisplayFormat {
        format_id: candidate.format_id.clone(),
        resolution,
        video_codec: candidate.vcodec.clone(),
        audio_codec: candidate.acodec.clone(),
        file_size,
        video_quality,
        audio_bitrate,
        ext: non_empty(&candidate.ext).unwrap_or(UNKNOWN).to_string(),
        url: non_empty(&candidate.url).unwrap_or(UNKNOWN).to_string(),
    }
}

/// Derive display rows, preserving candidate order.
pub fn derive_display_formats(candidates: &[StreamFormatCandidate]) -> Vec<DisplayFormat> {
    candidates.iter().map(derive_display_format).collect()
}

/// Whether `url` is an https URL served by a primary-tier delivery node.
///
/// The `"Unknown"` sentinel does not parse and is therefore never primary-tier.
pub fn is_primary_tier(url: &str) -> bool {
    match Url::parse(url) {
        Ok(u) => {
            u.scheme() == "https"
                && u.host_str()
                    .is_some_and(|h| h.starts_with(PRIMARY_TIER_HOST_PREFIX))
        }
        Err(_) => false,
    }
}

/// Pick the playback URL: the **last** primary-tier entry that carries video.
///
/// yt-dlp orders formats from worst to best within each tier, so the last
/// match is preferred over the first or the tallest one. Returns `None` when
/// nothing qualifies; callers fall back to the record's own URL.
pub fn pick_playback_url(formats: &[DisplayFormat]) -> Option<String> {
    formats
        .iter()
        .filter(|f| {
            is_primary_tier(&f.url)
                && f.video_quality != AUDIO_ONLY_QUALITY
                && f.resolution != AUDIO_ONLY_RESOLUTION
        })
        .last()
        .map(|f| f.url.clone())
}
