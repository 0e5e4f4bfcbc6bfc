//! Startup configuration
//!
//! Everything is read from the environment exactly once, before the listener
//! is bound, and handed to the server by value.

use std::path::PathBuf;
use std::time::Duration;

use axum::http::HeaderValue;

use crate::metadata::DEFAULT_API_BASE;
use crate::ytdlp::find_ytdlp_binary;

pub const DEFAULT_PORT: u16 = 10000;
pub const DEFAULT_CLIENT_URL: &str = "http://localhost:3000";
const DEFAULT_METADATA_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 3600;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("YOUTUBE_API_KEY is not set")]
    MissingApiKey,

    #[error("{var} must be a non-negative integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{var} must be greater than zero")]
    ZeroTimeout { var: &'static str },

    #[error("CLIENT_URL is not a valid origin: {0:?}")]
    InvalidOrigin(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub api_key: String,
    /// Single origin allowed by CORS.
    pub allowed_origin: HeaderValue,
    pub yt_dlp_path: PathBuf,
    pub api_base_url: String,
    pub download_dir: PathBuf,
    pub metadata_timeout: Duration,
    /// `None` lets downloads run as long as they need.
    pub download_timeout: Option<Duration>,
    pub http_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = get("YOUTUBE_API_KEY").ok_or(ConfigError::MissingApiKey)?;

        let client_url = get("CLIENT_URL").unwrap_or_else(|| DEFAULT_CLIENT_URL.to_string());
        let allowed_origin = HeaderValue::from_str(client_url.trim_end_matches('/'))
            .map_err(|_| ConfigError::InvalidOrigin(client_url.clone()))?;

        let number = |var: &'static str, default: u64| -> Result<u64, ConfigError> {
            match get(var) {
                Some(value) => value
                    .parse::<u64>()
                    .map_err(|_| ConfigError::InvalidNumber { var, value }),
                None => Ok(default),
            }
        };

        // A zero here would make every request time out at once.
        let positive = |var: &'static str, default: u64| -> Result<Duration, ConfigError> {
            match number(var, default)? {
                0 => Err(ConfigError::ZeroTimeout { var }),
                secs => Ok(Duration::from_secs(secs)),
            }
        };

        let port = match get("PORT") {
            Some(value) => value
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidNumber { var: "PORT", value })?,
            None => DEFAULT_PORT,
        };

        let download_timeout = match number("DOWNLOAD_TIMEOUT_SECS", DEFAULT_DOWNLOAD_TIMEOUT_SECS)? {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(Self {
            port,
            api_key,
            allowed_origin,
            yt_dlp_path: get("YTDLP_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(find_ytdlp_binary),
            api_base_url: get("YOUTUBE_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            download_dir: get("DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            metadata_timeout: positive("METADATA_TIMEOUT_SECS", DEFAULT_METADATA_TIMEOUT_SECS)?,
            download_timeout,
            http_timeout: positive("HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_only_the_key_is_set() {
        let cfg = Config::from_lookup(lookup(&[
            ("YOUTUBE_API_KEY", "secret"),
            ("YTDLP_PATH", "/opt/bin/yt-dlp"),
        ]))
        .unwrap();
        assert_eq!(cfg.port, 10000);
        assert_eq!(cfg.api_key, "secret");
        assert_eq!(cfg.allowed_origin, "http://localhost:3000");
        assert_eq!(cfg.yt_dlp_path, PathBuf::from("/opt/bin/yt-dlp"));
        assert_eq!(cfg.api_base_url, DEFAULT_API_BASE);
        assert_eq!(cfg.metadata_timeout, Duration::from_secs(30));
        assert_eq!(cfg.download_timeout, Some(Duration::from_secs(3600)));
        assert_eq!(cfg.http_timeout, Duration::from_secs(15));
    }

    #[test]
    fn missing_or_empty_key_is_fatal() {
        assert!(matches!(
            Config::from_lookup(lookup(&[])),
            Err(ConfigError::MissingApiKey)
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("YOUTUBE_API_KEY", "  ")])),
            Err(ConfigError::MissingApiKey)
        ));
    }

    #[test]
    fn overrides_and_zero_download_timeout() {
        let cfg = Config::from_lookup(lookup(&[
            ("YOUTUBE_API_KEY", "k"),
            ("YTDLP_PATH", "yt-dlp"),
            ("PORT", "8080"),
            ("CLIENT_URL", "https://app.example.com/"),
            ("DOWNLOAD_TIMEOUT_SECS", "0"),
            ("DOWNLOAD_DIR", "/data"),
        ]))
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.allowed_origin, "https://app.example.com");
        assert_eq!(cfg.download_timeout, None);
        assert_eq!(cfg.download_dir, PathBuf::from("/data"));
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("YOUTUBE_API_KEY", "k"),
            ("YTDLP_PATH", "yt-dlp"),
            ("PORT", "ten"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { var: "PORT", .. }));

        let err = Config::from_lookup(lookup(&[
            ("YOUTUBE_API_KEY", "k"),
            ("YTDLP_PATH", "yt-dlp"),
            ("HTTP_TIMEOUT_SECS", "-1"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidNumber {
                var: "HTTP_TIMEOUT_SECS",
                ..
            }
        ));
    }

    #[test]
    fn zero_is_refused_for_request_timeouts() {
        for var in ["METADATA_TIMEOUT_SECS", "HTTP_TIMEOUT_SECS"] {
            let err = Config::from_lookup(lookup(&[
                ("YOUTUBE_API_KEY", "k"),
                ("YTDLP_PATH", "yt-dlp"),
                (var, "0"),
            ]))
            .unwrap_err();
            assert!(matches!(err, ConfigError::ZeroTimeout { var: v } if v == var));
        }
    }
}
