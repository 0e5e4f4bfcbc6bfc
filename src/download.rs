//! Progress Streamer
//!
//! Drives a yt-dlp download and turns its free-form stdout into a sequence of
//! [`ProgressEvent`]s: non-decreasing `progress` percentages followed by
//! exactly one `done` or `error`.

use std::sync::OnceLock;
use std::time::Duration;

use futures::{Stream, StreamExt};
use regex::Regex;
use uuid::Uuid;

use crate::error::AppError;
use crate::events::ProgressEvent;
use crate::models::DownloadRequest;
use crate::process::StreamingProcess;
use crate::url_utils::is_acceptable_source;
use crate::ytdlp::YtDlpRunner;

fn percent_marker_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)\s*%").ok())
        .as_ref()
}

/// The last `NN.N%` marker in `chunk`, if any.
pub fn last_percent_marker(chunk: &str) -> Option<f64> {
    percent_marker_re()?
        .captures_iter(chunk)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .last()
}

/// Scan one stdout chunk against the highest percentage emitted so far.
///
/// Only the chunk's last marker counts. It is emitted when it does not go
/// backwards; otherwise it is dropped and `previous_max` is kept. Chunks are
/// expected to be whole lines (see [`crate::process::LineFramer`]).
pub fn scan_chunk(
    previous_max: Option<f64>,
    chunk: &str,
) -> (Option<f64>, Option<ProgressEvent>) {
    match last_percent_marker(chunk) {
        Some(value) if previous_max.map_or(true, |prev| value >= prev) => {
            (Some(value), Some(ProgressEvent::progress(value)))
        }
        _ => (previous_max, None),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Completed,
    Failed,
}

/// Per-download bookkeeping: lifecycle state and the high-water percentage.
#[derive(Debug)]
pub struct DownloadSession {
    pub id: Uuid,
    state: SessionState,
    last_percent: Option<f64>,
}

impl Default for DownloadSession {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Idle,
            last_percent: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn start(&mut self) {
        if self.state == SessionState::Idle {
            self.state = SessionState::Running;
        }
    }

    /// Feed one chunk of stdout. Ignored unless the session is running.
    pub fn observe_chunk(&mut self, chunk: &[u8]) -> Option<ProgressEvent> {
        if self.state != SessionState::Running {
            return None;
        }
        let text = String::from_utf8_lossy(chunk);
        let (max, event) = scan_chunk(self.last_percent, &text);
        self.last_percent = max;
        event
    }

    /// Terminal event for the process exit. `None` means killed without a code.
    pub fn finish(&mut self, exit_code: Option<i32>) -> ProgressEvent {
        if exit_code == Some(0) {
            self.state = SessionState::Completed;
            ProgressEvent::done()
        } else {
            self.state = SessionState::Failed;
            ProgressEvent::error(exit_code)
        }
    }
}

enum Ending {
    Exited(Option<i32>),
    TimedOut,
}

/// Event stream for a spawned download.
///
/// The stream owns the process: dropping it before the end (caller went away)
/// kills yt-dlp. With a `timeout`, a download still running at the deadline is
/// killed and reported as `error` with a null code.
pub fn progress_events(
    process: StreamingProcess,
    timeout: Option<Duration>,
) -> impl Stream<Item = ProgressEvent> + Send + 'static {
    async_stream::stream! {
        let mut session = DownloadSession::new();
        session.start();
        log::info!("[{}] Download session started", session.id);

        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
        let StreamingProcess { mut chunks, exit } = process;

        let mut ending = None;
        loop {
            let next = match deadline {
                Some(at) => match tokio::time::timeout_at(at, chunks.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        ending = Some(Ending::TimedOut);
                        break;
                    }
                },
                None => chunks.next().await,
            };

            match next {
                Some(Ok(chunk)) => {
                    log::debug!("[{}] yt-dlp stdout: {}", session.id, String::from_utf8_lossy(&chunk).trim_end());
                    if let Some(event) = session.observe_chunk(&chunk) {
                        yield event;
                    }
                }
                Some(Err(e)) => {
                    log::error!("[{}] Error reading yt-dlp stdout: {}", session.id, e);
                    break;
                }
                None => break,
            }
        }

        let ending = match ending {
            Some(ending) => {
                // Dropping the exit future drops the child, which kills it.
                drop(exit);
                ending
            }
            None => {
                let waited = match deadline {
                    Some(at) => tokio::time::timeout_at(at, exit).await.ok(),
                    None => Some(exit.await),
                };
                match waited {
                    Some(Ok(code)) => Ending::Exited(code),
                    Some(Err(e)) => {
                        log::error!("[{}] Failed to wait for yt-dlp: {}", session.id, e);
                        Ending::Exited(None)
                    }
                    None => Ending::TimedOut,
                }
            }
        };

        let event = match ending {
            Ending::Exited(code) => {
                let event = session.finish(code);
                if session.state() == SessionState::Completed {
                    log::info!("[{}] Download completed", session.id);
                } else {
                    log::error!("[{}] yt-dlp exited with code {:?}", session.id, code);
                }
                event
            }
            Ending::TimedOut => {
                log::error!(
                    "[{}] Download timed out after {:?}, killing yt-dlp",
                    session.id,
                    timeout
                );
                session.finish(None)
            }
        };
        yield event;
    }
}

/// Validate raw `/download` query values.
///
/// Empty values count as missing. Quality must be a positive pixel height and
/// the extension a bare alphanumeric container name.
pub fn parse_download_request(
    url: Option<&str>,
    quality: Option<&str>,
    extension: Option<&str>,
) -> Result<DownloadRequest, AppError> {
    fn required<'a>(value: Option<&'a str>, name: &'static str) -> Result<&'a str, AppError> {
        value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(AppError::MissingParameter(name))
    }

    let url = required(url, "url")?;
    let quality = required(quality, "quality")?;
    let extension = required(extension, "extension")?;

    let quality_ceiling_height = quality
        .parse::<u32>()
        .ok()
        .filter(|h| *h > 0)
        .ok_or_else(|| AppError::InvalidParameter {
            name: "quality",
            value: quality.to_string(),
        })?;

    if !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::InvalidParameter {
            name: "extension",
            value: extension.to_string(),
        });
    }

    if !is_acceptable_source(url) {
        return Err(AppError::InvalidSource(url.to_string()));
    }

    Ok(DownloadRequest {
        url: url.to_string(),
        quality_ceiling_height,
        container_format: extension.to_ascii_lowercase(),
    })
}

/// Starts downloads and hands back their event streams.
#[derive(Debug, Clone)]
pub struct Downloader {
    ytdlp: YtDlpRunner,
    timeout: Option<Duration>,
}

impl Downloader {
    pub fn new(ytdlp: YtDlpRunner, timeout: Option<Duration>) -> Self {
        Self { ytdlp, timeout }
    }

    /// Spawn yt-dlp for `req`. A spawn failure is returned here, before any
    /// event is produced, so the caller can still answer with an error status.
    pub async fn start(
        &self,
        req: &DownloadRequest,
    ) -> Result<impl Stream<Item = ProgressEvent> + Send + 'static, AppError> {
        let process = self.ytdlp.spawn_download(req).await?;
        Ok(progress_events(process, self.timeout))
    }
}
