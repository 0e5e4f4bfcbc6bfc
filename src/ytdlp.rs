use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::AppError;
use crate::models::{DownloadRequest, RawExtractionRecord};
use crate::process::{ProcessRunner, StreamingProcess, SystemRunner};

/// Where to find yt-dlp and how to call it.
#[derive(Debug, Clone)]
pub struct YtDlpConfig {
    /// Path to the `yt-dlp` binary.
    pub yt_dlp_path: PathBuf,

    /// Optional extra arguments injected into every yt-dlp call (e.g., proxy).
    pub global_args: Vec<String>,

    /// Timeout for metadata calls (not for downloads).
    pub metadata_timeout: Duration,

    /// Directory downloads are written to.
    pub output_dir: PathBuf,
}

impl YtDlpConfig {
    pub fn new(yt_dlp_path: PathBuf) -> Self {
        Self {
            yt_dlp_path,
            global_args: vec![],
            metadata_timeout: Duration::from_secs(30),
            output_dir: PathBuf::from("."),
        }
    }
}

/// Find yt-dlp on PATH or in common installation paths.
pub fn find_ytdlp_binary() -> PathBuf {
    if let Ok(path) = which::which("yt-dlp") {
        log::info!("Found yt-dlp on PATH: {:?}", path);
        return path;
    }

    // Common paths where yt-dlp might be installed
    let common_paths = [
        // Homebrew on Apple Silicon
        "/opt/homebrew/bin/yt-dlp",
        // Homebrew on Intel Mac
        "/usr/local/bin/yt-dlp",
        // pip install --user
        "$HOME/.local/bin/yt-dlp",
        // System-wide pip
        "/usr/bin/yt-dlp",
        // pipx
        "$HOME/.local/pipx/venvs/yt-dlp/bin/yt-dlp",
    ];

    for path_template in &common_paths {
        let expanded = if path_template.starts_with("$HOME") {
            match std::env::var_os("HOME") {
                Some(home) => path_template.replace("$HOME", &home.to_string_lossy()),
                None => continue,
            }
        } else {
            path_template.to_string()
        };

        let path = PathBuf::from(&expanded);
        if path.exists() {
            log::info!("Found yt-dlp at: {:?}", path);
            return path;
        }
    }

    // Last resort - hope it's in PATH at spawn time
    log::warn!("Could not find yt-dlp in common paths, falling back to PATH lookup");
    PathBuf::from("yt-dlp")
}

/// Format expression: best video no taller than `height`, merged with best audio.
pub fn format_expression(height: u32) -> String {
    format!("bestvideo[height<={height}]+bestaudio")
}

/// Runner for the two yt-dlp invocations this service makes.
#[derive(Clone)]
pub struct YtDlpRunner {
    cfg: YtDlpConfig,
    runner: Arc<dyn ProcessRunner>,
}

impl std::fmt::Debug for YtDlpRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YtDlpRunner")
            .field("cfg", &self.cfg)
            .finish_non_exhaustive()
    }
}

impl YtDlpRunner {
    pub fn new(cfg: YtDlpConfig) -> Self {
        Self::with_runner(cfg, Arc::new(SystemRunner::new()))
    }

    pub fn with_runner(cfg: YtDlpConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { cfg, runner }
    }

    fn program(&self) -> String {
        self.cfg
            .yt_dlp_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "yt-dlp".to_string())
    }

    pub fn info_args(&self, url: &str) -> Vec<String> {
        let mut args = self.cfg.global_args.clone();
        args.extend([
            "--dump-json".to_string(),
            "--no-warnings".to_string(),
            "--no-playlist".to_string(),
            url.to_string(),
        ]);
        args
    }

    pub fn download_args(&self, req: &DownloadRequest) -> Vec<String> {
        let template = self.cfg.output_dir.join("%(title)s [%(id)s].%(ext)s");

        let mut args = self.cfg.global_args.clone();
        args.extend([
            "--newline".to_string(),
            "--no-warnings".to_string(),
            "--no-playlist".to_string(),
            "-f".to_string(),
            format_expression(req.quality_ceiling_height),
            "--merge-output-format".to_string(),
            req.container_format.clone(),
            "-o".to_string(),
            template.to_string_lossy().into_owned(),
            req.url.clone(),
        ]);
        args
    }

    /// Fetch the extraction record for a URL via `yt-dlp --dump-json`.
    ///
    /// Notes:
    /// - Uses the configured metadata timeout.
    /// - Output is parsed even when partial; a killed process can exit 0 with
    ///   a truncated document, which surfaces as `UnparseableOutput`.
    /// - It does NOT download media.
    pub async fn fetch_record(&self, url: &str) -> Result<RawExtractionRecord, AppError> {
        let args = self.info_args(url);
        log::debug!("Running {} {:?}", self.program(), args);

        let output = self
            .runner
            .run(&self.cfg.yt_dlp_path, &args, Some(self.cfg.metadata_timeout))
            .await?;

        let stdout = output.into_stdout(&self.program())?;
        parse_extraction_record(&stdout)
    }

    /// Spawn a download. Progress is read from the returned process's stdout.
    pub async fn spawn_download(&self, req: &DownloadRequest) -> Result<StreamingProcess, AppError> {
        let args = self.download_args(req);
        log::info!("Starting download of {} with args: {:?}", req.url, args);
        self.runner
            .spawn_streaming(&self.cfg.yt_dlp_path, &args)
            .await
    }
}

fn looks_like_json_object(s: &str) -> bool {
    let t = s.trim();
    t.starts_with('{') && t.ends_with('}')
}

/// Decode the first JSON object line of yt-dlp's stdout.
pub fn parse_extraction_record(stdout: &[u8]) -> Result<RawExtractionRecord, AppError> {
    let text = String::from_utf8_lossy(stdout);

    let line = text
        .lines()
        .find(|l| looks_like_json_object(l))
        .ok_or_else(|| {
            AppError::UnparseableOutput(format!(
                "no JSON document in {} bytes of output",
                stdout.len()
            ))
        })?;

    serde_json::from_str(line)
        .map_err(|e| AppError::UnparseableOutput(format!("invalid yt-dlp JSON: {e}")))
}
