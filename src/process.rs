//! Process Runner
//!
//! Launches external tools in one of two modes:
//! - batch: wait for exit, hand back everything stdout produced
//! - streaming: hand stdout to the caller line by line as it arrives, exit reported separately
//!
//! `SystemRunner` drives real subprocesses. `ScriptedRunner` replays canned output
//! so extraction and download flows can be exercised without yt-dlp installed.

use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[cfg(windows)]
use std::os::windows::process::CommandExt;

/// Windows flag to prevent console window from appearing when spawning processes.
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x08000000;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio_util::codec::{Decoder, FramedRead};

use crate::error::AppError;

/// Result of a batch-mode run.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Stdout of a successful run, or `ProcessNonZeroExit` carrying the raw code.
    pub fn into_stdout(self, program: &str) -> Result<Vec<u8>, AppError> {
        if self.success() {
            Ok(self.stdout)
        } else {
            Err(AppError::ProcessNonZeroExit {
                program: program.to_string(),
                code: self.exit_code,
            })
        }
    }
}

/// Longest stdout line kept whole; anything longer is handed over in pieces.
const MAX_LINE_BYTES: usize = 64 * 1024;

/// Frames stdout into `\n`-terminated lines, raw bytes included.
///
/// Pipe reads cut wherever the buffer fills, so without framing a progress
/// line like `[download]   5.9%` can arrive as `5.` and `9%`.
#[derive(Debug, Default)]
pub struct LineFramer;

impl Decoder for LineFramer {
    type Item = Bytes;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, Self::Error> {
        match buf.iter().position(|b| *b == b'\n') {
            Some(pos) => Ok(Some(buf.split_to(pos + 1).freeze())),
            None if buf.len() >= MAX_LINE_BYTES => Ok(Some(buf.split().freeze())),
            None => Ok(None),
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, Self::Error> {
        match self.decode(buf)? {
            Some(line) => Ok(Some(line)),
            None if buf.is_empty() => Ok(None),
            None => Ok(Some(buf.split().freeze())),
        }
    }
}

/// A running streaming-mode process.
///
/// `chunks` yields one stdout line per item (a trailing partial line comes
/// last). Dropping this value terminates the underlying process if it is
/// still alive.
pub struct StreamingProcess {
    pub chunks: BoxStream<'static, std::io::Result<Bytes>>,
    pub exit: BoxFuture<'static, std::io::Result<Option<i32>>>,
}

impl std::fmt::Debug for StreamingProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingProcess").finish_non_exhaustive()
    }
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run to completion. A timeout kills the process and yields `ProcessTimeout`.
    async fn run(
        &self,
        program: &Path,
        args: &[String],
        timeout: Option<Duration>,
    ) -> Result<ProcessOutput, AppError>;

    /// Spawn and return as soon as the process is running.
    async fn spawn_streaming(
        &self,
        program: &Path,
        args: &[String],
    ) -> Result<StreamingProcess, AppError>;
}

fn program_name(program: &Path) -> String {
    program
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string())
}

/// Runner backed by `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }

    fn command(program: &Path, args: &[String]) -> Command {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Hide console window on Windows
        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        cmd
    }
}

fn pipe_missing(name: &str, pipe: &str) -> AppError {
    AppError::Io {
        context: format!("failed to capture {name} {pipe}"),
        source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe not available"),
    }
}

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(
        &self,
        program: &Path,
        args: &[String],
        timeout: Option<Duration>,
    ) -> Result<ProcessOutput, AppError> {
        let name = program_name(program);

        let mut child = Self::command(program, args)
            .spawn()
            .map_err(|source| AppError::ProcessSpawn {
                program: program.display().to_string(),
                source,
            })?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| pipe_missing(&name, "stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| pipe_missing(&name, "stderr"))?;

        let read_stdout = async {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).await?;
            Ok::<_, std::io::Error>(buf)
        };

        // stderr goes to the log sink line by line and is kept for the caller.
        let read_stderr = async {
            let mut buf = Vec::new();
            let mut segments = BufReader::new(stderr).split(b'\n');
            while let Some(segment) = segments.next_segment().await? {
                log::warn!("{} stderr: {}", name, String::from_utf8_lossy(&segment));
                buf.extend_from_slice(&segment);
                buf.push(b'\n');
            }
            Ok::<_, std::io::Error>(buf)
        };

        let collect = async {
            let (stdout, stderr) = tokio::try_join!(read_stdout, read_stderr)?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>(ProcessOutput {
                exit_code: status.code(),
                stdout,
                stderr,
            })
        };

        let collected = match timeout {
            Some(after) => match tokio::time::timeout(after, collect).await {
                Ok(result) => result,
                Err(_) => {
                    let _ = child.kill().await;
                    return Err(AppError::ProcessTimeout {
                        program: name,
                        after,
                    });
                }
            },
            None => collect.await,
        };

        collected.map_err(|source| AppError::Io {
            context: format!("error reading {name} output"),
            source,
        })
    }

    async fn spawn_streaming(
        &self,
        program: &Path,
        args: &[String],
    ) -> Result<StreamingProcess, AppError> {
        let name = program_name(program);

        let mut child = Self::command(program, args)
            .spawn()
            .map_err(|source| AppError::ProcessSpawn {
                program: program.display().to_string(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| pipe_missing(&name, "stdout"))?;

        // Keep stderr drained so the child never blocks on a full pipe.
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    log::debug!("{} stderr: {}", name, line);
                }
            });
        }

        Ok(StreamingProcess {
            chunks: FramedRead::new(stdout, LineFramer).boxed(),
            exit: async move { child.wait().await.map(|status| status.code()) }.boxed(),
        })
    }
}

/// In-memory runner that replays a fixed script.
///
/// Every invocation's argument list is recorded so callers can assert on it.
#[derive(Debug, Clone)]
pub struct ScriptedRunner {
    chunks: Vec<Bytes>,
    stderr: Vec<u8>,
    exit_code: Option<i32>,
    fail_spawn: bool,
    hang_after_output: bool,
    calls: Arc<Mutex<Vec<Vec<String>>>>,
}

impl ScriptedRunner {
    /// A process that prints nothing and exits with `code`.
    pub fn exiting(code: i32) -> Self {
        Self {
            chunks: Vec::new(),
            stderr: Vec::new(),
            exit_code: Some(code),
            fail_spawn: false,
            hang_after_output: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A process whose executable cannot be started.
    pub fn spawn_failure() -> Self {
        Self {
            fail_spawn: true,
            ..Self::exiting(0)
        }
    }

    /// A process killed by a signal (no exit code).
    pub fn signaled() -> Self {
        Self {
            exit_code: None,
            ..Self::exiting(0)
        }
    }

    pub fn with_stdout(mut self, stdout: impl Into<Bytes>) -> Self {
        self.chunks = vec![stdout.into()];
        self
    }

    /// Stdout delivered as separate chunks, in order.
    pub fn with_chunks<I, B>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        self.chunks = chunks.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_stderr(mut self, stderr: impl Into<Vec<u8>>) -> Self {
        self.stderr = stderr.into();
        self
    }

    /// Streaming mode never closes stdout after the scripted chunks.
    pub fn hanging(mut self) -> Self {
        self.hang_after_output = true;
        self
    }

    /// Argument lists of every invocation so far.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, program: &Path, args: &[String]) -> Result<(), AppError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(args.to_vec());
        }
        if self.fail_spawn {
            return Err(AppError::ProcessSpawn {
                program: program.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(
        &self,
        program: &Path,
        args: &[String],
        _timeout: Option<Duration>,
    ) -> Result<ProcessOutput, AppError> {
        self.record(program, args)?;
        Ok(ProcessOutput {
            exit_code: self.exit_code,
            stdout: self.chunks.concat(),
            stderr: self.stderr.clone(),
        })
    }

    async fn spawn_streaming(
        &self,
        program: &Path,
        args: &[String],
    ) -> Result<StreamingProcess, AppError> {
        self.record(program, args)?;

        let scripted = futures::stream::iter(
            self.chunks
                .clone()
                .into_iter()
                .map(Ok::<Bytes, std::io::Error>),
        );
        let chunks = if self.hang_after_output {
            scripted.chain(futures::stream::pending()).boxed()
        } else {
            scripted.boxed()
        };

        Ok(StreamingProcess {
            chunks,
            exit: futures::future::ready(Ok(self.exit_code)).boxed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_zero_exit_carries_raw_code() {
        let output = ProcessOutput {
            exit_code: Some(2),
            stdout: b"partial".to_vec(),
            stderr: Vec::new(),
        };
        match output.into_stdout("yt-dlp") {
            Err(AppError::ProcessNonZeroExit { program, code }) => {
                assert_eq!(program, "yt-dlp");
                assert_eq!(code, Some(2));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn signal_exit_is_not_success() {
        let output = ProcessOutput {
            exit_code: None,
            stdout: Vec::new(),
            stderr: Vec::new(),
        };
        assert!(!output.success());
    }

    #[tokio::test]
    async fn scripted_batch_concatenates_chunks() {
        let runner = ScriptedRunner::exiting(0).with_chunks(["{\"a\":", "1}"]);
        let out = runner
            .run(Path::new("yt-dlp"), &["-j".to_string()], None)
            .await
            .unwrap();
        assert_eq!(out.stdout, b"{\"a\":1}");
        assert_eq!(runner.calls(), vec![vec!["-j".to_string()]]);
    }

    #[tokio::test]
    async fn scripted_spawn_failure_is_distinct() {
        let runner = ScriptedRunner::spawn_failure();
        let err = runner
            .spawn_streaming(Path::new("yt-dlp"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ProcessSpawn { .. }));
    }

    #[tokio::test]
    async fn scripted_streaming_delivers_chunks_then_exit() {
        let runner = ScriptedRunner::exiting(3).with_chunks(["a", "b"]);
        let process = runner
            .spawn_streaming(Path::new("yt-dlp"), &[])
            .await
            .unwrap();
        let chunks: Vec<Bytes> = process
            .chunks
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks, vec![Bytes::from("a"), Bytes::from("b")]);
        assert_eq!(process.exit.await.unwrap(), Some(3));
    }

    #[test]
    fn line_framer_splits_on_newline_and_flushes_tail() {
        let mut framer = LineFramer;
        let mut buf = BytesMut::from(&b"[download]   5."[..]);
        assert_eq!(framer.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"9% of 10MiB\n[download]   7.2%");
        assert_eq!(
            framer.decode(&mut buf).unwrap(),
            Some(Bytes::from("[download]   5.9% of 10MiB\n"))
        );
        assert_eq!(framer.decode(&mut buf).unwrap(), None);
        assert_eq!(
            framer.decode_eof(&mut buf).unwrap(),
            Some(Bytes::from("[download]   7.2%"))
        );
        assert_eq!(framer.decode_eof(&mut buf).unwrap(), None);
    }

    #[test]
    fn line_framer_caps_runaway_lines() {
        let mut framer = LineFramer;
        let mut buf = BytesMut::from(&vec![b'x'; MAX_LINE_BYTES][..]);
        let piece = framer.decode(&mut buf).unwrap().unwrap();
        assert_eq!(piece.len(), MAX_LINE_BYTES);
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn missing_executable_is_spawn_failure() {
        let err = SystemRunner::new()
            .run(
                Path::new("/nonexistent/definitely-not-yt-dlp"),
                &[],
                Some(Duration::from_secs(5)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ProcessSpawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn system_batch_captures_stdout_and_exit_code() {
        let out = SystemRunner::new()
            .run(
                Path::new("/bin/sh"),
                &["-c".to_string(), "printf hello; echo oops >&2; exit 4".to_string()],
                Some(Duration::from_secs(10)),
            )
            .await
            .unwrap();
        assert_eq!(out.stdout, b"hello");
        assert_eq!(out.stderr, b"oops\n");
        assert_eq!(out.exit_code, Some(4));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn system_batch_timeout_kills_process() {
        let err = SystemRunner::new()
            .run(
                Path::new("/bin/sh"),
                &["-c".to_string(), "sleep 30".to_string()],
                Some(Duration::from_millis(100)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ProcessTimeout { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn system_streaming_reports_exit_after_output() {
        let process = SystemRunner::new()
            .spawn_streaming(
                Path::new("/bin/sh"),
                &["-c".to_string(), "printf '12.5%%'; exit 0".to_string()],
            )
            .await
            .unwrap();
        let text: Vec<u8> = process
            .chunks
            .map(|c| c.unwrap().to_vec())
            .concat()
            .await;
        assert_eq!(text, b"12.5%");
        assert_eq!(process.exit.await.unwrap(), Some(0));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn system_streaming_reassembles_lines_split_across_writes() {
        let process = SystemRunner::new()
            .spawn_streaming(
                Path::new("/bin/sh"),
                &[
                    "-c".to_string(),
                    "printf '[download]   5.'; sleep 0.2; printf '9%% of 10MiB\\n[download]   7.2%%\\n'"
                        .to_string(),
                ],
            )
            .await
            .unwrap();
        let lines: Vec<Bytes> = process.chunks.map(|c| c.unwrap()).collect().await;
        assert_eq!(
            lines,
            vec![
                Bytes::from("[download]   5.9% of 10MiB\n"),
                Bytes::from("[download]   7.2%\n"),
            ]
        );
    }
}
