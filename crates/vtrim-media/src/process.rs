//! External process runner with timeout, stderr capture and progress.

use std::collections::VecDeque;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::command::ToolCommand;
use crate::error::{MediaError, MediaResult};
use crate::progress::{is_progress_line, parse_progress_line, FfmpegProgress, ProgressCallback};

/// Default wall-clock bound for a single process.
pub const DEFAULT_PROCESS_TIMEOUT: Duration = Duration::from_secs(1800);

/// Number of stderr lines kept for diagnostics.
const STDERR_TAIL_LINES: usize = 40;

/// What a successful process left behind.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    /// Last non-progress stderr lines
    pub stderr_tail: String,
    pub elapsed: Duration,
}

/// Spawns tools and waits for them, killing the child on timeout.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(DEFAULT_PROCESS_TIMEOUT)
    }
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run a command to completion.
    pub async fn run(&self, cmd: &ToolCommand) -> MediaResult<ProcessOutput> {
        self.run_inner(cmd, None).await
    }

    /// Run a command, feeding ffmpeg `-progress` blocks to `on_progress`.
    pub async fn run_with_progress<F>(&self, cmd: &ToolCommand, on_progress: F) -> MediaResult<ProcessOutput>
    where
        F: Fn(FfmpegProgress) + Send + 'static,
    {
        self.run_inner(cmd, Some(Box::new(on_progress))).await
    }

    async fn run_inner(
        &self,
        cmd: &ToolCommand,
        on_progress: Option<ProgressCallback>,
    ) -> MediaResult<ProcessOutput> {
        let tool = cmd.tool();
        let program = which::which(tool).map_err(|_| MediaError::ToolNotFound(tool))?;

        debug!(tool, "Running: {}", cmd.redacted());
        let started = Instant::now();

        let mut child = Command::new(program)
            .args(cmd.get_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("stderr not captured"))?;

        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).await.map(|_| buf)
        });

        let stderr_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr).lines();
            let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let mut current = FfmpegProgress::default();

            while let Ok(Some(line)) = reader.next_line().await {
                if is_progress_line(&line) {
                    if let Some(callback) = &on_progress {
                        if let Some(progress) = parse_progress_line(&line, &mut current) {
                            callback(progress);
                        }
                    }
                    continue;
                }
                if line.trim().is_empty() {
                    continue;
                }
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Vec::from(tail).join("\n")
        });

        let waited = tokio::time::timeout(self.timeout, child.wait()).await;
        let status = match waited {
            Ok(status) => status?,
            Err(_) => {
                let secs = self.timeout.as_secs();
                warn!(tool, timeout_secs = secs, "Process timed out, killing");
                if let Err(e) = child.kill().await {
                    warn!(tool, "Failed to kill timed out process: {}", e);
                }
                // grandchildren may still hold the pipes
                stdout_task.abort();
                stderr_task.abort();
                return Err(MediaError::Timeout { tool, secs });
            }
        };

        let stdout = stdout_task
            .await
            .map_err(|e| MediaError::internal(format!("stdout reader failed: {e}")))??;
        let stderr_tail = stderr_task.await.unwrap_or_default();
        let elapsed = started.elapsed();

        if !status.success() {
            let message = stderr_tail
                .lines()
                .last()
                .unwrap_or("exited with non-zero status")
                .to_string();
            debug!(tool, exit_code = ?status.code(), stderr = %stderr_tail, "Process failed");
            return Err(MediaError::process_failed(
                tool,
                message,
                Some(stderr_tail),
                status.code(),
            ));
        }

        debug!(tool, elapsed_ms = elapsed.as_millis() as u64, "Process finished");
        Ok(ProcessOutput {
            stdout,
            stderr_tail,
            elapsed,
        })
    }
}
