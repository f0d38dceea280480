//! Time-boxed execution of untrusted Python source.
//!
//! Each run writes the source to its own temporary file, launches the
//! interpreter on it inside a fresh process group, and waits up to a deadline.
//! The file is always removed and the group is always reclaimed, whatever the
//! outcome. This is not an isolation boundary: the program runs with the
//! caller's privileges.

use crate::error::{SandboxError, SandboxResult};
use crate::protocol::ExecutionResult;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub mod interpreter;
pub mod process_group;
pub mod script;

pub use interpreter::Interpreter;
pub use process_group::{GroupSignal, ProcessGroup};
pub use script::ScriptFile;

pub const DEFAULT_TIMEOUT_SECONDS: f64 = 5.0;
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(250);

/// How long to keep reading pipes after the leader is gone
const OUTPUT_DRAIN_LIMIT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Python interpreter to launch the script with
    pub interpreter: PathBuf,
    /// Wall-clock budget for one run
    pub timeout_seconds: f64,
    /// Time between the graceful and the forceful stop on timeout
    pub grace_period: Duration,
    /// Where scripts are written; the system temp dir when `None`
    pub scratch_dir: Option<PathBuf>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: interpreter::default_program(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            grace_period: DEFAULT_GRACE_PERIOD,
            scratch_dir: None,
        }
    }
}

/// Something that can execute a source text and describe the outcome
#[async_trait]
pub trait CodeRunner: Send + Sync {
    async fn execute(&self, source: &str) -> ExecutionResult;
}

/// Runs programs according to a [`SandboxConfig`]. Cheap to clone; holds no
/// per-run state, so one instance can serve concurrent runs.
#[derive(Debug, Clone, Default)]
pub struct Sandbox {
    config: SandboxConfig,
}

/// Run `source` with the default interpreter and the given timeout
pub async fn run_in_sandbox(source: &str, timeout_seconds: f64) -> ExecutionResult {
    Sandbox::new(SandboxConfig {
        timeout_seconds,
        ..SandboxConfig::default()
    })
    .run(source)
    .await
}

impl Sandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Execute `source` once. Never fails: launch problems, wait errors and
    /// bad configuration all come back as [`ExecutionResult::Failed`].
    pub async fn run(&self, source: &str) -> ExecutionResult {
        match self.try_run(source).await {
            Ok(result) => result,
            Err(e) => {
                debug!("sandbox run failed: {}", e);
                ExecutionResult::failed(e.to_string())
            }
        }
    }

    async fn try_run(&self, source: &str) -> SandboxResult<ExecutionResult> {
        let timeout = Duration::try_from_secs_f64(self.config.timeout_seconds)
            .ok()
            .filter(|timeout| !timeout.is_zero())
            .ok_or(SandboxError::InvalidTimeout(self.config.timeout_seconds))?;

        let mut script = ScriptFile::create(source, self.config.scratch_dir.as_deref())?;
        let outcome = self.execute_script(script.path(), timeout).await;
        script.release();
        outcome
    }

    async fn execute_script(
        &self,
        script: &Path,
        timeout: Duration,
    ) -> SandboxResult<ExecutionResult> {
        let mut command = std::process::Command::new(&self.config.interpreter);
        command
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let started = Instant::now();
        let mut group = ProcessGroup::spawn(command).map_err(|source| SandboxError::Launch {
            interpreter: self.config.interpreter.clone(),
            source,
        })?;
        debug!(pid = ?group.id(), script = %script.display(), "program launched");

        let stdout = capture(group.take_stdout());
        let stderr = capture(group.take_stderr());

        match tokio::time::timeout(timeout, group.wait()).await {
            Ok(Ok(status)) => {
                let elapsed = started.elapsed();
                // Descendants left behind by the leader would keep the pipes open
                group.kill();

                let exit_code = exit_code(status);
                debug!(exit_code, elapsed_ms = elapsed.as_millis() as u64, "program exited");

                Ok(ExecutionResult::Completed {
                    stdout: stdout.drain().await,
                    stderr: stderr.drain().await,
                    exit_code,
                    elapsed_seconds: round_seconds(elapsed),
                })
            }
            Ok(Err(e)) => {
                if let Err(kill_err) = group.terminate(self.config.grace_period).await {
                    warn!("could not reap program after wait failure: {}", kill_err);
                }
                stdout.abort();
                stderr.abort();
                Err(SandboxError::Wait(e))
            }
            Err(_) => {
                info!(
                    timeout_seconds = self.config.timeout_seconds,
                    "deadline reached, terminating process group"
                );
                if let Err(e) = group.terminate(self.config.grace_period).await {
                    warn!("could not reap timed out program: {}", e);
                }
                stdout.abort();
                stderr.abort();

                Ok(ExecutionResult::TimedOut {
                    elapsed_seconds: round_seconds(timeout),
                })
            }
        }
    }
}

#[async_trait]
impl CodeRunner for Sandbox {
    async fn execute(&self, source: &str) -> ExecutionResult {
        self.run(source).await
    }
}

/// Output read so far from one pipe, filled by a separate task so a chatty
/// program never blocks on a full pipe while we wait for it
struct Capture {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

fn capture<R>(pipe: Option<R>) -> Capture
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&buffer);
    let task = tokio::spawn(async move {
        let Some(mut pipe) = pipe else { return };
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => sink
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(&chunk[..n]),
                Err(e) => {
                    warn!("output capture stopped early: {}", e);
                    break;
                }
            }
        }
    });
    Capture { buffer, task }
}

impl Capture {
    /// Wait briefly for end of file, then keep whatever arrived
    async fn drain(mut self) -> String {
        match tokio::time::timeout(OUTPUT_DRAIN_LIMIT, &mut self.task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("output capture task failed: {}", e),
            Err(_) => {
                warn!("output pipe still open after exit, keeping partial output");
                self.task.abort();
            }
        }
        self.text()
    }

    fn abort(&self) {
        self.task.abort();
    }

    fn text(&self) -> String {
        let bytes = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

fn round_seconds(duration: Duration) -> f64 {
    (duration.as_secs_f64() * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drain_keeps_output_when_the_pipe_stays_open() {
        use tokio::io::AsyncWriteExt;

        let (mut writer, reader) = tokio::io::duplex(64);
        writer.write_all(b"partial").await.unwrap();

        let started = Instant::now();
        let text = capture(Some(reader)).drain().await;
        assert_eq!(text, "partial");
        assert!(started.elapsed() >= OUTPUT_DRAIN_LIMIT);
        drop(writer);
    }

    #[tokio::test]
    async fn drain_reads_to_end_of_file() {
        use tokio::io::AsyncWriteExt;

        let (mut writer, reader) = tokio::io::duplex(64);
        let output = capture(Some(reader));
        writer.write_all(b"line one\nline two\n").await.unwrap();
        drop(writer);
        assert_eq!(output.drain().await, "line one\nline two\n");

        assert_eq!(capture(None::<tokio::io::DuplexStream>).drain().await, "");
    }

    #[test]
    fn rounds_to_four_places() {
        assert_eq!(round_seconds(Duration::from_micros(1_234_567)), 1.2346);
        assert_eq!(round_seconds(Duration::from_secs(1)), 1.0);
    }

    #[tokio::test]
    async fn invalid_timeouts_fail_without_launching() {
        let scratch = tempfile::tempdir().unwrap();
        for timeout_seconds in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let sandbox = Sandbox::new(SandboxConfig {
                timeout_seconds,
                scratch_dir: Some(scratch.path().to_path_buf()),
                ..SandboxConfig::default()
            });
            let result = sandbox.run("print('x')").await;
            match result {
                ExecutionResult::Failed { error } => assert!(error.contains("invalid timeout")),
                other => panic!("expected failure, got {:?}", other),
            }
        }
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_interpreter_is_a_launch_failure() {
        let scratch = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::new(SandboxConfig {
            interpreter: PathBuf::from("codefix-no-such-python"),
            scratch_dir: Some(scratch.path().to_path_buf()),
            ..SandboxConfig::default()
        });

        match sandbox.run("print('x')").await {
            ExecutionResult::Failed { error } => {
                assert!(error.contains("codefix-no-such-python"), "{}", error)
            }
            other => panic!("expected launch failure, got {:?}", other),
        }
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }
}
