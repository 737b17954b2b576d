//! The command-execution boundary and its shared types.
//!
//! Defines [`CommandRunner`], the capability every external-process stage
//! goes through, along with [`Invocation`], [`InvocationResult`],
//! [`RunError`], and the [`OutputSink`] live output is streamed into.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

/// A request to run one external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program to execute. Each argument is passed as-is, never through a shell.
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Working directory of the child process.
    pub working_dir: PathBuf,
    /// Maximum wall-clock time before the process is killed.
    pub timeout: Duration,
    /// Fold stderr into the captured output instead of capturing it separately.
    pub merge_stderr: bool,
}

impl Invocation {
    /// Program and arguments rendered for log lines.
    pub fn display_command(&self) -> String {
        let mut rendered = self.program.display().to_string();
        for arg in &self.args {
            rendered.push(' ');
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                rendered.push_str(&format!("{arg:?}"));
            } else {
                rendered.push_str(arg);
            }
        }
        rendered
    }
}

/// Captured result of a process that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvocationResult {
    /// Process exit code (`-1` if killed by signal).
    pub exit_code: i32,
    /// Standard output (plus stderr when merged), in arrival order.
    pub output: String,
    /// Standard error when not merged into `output`.
    pub stderr: String,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl InvocationResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Failures that prevent a process from running to completion.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("process timed out after {elapsed_ms}ms")]
    Timeout {
        elapsed_ms: u64,
        /// Output captured before the process was killed.
        output: String,
    },

    #[error("I/O error while waiting for process: {0}")]
    Io(#[from] std::io::Error),
}

impl RunError {
    /// Output captured before the failure, if any.
    pub fn partial_output(&self) -> &str {
        match self {
            RunError::Timeout { output, .. } => output,
            RunError::Spawn { .. } | RunError::Io(_) => "",
        }
    }
}

/// Destination for output chunks as they are produced.
///
/// Cheap to clone. A sink whose receiver has gone away silently drops
/// chunks; the captured copy in [`InvocationResult`] is unaffected.
#[derive(Debug, Clone, Default)]
pub struct OutputSink {
    tx: Option<mpsc::UnboundedSender<String>>,
}

impl OutputSink {
    /// A sink paired with the receiver observing it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that drops everything.
    pub fn discard() -> Self {
        Self::default()
    }

    pub fn emit(&self, chunk: impl Into<String>) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(chunk.into());
        }
    }
}

/// Runs external commands on behalf of the submission pipeline.
///
/// Implementations must emit output to `sink` incrementally, before the
/// process exits, and must return only after the output is fully drained
/// and the process reaped. A non-zero exit is a successful run; callers
/// inspect [`InvocationResult::exit_code`].
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        invocation: &Invocation,
        sink: &OutputSink,
    ) -> Result<InvocationResult, RunError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
