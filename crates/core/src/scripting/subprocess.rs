//! Tokio-backed [`CommandRunner`] that spawns real child processes.
//!
//! Output is read in [`READ_CHUNK_BYTES`] chunks and forwarded to the sink as
//! soon as it arrives, so callers observe progress before the process exits.
//! The wait is bounded by [`Invocation::timeout`]; on expiry the child is
//! killed and the output captured so far is returned with the error.

use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;

use super::runner::{CommandRunner, Invocation, InvocationResult, OutputSink, RunError};

/// Size of each read from a child's output pipe.
pub const READ_CHUNK_BYTES: usize = 1024;

/// Maximum output retained per invocation (10 MiB).
///
/// Chunks past the limit are still streamed to the sink but not kept.
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Runs invocations as child processes of the server.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        sink: &OutputSink,
    ) -> Result<InvocationResult, RunError> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|source| RunError::Spawn {
            program: invocation.program.display().to_string(),
            source,
        })?;
        tracing::debug!(command = %invocation.display_command(), "Spawned child process");

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let stdout_task = tokio::spawn(drain_stream(child.stdout.take(), Some(tx.clone())));
        let stderr_task = if invocation.merge_stderr {
            tokio::spawn(drain_stream(child.stderr.take(), Some(tx)))
        } else {
            drop(tx);
            tokio::spawn(drain_stream(child.stderr.take(), None))
        };

        let mut output = String::new();
        let waited = {
            let collect = async {
                while let Some(chunk) = rx.recv().await {
                    sink.emit(chunk.as_str());
                    if output.len() < MAX_OUTPUT_BYTES {
                        output.push_str(&chunk);
                    }
                }
            };
            let wait = async {
                let (status, ()) = tokio::join!(child.wait(), collect);
                status
            };
            tokio::time::timeout(invocation.timeout, wait).await
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        match waited {
            Ok(Ok(status)) => {
                let _ = stdout_task.await;
                let stderr = stderr_task.await.unwrap_or_default();
                Ok(InvocationResult {
                    exit_code: status.code().unwrap_or(-1),
                    output,
                    stderr,
                    duration_ms,
                })
            }
            Ok(Err(e)) => Err(RunError::Io(e)),
            Err(_elapsed) => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "Failed to kill timed-out child process");
                }
                stdout_task.abort();
                stderr_task.abort();
                Err(RunError::Timeout {
                    elapsed_ms: duration_ms,
                    output,
                })
            }
        }
    }
}

/// Read `handle` to EOF in fixed-size chunks.
///
/// With a sender, each decoded chunk is forwarded and the return value is
/// empty; without one, the decoded stream is returned instead.
async fn drain_stream<R: AsyncRead + Unpin>(
    handle: Option<R>,
    tx: Option<mpsc::UnboundedSender<String>>,
) -> String {
    let Some(mut reader) = handle else {
        return String::new();
    };
    let mut decoder = Utf8Chunker::default();
    let mut kept = String::new();
    let mut buf = [0u8; READ_CHUNK_BYTES];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "Error reading child output");
                break;
            }
        };
        let text = decoder.push(&buf[..n]);
        if text.is_empty() {
            continue;
        }
        match &tx {
            Some(tx) => {
                let _ = tx.send(text);
            }
            None if kept.len() < MAX_OUTPUT_BYTES => kept.push_str(&text),
            None => {}
        }
    }

    let tail = decoder.finish();
    if !tail.is_empty() {
        match &tx {
            Some(tx) => {
                let _ = tx.send(tail);
            }
            None => kept.push_str(&tail),
        }
    }
    kept
}

/// Decodes a byte stream into UTF-8 text without splitting multi-byte
/// sequences across chunk boundaries. Invalid bytes become U+FFFD.
#[derive(Debug, Default)]
struct Utf8Chunker {
    pending: Vec<u8>,
}

impl Utf8Chunker {
    fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        match std::str::from_utf8(&self.pending) {
            Ok(text) => {
                let text = text.to_string();
                self.pending.clear();
                text
            }
            Err(e) if e.error_len().is_none() => {
                // Incomplete sequence at the end; hold it for the next chunk.
                let valid = e.valid_up_to();
                let text = String::from_utf8_lossy(&self.pending[..valid]).into_owned();
                self.pending.drain(..valid);
                text
            }
            Err(_) => {
                let text = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                text
            }
        }
    }

    fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
