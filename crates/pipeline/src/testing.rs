//! Test double for the command-execution boundary.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use pau_core::scripting::{CommandRunner, Invocation, InvocationResult, OutputSink, RunError};

/// Scripted behaviour for one invocation.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Emit `chunks` then exit with `exit_code`.
    Exit { chunks: Vec<String>, exit_code: i32 },
    /// Fail to spawn.
    SpawnFailure,
    /// Emit `chunks` then time out.
    Timeout { chunks: Vec<String> },
}

impl Scripted {
    pub fn ok(chunks: &[&str]) -> Self {
        Self::exit(0, chunks)
    }

    pub fn exit(exit_code: i32, chunks: &[&str]) -> Self {
        Self::Exit {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            exit_code,
        }
    }
}

/// Records every invocation instead of spawning processes and replays
/// scripted outcomes in order. Once the script runs out, invocations
/// succeed silently.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    script: Mutex<VecDeque<Scripted>>,
    invocations: Mutex<Vec<Invocation>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an outcome for the next unscripted invocation.
    pub fn then(self, outcome: Scripted) -> Self {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(outcome);
        self
    }

    /// Invocations received so far, in order.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        sink: &OutputSink,
    ) -> Result<InvocationResult, RunError> {
        self.invocations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(invocation.clone());

        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or(Scripted::Exit {
                chunks: Vec::new(),
                exit_code: 0,
            });

        let replay = |chunks: &[String]| {
            let mut output = String::new();
            for chunk in chunks {
                sink.emit(chunk.as_str());
                output.push_str(chunk);
            }
            output
        };

        match next {
            Scripted::Exit { chunks, exit_code } => Ok(InvocationResult {
                exit_code,
                output: replay(&chunks),
                stderr: String::new(),
                duration_ms: 1,
            }),
            Scripted::SpawnFailure => Err(RunError::Spawn {
                program: invocation.program.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            }),
            Scripted::Timeout { chunks } => Err(RunError::Timeout {
                elapsed_ms: invocation.timeout.as_millis() as u64,
                output: replay(&chunks),
            }),
        }
    }
}
