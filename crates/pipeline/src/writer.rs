//! Record writer invocation.
//!
//! The writer is an external program that serializes a submission into a
//! structured record file. Its command line is derived entirely from the
//! theme's flag table: every slot becomes one flag followed by one discrete
//! argument, so free text from the caller is never re-parsed by a shell.

use std::path::Path;

use pau_core::config::PipelineConfig;
use pau_core::naming::RecordFile;
use pau_core::record::SubmissionRecord;
use pau_core::scripting::{CommandRunner, Invocation, InvocationResult, OutputSink, RunError};
use pau_core::theme::{Theme, WriterArg};

/// The writer exited non-zero or never ran.
#[derive(Debug, thiserror::Error)]
pub enum WriterProcessError {
    #[error("record writer exited with code {exit_code}")]
    Exit { exit_code: i32, output: String },

    #[error("record writer could not run: {0}")]
    Run(#[from] RunError),
}

impl WriterProcessError {
    /// Output the writer produced before failing.
    pub fn output(&self) -> &str {
        match self {
            WriterProcessError::Exit { output, .. } => output,
            WriterProcessError::Run(err) => err.partial_output(),
        }
    }
}

/// Build the writer's argument list for `theme`.
///
/// `log_path` is passed as an empty argument when there is no attachment.
pub fn writer_args(
    theme: Theme,
    record: &SubmissionRecord,
    output_path: &Path,
    log_path: Option<&Path>,
) -> Vec<String> {
    let flags = theme.profile().writer_flags;
    let mut args = Vec::with_capacity(flags.len() * 2);
    for (flag, slot) in flags {
        args.push((*flag).to_string());
        args.push(match slot {
            WriterArg::OutputPath => output_path.display().to_string(),
            WriterArg::TagExpression => theme.tag_expression(&record.tags),
            WriterArg::LogPath => log_path
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            WriterArg::Field(field) => record.value(*field).to_string(),
        });
    }
    args
}

/// Describe the writer run for one submission.
pub fn writer_invocation(
    config: &PipelineConfig,
    theme: Theme,
    record: &SubmissionRecord,
    record_file: &RecordFile,
    log_path: Option<&Path>,
) -> Invocation {
    Invocation {
        program: config.writer_program(theme.writer_command()),
        args: writer_args(theme, record, record_file.path(), log_path),
        working_dir: config.writer_dir.clone(),
        timeout: config.process_timeout,
        merge_stderr: false,
    }
}

/// Run the record writer, streaming its stdout into `sink`.
pub async fn invoke_writer(
    runner: &dyn CommandRunner,
    config: &PipelineConfig,
    theme: Theme,
    record: &SubmissionRecord,
    record_file: &RecordFile,
    log_path: Option<&Path>,
    sink: &OutputSink,
) -> Result<InvocationResult, WriterProcessError> {
    let invocation = writer_invocation(config, theme, record, record_file, log_path);
    tracing::info!(
        theme = %theme,
        record_file = %record_file.path().display(),
        command = %invocation.display_command(),
        "Running record writer",
    );

    let result = runner.run(&invocation, sink).await?;
    if !result.stderr.is_empty() {
        tracing::warn!(stderr = %result.stderr.trim_end(), "Record writer wrote to stderr");
    }
    if !result.success() {
        return Err(WriterProcessError::Exit {
            exit_code: result.exit_code,
            output: result.output,
        });
    }

    tracing::debug!(duration_ms = result.duration_ms, "Record writer finished");
    Ok(result)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
