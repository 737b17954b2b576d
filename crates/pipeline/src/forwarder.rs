//! Report forwarding.
//!
//! The reporter ingests a writer-produced record file into the downstream
//! reporting system. It runs inside the reporting context directory after
//! sourcing the context's activation script. The activation is done by a
//! fixed `bash -c` program that receives every path as a positional
//! parameter; nothing is interpolated into the script text.

use pau_core::config::PipelineConfig;
use pau_core::naming::RecordFile;
use pau_core::scripting::{CommandRunner, Invocation, InvocationResult, OutputSink, RunError};

/// Activates the context (`$1`), then replaces the shell with the reporter
/// (`$2`) reading the record file (`$3`).
pub const ACTIVATE_AND_EXEC: &str = r#"source "$1" && exec "$2" -f "$3""#;

/// `$0` for the activation shell, shown in its error messages.
const SHELL_NAME: &str = "pau-forward";

/// The reporter exited non-zero or never ran.
#[derive(Debug, thiserror::Error)]
pub enum ReportForwardError {
    #[error("reporter exited with code {exit_code}")]
    Exit { exit_code: i32, output: String },

    #[error("reporter could not run: {0}")]
    Run(#[from] RunError),
}

impl ReportForwardError {
    /// Output the reporter produced before failing.
    pub fn output(&self) -> &str {
        match self {
            ReportForwardError::Exit { output, .. } => output,
            ReportForwardError::Run(err) => err.partial_output(),
        }
    }
}

/// Describe the reporter run for `record_file`.
pub fn forward_invocation(config: &PipelineConfig, record_file: &RecordFile) -> Invocation {
    let record_path = record_file.path().display().to_string();
    let (program, args) = if config.reporter_activate.is_empty() {
        (
            config.reporter_context_dir.join(&config.reporter_command),
            vec!["-f".to_string(), record_path],
        )
    } else {
        (
            "bash".into(),
            vec![
                "-c".to_string(),
                ACTIVATE_AND_EXEC.to_string(),
                SHELL_NAME.to_string(),
                config.reporter_activate.clone(),
                config.reporter_command.clone(),
                record_path,
            ],
        )
    };

    Invocation {
        program,
        args,
        working_dir: config.reporter_context_dir.clone(),
        timeout: config.process_timeout,
        merge_stderr: true,
    }
}

/// Run the reporter against `record_file`, streaming its output into `sink`.
pub async fn forward(
    runner: &dyn CommandRunner,
    config: &PipelineConfig,
    record_file: &RecordFile,
    sink: &OutputSink,
) -> Result<InvocationResult, ReportForwardError> {
    let invocation = forward_invocation(config, record_file);
    tracing::info!(
        record_file = %record_file.path().display(),
        context = %config.reporter_context_dir.display(),
        "Forwarding record to reporter",
    );

    let result = runner.run(&invocation, sink).await?;
    if !result.success() {
        return Err(ReportForwardError::Exit {
            exit_code: result.exit_code,
            output: result.output,
        });
    }

    tracing::debug!(duration_ms = result.duration_ms, "Reporter finished");
    Ok(result)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    use assert_matches::assert_matches;
    use pau_core::scripting::ProcessRunner;

    use super::*;
    use crate::testing::{RecordingRunner, Scripted};

    #[test]
    fn activated_invocation_passes_paths_positionally() {
        let config = PipelineConfig::rooted_at(Path::new("/srv/pau"));
        let record_file = RecordFile::generate(&config);
        let invocation = forward_invocation(&config, &record_file);

        assert_eq!(invocation.program, PathBuf::from("bash"));
        assert_eq!(invocation.args[0], "-c");
        assert_eq!(invocation.args[1], ACTIVATE_AND_EXEC);
        assert_eq!(invocation.args[3], config.reporter_activate);
        assert_eq!(invocation.args[4], config.reporter_command);
        assert_eq!(invocation.args[5], record_file.path().display().to_string());
        assert_eq!(invocation.working_dir, config.reporter_context_dir);
        assert!(invocation.merge_stderr);
    }

    #[test]
    fn without_activation_reporter_runs_directly() {
        let config = PipelineConfig {
            reporter_activate: String::new(),
            reporter_command: "report.py".to_string(),
            ..PipelineConfig::rooted_at(Path::new("/srv/pau"))
        };
        let record_file = RecordFile::generate(&config);
        let invocation = forward_invocation(&config, &record_file);
        assert_eq!(invocation.program, PathBuf::from("/srv/pau/reporting/report.py"));
        assert_eq!(
            invocation.args,
            vec!["-f".to_string(), record_file.path().display().to_string()]
        );
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_forward_error() {
        let config = PipelineConfig::rooted_at(Path::new("/srv/pau"));
        let runner = RecordingRunner::new().then(Scripted::exit(1, &["Traceback ...\n"]));
        let record_file = RecordFile::generate(&config);
        let err = forward(&runner, &config, &record_file, &OutputSink::discard())
            .await
            .expect_err("should fail");
        assert_matches!(err, ReportForwardError::Exit { exit_code: 1, .. });
        assert_eq!(err.output(), "Traceback ...\n");
    }

    #[tokio::test]
    async fn timeout_is_a_forward_error_with_partial_output() {
        let config = PipelineConfig::rooted_at(Path::new("/srv/pau"));
        let runner = RecordingRunner::new().then(Scripted::Timeout {
            chunks: vec!["connecting\n".to_string()],
        });
        let record_file = RecordFile::generate(&config);
        let err = forward(&runner, &config, &record_file, &OutputSink::discard())
            .await
            .expect_err("should fail");
        assert_matches!(err, ReportForwardError::Run(RunError::Timeout { .. }));
        assert_eq!(err.output(), "connecting\n");
    }

    #[tokio::test]
    async fn activation_script_runs_in_context_dir() {
        let root = tempfile::tempdir().expect("tempdir");
        let config = PipelineConfig::rooted_at(root.path());
        let context = &config.reporter_context_dir;
        std::fs::create_dir_all(context.join(".venv_wassp/bin")).expect("venv dir");
        std::fs::create_dir_all(context.join("wassp/host/report")).expect("reporter dir");
        std::fs::write(
            context.join(".venv_wassp/bin/activate"),
            "export PAU_ACTIVATED=yes\n",
        )
        .expect("activate");
        let reporter = context.join("wassp/host/report/testReportManual.py");
        std::fs::write(
            &reporter,
            "#!/bin/bash\necho \"activated=$PAU_ACTIVATED args=$*\"\necho warn >&2\n",
        )
        .expect("reporter");
        std::fs::set_permissions(&reporter, std::fs::Permissions::from_mode(0o755))
            .expect("chmod");

        let record_file = RecordFile::generate(&config);
        let result = forward(&ProcessRunner, &config, &record_file, &OutputSink::discard())
            .await
            .expect("forward");
        assert!(result.output.contains("activated=yes"));
        assert!(result
            .output
            .contains(&format!("args=-f {}", record_file.path().display())));
        assert!(result.output.contains("warn"), "stderr is merged");
    }
}
