//! Submission orchestration.
//!
//! A submission moves through
//! `AwaitingInput -> ThemeResolved -> AttachmentHandled -> RecordWritten ->
//! Forwarded | Aborted`. [`SubmissionPipeline::prepare`] performs the first
//! transition and is the only step that can reject a request;
//! [`SubmissionPipeline::run`] performs the rest and always returns an
//! outcome, folding every stage failure into the transcript and status.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use pau_core::attachment::{self, Attachment};
use pau_core::config::PipelineConfig;
use pau_core::error::CoreError;
use pau_core::naming::RecordFile;
use pau_core::record::{FormFields, SubmissionRecord};
use pau_core::scripting::{CommandRunner, InvocationResult, OutputSink};
use pau_core::theme::Theme;

use crate::forwarder;
use crate::transcript::Transcript;
use crate::writer;

/// Position of a submission in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStage {
    AwaitingInput,
    ThemeResolved,
    AttachmentHandled,
    RecordWritten,
    Forwarded,
    Aborted,
}

/// Final status of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// Record written and accepted by the reporter.
    Forwarded,
    /// Record written; forwarding bypassed for a `DEBUG` submission.
    ForwardSkipped,
    /// The writer failed; nothing was forwarded.
    WriterFailed,
    /// The record was written but the reporter failed.
    ForwardFailed,
}

impl SubmissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionStatus::Forwarded => "forwarded",
            SubmissionStatus::ForwardSkipped => "forward_skipped",
            SubmissionStatus::WriterFailed => "writer_failed",
            SubmissionStatus::ForwardFailed => "forward_failed",
        }
    }

    pub fn is_success(self) -> bool {
        matches!(
            self,
            SubmissionStatus::Forwarded | SubmissionStatus::ForwardSkipped
        )
    }

    /// Terminal stage reached with this status.
    pub fn terminal_stage(self) -> SubmissionStage {
        if self.is_success() {
            SubmissionStage::Forwarded
        } else {
            SubmissionStage::Aborted
        }
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw caller input for one submission.
#[derive(Debug, Clone, Default)]
pub struct SubmissionRequest {
    /// Untrusted theme selector.
    pub theme: String,
    pub fields: FormFields,
    pub attachment: Attachment,
}

/// A validated submission with its theme resolved and record file named.
#[derive(Debug, Clone)]
pub struct PreparedSubmission {
    theme: Theme,
    record: SubmissionRecord,
    attachment: Attachment,
    record_file: RecordFile,
}

impl PreparedSubmission {
    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn record(&self) -> &SubmissionRecord {
        &self.record
    }

    pub fn record_file(&self) -> &RecordFile {
        &self.record_file
    }
}

/// Everything a caller learns about a finished submission.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionOutcome {
    pub theme: Theme,
    pub stage: SubmissionStage,
    pub status: SubmissionStatus,
    pub record_file: PathBuf,
    /// Stored attachment, if any.
    pub log_path: Option<PathBuf>,
    /// Non-fatal problems (attachment intake, cleanup).
    pub warnings: Vec<String>,
    pub writer: Option<InvocationResult>,
    pub forwarder: Option<InvocationResult>,
    /// Messages and process output in the order they were produced.
    pub transcript: String,
}

/// Sequences theme resolution, attachment intake, record writing, and
/// report forwarding for each submission.
///
/// Holds no per-submission state; one instance serves every request.
#[derive(Clone)]
pub struct SubmissionPipeline {
    config: Arc<PipelineConfig>,
    runner: Arc<dyn CommandRunner>,
}

impl SubmissionPipeline {
    pub fn new(config: Arc<PipelineConfig>, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Resolve the theme, validate the record, and name the record file.
    pub fn prepare(&self, request: SubmissionRequest) -> Result<PreparedSubmission, CoreError> {
        let theme = Theme::resolve(&request.theme);
        let record = SubmissionRecord::from_form(theme, &request.fields)?;
        let record_file = RecordFile::generate(&self.config);
        tracing::debug!(
            theme = %theme,
            record_file = %record_file.name(),
            stage = ?SubmissionStage::ThemeResolved,
            "Submission prepared",
        );
        Ok(PreparedSubmission {
            theme,
            record,
            attachment: request.attachment,
            record_file,
        })
    }

    /// [`prepare`](Self::prepare) then [`run`](Self::run).
    pub async fn submit(
        &self,
        request: SubmissionRequest,
        sink: OutputSink,
    ) -> Result<SubmissionOutcome, CoreError> {
        let prepared = self.prepare(request)?;
        Ok(self.run(prepared, sink).await)
    }

    /// Run a prepared submission to a terminal stage.
    ///
    /// Never fails: writer and reporter failures are reported through the
    /// returned status and transcript.
    pub async fn run(&self, prepared: PreparedSubmission, sink: OutputSink) -> SubmissionOutcome {
        let PreparedSubmission {
            theme,
            record,
            attachment,
            record_file,
        } = prepared;
        let config = self.config.as_ref();
        let runner = self.runner.as_ref();
        let mut transcript = Transcript::new(sink);
        let mut warnings = Vec::new();

        transcript.line(format!("outfile: {}", record_file.path().display()));
        transcript.line(format!("tag: {}", theme.tag_expression(&record.tags)));
        transcript.line(format!("theme: {theme}"));

        if record.is_debug() {
            transcript.line("Uploaded File Info:");
            transcript.line(format!("  name: {}", attachment.declared_name));
            transcript.line(format!(
                "  type: {}",
                attachment.content_type.as_deref().unwrap_or("")
            ));
            transcript.line(format!("  size: {}", attachment.size));
            transcript.line(format!("  status: {}", attachment.status));
        }

        // ThemeResolved -> AttachmentHandled. Intake failures never abort.
        let log_path = match attachment::intake(&attachment, &config.upload_dir).await {
            Ok(Some(path)) => {
                transcript.line("File has been uploaded");
                Some(path)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Attachment intake failed, continuing without log file");
                transcript.line(format!("warning: {e}"));
                warnings.push(e.to_string());
                None
            }
        };
        attachment.discard_transient().await;
        tracing::debug!(stage = ?SubmissionStage::AttachmentHandled, has_log = log_path.is_some());

        if let Err(e) = tokio::fs::create_dir_all(&config.record_dir).await {
            tracing::warn!(dir = %config.record_dir.display(), error = %e, "Failed to create record directory");
            warnings.push(format!(
                "failed to create record directory {}: {e}",
                config.record_dir.display()
            ));
        }

        // AttachmentHandled -> RecordWritten | Aborted.
        let written = writer::invoke_writer(
            runner,
            config,
            theme,
            &record,
            &record_file,
            log_path.as_deref(),
            transcript.sink(),
        )
        .await;

        let mut writer_result = None;
        let mut forwarder_result = None;

        let status = match written {
            Err(e) => {
                tracing::error!(error = %e, record_file = %record_file.name(), "Record writer failed");
                transcript.streamed_output(e.output());
                transcript.line(format!("WriterProcessError: {e}"));
                SubmissionStatus::WriterFailed
            }
            Ok(result) => {
                transcript.streamed_output(&result.output);
                writer_result = Some(result);
                tracing::debug!(stage = ?SubmissionStage::RecordWritten, record_file = %record_file.name());

                // RecordWritten -> Forwarded | Aborted.
                if record.is_debug() {
                    tracing::info!(record_file = %record_file.name(), "DEBUG submission, not forwarding");
                    transcript.line("DEBUG submission: record not forwarded");
                    SubmissionStatus::ForwardSkipped
                } else {
                    match forwarder::forward(runner, config, &record_file, transcript.sink()).await
                    {
                        Ok(result) => {
                            transcript.streamed_output(&result.output);
                            forwarder_result = Some(result);
                            SubmissionStatus::Forwarded
                        }
                        Err(e) => {
                            tracing::error!(error = %e, record_file = %record_file.name(), "Report forwarding failed");
                            transcript.streamed_output(e.output());
                            transcript.line(format!("ReportForwardError: {e}"));
                            SubmissionStatus::ForwardFailed
                        }
                    }
                }
            }
        };

        if !config.retain_record_files {
            match tokio::fs::remove_file(record_file.path()).await {
                Ok(()) => tracing::debug!(record_file = %record_file.name(), "Removed record file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(record_file = %record_file.name(), error = %e, "Failed to remove record file");
                    warnings.push(format!("failed to remove record file: {e}"));
                }
            }
        }

        let stage = status.terminal_stage();
        transcript.line(format!("--- status: {status}"));
        tracing::info!(
            theme = %theme,
            record_file = %record_file.name(),
            status = %status,
            stage = ?stage,
            "Submission finished",
        );

        SubmissionOutcome {
            theme,
            stage,
            status,
            record_file: record_file.path().to_path_buf(),
            log_path,
            warnings,
            writer: writer_result,
            forwarder: forwarder_result,
            transcript: transcript.into_text(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::path::Path;

    use assert_matches::assert_matches;
    use pau_core::attachment::UploadStatus;

    use super::*;
    use crate::forwarder::ACTIVATE_AND_EXEC;
    use crate::testing::{RecordingRunner, Scripted};

    fn fields(pairs: &[(&str, &str)]) -> FormFields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn basic_fields() -> FormFields {
        fields(&[("tester", "alice"), ("testname", "boot-test"), ("passfail", "PASS")])
    }

    fn pipeline(root: &Path, runner: Arc<RecordingRunner>) -> SubmissionPipeline {
        SubmissionPipeline::new(Arc::new(PipelineConfig::rooted_at(root)), runner)
    }

    fn arg_after<'a>(args: &'a [String], flag: &str) -> &'a str {
        let idx = args.iter().position(|a| a == flag).expect("flag present");
        &args[idx + 1]
    }

    #[tokio::test]
    async fn default_theme_submission_writes_then_forwards() {
        let root = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(
            RecordingRunner::new()
                .then(Scripted::ok(&["ini written\n"]))
                .then(Scripted::ok(&["report stored\n"])),
        );
        let pipeline = pipeline(root.path(), runner.clone());

        let outcome = pipeline
            .submit(
                SubmissionRequest {
                    fields: basic_fields(),
                    ..SubmissionRequest::default()
                },
                OutputSink::discard(),
            )
            .await
            .expect("valid submission");

        assert_eq!(outcome.status, SubmissionStatus::Forwarded);
        assert_eq!(outcome.stage, SubmissionStage::Forwarded);
        assert_eq!(outcome.theme, Theme::Tis);

        let invocations = runner.invocations();
        assert_eq!(invocations.len(), 2);
        let writer = &invocations[0];
        assert_eq!(writer.program, pipeline.config().writer_dir.join("ini_writer.sh"));
        assert_eq!(arg_after(&writer.args, "-a"), "");
        assert_eq!(arg_after(&writer.args, "-d"), "TEST");
        assert_eq!(arg_after(&writer.args, "-o"), outcome.record_file.display().to_string());

        let reporter = &invocations[1];
        assert_eq!(reporter.args[1], ACTIVATE_AND_EXEC);
        assert_eq!(
            reporter.args.last().map(String::as_str),
            Some(outcome.record_file.to_str().expect("utf8"))
        );

        let writer_at = outcome.transcript.find("ini written").expect("writer output");
        let reporter_at = outcome.transcript.find("report stored").expect("reporter output");
        assert!(writer_at < reporter_at);
        assert!(outcome.transcript.ends_with("--- status: forwarded\n"));
        assert!(outcome.warnings.is_empty());
    }

    #[tokio::test]
    async fn debug_submission_is_never_forwarded() {
        let root = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(RecordingRunner::new().then(Scripted::ok(&["ini written\n"])));
        let pipeline = pipeline(root.path(), runner.clone());

        let mut form = basic_fields();
        form.insert("userstory".into(), "DEBUG".into());
        let outcome = pipeline
            .submit(
                SubmissionRequest {
                    fields: form,
                    ..SubmissionRequest::default()
                },
                OutputSink::discard(),
            )
            .await
            .expect("valid submission");

        assert_eq!(runner.invocations().len(), 1);
        assert_eq!(outcome.status, SubmissionStatus::ForwardSkipped);
        assert_eq!(outcome.stage, SubmissionStage::Forwarded);
        assert!(outcome.status.is_success());
        assert!(outcome.forwarder.is_none());
        assert!(outcome.transcript.contains("Uploaded File Info:"));
        assert!(outcome.transcript.contains("ini written"));
    }

    #[tokio::test]
    async fn writer_failure_aborts_before_forwarding() {
        let root = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(RecordingRunner::new().then(Scripted::exit(1, &["half a record\n"])));
        let pipeline = pipeline(root.path(), runner.clone());

        let outcome = pipeline
            .submit(
                SubmissionRequest {
                    fields: basic_fields(),
                    ..SubmissionRequest::default()
                },
                OutputSink::discard(),
            )
            .await
            .expect("valid submission");

        assert_eq!(runner.invocations().len(), 1, "forwarder must not run");
        assert_eq!(outcome.status, SubmissionStatus::WriterFailed);
        assert_eq!(outcome.stage, SubmissionStage::Aborted);
        assert!(outcome.transcript.contains("half a record"));
        assert!(outcome.transcript.contains("WriterProcessError"));
        assert!(outcome.writer.is_none());
    }

    #[tokio::test]
    async fn writer_spawn_failure_aborts() {
        let root = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(RecordingRunner::new().then(Scripted::SpawnFailure));
        let pipeline = pipeline(root.path(), runner.clone());

        let outcome = pipeline
            .submit(
                SubmissionRequest {
                    fields: basic_fields(),
                    ..SubmissionRequest::default()
                },
                OutputSink::discard(),
            )
            .await
            .expect("valid submission");

        assert_eq!(runner.invocations().len(), 1);
        assert_eq!(outcome.stage, SubmissionStage::Aborted);
        assert!(outcome.transcript.contains("could not run"));
    }

    #[tokio::test]
    async fn forward_failure_is_reported_not_raised() {
        let root = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(
            RecordingRunner::new()
                .then(Scripted::ok(&["ini written\n"]))
                .then(Scripted::exit(2, &["mongo unreachable"])),
        );
        let pipeline = pipeline(root.path(), runner.clone());

        let outcome = pipeline
            .submit(
                SubmissionRequest {
                    fields: basic_fields(),
                    ..SubmissionRequest::default()
                },
                OutputSink::discard(),
            )
            .await
            .expect("valid submission");

        assert_eq!(outcome.status, SubmissionStatus::ForwardFailed);
        assert!(!outcome.status.is_success());
        assert!(outcome.writer.is_some());
        assert!(outcome.transcript.contains("mongo unreachable\nReportForwardError"));
    }

    #[tokio::test]
    async fn stored_attachment_is_passed_as_log_path() {
        let root = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(RecordingRunner::new());
        let pipeline = pipeline(root.path(), runner.clone());

        let staging = &pipeline.config().staging_dir;
        std::fs::create_dir_all(staging).expect("staging dir");
        let transient = staging.join("abc.upload");
        std::fs::write(&transient, b"console output").expect("stage upload");

        let outcome = pipeline
            .submit(
                SubmissionRequest {
                    fields: basic_fields(),
                    attachment: Attachment {
                        declared_name: "../../logs/console.log".into(),
                        content_type: None,
                        size: 14,
                        status: UploadStatus::Ok,
                        transient_path: Some(transient.clone()),
                    },
                    ..SubmissionRequest::default()
                },
                OutputSink::discard(),
            )
            .await
            .expect("valid submission");

        let stored = pipeline.config().upload_dir.join("console.log");
        assert_eq!(outcome.log_path.as_deref(), Some(stored.as_path()));
        assert!(stored.exists());
        assert!(!transient.exists());
        let writer = &runner.invocations()[0];
        assert_eq!(arg_after(&writer.args, "-a"), stored.display().to_string());
        assert!(outcome.transcript.contains("File has been uploaded"));
    }

    #[tokio::test]
    async fn failed_upload_is_a_warning_only() {
        let root = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(RecordingRunner::new());
        let pipeline = pipeline(root.path(), runner.clone());

        let outcome = pipeline
            .submit(
                SubmissionRequest {
                    fields: basic_fields(),
                    attachment: Attachment {
                        declared_name: "huge.log".into(),
                        status: UploadStatus::TooLarge,
                        ..Attachment::default()
                    },
                    ..SubmissionRequest::default()
                },
                OutputSink::discard(),
            )
            .await
            .expect("valid submission");

        assert_eq!(outcome.status, SubmissionStatus::Forwarded);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.transcript.contains("warning: upload of 'huge.log' failed"));
        assert_eq!(arg_after(&runner.invocations()[0].args, "-a"), "");
    }

    #[tokio::test]
    async fn record_file_removed_when_not_retained() {
        let root = tempfile::tempdir().expect("tempdir");
        let config = PipelineConfig {
            retain_record_files: false,
            ..PipelineConfig::rooted_at(root.path())
        };
        let runner = Arc::new(RecordingRunner::new());
        let pipeline = SubmissionPipeline::new(Arc::new(config), runner);

        let prepared = pipeline
            .prepare(SubmissionRequest {
                fields: basic_fields(),
                ..SubmissionRequest::default()
            })
            .expect("valid submission");
        std::fs::create_dir_all(&pipeline.config().record_dir).expect("record dir");
        std::fs::write(prepared.record_file().path(), b"[ini]").expect("record");
        let path = prepared.record_file().path().to_path_buf();

        let outcome = pipeline.run(prepared, OutputSink::discard()).await;
        assert!(outcome.status.is_success());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn streamed_chunks_match_transcript() {
        let root = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(
            RecordingRunner::new()
                .then(Scripted::ok(&["one\n", "two\n"]))
                .then(Scripted::ok(&["three"])),
        );
        let pipeline = pipeline(root.path(), runner);
        let (sink, mut rx) = OutputSink::channel();

        let outcome = pipeline
            .submit(
                SubmissionRequest {
                    fields: basic_fields(),
                    ..SubmissionRequest::default()
                },
                sink,
            )
            .await
            .expect("valid submission");

        let mut streamed = String::new();
        while let Some(chunk) = rx.recv().await {
            streamed.push_str(&chunk);
        }
        assert_eq!(streamed, outcome.transcript);
        assert!(streamed.contains("one\ntwo\nthree\n"));
    }

    #[tokio::test]
    async fn outcome_serializes_with_snake_case_status() {
        let root = tempfile::tempdir().expect("tempdir");
        let pipeline = pipeline(root.path(), Arc::new(RecordingRunner::new()));
        let mut form = basic_fields();
        form.insert("userstory".into(), "DEBUG".into());
        let outcome = pipeline
            .submit(
                SubmissionRequest {
                    fields: form,
                    ..SubmissionRequest::default()
                },
                OutputSink::discard(),
            )
            .await
            .expect("valid submission");

        let json = serde_json::to_value(&outcome).expect("serialize");
        assert_eq!(json["status"], "forward_skipped");
        assert_eq!(json["stage"], "forwarded");
        assert_eq!(json["theme"], "tis");
        assert!(json["forwarder"].is_null());
    }

    #[test]
    fn prepare_rejects_invalid_records() {
        let root = tempfile::tempdir().expect("tempdir");
        let pipeline = pipeline(root.path(), Arc::new(RecordingRunner::new()));
        let result = pipeline.prepare(SubmissionRequest {
            theme: "iot".into(),
            fields: basic_fields(),
            ..SubmissionRequest::default()
        });
        assert_matches!(result, Err(CoreError::Validation(msg)) if msg.contains("board_name"));
    }

    #[test]
    fn prepare_falls_back_to_default_theme() {
        let root = tempfile::tempdir().expect("tempdir");
        let pipeline = pipeline(root.path(), Arc::new(RecordingRunner::new()));
        let prepared = pipeline
            .prepare(SubmissionRequest {
                theme: "unknown".into(),
                fields: basic_fields(),
                ..SubmissionRequest::default()
            })
            .expect("valid submission");
        assert_eq!(prepared.theme(), Theme::Tis);
        assert!(prepared.record_file().name().ends_with("results.ini"));
        assert!(prepared
            .record_file()
            .path()
            .starts_with(&pipeline.config().record_dir));
    }
}
