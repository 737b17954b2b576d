//! Immutable pipeline configuration.
//!
//! Built once at start-up (see `pau_api::config::ServerConfig::from_env`)
//! and shared by reference with every stage of the submission pipeline.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default fixed base name of generated record files.
pub const DEFAULT_RECORD_FILE_NAME: &str = "results.ini";

/// Default activation script, relative to the reporting context directory.
pub const DEFAULT_REPORTER_ACTIVATE: &str = ".venv_wassp/bin/activate";

/// Default reporter command, relative to the reporting context directory.
pub const DEFAULT_REPORTER_COMMAND: &str = "wassp/host/report/testReportManual.py";

/// Default bounded wait for a single child process (5 minutes).
pub const DEFAULT_PROCESS_TIMEOUT: Duration = Duration::from_secs(300);

/// Paths, command names, and policies used by the submission pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Permanent storage for uploaded attachments.
    pub upload_dir: PathBuf,
    /// Transient location uploads are written to before intake moves them.
    pub staging_dir: PathBuf,
    /// Directory generated record files are written into.
    pub record_dir: PathBuf,
    /// Fixed base name appended to the random record-file prefix.
    pub record_file_name: String,
    /// Directory holding the writer commands; also their working directory.
    pub writer_dir: PathBuf,
    /// Working directory of the reporter (its pre-established context).
    pub reporter_context_dir: PathBuf,
    /// Activation script sourced before the reporter runs. Empty disables it.
    pub reporter_activate: String,
    /// Reporter program, relative to `reporter_context_dir` or absolute.
    pub reporter_command: String,
    /// Maximum wall-clock time for each child process.
    pub process_timeout: Duration,
    /// Keep record files after the pipeline finishes.
    pub retain_record_files: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            staging_dir: PathBuf::from("uploads/.staging"),
            record_dir: PathBuf::from("uploads"),
            record_file_name: DEFAULT_RECORD_FILE_NAME.to_string(),
            writer_dir: PathBuf::from("."),
            reporter_context_dir: PathBuf::from("wassp-repos"),
            reporter_activate: DEFAULT_REPORTER_ACTIVATE.to_string(),
            reporter_command: DEFAULT_REPORTER_COMMAND.to_string(),
            process_timeout: DEFAULT_PROCESS_TIMEOUT,
            retain_record_files: true,
        }
    }
}

impl PipelineConfig {
    /// Full path of the writer command for the given command name.
    pub fn writer_program(&self, command: &str) -> PathBuf {
        self.writer_dir.join(command)
    }

    /// Full path of a record file with the given generated name.
    pub fn record_path(&self, file_name: &str) -> PathBuf {
        self.record_dir.join(file_name)
    }

    /// Configuration rooted entirely under `root`, used by tests.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            upload_dir: root.join("uploads"),
            staging_dir: root.join("staging"),
            record_dir: root.join("records"),
            writer_dir: root.join("bin"),
            reporter_context_dir: root.join("reporting"),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
