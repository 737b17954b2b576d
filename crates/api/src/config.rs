use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use pau_core::config::{
    PipelineConfig, DEFAULT_RECORD_FILE_NAME, DEFAULT_REPORTER_ACTIVATE,
    DEFAULT_REPORTER_COMMAND,
};

/// Default upload limit for the attached log file (50 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Grace period for in-flight submissions after a shutdown signal.
    pub shutdown_timeout_secs: u64,
    /// Largest attachment accepted before it is marked too large.
    pub max_upload_bytes: u64,
    /// Paths and policies of the submission pipeline.
    pub pipeline: PipelineConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                                   |
    /// |----------------------------|-------------------------------------------|
    /// | `HOST`                     | `0.0.0.0`                                 |
    /// | `PORT`                     | `3000`                                    |
    /// | `CORS_ORIGINS`             | `http://localhost:5173`                   |
    /// | `REQUEST_TIMEOUT_SECS`     | `30`                                      |
    /// | `SHUTDOWN_TIMEOUT_SECS`    | `30`                                      |
    /// | `MAX_UPLOAD_BYTES`         | `52428800`                                |
    /// | `PAU_UPLOAD_DIR`           | `uploads`                                 |
    /// | `PAU_STAGING_DIR`          | `uploads/.staging`                        |
    /// | `PAU_RECORD_DIR`           | `uploads`                                 |
    /// | `PAU_RECORD_FILE_NAME`     | `results.ini`                             |
    /// | `PAU_WRITER_DIR`           | `.`                                       |
    /// | `PAU_REPORTER_CONTEXT_DIR` | `wassp-repos`                             |
    /// | `PAU_REPORTER_ACTIVATE`    | `.venv_wassp/bin/activate`                |
    /// | `PAU_REPORTER_COMMAND`     | `wassp/host/report/testReportManual.py`   |
    /// | `PAU_PROCESS_TIMEOUT_SECS` | `300`                                     |
    /// | `PAU_RETAIN_RECORD_FILES`  | `true`                                    |
    ///
    /// Panics on values that do not parse, so misconfiguration fails at
    /// startup rather than on the first submission.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let host = var("HOST", "0.0.0.0");
        let port: u16 = parse_var(&var("PORT", "3000"), "PORT");

        let cors_origins: Vec<String> = var("CORS_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 =
            parse_var(&var("REQUEST_TIMEOUT_SECS", "30"), "REQUEST_TIMEOUT_SECS");
        let shutdown_timeout_secs: u64 =
            parse_var(&var("SHUTDOWN_TIMEOUT_SECS", "30"), "SHUTDOWN_TIMEOUT_SECS");
        let max_upload_bytes: u64 = parse_var(
            &var("MAX_UPLOAD_BYTES", &DEFAULT_MAX_UPLOAD_BYTES.to_string()),
            "MAX_UPLOAD_BYTES",
        );

        let context_dir = absolute(&var("PAU_REPORTER_CONTEXT_DIR", "wassp-repos"));
        let process_timeout_secs: u64 =
            parse_var(&var("PAU_PROCESS_TIMEOUT_SECS", "300"), "PAU_PROCESS_TIMEOUT_SECS");

        let pipeline = PipelineConfig {
            upload_dir: absolute(&var("PAU_UPLOAD_DIR", "uploads")),
            staging_dir: absolute(&var("PAU_STAGING_DIR", "uploads/.staging")),
            record_dir: absolute(&var("PAU_RECORD_DIR", "uploads")),
            record_file_name: var("PAU_RECORD_FILE_NAME", DEFAULT_RECORD_FILE_NAME),
            writer_dir: absolute(&var("PAU_WRITER_DIR", ".")),
            reporter_activate: var("PAU_REPORTER_ACTIVATE", DEFAULT_REPORTER_ACTIVATE),
            reporter_command: var("PAU_REPORTER_COMMAND", DEFAULT_REPORTER_COMMAND),
            reporter_context_dir: context_dir,
            process_timeout: Duration::from_secs(process_timeout_secs),
            retain_record_files: parse_bool(
                &var("PAU_RETAIN_RECORD_FILES", "true"),
                "PAU_RETAIN_RECORD_FILES",
            ),
        };

        if pipeline.record_file_name.contains(['/', '\\']) {
            panic!("PAU_RECORD_FILE_NAME must be a plain file name");
        }

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            max_upload_bytes,
            pipeline,
        }
    }
}

fn parse_var<T>(value: &str, key: &str) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .unwrap_or_else(|e| panic!("{key} must be a valid {}: {e}", std::any::type_name::<T>()))
}

fn parse_bool(value: &str, key: &str) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        other => panic!("{key} must be a boolean, got '{other}'"),
    }
}

/// Child processes run in other working directories, so every configured
/// path is anchored to the startup directory.
fn absolute(value: &str) -> PathBuf {
    let path = Path::new(value);
    std::path::absolute(path)
        .unwrap_or_else(|e| panic!("Cannot resolve path '{}': {e}", path.display()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
