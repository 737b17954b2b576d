//! Collision-resistant naming for per-submission record files.
//!
//! Names are `{prefix}{base}` where `prefix` is [`PREFIX_LENGTH`] characters
//! drawn uniformly from the 62-symbol alphanumeric alphabet. Uniqueness is
//! probabilistic (62^10 possible prefixes); nothing checks the filesystem for
//! an existing file of the same name.

use std::path::{Path, PathBuf};

use rand::Rng;

use crate::config::PipelineConfig;

/// Length of the random prefix.
pub const PREFIX_LENGTH: usize = 10;

/// Prefix `base_name` with a random alphanumeric string.
///
/// An empty `base_name` yields just the prefix.
pub fn unique_file_name(base_name: &str) -> String {
    let mut name: String = rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(PREFIX_LENGTH)
        .map(char::from)
        .collect();
    name.push_str(base_name);
    name
}

/// The record file bound to one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFile {
    name: String,
    path: PathBuf,
}

impl RecordFile {
    /// Generate a fresh record file name inside the configured record directory.
    pub fn generate(config: &PipelineConfig) -> Self {
        let name = unique_file_name(&config.record_file_name);
        let path = config.record_path(&name);
        Self { name, path }
    }

    /// Generated file name (prefix + fixed base name).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved path inside the record directory.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
