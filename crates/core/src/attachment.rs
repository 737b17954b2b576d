//! Uploaded log-file attachments and their intake into permanent storage.
//!
//! An upload first lands in a transient location (the staging directory).
//! [`intake`] validates it and moves it to `storage_dir/<basename>`, where
//! `basename` is the declared name with every directory component removed.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Transport-level state of an uploaded file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    /// The file arrived intact.
    Ok,
    /// No file was submitted.
    #[default]
    NoFile,
    /// The file exceeded the configured upload limit.
    TooLarge,
    /// The upload was cut off before completion.
    Partial,
    /// Any other transport failure.
    Failed(String),
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadStatus::Ok => f.write_str("ok"),
            UploadStatus::NoFile => f.write_str("no file"),
            UploadStatus::TooLarge => f.write_str("file too large"),
            UploadStatus::Partial => f.write_str("partial upload"),
            UploadStatus::Failed(reason) => write!(f, "upload failed: {reason}"),
        }
    }
}

/// An optional uploaded file as received with a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attachment {
    /// File name as declared by the client. Untrusted.
    pub declared_name: String,
    pub content_type: Option<String>,
    /// Bytes received.
    pub size: u64,
    pub status: UploadStatus,
    /// Where the bytes currently live, if anywhere.
    pub transient_path: Option<PathBuf>,
}

impl Attachment {
    /// An absent attachment.
    pub fn none() -> Self {
        Self::default()
    }

    /// Remove the transient file if it is still present.
    pub async fn discard_transient(&self) {
        if let Some(path) = &self.transient_path {
            match tokio::fs::remove_file(path).await {
                Ok(()) => tracing::debug!(path = %path.display(), "Removed transient upload"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove transient upload")
                }
            }
        }
    }
}

/// Attachment intake failures. Neither aborts a submission.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    /// The upload itself failed.
    #[error("upload of '{name}' failed: {status}")]
    Upload { name: String, status: UploadStatus },

    /// The declared name has no usable basename.
    #[error("upload has no usable file name: '{name}'")]
    InvalidName { name: String },

    /// The file could not be moved into storage.
    #[error("failed to store '{name}' at {}: {source}", path.display())]
    Storage {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Reduce a client-declared file name to its final path component.
///
/// Both `/` and `\` are treated as separators. Returns `None` when nothing
/// usable remains (empty, `.` or `..`).
pub fn sanitize_file_name(declared: &str) -> Option<&str> {
    let base = declared.rsplit(['/', '\\']).next().unwrap_or(declared).trim();
    match base {
        "" | "." | ".." => None,
        name => Some(name),
    }
}

/// Validate `upload` and move it into `storage_dir`.
///
/// Returns the stored path, or `None` when there is nothing to store (no
/// file submitted, or an empty file).
pub async fn intake(upload: &Attachment, storage_dir: &Path) -> Result<Option<PathBuf>, IntakeError> {
    match &upload.status {
        UploadStatus::NoFile => return Ok(None),
        UploadStatus::Ok => {}
        status => {
            return Err(IntakeError::Upload {
                name: upload.declared_name.clone(),
                status: status.clone(),
            })
        }
    }

    if upload.size == 0 {
        tracing::debug!(name = %upload.declared_name, "Empty attachment, nothing to store");
        return Ok(None);
    }

    let Some(file_name) = sanitize_file_name(&upload.declared_name) else {
        return Err(IntakeError::InvalidName {
            name: upload.declared_name.clone(),
        });
    };

    let Some(source) = &upload.transient_path else {
        return Err(IntakeError::Upload {
            name: upload.declared_name.clone(),
            status: UploadStatus::Failed("no transient file".to_string()),
        });
    };

    let dest = storage_dir.join(file_name);
    let storage_err = |source| IntakeError::Storage {
        name: file_name.to_string(),
        path: dest.clone(),
        source,
    };

    tokio::fs::create_dir_all(storage_dir)
        .await
        .map_err(storage_err)?;

    if let Err(rename_err) = tokio::fs::rename(source, &dest).await {
        // Staging may sit on another filesystem; fall back to copy + remove.
        tracing::debug!(error = %rename_err, "Rename failed, copying attachment instead");
        tokio::fs::copy(source, &dest).await.map_err(storage_err)?;
        if let Err(e) = tokio::fs::remove_file(source).await {
            tracing::warn!(path = %source.display(), error = %e, "Failed to remove copied upload");
        }
    }

    tracing::info!(path = %dest.display(), size = upload.size, "Stored attachment");
    Ok(Some(dest))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
