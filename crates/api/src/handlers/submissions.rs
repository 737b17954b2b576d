//! Handler for test-result submissions.
//!
//! Accepts the multipart form, stages the optional log file, validates the
//! record, and then hands the submission to the pipeline on a background
//! task. The response body streams the submission transcript while the
//! writer and reporter run.

use std::convert::Infallible;
use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::multipart::Field as FormPart;
use axum::extract::{Multipart, Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::Response;
use futures::StreamExt;
use pau_core::attachment::{Attachment, UploadStatus};
use pau_core::record::FormFields;
use pau_core::scripting::OutputSink;
use pau_pipeline::submission::SubmissionRequest;
use serde::Deserialize;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Response header carrying the generated record-file name.
pub const RECORD_FILE_HEADER: &str = "x-pau-record-file";

/// Form part holding the optional log file.
pub const ATTACHMENT_PART: &str = "myFile";

/// Form part selecting the theme.
pub const THEME_PART: &str = "theme";

/// Upper bound on a single text part.
const MAX_TEXT_PART_BYTES: usize = 64 * 1024;

#[derive(Debug, Default, Deserialize)]
pub struct SubmitParams {
    pub theme: Option<String>,
}

/// Everything read from the multipart body.
#[derive(Debug, Default)]
struct SubmissionForm {
    theme: Option<String>,
    fields: FormFields,
    attachment: Attachment,
    /// Deletes the staged upload when dropped. Held until intake has run so
    /// an abandoned request (timeout, disconnect, rejection) leaves nothing
    /// behind in the staging directory.
    staged: Option<TempPath>,
}

/// POST /api/v1/submissions
///
/// Returns 400 for a malformed form or an invalid record. Otherwise responds
/// 200 immediately with a `text/plain` body that streams the transcript and
/// ends with the final status line.
pub async fn submit(
    State(state): State<AppState>,
    Query(params): Query<SubmitParams>,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let mut form = SubmissionForm::default();
    read_form(&mut multipart, &state, &mut form).await?;

    let theme = form
        .theme
        .filter(|t| !t.trim().is_empty())
        .or(params.theme)
        .unwrap_or_default();
    let upload_status = form.attachment.status.clone();
    let staged = form.staged;

    let prepared = state.pipeline.prepare(SubmissionRequest {
        theme,
        fields: form.fields,
        attachment: form.attachment,
    })?;

    let record_file = HeaderValue::from_str(prepared.record_file().name())
        .map_err(|e| AppError::InternalError(format!("Record file name is not a header value: {e}")))?;

    tracing::info!(
        theme = %prepared.theme(),
        record_file = %prepared.record_file().name(),
        attachment = %upload_status,
        "Submission accepted",
    );

    let (sink, rx) = OutputSink::channel();
    let pipeline = Arc::clone(&state.pipeline);
    state.submissions.spawn(async move {
        pipeline.run(prepared, sink).await;
        // Intake has moved the file by now; this only removes leftovers.
        drop(staged);
    });

    let body = Body::from_stream(UnboundedReceiverStream::new(rx).map(Ok::<_, Infallible>));
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(CACHE_CONTROL, "no-cache")
        .header(RECORD_FILE_HEADER, record_file)
        .body(body)
        .map_err(|e| AppError::InternalError(e.to_string()))
}

async fn read_form(
    multipart: &mut Multipart,
    state: &AppState,
    form: &mut SubmissionForm,
) -> AppResult<()> {
    while let Some(part) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        let name = part.name().unwrap_or_default().to_string();

        if name == ATTACHMENT_PART {
            // A repeated file part replaces the earlier one.
            form.staged = None;
            let (attachment, staged) = stage_upload(
                part,
                &state.config.pipeline.staging_dir,
                state.config.max_upload_bytes,
            )
            .await?;
            form.attachment = attachment;
            form.staged = staged;
            if form.attachment.status == UploadStatus::Partial {
                // The body was cut off; whatever followed the file is gone.
                break;
            }
            continue;
        }

        let value = read_text(part, &name).await?;
        if name == THEME_PART {
            form.theme = Some(value);
        } else if !name.is_empty() {
            form.fields.insert(name, value);
        }
    }
    Ok(())
}

async fn read_text(mut part: FormPart<'_>, name: &str) -> AppResult<String> {
    let mut buf = Vec::new();
    while let Some(chunk) = part
        .chunk()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read field '{name}': {e}")))?
    {
        if buf.len() + chunk.len() > MAX_TEXT_PART_BYTES {
            return Err(AppError::BadRequest(format!("Field '{name}' is too long")));
        }
        buf.extend_from_slice(&chunk);
    }
    String::from_utf8(buf)
        .map_err(|_| AppError::BadRequest(format!("Field '{name}' is not valid UTF-8")))
}

/// Stream the file part into the staging directory.
///
/// Transport problems are recorded in the attachment's status rather than
/// failing the request. Only a failure to create the staging file is an
/// error. A usable upload comes back with the guard that owns its staged
/// file.
async fn stage_upload(
    mut part: FormPart<'_>,
    staging_dir: &Path,
    max_bytes: u64,
) -> AppResult<(Attachment, Option<TempPath>)> {
    let declared_name = part.file_name().unwrap_or_default().to_string();
    let content_type = part.content_type().map(str::to_string);

    if declared_name.is_empty() {
        // Browsers send an empty, nameless part when no file was chosen.
        while let Ok(Some(_)) = part.chunk().await {}
        return Ok((Attachment::none(), None));
    }

    tokio::fs::create_dir_all(staging_dir)
        .await
        .map_err(|e| AppError::InternalError(format!("Failed to create staging dir: {e}")))?;
    let (std_file, staged) = tempfile::Builder::new()
        .suffix(".upload")
        .tempfile_in(staging_dir)
        .map_err(|e| AppError::InternalError(format!("Failed to create staging file: {e}")))?
        .into_parts();
    let mut file = tokio::fs::File::from_std(std_file);

    let mut size: u64 = 0;
    let mut status = UploadStatus::Ok;
    loop {
        match part.chunk().await {
            Ok(Some(chunk)) => {
                size += chunk.len() as u64;
                if status != UploadStatus::Ok {
                    continue;
                }
                if size > max_bytes {
                    status = UploadStatus::TooLarge;
                } else if let Err(e) = file.write_all(&chunk).await {
                    status = UploadStatus::Failed(e.to_string());
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(name = %declared_name, error = %e, "Upload interrupted");
                status = UploadStatus::Partial;
                break;
            }
        }
    }

    if status == UploadStatus::Ok {
        if let Err(e) = file.flush().await {
            status = UploadStatus::Failed(e.to_string());
        }
    }
    drop(file);

    let mut attachment = Attachment {
        declared_name,
        content_type,
        size,
        status,
        transient_path: None,
    };
    if attachment.status != UploadStatus::Ok {
        tracing::warn!(
            name = %attachment.declared_name,
            size,
            status = %attachment.status,
            "Attachment not usable",
        );
        // Dropping the guard deletes the partial file.
        return Ok((attachment, None));
    }

    attachment.transient_path = Some(staged.to_path_buf());
    Ok((attachment, Some(staged)))
}
