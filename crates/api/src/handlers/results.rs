//! Result receiver for worker uploads.
//!
//! The filename pattern is the only check on what a worker may write: it
//! must name a generated task id and a known artifact kind. Images replace
//! any previous upload; log text is appended to the task's existing
//! progress log and never creates one. Once a log carries its trailer the
//! task is finished and further uploads for it are refused, so a redelivered
//! run cannot rewrite a completed result.

use advex_core::artifacts::{self, ArtifactKind};
use advex_core::error::CoreError;
use advex_worker::delivery::UPLOAD_FIELD;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// POST /{UPLOAD_PATH}
pub async fn receive(State(state): State<AppState>, mut multipart: Multipart) -> AppResult<StatusCode> {
    let mut received = 0usize;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::BadRequest("Upload has no filename".into()))?;
        let (task_id, kind) = artifacts::parse_filename(&filename).ok_or_else(|| {
            tracing::warn!(filename = %filename, "Rejected upload filename");
            AppError::BadRequest(format!("Rejected filename '{filename}'"))
        })?;

        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;

        let record = state
            .logs
            .record(&task_id)
            .await
            .map_err(|e| AppError::InternalError(e.to_string()))?;
        if record.as_ref().is_some_and(|r| r.is_complete()) {
            tracing::warn!(task_id = %task_id, filename = %filename, "Upload for a finished task refused");
            return Err(CoreError::Conflict(format!("Task {task_id} is already complete")).into());
        }

        if kind == ArtifactKind::Log {
            let text = String::from_utf8(data.to_vec())
                .map_err(|_| AppError::BadRequest("Log upload is not valid UTF-8".into()))?;

            if record.is_none() {
                return Err(CoreError::NotFound {
                    entity: "Task",
                    id: task_id.to_string(),
                }
                .into());
            }

            state
                .logs
                .append(&task_id, &text)
                .await
                .map_err(|e| AppError::InternalError(e.to_string()))?;
        } else {
            state
                .artifacts
                .put(&filename, &data)
                .await
                .map_err(|e| AppError::InternalError(format!("Failed to store {filename}: {e}")))?;
        }

        tracing::info!(task_id = %task_id, filename = %filename, bytes = data.len(), "Received result");
        received += 1;
    }

    if received == 0 {
        return Err(AppError::BadRequest(format!(
            "Missing '{UPLOAD_FIELD}' file field"
        )));
    }

    Ok(StatusCode::NO_CONTENT)
}
