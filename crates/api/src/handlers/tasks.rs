//! Submission and polling handlers.

use advex_core::artifacts::{self, ArtifactKind};
use advex_core::error::CoreError;
use advex_core::labels::LabelTable;
use advex_core::orchestrator::{SubmissionError, SubmitRequest};
use advex_core::status::{TaskState, TaskStatus};
use advex_core::task_id::TaskId;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::handlers::intake::{self, ImageSource};
use crate::middleware::session::Session;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub task_id: TaskId,
}

/// A label index with its display name, when the index is in range.
#[derive(Debug, Serialize)]
pub struct LabelView {
    pub index: u32,
    pub name: Option<String>,
}

/// Static URLs of a task's images. Outputs are only listed once the task
/// has finished with results.
#[derive(Debug, Serialize)]
pub struct ImageLinks {
    pub input: String,
    pub result: Option<String>,
    pub saliency: Option<String>,
    pub difference: Option<String>,
}

/// Poll result as returned to clients.
#[derive(Debug, Serialize)]
pub struct TaskView {
    #[serde(flatten)]
    pub status: TaskStatus,
    pub original_labels: Vec<LabelView>,
    pub new_labels: Vec<LabelView>,
    pub images: ImageLinks,
}

impl TaskView {
    pub fn new(status: TaskStatus, labels: &LabelTable) -> Self {
        let (original, new, finished) = match &status.state {
            TaskState::Succeeded { original, new } | TaskState::Partial { original, new } => {
                (label_views(original, labels), label_views(new, labels), true)
            }
            TaskState::InProgress | TaskState::Failed => (Vec::new(), Vec::new(), false),
        };

        let url = |kind: ArtifactKind| format!("/static/{}", artifacts::filename(&status.task_id, kind));
        let output = |kind: ArtifactKind| finished.then(|| url(kind));
        let images = ImageLinks {
            input: url(ArtifactKind::Input),
            result: output(ArtifactKind::Result),
            saliency: output(ArtifactKind::Saliency),
            difference: output(ArtifactKind::Difference),
        };

        Self {
            status,
            original_labels: original,
            new_labels: new,
            images,
        }
    }
}

fn label_views(indices: &[u32], labels: &LabelTable) -> Vec<LabelView> {
    indices
        .iter()
        .map(|&index| LabelView {
            index,
            name: labels.label(index).map(|l| l.full_name()),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// Parsed multipart submission form.
#[derive(Debug, Default)]
struct SubmissionForm {
    source: Option<String>,
    networks: Vec<u8>,
    label: Option<u32>,
    image: Option<Vec<u8>>,
    image_url: Option<String>,
}

impl SubmissionForm {
    async fn read(multipart: &mut Multipart) -> AppResult<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "image" => {
                    let data = field
                        .bytes()
                        .await
                        .map_err(|e| AppError::BadRequest(e.to_string()))?;
                    form.image = Some(data.to_vec());
                }
                "source" | "networks" | "label" | "image_url" => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| AppError::BadRequest(e.to_string()))?;
                    form.set_text(&name, text.trim())?;
                }
                other => {
                    tracing::debug!(field = other, "Ignoring unknown submission field");
                }
            }
        }

        Ok(form)
    }

    fn set_text(&mut self, name: &str, value: &str) -> AppResult<()> {
        match name {
            "source" => self.source = Some(value.to_string()),
            "image_url" => self.image_url = Some(value.to_string()),
            "label" => {
                self.label = Some(value.parse().map_err(|_| {
                    AppError::BadRequest(format!("Label must be a positive integer, got '{value}'"))
                })?);
            }
            "networks" => {
                for id in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                    self.networks.push(id.parse().map_err(|_| {
                        AppError::BadRequest(format!("Invalid network id '{id}'"))
                    })?);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// POST /api/v1/tasks
///
/// Multipart fields: `source` (`noise` | `upload` | `url` | `random`),
/// `networks` (repeated or comma-separated catalog ids), `label`, and
/// `image` or `image_url` depending on the source.
pub async fn submit(
    State(state): State<AppState>,
    Session(session): Session,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<SubmitResponse>>)> {
    let form = SubmissionForm::read(&mut multipart).await?;

    let source: ImageSource = form
        .source
        .as_deref()
        .unwrap_or("upload")
        .parse()?;
    let target_label = form
        .label
        .ok_or_else(|| SubmissionError::Validation("Missing 'label' field".into()))?;

    let image = intake::resolve(&state, source, form.image, form.image_url).await?;

    let task_id = state
        .orchestrator
        .submit(
            &session,
            SubmitRequest {
                network_ids: form.networks,
                target_label,
                image,
            },
        )
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: SubmitResponse { task_id },
        }),
    ))
}

// ---------------------------------------------------------------------------
// Polling
// ---------------------------------------------------------------------------

/// GET /api/v1/tasks/current
pub async fn get_current(
    State(state): State<AppState>,
    Session(session): Session,
) -> AppResult<Json<DataResponse<TaskView>>> {
    let task_id = state
        .orchestrator
        .current_task(&session)
        .await
        .ok_or_else(|| CoreError::NotFound {
            entity: "Task",
            id: "current".into(),
        })?;

    Ok(Json(DataResponse {
        data: view(&state, &task_id).await,
    }))
}

#[derive(Debug, Deserialize)]
pub struct AdoptParams {
    pub taskid: String,
}

/// PUT /api/v1/tasks/current?taskid=
pub async fn adopt_current(
    State(state): State<AppState>,
    Session(session): Session,
    Query(params): Query<AdoptParams>,
) -> AppResult<Json<DataResponse<TaskView>>> {
    let task_id = state.orchestrator.adopt(&session, &params.taskid).await?;
    tracing::info!(session = %session, task_id = %task_id, "Session adopted task");

    Ok(Json(DataResponse {
        data: view(&state, &task_id).await,
    }))
}

/// DELETE /api/v1/tasks/current
pub async fn detach_current(
    State(state): State<AppState>,
    Session(session): Session,
) -> StatusCode {
    if let Some(task_id) = state.orchestrator.detach(&session).await {
        tracing::debug!(session = %session, task_id = %task_id, "Session detached");
    }
    StatusCode::NO_CONTENT
}

/// GET /api/v1/tasks/{id}
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<DataResponse<TaskView>>> {
    let task_id = TaskId::parse(&id)?;
    Ok(Json(DataResponse {
        data: view(&state, &task_id).await,
    }))
}

async fn view(state: &AppState, task_id: &TaskId) -> TaskView {
    let status = state.orchestrator.poll(task_id).await;
    TaskView::new(status, state.orchestrator.labels())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> LabelTable {
        LabelTable::from_synset_str("n01 tench, Tinca tinca\nn02 goldfish\n").unwrap()
    }

    #[test]
    fn finished_view_lists_outputs_and_names() {
        let task_id = TaskId::generate();
        let status = TaskStatus {
            task_id: task_id.clone(),
            header: Some("header".into()),
            state: TaskState::Succeeded {
                original: vec![1],
                new: vec![2, 900],
            },
        };

        let view = TaskView::new(status, &labels());
        assert_eq!(view.original_labels[0].name.as_deref(), Some("(0001) tench"));
        assert_eq!(view.new_labels[0].name.as_deref(), Some("(0002) goldfish"));
        assert_eq!(view.new_labels[1].name, None);
        assert_eq!(view.images.input, format!("/static/{task_id}.png"));
        assert_eq!(
            view.images.saliency.as_deref(),
            Some(format!("/static/{task_id}-sal.png").as_str())
        );
    }

    #[test]
    fn failed_view_has_no_outputs() {
        let status = TaskStatus {
            task_id: TaskId::generate(),
            header: None,
            state: TaskState::Failed,
        };

        let view = TaskView::new(status, &labels());
        assert!(view.original_labels.is_empty());
        assert!(view.images.result.is_none());
        assert!(view.images.difference.is_none());
    }

    #[test]
    fn networks_accept_repeated_and_comma_separated() {
        let mut form = SubmissionForm::default();
        form.set_text("networks", "1, 3").unwrap();
        form.set_text("networks", "2").unwrap();
        assert_eq!(form.networks, vec![1, 3, 2]);
        assert!(form.set_text("networks", "x").is_err());
        assert!(form.set_text("label", "-4").is_err());
    }
}
