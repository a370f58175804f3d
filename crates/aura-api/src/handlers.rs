//! Request handlers.

use std::path::{Path, PathBuf};

use axum::extract::multipart::Field;
use axum::extract::{Multipart, State};
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use aura_models::{DevicePreference, Job, LayoutMode, SourceKind, TaskId};
use aura_storage::content_type_for;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
    pub available_slots: usize,
}

/// Health check endpoint (liveness probe).
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        available_slots: state.executor.available_slots(),
    })
}

/// Accepted job.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub message: String,
    pub task_id: String,
}

/// `POST /process-video/`
pub async fn process_video(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<SubmitResponse>> {
    submit(&state, multipart, SourceKind::Video).await
}

/// `POST /process-single-image/`
pub async fn process_single_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<SubmitResponse>> {
    submit(&state, multipart, SourceKind::Image).await
}

/// Form fields of a submission, file already staged on disk.
#[derive(Debug, Default)]
struct UploadForm {
    user_id: Option<String>,
    model: Option<String>,
    device: Option<String>,
    layout: Option<String>,
    staged: Option<PathBuf>,
}

async fn submit(state: &AppState, multipart: Multipart, kind: SourceKind) -> ApiResult<Json<SubmitResponse>> {
    let task_id = TaskId::new();
    let job_dir = state.worker.work_dir.join(task_id.as_str());

    let job = match build_job(state, multipart, kind, &task_id, &job_dir).await {
        Ok(job) => job,
        Err(e) => {
            if let Err(cleanup) = fs::remove_dir_all(&job_dir).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!(task_id = %task_id, error = %cleanup, "Failed to remove rejected upload");
                }
            }
            return Err(e);
        }
    };

    info!(
        task_id = %job.task_id,
        owner_id = %job.owner_id,
        kind = kind.as_str(),
        model = %job.model_name(),
        "Job accepted"
    );
    metrics::record_job_submitted(kind.as_str());
    // The outcome reaches the client through the progress socket.
    drop(state.executor.submit(job));

    let message = match kind {
        SourceKind::Video => "Video processing started",
        SourceKind::Image => "Single image processing started",
    };
    Ok(Json(SubmitResponse {
        message: message.to_string(),
        task_id: task_id.to_string(),
    }))
}

async fn build_job(
    state: &AppState,
    mut multipart: Multipart,
    kind: SourceKind,
    task_id: &TaskId,
    job_dir: &Path,
) -> ApiResult<Job> {
    let file_field = match kind {
        SourceKind::Video => "video",
        SourceKind::Image => "image",
    };
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "user_id" => form.user_id = Some(field.text().await?),
            "model" => form.model = Some(field.text().await?),
            "device" => form.device = Some(field.text().await?),
            "if_concat" => form.layout = Some(field.text().await?),
            n if n == file_field => {
                let file_name = sanitize_file_name(field.file_name(), kind);
                let staged = job_dir.join("upload").join(file_name);
                stage_upload(field, &staged).await?;
                form.staged = Some(staged);
            }
            _ => {}
        }
    }

    let owner_id = form
        .user_id
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::bad_request("user_id is required"))?;
    let staged = form
        .staged
        .ok_or_else(|| ApiError::bad_request(format!("{file_field} file is required")))?;
    check_media_type(&staged, kind)?;

    let device: DevicePreference = form.device.as_deref().unwrap_or("cpu").parse()?;
    let layout: LayoutMode = match kind {
        SourceKind::Video => form.layout.as_deref().unwrap_or("None").parse()?,
        SourceKind::Image => LayoutMode::None,
    };
    let model_path = state.worker.model_path(form.model.as_deref())?;

    Ok(Job::new(owner_id, kind, staged, &state.worker.work_dir, model_path)
        .with_task_id(task_id.clone())
        .with_layout(layout)
        .with_device(device))
}

async fn stage_upload(mut field: Field<'_>, staged: &Path) -> ApiResult<()> {
    if let Some(parent) = staged.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut file = fs::File::create(staged).await?;
    while let Some(chunk) = field.chunk().await? {
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(())
}

fn check_media_type(path: &Path, kind: SourceKind) -> ApiResult<()> {
    let expected = match kind {
        SourceKind::Video => "video/",
        SourceKind::Image => "image/",
    };
    match content_type_for(path) {
        Ok(content_type) if content_type.starts_with(expected) => Ok(()),
        _ => Err(ApiError::bad_request(format!(
            "Unsupported {} file: {}",
            kind.as_str(),
            path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
        ))),
    }
}

/// Client file name reduced to a single safe path component.
fn sanitize_file_name(raw: Option<&str>, kind: SourceKind) -> String {
    let base = raw
        .and_then(|r| r.rsplit(['/', '\\']).next())
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect::<String>();
    let base = base.trim_start_matches('.');

    if base.is_empty() {
        match kind {
            SourceKind::Video => "upload.mp4".to_string(),
            SourceKind::Image => "upload.png".to_string(),
        }
    } else {
        base.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name(Some("clip.mp4"), SourceKind::Video), "clip.mp4");
        assert_eq!(
            sanitize_file_name(Some("../../etc/passwd.png"), SourceKind::Image),
            "passwd.png"
        );
        assert_eq!(
            sanitize_file_name(Some("C:\\Users\\me\\my photo.jpg"), SourceKind::Image),
            "myphoto.jpg"
        );
        assert_eq!(sanitize_file_name(Some(".."), SourceKind::Video), "upload.mp4");
        assert_eq!(sanitize_file_name(None, SourceKind::Image), "upload.png");
    }

    #[test]
    fn test_media_type_must_match_endpoint() {
        assert!(check_media_type(Path::new("a.mp4"), SourceKind::Video).is_ok());
        assert!(check_media_type(Path::new("a.png"), SourceKind::Video).is_err());
        assert!(check_media_type(Path::new("a.jpg"), SourceKind::Image).is_ok());
        assert!(check_media_type(Path::new("a.exe"), SourceKind::Image).is_err());
    }
}
