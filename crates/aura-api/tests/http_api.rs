//! Router-level tests: job submission, validation and health.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use aura_api::{create_router, ApiConfig, AppState, LiveConnections};
use aura_media::{
    FfmpegCommand, FrameDecoder, FrameWriter, MediaCommandRunner, MediaError, MediaResult,
    ModelLoader, PostFilter, StyleModel, VideoBackend, VideoInfo,
};
use aura_models::DevicePreference;
use aura_storage::{ArtifactUploader, StorageResult};
use aura_worker::{JobExecutor, JobPipeline, PipelineDeps, ProgressReporter, WorkerConfig};

const BOUNDARY: &str = "aura-test-boundary";

struct Unavailable;

#[async_trait]
impl VideoBackend for Unavailable {
    async fn probe(&self, _path: &Path) -> MediaResult<VideoInfo> {
        Err(MediaError::FfprobeNotFound)
    }

    fn open_decoder(&self, _path: &Path, _info: &VideoInfo) -> MediaResult<Box<dyn FrameDecoder>> {
        Err(MediaError::FfmpegNotFound)
    }

    fn create_writer(
        &self,
        _path: &Path,
        _width: u32,
        _height: u32,
        _fps: f64,
    ) -> MediaResult<Box<dyn FrameWriter>> {
        Err(MediaError::FfmpegNotFound)
    }
}

impl ModelLoader for Unavailable {
    fn load(&self, path: &Path, _device: DevicePreference) -> MediaResult<Arc<dyn StyleModel>> {
        Err(MediaError::model_not_found(path.display().to_string()))
    }
}

#[async_trait]
impl MediaCommandRunner for Unavailable {
    async fn run(&self, _cmd: &FfmpegCommand) -> MediaResult<()> {
        Err(MediaError::FfmpegNotFound)
    }
}

#[async_trait]
impl ArtifactUploader for Unavailable {
    async fn upload(&self, _path: &Path) -> StorageResult<String> {
        Ok("https://example.invalid/never".to_string())
    }
}

fn app(root: &TempDir) -> Router {
    let worker = WorkerConfig {
        work_dir: root.path().to_path_buf(),
        ..Default::default()
    };
    let connections = Arc::new(LiveConnections::new());
    let deps = PipelineDeps {
        video: Arc::new(Unavailable),
        models: Arc::new(Unavailable),
        commands: Arc::new(Unavailable),
        uploader: Arc::new(Unavailable),
        progress: ProgressReporter::new(connections.clone()),
        filter: Arc::new(PostFilter::default()),
        source_config: worker.source_config(),
    };
    let executor = JobExecutor::new(&worker, JobPipeline::new(deps));
    let state = AppState::new(ApiConfig::default(), worker, executor, connections);
    create_router(state, None)
}

/// `(name, filename, content)`; a filename makes the part a file upload.
fn multipart(parts: &[(&str, Option<&str>, &[u8])]) -> Body {
    let mut body = Vec::new();
    for (name, filename, content) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match filename {
            Some(f) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    Body::from(body)
}

fn post(uri: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(body)
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let root = TempDir::new().unwrap();
    let response = app(&root)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["available_slots"], 2);
}

#[tokio::test]
async fn test_video_submission_returns_task_id() {
    let root = TempDir::new().unwrap();
    let body = multipart(&[
        ("user_id", None, b"alice"),
        ("device", None, b"gpu"),
        ("if_concat", None, b"Horizontal"),
        ("video", Some("clip.mp4"), b"not really a video"),
    ]);

    let response = app(&root).oneshot(post("/process-video/", body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["message"], "Video processing started");
    assert!(!body["task_id"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_image_submission_message() {
    let root = TempDir::new().unwrap();
    let body = multipart(&[
        ("image", Some("photo.jpg"), b"jpeg bytes"),
        ("user_id", None, b"alice"),
    ]);

    let response = app(&root)
        .oneshot(post("/process-single-image/", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["message"], "Single image processing started");
}

#[tokio::test]
async fn test_missing_user_id_is_rejected_and_upload_removed() {
    let root = TempDir::new().unwrap();
    let body = multipart(&[("video", Some("clip.mp4"), b"bytes")]);

    let response = app(&root).oneshot(post("/process-video/", body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(response).await["detail"]
        .as_str()
        .unwrap()
        .contains("user_id"));
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_wrong_media_type_is_rejected() {
    let root = TempDir::new().unwrap();
    let body = multipart(&[
        ("user_id", None, b"alice"),
        ("image", Some("clip.mp4"), b"bytes"),
    ]);

    let response = app(&root)
        .oneshot(post("/process-single-image/", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_options_are_rejected() {
    let root = TempDir::new().unwrap();

    for (field, value) in [
        ("device", &b"tpu"[..]),
        ("if_concat", &b"Diagonal"[..]),
        ("model", &b"../../etc/passwd"[..]),
    ] {
        let body = multipart(&[
            ("user_id", None, b"alice"),
            (field, None, value),
            ("video", Some("clip.mp4"), b"bytes"),
        ]);
        let response = app(&root).oneshot(post("/process-video/", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "field {field}");
    }
}
