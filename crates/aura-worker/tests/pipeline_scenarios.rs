//! End-to-end job scenarios against in-memory media, model and storage fakes.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::Array3;
use tempfile::TempDir;

use aura_media::{
    write_image, ExecutionBackend, FfmpegCommand, Frame, FrameDecoder, FrameSourceConfig,
    FrameWriter, MediaCommandRunner, MediaError, MediaResult, ModelLoader, PostFilter, StyleModel,
    VideoBackend, VideoInfo,
};
use aura_models::{DevicePreference, Job, JobState, LayoutMode, ProgressEvent, SourceKind};
use aura_storage::{ArtifactUploader, StorageError, StorageResult};
use aura_worker::{
    ConnectionRegistry, DeliveryError, JobOutcome, JobPipeline, LiveConnection, PipelineDeps,
    ProgressReporter,
};

const OWNER: &str = "user-1";
const WIDTH: u32 = 32;
const HEIGHT: u32 = 24;

// ----------------------------------------------------------------------------
// Fakes
// ----------------------------------------------------------------------------

/// Promises `claimed` frames in the probe, delivers `delivered`.
///
/// With `decoder_fails`, the stream ends in a decoder error instead of a clean EOF.
struct ScriptedVideo {
    claimed: u64,
    delivered: u64,
    decoder_fails: bool,
    has_audio: bool,
    written: Arc<Mutex<Vec<(usize, usize)>>>,
}

#[async_trait]
impl VideoBackend for ScriptedVideo {
    async fn probe(&self, path: &Path) -> MediaResult<VideoInfo> {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
        Ok(VideoInfo {
            width: WIDTH,
            height: HEIGHT,
            fps: 25.0,
            frame_count: self.claimed,
            duration: self.claimed as f64 / 25.0,
            has_audio: self.has_audio,
            codec: "h264".to_string(),
        })
    }

    fn open_decoder(&self, _path: &Path, info: &VideoInfo) -> MediaResult<Box<dyn FrameDecoder>> {
        Ok(Box::new(GradientDecoder {
            width: info.width as usize,
            height: info.height as usize,
            remaining: self.delivered,
            fails: self.decoder_fails,
            next: 0,
        }))
    }

    fn create_writer(
        &self,
        path: &Path,
        _width: u32,
        _height: u32,
        _fps: f64,
    ) -> MediaResult<Box<dyn FrameWriter>> {
        std::fs::write(path, b"")?;
        Ok(Box::new(RecordingWriter {
            written: Arc::clone(&self.written),
        }))
    }
}

struct GradientDecoder {
    width: usize,
    height: usize,
    remaining: u64,
    fails: bool,
    next: u8,
}

impl FrameDecoder for GradientDecoder {
    fn read_frame(&mut self) -> MediaResult<Option<Array3<u8>>> {
        if self.remaining == 0 {
            if self.fails {
                return Err(MediaError::ffmpeg_failed(
                    "FFmpeg decoder exited with an error",
                    Some("corrupt macroblock".to_string()),
                    Some(1),
                ));
            }
            return Ok(None);
        }
        self.remaining -= 1;
        self.next = self.next.wrapping_add(1);
        let shade = self.next;
        Ok(Some(Array3::from_shape_fn((self.height, self.width, 3), |(y, x, _)| {
            shade.wrapping_add((x + y) as u8)
        })))
    }
}

struct RecordingWriter {
    written: Arc<Mutex<Vec<(usize, usize)>>>,
}

impl FrameWriter for RecordingWriter {
    fn write_frame(&mut self, pixels: &Array3<u8>) -> MediaResult<()> {
        let (h, w, _) = pixels.dim();
        self.written.lock().unwrap().push((w, h));
        Ok(())
    }

    fn finish(self: Box<Self>) -> MediaResult<()> {
        Ok(())
    }
}

struct IdentityModel;

impl StyleModel for IdentityModel {
    fn name(&self) -> &str {
        "identity"
    }

    fn backend(&self) -> ExecutionBackend {
        ExecutionBackend::Cpu
    }

    fn infer(&self, frame: &Frame) -> MediaResult<Frame> {
        Ok(frame.clone())
    }
}

/// Knows exactly one model file name.
struct SingleModel;

impl ModelLoader for SingleModel {
    fn load(&self, path: &Path, _device: DevicePreference) -> MediaResult<Arc<dyn StyleModel>> {
        if path.file_name().is_some_and(|n| n == "identity.onnx") {
            Ok(Arc::new(IdentityModel))
        } else {
            Err(MediaError::model_not_found(path.display().to_string()))
        }
    }
}

/// Succeeds by touching the command's output, or fails every command.
struct TouchRunner {
    succeed: bool,
}

#[async_trait]
impl MediaCommandRunner for TouchRunner {
    async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        if !self.succeed {
            return Err(MediaError::ffmpeg_failed("scripted failure", None, None));
        }
        tokio::fs::write(cmd.output(), b"muxed").await?;
        Ok(())
    }
}

#[derive(Default)]
struct RecordingUploader {
    uploaded: Mutex<Vec<PathBuf>>,
    fail: bool,
}

#[async_trait]
impl ArtifactUploader for RecordingUploader {
    async fn upload(&self, path: &Path) -> StorageResult<String> {
        if self.fail {
            return Err(StorageError::upload_failed("bucket unavailable"));
        }
        assert!(path.exists(), "uploaded artifact must exist: {}", path.display());
        self.uploaded.lock().unwrap().push(path.to_path_buf());
        let name = path.file_name().unwrap().to_string_lossy();
        Ok(format!("https://space.sgp1.cdn.digitaloceanspaces.com/{name}"))
    }
}

#[derive(Default)]
struct Inbox {
    payloads: Mutex<Vec<String>>,
}

impl LiveConnection for Inbox {
    fn send(&self, payload: String) -> Result<(), DeliveryError> {
        self.payloads.lock().unwrap().push(payload);
        Ok(())
    }
}

struct SingleOwner(Arc<Inbox>);

impl ConnectionRegistry for SingleOwner {
    fn lookup(&self, owner_id: &str) -> Option<Arc<dyn LiveConnection>> {
        (owner_id == OWNER).then(|| Arc::clone(&self.0) as Arc<dyn LiveConnection>)
    }
}

// ----------------------------------------------------------------------------
// Harness
// ----------------------------------------------------------------------------

struct Harness {
    root: TempDir,
    written: Arc<Mutex<Vec<(usize, usize)>>>,
    uploader: Arc<RecordingUploader>,
    inbox: Arc<Inbox>,
    pipeline: JobPipeline,
}

struct Script {
    claimed: u64,
    delivered: u64,
    decoder_fails: bool,
    has_audio: bool,
    remux_succeeds: bool,
    upload_fails: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            claimed: 10,
            delivered: 10,
            decoder_fails: false,
            has_audio: false,
            remux_succeeds: true,
            upload_fails: false,
        }
    }
}

impl Harness {
    fn new(script: Script) -> Self {
        let written = Arc::new(Mutex::new(Vec::new()));
        let uploader = Arc::new(RecordingUploader {
            fail: script.upload_fails,
            ..Default::default()
        });
        let inbox = Arc::new(Inbox::default());

        let deps = PipelineDeps {
            video: Arc::new(ScriptedVideo {
                claimed: script.claimed,
                delivered: script.delivered,
                decoder_fails: script.decoder_fails,
                has_audio: script.has_audio,
                written: Arc::clone(&written),
            }),
            models: Arc::new(SingleModel),
            commands: Arc::new(TouchRunner {
                succeed: script.remux_succeeds,
            }),
            uploader: uploader.clone(),
            progress: ProgressReporter::new(Arc::new(SingleOwner(Arc::clone(&inbox)))),
            filter: Arc::new(PostFilter::default()),
            source_config: FrameSourceConfig {
                frame_limit: 1280,
                buffer_capacity: 4,
            },
        };

        Self {
            root: TempDir::new().unwrap(),
            written,
            uploader,
            inbox,
            pipeline: JobPipeline::new(deps),
        }
    }

    async fn video_job(&self, layout: LayoutMode) -> Job {
        let staged = self.root.path().join("staged.mp4");
        tokio::fs::write(&staged, b"container bytes").await.unwrap();
        Job::new(OWNER, SourceKind::Video, staged, self.jobs_dir(), "models/identity.onnx")
            .with_layout(layout)
    }

    fn image_job(&self, model: &str) -> Job {
        let staged = self.root.path().join("photo.png");
        let pixels = Array3::from_shape_fn((40, 50, 3), |(y, x, c)| (x * 4 + y * 2 + c * 30) as u8);
        write_image(&staged, &pixels).unwrap();
        Job::new(OWNER, SourceKind::Image, staged, self.jobs_dir(), format!("models/{model}.onnx"))
    }

    fn jobs_dir(&self) -> PathBuf {
        self.root.path().join("jobs")
    }

    fn events(&self) -> Vec<ProgressEvent> {
        self.inbox
            .payloads
            .lock()
            .unwrap()
            .iter()
            .map(|p| serde_json::from_str(p).unwrap())
            .collect()
    }

    fn uploaded(&self) -> Vec<PathBuf> {
        self.uploader.uploaded.lock().unwrap().clone()
    }

    fn assert_cleaned_up(&self, job: &Job) {
        assert!(!job.work_dir().exists(), "job directory left behind");
        assert!(!job.input_path.exists(), "staged input left behind");
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

// ----------------------------------------------------------------------------
// Video jobs
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_complete_video_writes_every_frame() {
    let harness = Harness::new(Script::default());
    let job = harness.video_job(LayoutMode::None).await;

    let outcome = harness.pipeline.run(job.clone()).await;

    assert!(outcome.is_success(), "unexpected failure: {:?}", outcome.error);
    assert_eq!(harness.written.lock().unwrap().len(), 10);
    assert!(harness
        .written
        .lock()
        .unwrap()
        .iter()
        .all(|&dims| dims == (WIDTH as usize, HEIGHT as usize)));
    harness.assert_cleaned_up(&job);
}

#[tokio::test]
async fn test_truncated_video_aborts_as_broken() {
    let harness = Harness::new(Script {
        claimed: 100,
        delivered: 40,
        ..Default::default()
    });
    let job = harness.video_job(LayoutMode::None).await;

    let outcome = harness.pipeline.run(job.clone()).await;

    assert_eq!(outcome.state, JobState::Aborted);
    assert_eq!(outcome.error.as_deref(), Some("The video is broken."));
    assert_eq!(outcome.url, None);
    assert!(harness.uploaded().is_empty());
    assert_eq!(harness.written.lock().unwrap().len(), 40);
    harness.assert_cleaned_up(&job);

    let events = harness.events();
    let last = events.last().unwrap();
    assert_eq!(last.error.as_deref(), Some("The video is broken."));
    assert!(events.iter().all(|e| e.percent.unwrap_or(0) < 100));
}

#[tokio::test]
async fn test_decoder_error_mid_stream_aborts_as_broken() {
    let harness = Harness::new(Script {
        claimed: 30,
        delivered: 12,
        decoder_fails: true,
        has_audio: true,
        ..Default::default()
    });
    let job = harness.video_job(LayoutMode::Horizontal).await;

    let outcome = harness.pipeline.run(job.clone()).await;

    assert_eq!(outcome.state, JobState::Aborted);
    assert_eq!(outcome.error.as_deref(), Some("The video is broken."));
    assert!(!outcome.history.contains(&JobState::Remuxing));
    assert!(harness.uploaded().is_empty());
    assert_eq!(harness.written.lock().unwrap().len(), 12);
    harness.assert_cleaned_up(&job);

    let events = harness.events();
    assert_eq!(
        events.last().unwrap().error.as_deref(),
        Some("The video is broken.")
    );
}

#[tokio::test]
async fn test_video_without_audio_publishes_silent_output() {
    let harness = Harness::new(Script {
        has_audio: false,
        ..Default::default()
    });
    let job = harness.video_job(LayoutMode::None).await;

    let outcome = harness.pipeline.run(job.clone()).await;

    assert_eq!(outcome.state, JobState::Cleaned);
    assert_eq!(outcome.error, None);
    let uploaded = harness.uploaded();
    assert_eq!(uploaded.len(), 1);
    assert_eq!(file_name(&uploaded[0]), "output.mp4");
    harness.assert_cleaned_up(&job);
}

#[tokio::test]
async fn test_video_with_audio_publishes_muxed_output() {
    let harness = Harness::new(Script {
        has_audio: true,
        ..Default::default()
    });
    let job = harness.video_job(LayoutMode::None).await;

    let outcome = harness.pipeline.run(job.clone()).await;

    assert!(outcome.is_success());
    assert_eq!(file_name(&harness.uploaded()[0]), "output_sound.mp4");
    harness.assert_cleaned_up(&job);
}

#[tokio::test]
async fn test_failed_remux_degrades_to_silent_video() {
    let harness = Harness::new(Script {
        has_audio: true,
        remux_succeeds: false,
        ..Default::default()
    });
    let job = harness.video_job(LayoutMode::None).await;

    let outcome = harness.pipeline.run(job.clone()).await;

    assert!(outcome.is_success());
    assert_eq!(file_name(&harness.uploaded()[0]), "output.mp4");
    assert!(harness.events().iter().all(|e| !e.is_error()));
}

#[tokio::test]
async fn test_horizontal_layout_doubles_width() {
    let harness = Harness::new(Script::default());
    let job = harness.video_job(LayoutMode::Horizontal).await;

    let outcome = harness.pipeline.run(job).await;

    assert!(outcome.is_success());
    let written = harness.written.lock().unwrap();
    assert_eq!(written.len(), 10);
    assert!(written
        .iter()
        .all(|&dims| dims == (2 * WIDTH as usize, HEIGHT as usize)));
}

#[tokio::test]
async fn test_vertical_layout_doubles_height() {
    let harness = Harness::new(Script::default());
    let job = harness.video_job(LayoutMode::Vertical).await;

    harness.pipeline.run(job).await;

    assert!(harness
        .written
        .lock()
        .unwrap()
        .iter()
        .all(|&dims| dims == (WIDTH as usize, 2 * HEIGHT as usize)));
}

#[tokio::test]
async fn test_progress_is_monotonic_and_ends_with_url() {
    let harness = Harness::new(Script::default());
    let job = harness.video_job(LayoutMode::None).await;

    let outcome = harness.pipeline.run(job.clone()).await;

    let events = harness.events();
    let percents: Vec<u8> = events.iter().filter_map(|e| e.percent).collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{percents:?}");
    assert_eq!(percents.last(), Some(&100));

    let frames: Vec<u64> = events.iter().filter_map(|e| e.processed_frame).collect();
    assert_eq!(frames, (1..=10).collect::<Vec<_>>());

    let last = events.last().unwrap();
    assert_eq!(last.task_id, job.task_id);
    assert_eq!(last.url, outcome.url);
    assert!(last.url.is_some());
}

#[tokio::test]
async fn test_video_history_passes_through_remux() {
    let harness = Harness::new(Script::default());
    let job = harness.video_job(LayoutMode::None).await;

    let JobOutcome { history, .. } = harness.pipeline.run(job).await;

    assert_eq!(
        history,
        vec![
            JobState::Queued,
            JobState::Decoding,
            JobState::Transforming,
            JobState::Remuxing,
            JobState::Uploading,
            JobState::Cleaned,
        ]
    );
}

#[tokio::test]
async fn test_upload_failure_aborts_and_cleans() {
    let harness = Harness::new(Script {
        upload_fails: true,
        ..Default::default()
    });
    let job = harness.video_job(LayoutMode::None).await;

    let outcome = harness.pipeline.run(job.clone()).await;

    assert_eq!(outcome.state, JobState::Aborted);
    assert_eq!(outcome.history.iter().nth_back(1), Some(&JobState::Uploading));
    harness.assert_cleaned_up(&job);
}

#[tokio::test]
async fn test_missing_model_aborts_before_transform() {
    let harness = Harness::new(Script::default());
    let job = harness
        .video_job(LayoutMode::None)
        .await
        .with_device(DevicePreference::Accelerated);
    let job = Job {
        model_path: PathBuf::from("models/unknown.onnx"),
        ..job
    };

    let outcome = harness.pipeline.run(job.clone()).await;

    assert_eq!(outcome.state, JobState::Aborted);
    assert_eq!(
        outcome.history,
        vec![JobState::Queued, JobState::Decoding, JobState::Aborted]
    );
    assert!(harness.written.lock().unwrap().is_empty());
    harness.assert_cleaned_up(&job);
}

// ----------------------------------------------------------------------------
// Image jobs
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_image_job_skips_remux() {
    let harness = Harness::new(Script::default());
    let job = harness.image_job("identity");

    let outcome = harness.pipeline.run(job.clone()).await;

    assert!(outcome.is_success(), "unexpected failure: {:?}", outcome.error);
    assert_eq!(
        outcome.history,
        vec![
            JobState::Queued,
            JobState::Decoding,
            JobState::Transforming,
            JobState::Uploading,
            JobState::Cleaned,
        ]
    );
    assert_eq!(file_name(&harness.uploaded()[0]), "output.png");
    harness.assert_cleaned_up(&job);
}

#[tokio::test]
async fn test_image_job_reports_single_processed_image() {
    let harness = Harness::new(Script::default());
    let job = harness.image_job("identity");

    harness.pipeline.run(job).await;

    let events = harness.events();
    let processed: Vec<&ProgressEvent> = events
        .iter()
        .filter(|e| e.processed_image.is_some())
        .collect();
    assert_eq!(processed.len(), 1);
    assert_eq!(processed[0].percent, Some(100));
    assert_eq!(processed[0].processed_image.as_deref(), Some("photo.png"));
    assert!(events.last().unwrap().url.is_some());
}

#[tokio::test]
async fn test_image_job_with_unknown_model_aborts() {
    let harness = Harness::new(Script::default());
    let job = harness.image_job("missing");

    let outcome = harness.pipeline.run(job.clone()).await;

    assert_eq!(outcome.state, JobState::Aborted);
    assert!(outcome.error.is_some());
    assert!(harness.uploaded().is_empty());
    harness.assert_cleaned_up(&job);
}
