//! Video jobs: decode, stylize and compose every frame, remux, upload.

use std::path::PathBuf;
use std::sync::Arc;

use aura_media::{
    resize_lanczos, AudioRemuxer, Compositor, Frame, FrameSource, FrameSourceConfig, MediaResult,
    ModelLoader, PostFilter, RemuxOutcome, StyleModel, VideoBackend, VideoInfo,
};
use aura_models::{DevicePreference, Job, JobState, LayoutMode, ProgressEvent, TaskId};

use super::{JobWorkspace, PipelineDeps, StateTracker};
use crate::error::WorkerResult;
use crate::logging::JobLogger;
use crate::metrics;
use crate::progress::ProgressReporter;

pub(super) async fn run(
    deps: &PipelineDeps,
    job: &Job,
    tracker: &mut StateTracker,
    workspace: &mut JobWorkspace,
    logger: &JobLogger,
) -> WorkerResult<String> {
    tracker.advance(JobState::Decoding)?;
    workspace.create().await?;
    let input = workspace.adopt_input(&job.input_path).await?;
    let info = deps.video.probe(&input).await?;
    info.validate()?;
    logger.log_progress(&format!(
        "{}x{} @ {:.2} fps, {} frames, audio: {}",
        info.width, info.height, info.fps, info.frame_count, info.has_audio
    ));

    let silent = workspace.artifact("output.mp4");
    let transform = FrameLoop {
        video: Arc::clone(&deps.video),
        models: Arc::clone(&deps.models),
        filter: Arc::clone(&deps.filter),
        progress: deps.progress.clone(),
        source_config: deps.source_config,
        input: input.clone(),
        output: silent.clone(),
        info: info.clone(),
        task_id: job.task_id.clone(),
        owner_id: job.owner_id.clone(),
        layout: job.layout_mode,
        device: job.device_preference,
        model_path: job.model_path.clone(),
    };

    // Model load and decoder start happen before the first frame; both are
    // decode-stage failures.
    let (model, source) = {
        let prepare = transform.clone();
        tokio::task::spawn_blocking(move || prepare.prepare()).await??
    };
    tracker.advance(JobState::Transforming)?;
    let written = tokio::task::spawn_blocking(move || transform.run(model, source)).await??;
    logger.log_progress(&format!("{written} frames composed"));

    tracker.advance(JobState::Remuxing)?;
    workspace.track(AudioRemuxer::audio_path(&silent));
    workspace.track(AudioRemuxer::muxed_path(&silent));
    let outcome = AudioRemuxer::new(Arc::clone(&deps.commands))
        .remux(&input, &silent, info.has_audio)
        .await;
    if let RemuxOutcome::Silent { reason, .. } = &outcome {
        logger.log_warning(&format!("publishing silent video: {reason}"));
    }

    tracker.advance(JobState::Uploading)?;
    Ok(deps.uploader.upload(outcome.path()).await?)
}

/// Everything the blocking frame loop needs, owned so it can cross threads.
#[derive(Clone)]
struct FrameLoop {
    video: Arc<dyn VideoBackend>,
    models: Arc<dyn ModelLoader>,
    filter: Arc<PostFilter>,
    progress: ProgressReporter,
    source_config: FrameSourceConfig,
    input: PathBuf,
    output: PathBuf,
    info: VideoInfo,
    task_id: TaskId,
    owner_id: String,
    layout: LayoutMode,
    device: DevicePreference,
    model_path: PathBuf,
}

impl FrameLoop {
    fn prepare(&self) -> MediaResult<(Arc<dyn StyleModel>, FrameSource)> {
        let model = self.models.load(&self.model_path, self.device)?;
        let source = FrameSource::open(
            self.video.as_ref(),
            &self.input,
            &self.info,
            model.name(),
            self.source_config,
        )?;
        Ok((model, source))
    }

    fn run(self, model: Arc<dyn StyleModel>, mut source: FrameSource) -> MediaResult<u64> {
        let panel = source.original_dimensions();
        let (out_w, out_h) = self.layout.output_dimensions(panel.0, panel.1);
        let writer = self
            .video
            .create_writer(&self.output, out_w, out_h, source.frames_per_second())?;

        let (reporter, owner, task) = (self.progress.clone(), self.owner_id.clone(), self.task_id.clone());
        let mut compositor = Compositor::new(writer, self.layout, panel, source.total_frame_count())
            .with_progress(Box::new(move |p| {
                metrics::record_frame_processed();
                let event = ProgressEvent::fraction(&task, p.frames_written, p.total_frames)
                    .with_frame(p.frames_written);
                reporter.notify(&owner, &event);
            }));

        while let Some(frame) = source.next()? {
            let generated = model.infer(&frame)?;
            let generated = restore(&self.filter, generated, panel)?;
            let original = match self.layout {
                LayoutMode::None => frame,
                _ => restore(&self.filter, frame, panel)?,
            };
            compositor.compose(original, generated)?;
        }

        compositor.finish()
    }
}

/// Back to the source size, then through the post-filter.
fn restore(filter: &PostFilter, frame: Frame, (width, height): (u32, u32)) -> MediaResult<Frame> {
    frame.map_pixels(|pixels| filter.apply(&resize_lanczos(pixels, width, height)?))
}
