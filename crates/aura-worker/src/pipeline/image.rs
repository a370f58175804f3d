//! Image Job Runner: one still through the model, no audio or composition.

use std::path::Path;
use std::sync::Arc;

use aura_media::{aligned_dimensions, read_image, resize_lanczos, write_image, Frame};
use aura_models::{Job, JobState, ProgressEvent};

use super::{JobWorkspace, PipelineDeps, StateTracker};
use crate::error::WorkerResult;
use crate::metrics;

pub(super) async fn run(
    deps: &PipelineDeps,
    job: &Job,
    tracker: &mut StateTracker,
    workspace: &mut JobWorkspace,
) -> WorkerResult<String> {
    tracker.advance(JobState::Decoding)?;
    workspace.create().await?;
    let input = workspace.adopt_input(&job.input_path).await?;
    let output = workspace.artifact(&output_name(&input));

    let (models, model_path, device) = (Arc::clone(&deps.models), job.model_path.clone(), job.device_preference);
    let decode_input = input.clone();
    let (model, pixels) = tokio::task::spawn_blocking(move || {
        let model = models.load(&model_path, device)?;
        let pixels = read_image(&decode_input)?;
        aura_media::MediaResult::Ok((model, pixels))
    })
    .await??;

    tracker.advance(JobState::Transforming)?;
    let filter = Arc::clone(&deps.filter);
    let encode_output = output.clone();
    tokio::task::spawn_blocking(move || {
        let (h, w, _) = pixels.dim();
        let (width, height) = (w as u32, h as u32);
        let (tw, th) = aligned_dimensions(width, height, model.name());

        let generated = model.infer(&Frame::new(0, resize_lanczos(pixels, tw, th)?))?;
        let restored = resize_lanczos(generated.pixels, width, height)?;
        write_image(&encode_output, &filter.apply(&restored)?)
    })
    .await??;
    metrics::record_frame_processed();

    let name = job
        .input_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    deps.progress.notify(
        &job.owner_id,
        &ProgressEvent::progress(&job.task_id, 100).with_image(name),
    );

    tracker.advance(JobState::Uploading)?;
    Ok(deps.uploader.upload(&output).await?)
}

/// `output.<ext>` keeping the input's extension.
fn output_name(input: &Path) -> String {
    match input.extension() {
        Some(ext) => format!("output.{}", ext.to_string_lossy()),
        None => "output.png".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_keeps_extension() {
        assert_eq!(output_name(Path::new("/w/input.jpg")), "output.jpg");
        assert_eq!(output_name(Path::new("/w/input")), "output.png");
    }
}
