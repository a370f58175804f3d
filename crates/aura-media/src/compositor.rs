//! Frame Compositor: layout, validation and writing of output frames.

use tracing::debug;

use aura_models::LayoutMode;

use crate::error::{MediaError, MediaResult};
use crate::frame::{arrange, Frame};
use crate::progress::{FrameProgress, ProgressCallback};
use crate::video_io::FrameWriter;

/// Arranges original/generated pairs and writes them in order.
///
/// Output dimensions are fixed at construction from the panel size and
/// layout; every frame is checked against them.
pub struct Compositor {
    writer: Option<Box<dyn FrameWriter>>,
    layout: LayoutMode,
    panel: (u32, u32),
    output: (u32, u32),
    total_frames: u64,
    frames_written: u64,
    on_progress: Option<ProgressCallback>,
}

impl Compositor {
    /// `panel` is the `(width, height)` of each original/generated frame.
    pub fn new(
        writer: Box<dyn FrameWriter>,
        layout: LayoutMode,
        panel: (u32, u32),
        total_frames: u64,
    ) -> Self {
        Self {
            writer: Some(writer),
            layout,
            panel,
            output: layout.output_dimensions(panel.0, panel.1),
            total_frames,
            frames_written: 0,
            on_progress: None,
        }
    }

    /// Called after every written frame.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// `(width, height)` of every written frame.
    pub fn output_dimensions(&self) -> (u32, u32) {
        self.output
    }

    pub fn compose(&mut self, original: Frame, generated: Frame) -> MediaResult<FrameProgress> {
        if original.index != self.frames_written || generated.index != self.frames_written {
            return Err(MediaError::internal(format!(
                "frame out of order: expected {}, got {}/{}",
                self.frames_written, original.index, generated.index
            )));
        }
        // The original is only checked when the layout shows it.
        if self.layout != LayoutMode::None && original.dimensions() != self.panel {
            return Err(MediaError::dimension_mismatch(self.panel, original.dimensions()));
        }
        if generated.dimensions() != self.panel {
            return Err(MediaError::dimension_mismatch(self.panel, generated.dimensions()));
        }

        let composed = arrange(self.layout, &original.pixels, generated.pixels)?;
        let (h, w, _) = composed.dim();
        if (w as u32, h as u32) != self.output {
            return Err(MediaError::dimension_mismatch(self.output, (w as u32, h as u32)));
        }

        self.writer
            .as_mut()
            .ok_or_else(|| MediaError::internal("compositor already finished"))?
            .write_frame(&composed)?;
        self.frames_written += 1;

        let progress = FrameProgress::new(self.frames_written, self.total_frames);
        if let Some(callback) = self.on_progress.as_mut() {
            callback(progress);
        }
        Ok(progress)
    }

    /// Close the output stream. Fails if fewer frames than promised were written.
    pub fn finish(mut self) -> MediaResult<u64> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| MediaError::internal("compositor already finished"))?;
        if self.frames_written < self.total_frames {
            return Err(MediaError::BrokenVideo {
                decoded: self.frames_written,
                expected: self.total_frames,
            });
        }
        writer.finish()?;
        debug!(frames = self.frames_written, layout = %self.layout, "Composed stream closed");
        Ok(self.frames_written)
    }
}
