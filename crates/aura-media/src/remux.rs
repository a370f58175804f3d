//! Audio remux: re-attach the source soundtrack to the composed video.
//!
//! Best effort. Any failure degrades to the silent video.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::command::{FfmpegCommand, MediaCommandRunner};
use crate::error::MediaResult;

/// CRF used when re-encoding the muxed video for delivery.
pub const DELIVERY_CRF: u8 = 25;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemuxOutcome {
    /// Audio and video merged into a new container
    Muxed(PathBuf),
    /// The silent composed video is the final artifact
    Silent { path: PathBuf, reason: String },
}

impl RemuxOutcome {
    /// The file to publish.
    pub fn path(&self) -> &Path {
        match self {
            RemuxOutcome::Muxed(path) => path,
            RemuxOutcome::Silent { path, .. } => path,
        }
    }

    pub fn is_muxed(&self) -> bool {
        matches!(self, RemuxOutcome::Muxed(_))
    }
}

pub struct AudioRemuxer {
    runner: Arc<dyn MediaCommandRunner>,
}

impl AudioRemuxer {
    pub fn new(runner: Arc<dyn MediaCommandRunner>) -> Self {
        Self { runner }
    }

    /// Where the extracted soundtrack goes, next to the composed video.
    pub fn audio_path(silent: &Path) -> PathBuf {
        silent.with_file_name("sound.mp3")
    }

    pub fn muxed_path(silent: &Path) -> PathBuf {
        let stem = silent
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        silent.with_file_name(format!("{stem}_sound.mp4"))
    }

    /// Merge the audio of `source` into `silent`.
    ///
    /// Never fails: problems are logged and reported as [`RemuxOutcome::Silent`].
    pub async fn remux(&self, source: &Path, silent: &Path, has_audio: bool) -> RemuxOutcome {
        if !has_audio {
            info!(path = %silent.display(), "Source has no audio track, keeping silent video");
            return RemuxOutcome::Silent {
                path: silent.to_path_buf(),
                reason: "source has no audio track".to_string(),
            };
        }

        match self.try_remux(source, silent).await {
            Ok(muxed) => RemuxOutcome::Muxed(muxed),
            Err(e) => {
                warn!(error = %e, "Audio remux failed, returning silent video");
                RemuxOutcome::Silent {
                    path: silent.to_path_buf(),
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn try_remux(&self, source: &Path, silent: &Path) -> MediaResult<PathBuf> {
        let audio = Self::audio_path(silent);
        let muxed = Self::muxed_path(silent);

        self.runner
            .run(&FfmpegCommand::new(source, &audio).no_video())
            .await?;

        let mux = FfmpegCommand::new(&audio, &muxed)
            .add_input(silent)
            .video_codec("libx264")
            .audio_codec("copy")
            .crf(DELIVERY_CRF);
        self.runner.run(&mux).await?;

        Ok(muxed)
    }
}
