#![deny(unreachable_patterns)]
//! Media engine for style-transfer jobs.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and a process runner seam
//! - Raw-frame decode/encode over FFmpeg pipes
//! - A bounded background Frame Source
//! - ONNX Runtime style inference
//! - The cartoon post-filter and the frame compositor
//! - Best-effort audio remux

pub mod command;
pub mod compositor;
pub mod error;
pub mod filter;
pub mod frame;
pub mod fs_utils;
pub mod inference;
pub mod probe;
pub mod progress;
pub mod remux;
pub mod source;
pub mod still;
pub mod video_io;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner, MediaCommandRunner};
pub use compositor::Compositor;
pub use error::{MediaError, MediaResult};
pub use filter::{PostFilter, PostFilterConfig};
pub use frame::{aligned_dimensions, resize_lanczos, target_dimensions, Frame, DEFAULT_FRAME_LIMIT};
pub use fs_utils::move_file;
pub use inference::{ExecutionBackend, ModelLoader, OrtModelLoader, StyleModel};
pub use probe::{probe_video, VideoInfo};
pub use progress::{FrameProgress, ProgressCallback};
pub use remux::{AudioRemuxer, RemuxOutcome};
pub use source::{FrameSource, FrameSourceConfig, DEFAULT_BUFFER_CAPACITY};
pub use still::{read_image, write_image};
pub use video_io::{FfmpegVideoBackend, FrameDecoder, FrameWriter, VideoBackend};
