//! Worker configuration.

use std::path::PathBuf;

use aura_media::{FrameSourceConfig, DEFAULT_BUFFER_CAPACITY, DEFAULT_FRAME_LIMIT};

use crate::error::{WorkerError, WorkerResult};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Root of per-job temporary directories
    pub work_dir: PathBuf,
    /// Directory holding `<name>.onnx` generators
    pub model_dir: PathBuf,
    /// Model used when a request names none
    pub default_model: String,
    /// Longest frame edge fed to the model
    pub frame_limit: u32,
    /// Decoded frames buffered ahead of inference
    pub frame_buffer: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            work_dir: PathBuf::from("/tmp/aura"),
            model_dir: PathBuf::from("models"),
            default_model: "AnimeGANv3_Hayao_36".to_string(),
            frame_limit: DEFAULT_FRAME_LIMIT,
            frame_buffer: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: env_parse("WORKER_MAX_JOBS").unwrap_or(defaults.max_concurrent_jobs),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            model_dir: std::env::var("AURA_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_dir),
            default_model: std::env::var("AURA_DEFAULT_MODEL").unwrap_or(defaults.default_model),
            frame_limit: env_parse("AURA_FRAME_LIMIT").unwrap_or(defaults.frame_limit),
            frame_buffer: env_parse("AURA_FRAME_BUFFER").unwrap_or(defaults.frame_buffer),
        }
    }

    pub fn source_config(&self) -> FrameSourceConfig {
        FrameSourceConfig {
            frame_limit: self.frame_limit,
            buffer_capacity: self.frame_buffer,
        }
    }

    /// Resolve a requested model name to its file, falling back to the default model.
    ///
    /// Names are restricted to `[A-Za-z0-9_-]` so they cannot escape `model_dir`.
    pub fn model_path(&self, requested: Option<&str>) -> WorkerResult<PathBuf> {
        let name = requested
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.default_model);

        let valid = name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(WorkerError::invalid_model(name));
        }
        Ok(self.model_dir.join(format!("{name}.onnx")))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
