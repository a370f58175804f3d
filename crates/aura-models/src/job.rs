//! Job definitions for the transformation pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::layout::{DevicePreference, LayoutMode};

/// Unique identifier for a transformation task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a new random task ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of media submitted for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Image,
    Video,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Image => "image",
            SourceKind::Video => "video",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline state of a single job.
///
/// `Queued → Decoding → Transforming → Remuxing → Uploading → Cleaned`, with
/// `Aborted` reachable from every non-terminal state. Image jobs skip
/// `Remuxing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Queued,
    Decoding,
    Transforming,
    Remuxing,
    Uploading,
    Cleaned,
    Aborted,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Decoding => "decoding",
            JobState::Transforming => "transforming",
            JobState::Remuxing => "remuxing",
            JobState::Uploading => "uploading",
            JobState::Cleaned => "cleaned",
            JobState::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Cleaned | JobState::Aborted)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;

        if self.is_terminal() {
            return false;
        }
        if next == Aborted {
            return true;
        }
        matches!(
            (self, next),
            (Queued, Decoding)
                | (Decoding, Transforming)
                | (Transforming, Remuxing)
                | (Transforming, Uploading)
                | (Remuxing, Uploading)
                | (Uploading, Cleaned)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One end-to-end transformation request for one input file.
///
/// Immutable once created; the pipeline tracks state separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub task_id: TaskId,
    pub owner_id: String,
    pub source_kind: SourceKind,
    /// Where the uploaded file was staged by the submission API
    pub input_path: PathBuf,
    /// Root under which the job's private temporary directory is created
    pub output_dir: PathBuf,
    #[serde(default)]
    pub layout_mode: LayoutMode,
    #[serde(default)]
    pub device_preference: DevicePreference,
    /// ONNX model used for inference
    pub model_path: PathBuf,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Create a new job with a fresh task ID.
    pub fn new(
        owner_id: impl Into<String>,
        source_kind: SourceKind,
        input_path: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        model_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            task_id: TaskId::new(),
            owner_id: owner_id.into(),
            source_kind,
            input_path: input_path.into(),
            output_dir: output_dir.into(),
            layout_mode: LayoutMode::default(),
            device_preference: DevicePreference::default(),
            model_path: model_path.into(),
            created_at: Utc::now(),
        }
    }

    pub fn with_task_id(mut self, task_id: TaskId) -> Self {
        self.task_id = task_id;
        self
    }

    pub fn with_layout(mut self, layout_mode: LayoutMode) -> Self {
        self.layout_mode = layout_mode;
        self
    }

    pub fn with_device(mut self, device_preference: DevicePreference) -> Self {
        self.device_preference = device_preference;
        self
    }

    /// Model variant name (the model file stem), e.g. `AnimeGANv3_tiny_Cute`.
    pub fn model_name(&self) -> String {
        self.model_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Private working directory for this job.
    pub fn work_dir(&self) -> PathBuf {
        self.output_dir.join(self.task_id.as_str())
    }
}
