//! Progress events pushed to live client connections.
//!
//! The wire shape matches what the web client already listens for:
//! `{"task_id": ..., "progress": 42, "processed_frame": 17}` during work,
//! `{"task_id": ..., "error": "..."}` on failure.

use serde::{Deserialize, Serialize};

use crate::job::TaskId;

/// Ephemeral progress notification for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub task_id: TaskId,

    /// Completion percentage (0-100)
    #[serde(rename = "progress", default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<u8>,

    /// Frames written so far (video jobs)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_frame: Option<u64>,

    /// Name of the image just processed (image jobs)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_image: Option<String>,

    /// Public URL of the finished artifact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressEvent {
    fn empty(task_id: &TaskId) -> Self {
        Self {
            task_id: task_id.clone(),
            percent: None,
            processed_frame: None,
            processed_image: None,
            url: None,
            error: None,
        }
    }

    /// Percentage update. Values above 100 are clamped.
    pub fn progress(task_id: &TaskId, percent: u8) -> Self {
        Self {
            percent: Some(percent.min(100)),
            ..Self::empty(task_id)
        }
    }

    /// Percentage for `done` of `total` units, rounded down.
    pub fn fraction(task_id: &TaskId, done: u64, total: u64) -> Self {
        let percent = if total == 0 {
            100
        } else {
            (done.min(total) * 100 / total) as u8
        };
        Self::progress(task_id, percent)
    }

    pub fn with_frame(mut self, frame: u64) -> Self {
        self.processed_frame = Some(frame);
        self
    }

    pub fn with_image(mut self, name: impl Into<String>) -> Self {
        self.processed_image = Some(name.into());
        self
    }

    /// Terminal success event carrying the published URL.
    pub fn completed(task_id: &TaskId, url: impl Into<String>) -> Self {
        Self {
            percent: Some(100),
            url: Some(url.into()),
            ..Self::empty(task_id)
        }
    }

    /// Terminal failure event.
    pub fn error(task_id: &TaskId, message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::empty(task_id)
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
