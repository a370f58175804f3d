//! Pipeline Orchestrator.
//!
//! Drives one job through `Queued → Decoding → Transforming → (Remuxing) →
//! Uploading → Cleaned`, or to `Aborted` on the first fatal error. Whatever
//! the exit path, the job workspace is cleaned after the upload attempt.

mod image;
mod video;
pub mod workspace;

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, Instrument};

use aura_media::{FrameSourceConfig, MediaCommandRunner, ModelLoader, PostFilter, VideoBackend};
use aura_models::{Job, JobState, ProgressEvent, SourceKind, TaskId};
use aura_storage::ArtifactUploader;

use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::progress::ProgressReporter;

pub use workspace::{CleanupReport, JobWorkspace};

/// Collaborators a pipeline runs against.
#[derive(Clone)]
pub struct PipelineDeps {
    pub video: Arc<dyn VideoBackend>,
    pub models: Arc<dyn ModelLoader>,
    pub commands: Arc<dyn MediaCommandRunner>,
    pub uploader: Arc<dyn ArtifactUploader>,
    pub progress: ProgressReporter,
    pub filter: Arc<PostFilter>,
    pub source_config: FrameSourceConfig,
}

/// Final result of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub task_id: TaskId,
    pub state: JobState,
    /// Public URL of the published artifact
    pub url: Option<String>,
    pub error: Option<String>,
    /// Every state the job passed through, in order
    pub history: Vec<JobState>,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.state == JobState::Cleaned
    }
}

/// Enforces legal [`JobState`] transitions and records the path taken.
#[derive(Debug)]
pub struct StateTracker {
    task_id: TaskId,
    history: Vec<JobState>,
}

impl StateTracker {
    pub fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            history: vec![JobState::Queued],
        }
    }

    pub fn current(&self) -> JobState {
        self.history.last().copied().unwrap_or_default()
    }

    pub fn advance(&mut self, next: JobState) -> WorkerResult<()> {
        let current = self.current();
        if !current.can_transition_to(next) {
            return Err(WorkerError::InvalidTransition(format!("{current} -> {next}")));
        }
        debug!(task_id = %self.task_id, from = %current, to = %next, "Job state");
        self.history.push(next);
        Ok(())
    }

    pub fn history(&self) -> &[JobState] {
        &self.history
    }
}

/// Runs jobs end to end against a fixed set of collaborators.
#[derive(Clone)]
pub struct JobPipeline {
    deps: PipelineDeps,
}

impl JobPipeline {
    pub fn new(deps: PipelineDeps) -> Self {
        Self { deps }
    }

    pub async fn run(&self, job: Job) -> JobOutcome {
        let logger = JobLogger::for_job(&job);
        let span = logger.create_span();
        self.run_logged(job, logger).instrument(span).await
    }

    async fn run_logged(&self, job: Job, logger: JobLogger) -> JobOutcome {
        let started = Instant::now();
        let mut tracker = StateTracker::new(job.task_id.clone());
        let mut workspace = JobWorkspace::new(job.work_dir());
        logger.log_start(&format!(
            "model={} layout={} device={}",
            job.model_name(),
            job.layout_mode,
            job.device_preference
        ));

        let result = match job.source_kind {
            SourceKind::Video => video::run(&self.deps, &job, &mut tracker, &mut workspace, &logger).await,
            SourceKind::Image => image::run(&self.deps, &job, &mut tracker, &mut workspace).await,
        };

        let report = workspace.cleanup().await;
        if !report.failed.is_empty() {
            logger.log_warning(&format!("{} artifacts left behind", report.failed.len()));
        }

        let outcome = match result.and_then(|url| tracker.advance(JobState::Cleaned).map(|_| url)) {
            Ok(url) => {
                self.deps
                    .progress
                    .notify(&job.owner_id, &ProgressEvent::completed(&job.task_id, &url));
                logger.log_completion(&url);
                JobOutcome {
                    task_id: job.task_id.clone(),
                    state: JobState::Cleaned,
                    url: Some(url),
                    error: None,
                    history: Vec::new(),
                }
            }
            Err(e) => {
                let message = e.user_message();
                // Only fails if already terminal, which a failing job cannot be.
                let _ = tracker.advance(JobState::Aborted);
                self.deps
                    .progress
                    .notify(&job.owner_id, &ProgressEvent::error(&job.task_id, &message));
                logger.log_error(&e.to_string());
                JobOutcome {
                    task_id: job.task_id.clone(),
                    state: JobState::Aborted,
                    url: None,
                    error: Some(message),
                    history: Vec::new(),
                }
            }
        };

        metrics::record_job(
            job.source_kind.as_str(),
            outcome.state.as_str(),
            started.elapsed().as_secs_f64(),
        );
        JobOutcome {
            history: tracker.history().to_vec(),
            ..outcome
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_rejects_skipping_decode() {
        let mut tracker = StateTracker::new(TaskId::from_string("t"));
        assert!(tracker.advance(JobState::Transforming).is_err());
        tracker.advance(JobState::Decoding).unwrap();
        tracker.advance(JobState::Aborted).unwrap();
        assert!(tracker.advance(JobState::Cleaned).is_err());
        assert_eq!(
            tracker.history(),
            &[JobState::Queued, JobState::Decoding, JobState::Aborted]
        );
    }
}
