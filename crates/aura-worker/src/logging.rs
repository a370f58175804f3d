//! Structured job logging utilities.
//!
//! Every line carries the task, owner and operation so one job's lifecycle
//! can be filtered out of interleaved worker output.

use tracing::{error, info, warn, Span};

use aura_models::{Job, TaskId};

#[derive(Debug, Clone)]
pub struct JobLogger {
    task_id: String,
    owner_id: String,
    operation: String,
}

impl JobLogger {
    pub fn new(task_id: &TaskId, owner_id: &str, operation: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            owner_id: owner_id.to_string(),
            operation: operation.to_string(),
        }
    }

    /// Logger for a job, with the operation named after its source kind.
    pub fn for_job(job: &Job) -> Self {
        Self::new(
            &job.task_id,
            &job.owner_id,
            &format!("style_{}", job.source_kind.as_str()),
        )
    }

    pub fn log_start(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            owner_id = %self.owner_id,
            operation = %self.operation,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            owner_id = %self.owner_id,
            operation = %self.operation,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            task_id = %self.task_id,
            owner_id = %self.owner_id,
            operation = %self.operation,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            task_id = %self.task_id,
            owner_id = %self.owner_id,
            operation = %self.operation,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            owner_id = %self.owner_id,
            operation = %self.operation,
            "Job completed: {}", message
        );
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span to instrument the job's futures with.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            task_id = %self.task_id,
            owner_id = %self.owner_id,
            operation = %self.operation
        )
    }
}
