//! Job executor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use aura_models::{Job, JobState};

use crate::config::WorkerConfig;
use crate::pipeline::{JobOutcome, JobPipeline};

/// Runs submitted jobs on a bounded pool of tokio tasks.
pub struct JobExecutor {
    pipeline: Arc<JobPipeline>,
    job_semaphore: Arc<Semaphore>,
    max_concurrent_jobs: usize,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(config: &WorkerConfig, pipeline: JobPipeline) -> Self {
        let max_concurrent_jobs = config.max_concurrent_jobs.max(1);
        info!("Starting job executor with {} max concurrent jobs", max_concurrent_jobs);

        Self {
            pipeline: Arc::new(pipeline),
            job_semaphore: Arc::new(Semaphore::new(max_concurrent_jobs)),
            max_concurrent_jobs,
        }
    }

    /// Queue a job. It starts once a slot is free.
    pub fn submit(&self, job: Job) -> JoinHandle<JobOutcome> {
        let pipeline = Arc::clone(&self.pipeline);
        let semaphore = Arc::clone(&self.job_semaphore);

        tokio::spawn(async move {
            let task_id = job.task_id.clone();
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!("Executor shut down before job {} started", task_id);
                    return JobOutcome {
                        task_id,
                        state: JobState::Aborted,
                        url: None,
                        error: Some("Worker is shutting down".to_string()),
                        history: vec![JobState::Queued, JobState::Aborted],
                    };
                }
            };

            info!("Executing job {}", task_id);
            let outcome = pipeline.run(job).await;
            match &outcome.error {
                None => info!("Job {} completed successfully", task_id),
                Some(e) => error!("Job {} failed: {}", task_id, e),
            }
            outcome
        })
    }

    /// Slots not currently held by a running job.
    pub fn available_slots(&self) -> usize {
        self.job_semaphore.available_permits()
    }

    pub fn max_concurrent_jobs(&self) -> usize {
        self.max_concurrent_jobs
    }

    /// Stop accepting new starts. Jobs already running finish normally.
    pub fn shutdown(&self) {
        self.job_semaphore.close();
    }

    /// Wait for all in-flight jobs to complete.
    pub async fn wait_idle(&self) {
        while self.job_semaphore.available_permits() < self.max_concurrent_jobs {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
