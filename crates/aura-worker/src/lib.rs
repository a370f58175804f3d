//! Style-transfer job worker.
//!
//! This crate provides:
//! - The pipeline orchestrator for video and image jobs
//! - A bounded job executor
//! - Fire-and-forget progress delivery to live connections
//! - Per-job workspace cleanup, structured logging and metrics

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod progress;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use pipeline::{CleanupReport, JobOutcome, JobPipeline, JobWorkspace, PipelineDeps, StateTracker};
pub use progress::{ConnectionRegistry, DeliveryError, LiveConnection, NoConnections, ProgressReporter};
