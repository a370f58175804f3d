//! Shared data models for the Aura style-transfer service.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, their source kind, layout and device preference
//! - The per-job pipeline state machine
//! - Progress events pushed to live client connections

pub mod job;
pub mod layout;
pub mod progress;

pub use job::{Job, JobState, SourceKind, TaskId};
pub use layout::{DevicePreference, LayoutMode, ParseOptionError};
pub use progress::ProgressEvent;
