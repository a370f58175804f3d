//! Object storage for finished artifacts.
//!
//! Uploads go to a DigitalOcean Space through the S3 API and come back as a
//! public CDN URL.

pub mod client;
pub mod error;
pub mod upload;

pub use client::{SpacesClient, SpacesConfig};
pub use error::{StorageError, StorageResult};
pub use upload::{content_type_for, object_key_for, ArtifactUploader};
