//! Training-corpus tooling for a cloud document classifier
//!
//! Builds per-category training manifests from a directory tree, uploads
//! them to blob storage, and drives the service's long-running jobs (layout
//! analysis, classifier training, classification) through a bounded
//! exponential-backoff poller.

pub mod client;
pub mod config;
pub mod manifest;
pub mod mock;
pub mod poller;
pub mod summary;
pub mod workflow;

pub use client::{AzureBlobStore, BlobStore, ContainerRef, DocumentIntelligenceClient, HttpTransport};
pub use config::{ConfigError, EffectiveConfig, LaneConfig};
pub use manifest::{Eligibility, FileEntry, ManifestBuilder, ManifestError, ManifestOutput};
pub use poller::{AsyncJobPoller, JobBackend, JobHandle, JobStatus, PollResult, RetryPolicy};
pub use summary::{ExitCode, Status};
pub use workflow::{WorkflowError, WorkflowResult};
