//! Corpus and classifier workflows
//!
//! Each workflow chains the manifest builder, the service clients and the
//! poller, and returns a report. Per-file problems are collected in the
//! report; only errors that stop the whole operation are returned as
//! [`WorkflowError`].

mod analyze;
mod classifier;
mod classify;
mod upload;

pub use analyze::{analyze_layout, AnalyzeOptions};
pub use classifier::{build_classifier, list_classifiers, BuildOptions, DocTypeSource};
pub use classify::classify_documents;
pub use upload::upload_corpus;

use crate::client::{BlobError, ClientError, TransportError};
use crate::config::ConfigError;
use crate::manifest::ManifestError;
use crate::poller::SubmitError;
use crate::summary::{ExitCode, FailureKind};

/// Errors that abort a workflow
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Manifest(#[from] ManifestError),

    #[error("storage error: {0}")]
    Storage(#[from] BlobError),

    #[error("service error: {0}")]
    Client(#[from] ClientError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("{0}")]
    Submission(#[from] SubmitError),

    #[error("no training manifests (*.jsonl) or category folders found in {container}")]
    NoDocTypes { container: String },
}

impl WorkflowError {
    /// Map error to failure kind for exit code
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            WorkflowError::Config(_) => FailureKind::Config,
            WorkflowError::Manifest(ManifestError::Traversal { .. }) => FailureKind::Traversal,
            WorkflowError::Manifest(ManifestError::Write { .. }) => FailureKind::Storage,
            WorkflowError::Storage(BlobError::Transport(_)) => FailureKind::Transport,
            WorkflowError::Storage(_) => FailureKind::Storage,
            WorkflowError::Client(_) | WorkflowError::Transport(_) => FailureKind::Transport,
            WorkflowError::Submission(SubmitError::Transport(_)) => FailureKind::Transport,
            WorkflowError::Submission(_) => FailureKind::Submission,
            WorkflowError::NoDocTypes { .. } => FailureKind::Config,
        }
    }

    /// Get exit code for this error
    pub fn exit_code(&self) -> ExitCode {
        self.failure_kind().exit_code()
    }
}

/// Result type for workflows
pub type WorkflowResult<T> = Result<T, WorkflowError>;
