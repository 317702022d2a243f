//! Run reports and failure taxonomy
//!
//! Every workflow returns a report that renders for humans (`Display`) and
//! serializes to JSON, and carries the exit code of the run.

mod classifier;
mod corpus;
mod failure;

pub use classifier::{
    BuildReport, ClassifierListing, ClassifyReport, DetectedDocument, DocumentClassification,
};
pub use corpus::{
    write_rejections, write_unreadable, AnalyzeReport, CategoryUpload, DocumentOutcome, RejectedFile,
    UploadFailure, UploadReport, INPUT_REQUIREMENTS_URL,
};
pub use failure::{ExitCode, ExitCodeAggregator, FailureKind, Status};
