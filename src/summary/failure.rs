//! Failure taxonomy and stable exit codes

use serde::{Deserialize, Serialize};

/// Outcome of one item in a batch (a document or a build)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Job succeeded
    Success,
    /// Submission rejected by the service (unsupported or corrupted input)
    Rejected,
    /// Job failed remotely
    Failed,
    /// Attempts ran out; the job may still be running
    TimedOut,
    /// Polling abandoned on request
    Cancelled,
}

/// Failure kind - categorizes the cause of failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// Missing or invalid configuration
    Config,
    /// Training root unreadable
    Traversal,
    /// Network or HTTP failure
    Transport,
    /// Job submission rejected
    Submission,
    /// Job failed remotely
    JobFailed,
    /// Poll attempts exhausted
    TimedOut,
    /// Blob or local storage failure
    Storage,
    /// Polling cancelled
    Cancelled,
}

impl FailureKind {
    /// Get the stable exit code for this failure kind
    pub fn exit_code(&self) -> ExitCode {
        match self {
            FailureKind::Config => ExitCode::Config,
            FailureKind::Traversal => ExitCode::Traversal,
            FailureKind::Transport => ExitCode::Transport,
            FailureKind::Submission => ExitCode::Submission,
            FailureKind::JobFailed => ExitCode::JobFailed,
            FailureKind::TimedOut => ExitCode::TimedOut,
            FailureKind::Storage => ExitCode::Storage,
            FailureKind::Cancelled => ExitCode::Cancelled,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            FailureKind::Config => "Configuration error",
            FailureKind::Traversal => "Training directory unreadable",
            FailureKind::Transport => "Service unreachable",
            FailureKind::Submission => "Job submission rejected",
            FailureKind::JobFailed => "Job failed",
            FailureKind::TimedOut => "Job did not finish in time",
            FailureKind::Storage => "Storage operation failed",
            FailureKind::Cancelled => "Polling cancelled",
        }
    }
}

/// Stable process exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum ExitCode {
    #[default]
    Success = 0,
    Config = 1,
    Traversal = 10,
    Transport = 20,
    Submission = 30,
    JobFailed = 40,
    TimedOut = 50,
    Storage = 60,
    Cancelled = 80,
}

impl ExitCode {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    pub fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(ExitCode::Success),
            1 => Some(ExitCode::Config),
            10 => Some(ExitCode::Traversal),
            20 => Some(ExitCode::Transport),
            30 => Some(ExitCode::Submission),
            40 => Some(ExitCode::JobFailed),
            50 => Some(ExitCode::TimedOut),
            60 => Some(ExitCode::Storage),
            80 => Some(ExitCode::Cancelled),
            _ => None,
        }
    }
}

impl From<Status> for ExitCode {
    fn from(status: Status) -> Self {
        match status {
            Status::Success => ExitCode::Success,
            Status::Rejected => ExitCode::Submission,
            Status::Failed => ExitCode::JobFailed,
            Status::TimedOut => ExitCode::TimedOut,
            Status::Cancelled => ExitCode::Cancelled,
        }
    }
}

/// Aggregates item outcomes of a batch into one exit code
///
/// Cancellation wins, then the first failure seen.
#[derive(Debug, Default)]
pub struct ExitCodeAggregator {
    cancelled: bool,
    first: Option<ExitCode>,
}

impl ExitCodeAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, status: Status) {
        self.add_code(ExitCode::from(status));
    }

    pub fn add_code(&mut self, code: ExitCode) {
        match code {
            ExitCode::Success => {}
            ExitCode::Cancelled => self.cancelled = true,
            failure => {
                self.first.get_or_insert(failure);
            }
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        match (self.cancelled, self.first) {
            (true, _) => ExitCode::Cancelled,
            (false, Some(code)) => code,
            (false, None) => ExitCode::Success,
        }
    }
}
