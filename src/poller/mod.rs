//! Asynchronous job polling
//!
//! Drives a submit-then-poll workflow to a terminal [`PollResult`]:
//! submit once (never retried), then query status with bounded exponential
//! backoff. A transport error while polling is logged and costs one attempt;
//! it does not end the sequence.
//!
//! The poller owns no job state beyond one sequence. A [`JobHandle`] is
//! serializable, so a caller that received [`PollResult::TimedOut`] can store
//! it and call [`AsyncJobPoller::poll`] again later.

mod policy;

pub use policy::{PolicyValidationError, RetryPolicy};

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::client::TransportError;

/// Handle returned by a successful submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    /// Opaque operation identifier
    pub operation_id: String,
    /// Absolute URL answering status queries
    pub status_url: String,
}

impl JobHandle {
    /// Build a handle from an `Operation-Location` URL.
    ///
    /// The operation id is the last path segment, without the query.
    pub fn from_operation_location(location: &str) -> Self {
        let path = location.split('?').next().unwrap_or(location);
        let operation_id = path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(path)
            .to_string();
        Self {
            operation_id,
            status_url: location.to_string(),
        }
    }
}

/// Status reported by one query
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    /// Not finished yet
    Running,
    /// Finished; carries the full status body
    Succeeded(Value),
    /// Finished with an error reported by the service
    Failed(String),
}

/// Terminal outcome of one poll sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum PollResult {
    /// The job succeeded; payload of the final query
    Succeeded(Value),
    /// The job failed remotely
    Failed(String),
    /// Attempts exhausted while the job was still unfinished (or unreachable).
    /// The remote job may still be running.
    TimedOut(u32),
}

impl PollResult {
    pub fn is_success(&self) -> bool {
        matches!(self, PollResult::Succeeded(_))
    }

    /// Payload of a succeeded result
    pub fn payload(&self) -> Option<&Value> {
        match self {
            PollResult::Succeeded(payload) => Some(payload),
            _ => None,
        }
    }

    /// Short description for reports
    pub fn describe(&self) -> String {
        match self {
            PollResult::Succeeded(_) => "succeeded".to_string(),
            PollResult::Failed(reason) => format!("failed: {}", reason),
            PollResult::TimedOut(attempts) => format!("timed out after {} attempts", attempts),
        }
    }
}

/// Submission errors; fatal for one sequence and never retried
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("submission rejected (HTTP {status}): {message}")]
    Rejected {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("transport error during submission: {0}")]
    Transport(#[from] TransportError),

    #[error("invalid submission response: {0}")]
    InvalidResponse(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SubmitError {
    /// Service error code, when the service rejected the submission
    pub fn service_code(&self) -> Option<&str> {
        match self {
            SubmitError::Rejected { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// Errors of a single status query; tolerated by the poller
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("status query failed (HTTP {status}): {message}")]
    Http { status: u16, message: String },

    #[error("invalid status response: {0}")]
    InvalidResponse(String),
}

/// Errors that end a poll sequence without a [`PollResult`]
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("{0}")]
    Submission(#[from] SubmitError),

    #[error("polling of {} cancelled after {attempts} attempts", handle.operation_id)]
    Cancelled { handle: JobHandle, attempts: u32 },
}

/// Caller-supplied submit and status operations for one job
pub trait JobBackend {
    /// Submit the job
    fn submit(&self) -> Result<JobHandle, SubmitError>;

    /// Query the status of a submitted job
    fn query(&self, handle: &JobHandle) -> Result<JobStatus, QueryError>;
}

/// Blocking wait between queries
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Records requested waits without sleeping
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits requested so far, in order
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut waits) = self.waits.lock() {
            waits.push(duration);
        }
    }
}

impl<S: Sleeper + ?Sized> Sleeper for &S {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

impl<S: Sleeper + ?Sized> Sleeper for Arc<S> {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Submit-then-poll driver
#[derive(Debug)]
pub struct AsyncJobPoller<S: Sleeper = ThreadSleeper> {
    policy: RetryPolicy,
    sleeper: S,
    cancel: Option<Arc<AtomicBool>>,
}

impl AsyncJobPoller<ThreadSleeper> {
    /// Poller that blocks the current thread between queries
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_sleeper(policy, ThreadSleeper)
    }
}

impl<S: Sleeper> AsyncJobPoller<S> {
    /// Poller with a custom sleeper
    pub fn with_sleeper(policy: RetryPolicy, sleeper: S) -> Self {
        Self {
            policy,
            sleeper,
            cancel: None,
        }
    }

    /// Abandon the sequence at the next attempt boundary once `flag` is set
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Submit once, then poll to a terminal result
    pub fn run<B: JobBackend + ?Sized>(&self, backend: &B) -> Result<PollResult, PollError> {
        self.run_with_handle(backend).map(|(_, result)| result)
    }

    /// Like [`run`](Self::run), also returning the handle so a timed-out job
    /// can be reported and resumed
    pub fn run_with_handle<B: JobBackend + ?Sized>(
        &self,
        backend: &B,
    ) -> Result<(JobHandle, PollResult), PollError> {
        let handle = backend.submit().map_err(|e| {
            warn!(error = %e, "job submission failed");
            e
        })?;
        info!(operation_id = %handle.operation_id, "job submitted");
        let result = self.poll(backend, &handle)?;
        Ok((handle, result))
    }

    /// Poll an already submitted job to a terminal result
    pub fn poll<B: JobBackend + ?Sized>(
        &self,
        backend: &B,
        handle: &JobHandle,
    ) -> Result<PollResult, PollError> {
        let mut wait = self.policy.initial_wait;
        let mut attempts = 0u32;

        while attempts < self.policy.max_attempts {
            if self.is_cancelled() {
                info!(operation_id = %handle.operation_id, attempts, "polling cancelled");
                return Err(PollError::Cancelled {
                    handle: handle.clone(),
                    attempts,
                });
            }

            match backend.query(handle) {
                Ok(JobStatus::Succeeded(payload)) => {
                    info!(operation_id = %handle.operation_id, attempts = attempts + 1, "job succeeded");
                    return Ok(PollResult::Succeeded(payload));
                }
                Ok(JobStatus::Failed(reason)) => {
                    warn!(operation_id = %handle.operation_id, reason = %reason, "job failed");
                    return Ok(PollResult::Failed(reason));
                }
                Ok(JobStatus::Running) => {
                    debug!(
                        operation_id = %handle.operation_id,
                        attempt = attempts + 1,
                        wait_secs = wait.as_secs(),
                        "job still running"
                    );
                }
                Err(e) => {
                    warn!(
                        operation_id = %handle.operation_id,
                        error = %e,
                        attempt = attempts + 1,
                        max_attempts = self.policy.max_attempts,
                        "status query failed"
                    );
                }
            }

            self.sleeper.sleep(wait);
            attempts += 1;
            wait = self.policy.next_wait(wait);
        }

        warn!(
            operation_id = %handle.operation_id,
            attempts,
            waited_secs = self.policy.total_wait_budget().as_secs(),
            "job did not finish before attempts ran out"
        );
        Ok(PollResult::TimedOut(attempts))
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}
