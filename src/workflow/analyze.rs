//! Layout analysis of the training corpus

use std::fs;
use std::path::Path;

use docintel_protocol::LAYOUT_MODEL_ID;
use serde_json::Value;
use tracing::{info, warn};

use crate::client::{AnalyzeJob, DocumentIntelligenceClient};
use crate::manifest::{FileEntry, ManifestBuilder, SIDECAR_SUFFIX};
use crate::poller::{AsyncJobPoller, PollError, PollResult, Sleeper, SubmitError};
use crate::summary::{AnalyzeReport, DocumentOutcome, RejectedFile, Status};

use super::WorkflowResult;

/// Options of a layout-analysis run
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub model_id: String,
    /// Leave documents alone whose sidecar already exists
    pub skip_existing: bool,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            model_id: LAYOUT_MODEL_ID.to_string(),
            skip_existing: false,
        }
    }
}

/// Analyze every eligible file of every category and write its sidecar
///
/// Category thresholds do not apply here: a small category still gets its
/// layout. Files rejected locally, rejected on submission, or whose job
/// failed are listed as incompatible. A cancelled poll stops the batch.
pub fn analyze_layout<S: Sleeper>(
    builder: &ManifestBuilder,
    client: &DocumentIntelligenceClient,
    poller: &AsyncJobPoller<S>,
    options: &AnalyzeOptions,
) -> WorkflowResult<AnalyzeReport> {
    let scan = builder.scan()?;
    let mut report = AnalyzeReport::new(options.model_id.clone());
    report.incompatible = scan.rejected.iter().map(RejectedFile::from).collect();
    report.unreadable = scan.unreadable.clone();

    for entry in scan.eligible() {
        let path = entry.path_under(builder.root());
        let sidecar = format!("{}{}", entry.relative_path, SIDECAR_SUFFIX);
        let sidecar_path = builder.root().join(&sidecar);

        if options.skip_existing && sidecar_path.is_file() {
            info!(path = %entry.relative_path, "sidecar exists, skipping");
            report.skipped.push(entry.relative_path.clone());
            continue;
        }

        info!(path = %entry.relative_path, model_id = %options.model_id, "analyzing layout");
        let job = AnalyzeJob::new(client, options.model_id.as_str(), path);
        let outcome = match poller.run_with_handle(&job) {
            Ok((handle, PollResult::Succeeded(payload))) => {
                match write_sidecar(&sidecar_path, &payload) {
                    Ok(()) => document_outcome(entry, Status::Success, Some(handle.operation_id))
                        .with_output(sidecar),
                    Err(e) => {
                        warn!(path = %sidecar_path.display(), error = %e, "failed to write sidecar");
                        document_outcome(entry, Status::Failed, Some(handle.operation_id))
                            .with_detail(format!("cannot write {}: {}", sidecar, e))
                    }
                }
            }
            Ok((handle, PollResult::Failed(reason))) => {
                report
                    .incompatible
                    .push(RejectedFile::new(entry.relative_path.clone(), reason.clone()));
                document_outcome(entry, Status::Failed, Some(handle.operation_id)).with_detail(reason)
            }
            Ok((handle, PollResult::TimedOut(attempts))) => {
                document_outcome(entry, Status::TimedOut, Some(handle.operation_id))
                    .with_detail(format!("no result after {} attempts", attempts))
            }
            Err(PollError::Submission(e @ SubmitError::Rejected { .. })) => {
                report
                    .incompatible
                    .push(RejectedFile::new(entry.relative_path.clone(), e.to_string()));
                document_outcome(entry, Status::Rejected, None).with_detail(e.to_string())
            }
            Err(PollError::Submission(e)) => {
                document_outcome(entry, Status::Failed, None).with_detail(e.to_string())
            }
            Err(PollError::Cancelled { handle, .. }) => {
                report.outcomes.push(
                    document_outcome(entry, Status::Cancelled, Some(handle.operation_id))
                        .with_detail("cancelled".to_string()),
                );
                warn!("layout analysis cancelled, remaining documents not submitted");
                break;
            }
        };
        report.outcomes.push(outcome);
    }

    let report = report.finish();
    info!(
        analyzed = report.outcomes.len(),
        succeeded = report.count(Status::Success),
        incompatible = report.incompatible.len(),
        "layout analysis finished"
    );
    Ok(report)
}

fn document_outcome(entry: &FileEntry, status: Status, operation_id: Option<String>) -> DocumentOutcome {
    DocumentOutcome {
        path: entry.relative_path.clone(),
        status,
        output: None,
        detail: None,
        operation_id,
    }
}

trait OutcomeExt {
    fn with_output(self, output: String) -> Self;
    fn with_detail(self, detail: String) -> Self;
}

impl OutcomeExt for DocumentOutcome {
    fn with_output(mut self, output: String) -> Self {
        self.output = Some(output);
        self
    }

    fn with_detail(mut self, detail: String) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// Write the `analyzeResult` of a finished operation, or the whole body when absent
fn write_sidecar(path: &Path, payload: &Value) -> std::io::Result<()> {
    let result = payload.get("analyzeResult").unwrap_or(payload);
    let json = serde_json::to_string_pretty(result)?;
    fs::write(path, json)
}
