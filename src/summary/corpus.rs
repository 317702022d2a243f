//! Reports of the corpus workflows (upload, layout analysis)

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::manifest::FileEntry;

use super::failure::{ExitCode, ExitCodeAggregator, Status};

/// Where to read about supported inputs
pub const INPUT_REQUIREMENTS_URL: &str = "https://learn.microsoft.com/en-us/azure/ai-services/document-intelligence/concept-custom-classifier?view=doc-intel-4.0.0#input-requirements";

/// A file left out of the corpus, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedFile {
    pub path: String,
    pub reason: String,
}

impl RejectedFile {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<&FileEntry> for RejectedFile {
    fn from(entry: &FileEntry) -> Self {
        Self::new(entry.relative_path.clone(), entry.eligibility.reason())
    }
}

/// End-of-run listing of every rejected file
pub fn write_rejections(f: &mut fmt::Formatter<'_>, rejected: &[RejectedFile]) -> fmt::Result {
    if rejected.is_empty() {
        return Ok(());
    }
    writeln!(
        f,
        "The following files were skipped as they are corrupted or the format is unsupported:"
    )?;
    for file in rejected {
        writeln!(f, "\t{} ({})", file.path, file.reason)?;
    }
    writeln!(
        f,
        "See {} for supported file types and sizes.",
        INPUT_REQUIREMENTS_URL
    )
}

/// Category directories left out because they could not be listed
pub fn write_unreadable(f: &mut fmt::Formatter<'_>, unreadable: &[RejectedFile]) -> fmt::Result {
    if unreadable.is_empty() {
        return Ok(());
    }
    writeln!(f, "Unreadable categories (not scanned):")?;
    for category in unreadable {
        writeln!(f, "\t{} ({})", category.path, category.reason)?;
    }
    Ok(())
}

/// Uploaded files of one category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryUpload {
    pub category: String,
    pub files: usize,
    pub sidecars: usize,
    /// Blob name of the uploaded manifest
    pub manifest_blob: String,
}

/// A blob that could not be uploaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadFailure {
    pub blob: String,
    pub error: String,
}

/// Result of a corpus upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadReport {
    pub created_at: DateTime<Utc>,
    /// Container URL with the SAS token redacted
    pub container: String,
    /// Whether the container had to be created
    pub container_created: bool,
    pub categories: Vec<CategoryUpload>,
    pub rejected: Vec<RejectedFile>,
    pub below_threshold: Vec<String>,
    pub unreadable: Vec<RejectedFile>,
    pub failures: Vec<UploadFailure>,
    pub exit_code: i32,
}

impl UploadReport {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            created_at: Utc::now(),
            container: container.into(),
            container_created: false,
            categories: Vec::new(),
            rejected: Vec::new(),
            below_threshold: Vec::new(),
            unreadable: Vec::new(),
            failures: Vec::new(),
            exit_code: ExitCode::Success.as_i32(),
        }
    }

    /// Documents uploaded, sidecars and manifests excluded
    pub fn uploaded_files(&self) -> usize {
        self.categories.iter().map(|c| c.files).sum()
    }

    /// Set the exit code from the collected failures
    pub fn finish(mut self) -> Self {
        let code = if self.failures.is_empty() {
            ExitCode::Success
        } else {
            ExitCode::Storage
        };
        self.exit_code = code.as_i32();
        self
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for UploadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.container_created {
            writeln!(f, "Created container {}", self.container)?;
        }
        writeln!(
            f,
            "Uploaded {} files in {} categories to {}",
            self.uploaded_files(),
            self.categories.len(),
            self.container
        )?;
        for category in &self.categories {
            writeln!(
                f,
                "  {}: {} files, {} sidecars -> {}",
                category.category, category.files, category.sidecars, category.manifest_blob
            )?;
        }
        if !self.below_threshold.is_empty() {
            writeln!(
                f,
                "Categories with too few eligible files (not uploaded): {}",
                self.below_threshold.join(", ")
            )?;
        }
        write_unreadable(f, &self.unreadable)?;
        if !self.failures.is_empty() {
            writeln!(f, "Upload failures:")?;
            for failure in &self.failures {
                writeln!(f, "\t{}: {}", failure.blob, failure.error)?;
            }
        }
        write_rejections(f, &self.rejected)
    }
}

/// Layout analysis outcome of one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentOutcome {
    pub path: String,
    pub status: Status,
    /// Written sidecar, relative to the training root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Failure reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Operation id, kept so a timed-out job can be looked up later
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
}

/// Result of a layout-analysis batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeReport {
    pub created_at: DateTime<Utc>,
    pub model_id: String,
    pub outcomes: Vec<DocumentOutcome>,
    /// Documents skipped because a sidecar already existed
    pub skipped: Vec<String>,
    /// Files found incompatible, locally or by the service
    pub incompatible: Vec<RejectedFile>,
    pub unreadable: Vec<RejectedFile>,
    pub exit_code: i32,
}

impl AnalyzeReport {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            created_at: Utc::now(),
            model_id: model_id.into(),
            outcomes: Vec::new(),
            skipped: Vec::new(),
            incompatible: Vec::new(),
            unreadable: Vec::new(),
            exit_code: ExitCode::Success.as_i32(),
        }
    }

    pub fn count(&self, status: Status) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    /// Set the exit code from the outcomes
    ///
    /// Rejected documents are listed as incompatible and do not fail the run.
    pub fn finish(mut self) -> Self {
        let mut agg = ExitCodeAggregator::new();
        for outcome in &self.outcomes {
            if outcome.status != Status::Rejected {
                agg.add(outcome.status);
            }
        }
        self.exit_code = agg.exit_code().as_i32();
        self
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for AnalyzeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Analyzed {} documents with {}: {} succeeded, {} failed, {} timed out",
            self.outcomes.len(),
            self.model_id,
            self.count(Status::Success),
            self.count(Status::Failed) + self.count(Status::Rejected),
            self.count(Status::TimedOut)
        )?;
        if !self.skipped.is_empty() {
            writeln!(f, "Skipped {} documents with an existing sidecar", self.skipped.len())?;
        }
        for outcome in &self.outcomes {
            match (outcome.status, &outcome.operation_id) {
                (Status::TimedOut, Some(id)) => {
                    writeln!(f, "\t{}: still running (operation {})", outcome.path, id)?
                }
                (Status::Cancelled, _) => writeln!(f, "\t{}: cancelled", outcome.path)?,
                _ => {}
            }
        }
        write_unreadable(f, &self.unreadable)?;
        write_rejections(f, &self.incompatible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Eligibility;

    #[test]
    fn test_rejected_from_entry() {
        let entry = FileEntry {
            relative_path: "IDCards/setup.exe".to_string(),
            category: "IDCards".to_string(),
            eligibility: Eligibility::IncompatibleType,
        };
        let rejected = RejectedFile::from(&entry);
        assert_eq!(rejected.reason, "unsupported file type");
    }

    #[test]
    fn test_upload_report_render() {
        let mut report = UploadReport::new("https://acct/training?[REDACTED]");
        report.categories.push(CategoryUpload {
            category: "IDCards".to_string(),
            files: 6,
            sidecars: 1,
            manifest_blob: "IDCards.jsonl".to_string(),
        });
        report.below_threshold.push("Invoices".to_string());
        report
            .rejected
            .push(RejectedFile::new("IDCards/setup.exe", "unsupported file type"));
        let report = report.finish();

        let text = report.to_string();
        assert!(text.contains("Uploaded 6 files in 1 categories"));
        assert!(text.contains("IDCards: 6 files, 1 sidecars -> IDCards.jsonl"));
        assert!(text.contains("(not uploaded): Invoices"));
        assert!(text.contains("\tIDCards/setup.exe (unsupported file type)"));
        assert!(!text.contains("Unreadable"));
        assert!(text.contains(INPUT_REQUIREMENTS_URL));
        assert_eq!(report.exit_code, 0);
    }

    #[test]
    fn test_upload_failures_set_storage_exit_code() {
        let mut report = UploadReport::new("c");
        report.failures.push(UploadFailure {
            blob: "a.pdf".to_string(),
            error: "HTTP 500".to_string(),
        });
        assert_eq!(report.finish().exit_code, ExitCode::Storage.as_i32());
    }

    #[test]
    fn test_analyze_report_exit_code_ignores_rejections() {
        let mut report = AnalyzeReport::new("prebuilt-layout");
        report.outcomes.push(DocumentOutcome {
            path: "a.pdf".to_string(),
            status: Status::Success,
            output: Some("a.pdf.ocr.json".to_string()),
            detail: None,
            operation_id: None,
        });
        report.outcomes.push(DocumentOutcome {
            path: "b.png".to_string(),
            status: Status::Rejected,
            output: None,
            detail: Some("InvalidContent".to_string()),
            operation_id: None,
        });
        let report = report.finish();
        assert_eq!(report.exit_code, 0);

        let json = report.to_json().unwrap();
        assert!(json.contains("\"status\": \"rejected\""));
    }

    #[test]
    fn test_analyze_report_lists_timed_out_operations() {
        let mut report = AnalyzeReport::new("prebuilt-layout");
        report.outcomes.push(DocumentOutcome {
            path: "slow.pdf".to_string(),
            status: Status::TimedOut,
            output: None,
            detail: None,
            operation_id: Some("op-9".to_string()),
        });
        let report = report.finish();
        assert_eq!(report.exit_code, ExitCode::TimedOut.as_i32());
        assert!(report.to_string().contains("slow.pdf: still running (operation op-9)"));
    }
}
