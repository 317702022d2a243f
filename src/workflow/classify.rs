//! Classification of test documents

use std::path::{Path, PathBuf};

use docintel_protocol::ops::AnalyzeOperation;
use serde_json::Value;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::client::{ClassifyJob, DocumentIntelligenceClient};
use crate::manifest::ManifestError;
use crate::poller::{AsyncJobPoller, PollError, PollResult, Sleeper, SubmitError};
use crate::summary::{ClassifyReport, DetectedDocument, DocumentClassification, Status};

use super::WorkflowResult;

/// Classify every regular file directly inside `dir`
///
/// Files are visited in byte-wise name order; hidden files are skipped. An
/// unknown classifier (404 on submission) ends the run, other rejections and
/// entries that cannot be read are reported per file.
pub fn classify_documents<S: Sleeper>(
    dir: &Path,
    client: &DocumentIntelligenceClient,
    poller: &AsyncJobPoller<S>,
    classifier_id: &str,
) -> WorkflowResult<ClassifyReport> {
    let listing = list_documents(dir)?;
    let mut report = ClassifyReport::new(classifier_id);
    info!(classifier_id = %classifier_id, files = listing.len(), "classifying documents");

    for listed in listing {
        let path = match listed {
            Listed::File(path) => path,
            Listed::Unreadable { name, reason } => {
                report.outcomes.push(classification(
                    name,
                    Status::Failed,
                    None,
                    Vec::new(),
                    Some(format!("unreadable: {}", reason)),
                ));
                continue;
            }
        };
        let name = file_name(&path);
        let job = ClassifyJob::new(client, classifier_id, path);

        let outcome = match poller.run_with_handle(&job) {
            Ok((handle, PollResult::Succeeded(payload))) => match detected_documents(&payload) {
                Ok(documents) => {
                    info!(path = %name, documents = documents.len(), "classified");
                    classification(name, Status::Success, Some(handle.operation_id), documents, None)
                }
                Err(e) => classification(
                    name,
                    Status::Failed,
                    Some(handle.operation_id),
                    Vec::new(),
                    Some(format!("unreadable result: {}", e)),
                ),
            },
            Ok((handle, PollResult::Failed(reason))) => {
                classification(name, Status::Failed, Some(handle.operation_id), Vec::new(), Some(reason))
            }
            Ok((handle, PollResult::TimedOut(attempts))) => classification(
                name,
                Status::TimedOut,
                Some(handle.operation_id),
                Vec::new(),
                Some(format!("no result after {} attempts", attempts)),
            ),
            Err(PollError::Submission(e @ SubmitError::Rejected { status: 404, .. })) => {
                return Err(e.into());
            }
            Err(PollError::Submission(e @ SubmitError::Rejected { .. })) => {
                warn!(path = %name, error = %e, "document rejected");
                classification(name, Status::Rejected, None, Vec::new(), Some(e.to_string()))
            }
            Err(PollError::Submission(e)) => {
                classification(name, Status::Failed, None, Vec::new(), Some(e.to_string()))
            }
            Err(PollError::Cancelled { handle, .. }) => {
                report.outcomes.push(classification(
                    name,
                    Status::Cancelled,
                    Some(handle.operation_id),
                    Vec::new(),
                    Some("cancelled".to_string()),
                ));
                warn!("classification cancelled, remaining documents not submitted");
                break;
            }
        };
        report.outcomes.push(outcome);
    }

    Ok(report.finish())
}

/// One entry of the testing directory
enum Listed {
    File(PathBuf),
    Unreadable { name: String, reason: String },
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Only an unreadable `dir` is fatal; a broken entry is listed as unreadable
fn list_documents(dir: &Path) -> Result<Vec<Listed>, ManifestError> {
    let traversal = |source| ManifestError::Traversal {
        path: dir.to_path_buf(),
        source,
    };
    if !std::fs::metadata(dir).map_err(traversal)?.is_dir() {
        return Err(traversal(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "not a directory",
        )));
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(traversal(e.into())),
            Err(e) => {
                let name = e.path().map(file_name).unwrap_or_default();
                warn!(path = %name, error = %e, "unreadable entry in testing directory");
                if !name.starts_with('.') {
                    let reason = e.io_error().map(|io| io.to_string()).unwrap_or_else(|| e.to_string());
                    files.push(Listed::Unreadable { name, reason });
                }
                continue;
            }
        };
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if entry.file_type().is_file() && !hidden {
            files.push(Listed::File(entry.into_path()));
        }
    }
    Ok(files)
}

fn classification(
    path: String,
    status: Status,
    operation_id: Option<String>,
    documents: Vec<DetectedDocument>,
    detail: Option<String>,
) -> DocumentClassification {
    DocumentClassification {
        path,
        status,
        documents,
        detail,
        operation_id,
    }
}

fn detected_documents(payload: &Value) -> Result<Vec<DetectedDocument>, serde_json::Error> {
    let operation: AnalyzeOperation = serde_json::from_value(payload.clone())?;
    Ok(operation
        .analyze_result
        .map(|result| result.documents)
        .unwrap_or_default()
        .into_iter()
        .map(|doc| DetectedDocument {
            pages: doc.page_numbers(),
            doc_type: doc.doc_type.unwrap_or_else(|| "unknown".to_string()),
            confidence: doc.confidence,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{FailureConfig, MockRoute, MockService, MockTransport};
    use crate::poller::{RecordingSleeper, RetryPolicy};
    use crate::summary::ExitCode;
    use crate::workflow::WorkflowError;
    use serde_json::json;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn client(service: &MockService) -> DocumentIntelligenceClient {
        let transport = Arc::new(MockTransport::with_service(service.clone()));
        DocumentIntelligenceClient::new(transport, "https://docintel.example.com", "key").unwrap()
    }

    fn service_with_classifier() -> MockService {
        let service = MockService::new();
        service.add_classifier(json!({
            "classifierId": "ids",
            "docTypes": {"IDCards": {}, "Invoices": {}}
        }));
        service
    }

    fn testing_dir() -> TempDir {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("b.pdf"), b"%PDF b").unwrap();
        fs::write(temp.path().join("a.pdf"), b"%PDF a").unwrap();
        fs::write(temp.path().join(".DS_Store"), b"junk").unwrap();
        fs::create_dir(temp.path().join("nested")).unwrap();
        temp
    }

    #[test]
    fn test_classifies_files_in_order() {
        let temp = testing_dir();
        let service = service_with_classifier();
        service.set_documents(vec![
            json!({"docType": "IDCards", "confidence": 0.91, "boundingRegions": [{"pageNumber": 1, "polygon": []}]}),
            json!({"docType": "Invoices", "confidence": 0.8, "boundingRegions": [
                {"pageNumber": 2, "polygon": []},
                {"pageNumber": 3, "polygon": []}
            ]}),
        ]);
        let sleeper = RecordingSleeper::new();
        let poller = AsyncJobPoller::with_sleeper(RetryPolicy::default(), &sleeper);

        let report = classify_documents(temp.path(), &client(&service), &poller, "ids").unwrap();

        let paths: Vec<&str> = report.outcomes.iter().map(|o| o.path.as_str()).collect();
        assert_eq!(paths, vec!["a.pdf", "b.pdf"]);
        assert_eq!(report.exit_code, 0);
        let documents = &report.outcomes[0].documents;
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[1].doc_type, "Invoices");
        assert_eq!(documents[1].pages, vec![2, 3]);

        let rendered = report.to_string();
        assert!(rendered.contains("Found document of type 'IDCards' with confidence 0.91 on page(s) 1"));
        assert!(rendered.contains("on page(s) 2, 3"));
    }

    #[test]
    fn test_unknown_classifier_is_fatal() {
        let temp = testing_dir();
        let service = MockService::new();
        let sleeper = RecordingSleeper::new();
        let poller = AsyncJobPoller::with_sleeper(RetryPolicy::default(), &sleeper);

        let err = classify_documents(temp.path(), &client(&service), &poller, "missing").unwrap_err();

        assert!(matches!(err, WorkflowError::Submission(_)));
        assert_eq!(err.exit_code(), ExitCode::Submission);
    }

    #[test]
    fn test_rejected_file_does_not_stop_batch() {
        let temp = testing_dir();
        let service = service_with_classifier();
        service.inject_failure(
            MockRoute::Classify,
            FailureConfig::error(400, "InvalidRequest", "Invalid request.")
                .with_inner("InvalidContent", "The file is corrupted or format is unsupported.")
                .with_fail_count(1),
        );
        let sleeper = RecordingSleeper::new();
        let poller = AsyncJobPoller::with_sleeper(RetryPolicy::default(), &sleeper);

        let report = classify_documents(temp.path(), &client(&service), &poller, "ids").unwrap();

        assert_eq!(report.outcomes[0].status, Status::Rejected);
        assert_eq!(report.outcomes[1].status, Status::Success);
        assert_eq!(report.exit_code, ExitCode::Submission.as_i32());
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_does_not_stop_batch() {
        let temp = testing_dir();
        std::os::unix::fs::symlink(temp.path().join("missing.pdf"), temp.path().join("broken.pdf"))
            .unwrap();
        let service = service_with_classifier();
        let poller = AsyncJobPoller::with_sleeper(RetryPolicy::default(), RecordingSleeper::new());

        let report = classify_documents(temp.path(), &client(&service), &poller, "ids").unwrap();

        let outcomes: Vec<(&str, Status)> = report
            .outcomes
            .iter()
            .map(|o| (o.path.as_str(), o.status))
            .collect();
        assert_eq!(
            outcomes,
            vec![
                ("a.pdf", Status::Success),
                ("b.pdf", Status::Success),
                ("broken.pdf", Status::Failed),
            ]
        );
        assert!(report.outcomes[2].detail.as_deref().unwrap().starts_with("unreadable"));
        assert_eq!(report.exit_code, ExitCode::JobFailed.as_i32());
    }

    #[test]
    fn test_missing_directory() {
        let temp = TempDir::new().unwrap();
        let service = service_with_classifier();
        let poller = AsyncJobPoller::with_sleeper(RetryPolicy::default(), RecordingSleeper::new());

        let err = classify_documents(&temp.path().join("absent"), &client(&service), &poller, "ids")
            .unwrap_err();
        assert_eq!(err.exit_code(), ExitCode::Traversal);
    }
}
