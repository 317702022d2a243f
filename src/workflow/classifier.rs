//! Classifier training and listing

use std::collections::{BTreeMap, BTreeSet};

use docintel_protocol::ops::{BuildClassifierRequest, ClassifierDocTypeDetails, DocumentClassifierDetails};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::{BlobStore, BuildClassifierJob, ContainerRef, DocumentIntelligenceClient};
use crate::manifest::MANIFEST_EXTENSION;
use crate::poller::{AsyncJobPoller, PollError, PollResult, Sleeper};
use crate::summary::{BuildReport, ClassifierListing, Status};

use super::{WorkflowError, WorkflowResult};

/// Where each document type's training files are listed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DocTypeSource {
    /// One `<DocType>.jsonl` file list per type at the container root
    #[default]
    FileList,
    /// Every blob under `<DocType>/`
    Prefix,
}

/// Options of a classifier build
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Classifier id; a random UUID when absent
    pub classifier_id: Option<String>,
    pub description: Option<String>,
    pub base_classifier_id: Option<String>,
    pub source: DocTypeSource,
}

/// Derive the document types from the container and train a classifier
///
/// A rejected submission is returned as an error; a failed, timed-out or
/// cancelled build is reported with its status.
pub fn build_classifier<S: Sleeper>(
    client: &DocumentIntelligenceClient,
    store: &dyn BlobStore,
    container: &ContainerRef,
    poller: &AsyncJobPoller<S>,
    options: &BuildOptions,
) -> WorkflowResult<BuildReport> {
    let blobs = store.list_blobs(None)?;
    let doc_types = doc_types_from(&blobs, container, options.source);
    if doc_types.is_empty() {
        return Err(WorkflowError::NoDocTypes {
            container: container.to_string(),
        });
    }

    let classifier_id = options
        .classifier_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let names: Vec<String> = doc_types.keys().cloned().collect();
    info!(
        classifier_id = %classifier_id,
        doc_types = ?names,
        source = ?options.source,
        "building classifier"
    );

    let request = BuildClassifierRequest {
        classifier_id: classifier_id.clone(),
        description: options.description.clone(),
        base_classifier_id: options.base_classifier_id.clone(),
        doc_types,
    };
    let job = BuildClassifierJob::new(client, request);

    let report = match poller.run_with_handle(&job) {
        Ok((handle, PollResult::Succeeded(payload))) => {
            let details = match build_result(&payload) {
                Some(details) => details,
                None => {
                    debug!(classifier_id = %classifier_id, "build result missing, fetching classifier");
                    client.get_classifier(&classifier_id)?
                }
            };
            let mut report = BuildReport::new(classifier_id, names, Status::Success);
            report.details = Some(details);
            report.operation_id = Some(handle.operation_id);
            report
        }
        Ok((handle, PollResult::Failed(reason))) => {
            let mut report = BuildReport::new(classifier_id, names, Status::Failed);
            report.detail = Some(reason);
            report.operation_id = Some(handle.operation_id);
            report
        }
        Ok((handle, PollResult::TimedOut(attempts))) => {
            warn!(operation_id = %handle.operation_id, attempts, "classifier build still running");
            let mut report = BuildReport::new(classifier_id, names, Status::TimedOut);
            report.detail = Some(format!("no result after {} attempts", attempts));
            report.operation_id = Some(handle.operation_id);
            report
        }
        Err(PollError::Cancelled { handle, attempts }) => {
            let mut report = BuildReport::new(classifier_id, names, Status::Cancelled);
            report.detail = Some(format!("cancelled after {} attempts", attempts));
            report.operation_id = Some(handle.operation_id);
            report
        }
        Err(PollError::Submission(e)) => return Err(e.into()),
    };

    Ok(report)
}

/// Document types found in a container listing, keyed by name
fn doc_types_from(
    blobs: &[String],
    container: &ContainerRef,
    source: DocTypeSource,
) -> BTreeMap<String, ClassifierDocTypeDetails> {
    match source {
        DocTypeSource::FileList => blobs
            .iter()
            .filter(|name| !name.contains('/'))
            .filter_map(|name| {
                let stem = name.strip_suffix(&format!(".{}", MANIFEST_EXTENSION))?;
                (!stem.is_empty()).then(|| {
                    (
                        stem.to_string(),
                        ClassifierDocTypeDetails::from_file_list(container.as_str(), name.as_str()),
                    )
                })
            })
            .collect(),
        DocTypeSource::Prefix => {
            let folders: BTreeSet<&str> = blobs
                .iter()
                .filter_map(|name| name.split_once('/').map(|(folder, _)| folder))
                .filter(|folder| !folder.is_empty())
                .collect();
            folders
                .into_iter()
                .map(|folder| {
                    (
                        folder.to_string(),
                        ClassifierDocTypeDetails::from_prefix(container.as_str(), format!("{}/", folder)),
                    )
                })
                .collect()
        }
    }
}

/// Classifier details carried in the `result` of a finished build operation
fn build_result(payload: &Value) -> Option<DocumentClassifierDetails> {
    let result = payload.get("result")?;
    serde_json::from_value(result.clone()).ok()
}

/// List every classifier of the resource
pub fn list_classifiers(client: &DocumentIntelligenceClient) -> WorkflowResult<ClassifierListing> {
    let classifiers = client.list_classifiers()?;
    info!(count = classifiers.len(), "classifiers listed");
    Ok(ClassifierListing { classifiers })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{AzureBlobStore, MemoryBlobStore};
    use crate::mock::{FailureConfig, MockRoute, MockService, MockTransport};
    use crate::poller::{RecordingSleeper, RetryPolicy};
    use crate::summary::ExitCode;
    use docintel_protocol::OperationState;
    use serde_json::json;
    use std::sync::Arc;

    const SAS_URL: &str = "https://acct.blob.core.windows.net/training?sv=2022-11-02&sig=secret";

    fn container() -> ContainerRef {
        ContainerRef::parse(SAS_URL).unwrap()
    }

    fn client(service: &MockService) -> DocumentIntelligenceClient {
        let transport = Arc::new(MockTransport::with_service(service.clone()));
        DocumentIntelligenceClient::new(transport, "https://docintel.example.com", "key").unwrap()
    }

    fn training_store() -> MemoryBlobStore {
        let store = MemoryBlobStore::existing();
        for name in [
            "IDCards.jsonl",
            "IDCards/a.pdf",
            "IDCards/a.pdf.ocr.json",
            "Invoices.jsonl",
            "Invoices/i.pdf",
            "Receipts/r.png",
        ] {
            store.upload_blob(name, b"x").unwrap();
        }
        store
    }

    #[test]
    fn test_doc_types_from_file_lists() {
        let blobs: Vec<String> = training_store().names();
        let doc_types = doc_types_from(&blobs, &container(), DocTypeSource::FileList);

        assert_eq!(doc_types.keys().collect::<Vec<_>>(), vec!["IDCards", "Invoices"]);
        let source = doc_types["IDCards"].azure_blob_file_list_source.as_ref().unwrap();
        assert_eq!(source.file_list, "IDCards.jsonl");
        assert_eq!(source.container_url, SAS_URL);
    }

    #[test]
    fn test_doc_types_from_prefixes() {
        let blobs: Vec<String> = training_store().names();
        let doc_types = doc_types_from(&blobs, &container(), DocTypeSource::Prefix);

        assert_eq!(
            doc_types.keys().collect::<Vec<_>>(),
            vec!["IDCards", "Invoices", "Receipts"]
        );
        let source = doc_types["Receipts"].azure_blob_source.as_ref().unwrap();
        assert_eq!(source.prefix.as_deref(), Some("Receipts/"));
    }

    #[test]
    fn test_build_with_generated_id() {
        let service = MockService::new();
        service.set_progression(vec![OperationState::Running, OperationState::Succeeded]);
        let sleeper = RecordingSleeper::new();
        let poller = AsyncJobPoller::with_sleeper(RetryPolicy::default(), &sleeper);
        let options = BuildOptions {
            description: Some("ID cards and invoices".to_string()),
            ..BuildOptions::default()
        };

        let report = build_classifier(
            &client(&service),
            &training_store(),
            &container(),
            &poller,
            &options,
        )
        .unwrap();

        assert_eq!(report.status, Status::Success);
        assert_eq!(report.exit_code, 0);
        assert!(Uuid::parse_str(&report.classifier_id).is_ok());
        assert_eq!(report.doc_types, vec!["IDCards", "Invoices"]);
        let details = report.details.as_ref().unwrap();
        assert_eq!(details.description.as_deref(), Some("ID cards and invoices"));
        assert!(service.classifier(&report.classifier_id).is_some());
        assert_eq!(sleeper.waits().len(), 1);

        let rendered = report.to_string();
        assert!(rendered.contains("Classifier ID"));
        assert!(rendered.contains("\tInvoices"));
    }

    #[test]
    fn test_build_against_mock_container() {
        let service = MockService::new();
        service.create_container();
        service.put_blob("Forms.jsonl", b"{}");
        service.put_blob("Letters.jsonl", b"{}");
        let transport = Arc::new(MockTransport::with_service(service.clone()));
        let store = AzureBlobStore::new(transport, container());
        let sleeper = RecordingSleeper::new();
        let poller = AsyncJobPoller::with_sleeper(RetryPolicy::default(), &sleeper);
        let options = BuildOptions {
            classifier_id: Some("forms-v1".to_string()),
            ..BuildOptions::default()
        };

        let report =
            build_classifier(&client(&service), &store, &container(), &poller, &options).unwrap();

        assert_eq!(report.classifier_id, "forms-v1");
        let stored = service.classifier("forms-v1").unwrap();
        assert_eq!(
            stored["docTypes"]["Letters"]["azureBlobFileListSource"]["fileList"],
            json!("Letters.jsonl")
        );
    }

    #[test]
    fn test_empty_container_has_no_doc_types() {
        let service = MockService::new();
        let sleeper = RecordingSleeper::new();
        let poller = AsyncJobPoller::with_sleeper(RetryPolicy::default(), &sleeper);

        let err = build_classifier(
            &client(&service),
            &MemoryBlobStore::existing(),
            &container(),
            &poller,
            &BuildOptions::default(),
        )
        .unwrap_err();

        assert!(matches!(err, WorkflowError::NoDocTypes { .. }));
        assert!(!err.to_string().contains("secret"));
        assert!(service.requests().is_empty());
    }

    #[test]
    fn test_rejected_build_is_an_error() {
        let service = MockService::new();
        service.add_classifier(json!({"classifierId": "taken", "docTypes": {}}));
        let sleeper = RecordingSleeper::new();
        let poller = AsyncJobPoller::with_sleeper(RetryPolicy::default(), &sleeper);
        let options = BuildOptions {
            classifier_id: Some("taken".to_string()),
            ..BuildOptions::default()
        };

        let err = build_classifier(&client(&service), &training_store(), &container(), &poller, &options)
            .unwrap_err();

        assert_eq!(err.exit_code(), ExitCode::Submission);
        assert!(err.to_string().contains("ModelExists"));
        assert!(sleeper.waits().is_empty());
    }

    #[test]
    fn test_build_timeout_keeps_operation_id() {
        let service = MockService::new();
        service.set_progression(vec![OperationState::Running]);
        let sleeper = RecordingSleeper::new();
        let policy = RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::default()
        };
        let poller = AsyncJobPoller::with_sleeper(policy, &sleeper);

        let report = build_classifier(
            &client(&service),
            &training_store(),
            &container(),
            &poller,
            &BuildOptions::default(),
        )
        .unwrap();

        assert_eq!(report.status, Status::TimedOut);
        assert_eq!(report.exit_code, ExitCode::TimedOut.as_i32());
        assert_eq!(report.operation_id.as_deref(), Some("op-000001"));
    }

    #[test]
    fn test_list_classifiers_follows_pages() {
        let service = MockService::new().with_page_size(2);
        for id in ["a", "b", "c"] {
            service.add_classifier(json!({"classifierId": id, "description": format!("{} desc", id)}));
        }

        let listing = list_classifiers(&client(&service)).unwrap();

        assert_eq!(listing.classifiers.len(), 3);
        assert!(listing.to_string().contains("c | c desc"));
    }

    #[test]
    fn test_list_classifiers_unauthorized() {
        let service = MockService::new();
        service.inject_failure(
            MockRoute::ListClassifiers,
            FailureConfig::error(401, "401", "Access denied due to invalid subscription key."),
        );

        let err = list_classifiers(&client(&service)).unwrap_err();
        assert!(matches!(err, WorkflowError::Client(_)));
        assert_eq!(err.exit_code(), ExitCode::Transport);
    }
}
