//! Reports of the classifier workflows (build, classify, list)

use std::fmt;

use chrono::{DateTime, Utc};
use docintel_protocol::ops::DocumentClassifierDetails;
use serde::{Deserialize, Serialize};

use super::failure::{ExitCode, ExitCodeAggregator, Status};

/// Result of a classifier build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    pub created_at: DateTime<Utc>,
    pub classifier_id: String,
    /// Document types submitted for training
    pub doc_types: Vec<String>,
    pub status: Status,
    /// Classifier as reported by the service after a successful build
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<DocumentClassifierDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    pub exit_code: i32,
}

impl BuildReport {
    pub fn new(classifier_id: impl Into<String>, doc_types: Vec<String>, status: Status) -> Self {
        Self {
            created_at: Utc::now(),
            classifier_id: classifier_id.into(),
            doc_types,
            status,
            details: None,
            detail: None,
            operation_id: None,
            exit_code: ExitCode::from(status).as_i32(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Classifier ID: {}", self.classifier_id)?;
        match (&self.status, &self.details) {
            (Status::Success, Some(details)) => {
                writeln!(
                    f,
                    "API version used to build the classifier: {}",
                    details.api_version.as_deref().unwrap_or("unknown")
                )?;
                writeln!(
                    f,
                    "Classifier description: {}",
                    details.description.as_deref().unwrap_or("")
                )?;
                writeln!(f, "Document types used for training the classifier:")?;
                for doc_type in details.doc_types.keys() {
                    writeln!(f, "\t{}", doc_type)?;
                }
                Ok(())
            }
            (Status::TimedOut, _) => writeln!(
                f,
                "Build still running (operation {}); check again later",
                self.operation_id.as_deref().unwrap_or("unknown")
            ),
            (status, _) => writeln!(
                f,
                "Build {}: {}",
                match status {
                    Status::Cancelled => "cancelled",
                    Status::Rejected => "rejected",
                    _ => "failed",
                },
                self.detail.as_deref().unwrap_or("no details")
            ),
        }
    }
}

/// A document found by the classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedDocument {
    pub doc_type: String,
    pub confidence: f64,
    pub pages: Vec<u32>,
}

/// Classification outcome of one input file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentClassification {
    pub path: String,
    pub status: Status,
    pub documents: Vec<DetectedDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
}

/// Result of a classification batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyReport {
    pub created_at: DateTime<Utc>,
    pub classifier_id: String,
    pub outcomes: Vec<DocumentClassification>,
    pub exit_code: i32,
}

impl ClassifyReport {
    pub fn new(classifier_id: impl Into<String>) -> Self {
        Self {
            created_at: Utc::now(),
            classifier_id: classifier_id.into(),
            outcomes: Vec::new(),
            exit_code: ExitCode::Success.as_i32(),
        }
    }

    pub fn finish(mut self) -> Self {
        let mut agg = ExitCodeAggregator::new();
        for outcome in &self.outcomes {
            agg.add(outcome.status);
        }
        self.exit_code = agg.exit_code().as_i32();
        self
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for ClassifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Classifier: {}", self.classifier_id)?;
        for outcome in &self.outcomes {
            writeln!(f, "{}", outcome.path)?;
            match outcome.status {
                Status::Success if outcome.documents.is_empty() => {
                    writeln!(f, "\tno documents found")?;
                }
                Status::Success => {
                    for doc in &outcome.documents {
                        let pages: Vec<String> = doc.pages.iter().map(u32::to_string).collect();
                        writeln!(
                            f,
                            "\tFound document of type '{}' with confidence {:.2} on page(s) {}",
                            doc.doc_type,
                            doc.confidence,
                            pages.join(", ")
                        )?;
                    }
                }
                Status::TimedOut => writeln!(
                    f,
                    "\tstill running (operation {})",
                    outcome.operation_id.as_deref().unwrap_or("unknown")
                )?,
                _ => writeln!(
                    f,
                    "\tclassification failed: {}",
                    outcome.detail.as_deref().unwrap_or("no details")
                )?,
            }
        }
        Ok(())
    }
}

/// Listing of the classifiers of a resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierListing {
    pub classifiers: Vec<DocumentClassifierDetails>,
}

impl fmt::Display for ClassifierListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.classifiers.is_empty() {
            return writeln!(f, "No classifiers found.");
        }
        writeln!(f, "Classifiers (ID | description):")?;
        for classifier in &self.classifiers {
            writeln!(
                f,
                "{} | {}",
                classifier.classifier_id,
                classifier.description.as_deref().unwrap_or("")
            )?;
        }
        Ok(())
    }
}
