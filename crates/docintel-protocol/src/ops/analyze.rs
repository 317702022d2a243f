//! Analyze and classify operation types.
//!
//! Layout analysis and classification share the same result shape; a
//! classifier fills `documents` with one entry per detected document.

use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::operation::OperationState;

/// Status body of an analyze/classify operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeOperation {
    /// Current state.
    pub status: OperationState,
    /// Result, present once the state is `succeeded`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyze_result: Option<AnalyzeResult>,
    /// Error details, present when the state is `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

/// Analyze result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResult {
    /// API version that produced the result.
    #[serde(default)]
    pub api_version: Option<String>,
    /// Model or classifier id.
    #[serde(default)]
    pub model_id: Option<String>,
    /// Concatenated text content.
    #[serde(default)]
    pub content: Option<String>,
    /// Analyzed pages.
    #[serde(default)]
    pub pages: Vec<DocumentPage>,
    /// Documents detected by a classifier or custom model.
    #[serde(default)]
    pub documents: Vec<AnalyzedDocument>,
}

/// One analyzed page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPage {
    /// 1-based page number.
    pub page_number: u32,
    /// Page width in `unit`.
    #[serde(default)]
    pub width: Option<f64>,
    /// Page height in `unit`.
    #[serde(default)]
    pub height: Option<f64>,
    /// Unit of width/height (`pixel` or `inch`).
    #[serde(default)]
    pub unit: Option<String>,
}

/// A detected document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedDocument {
    /// Document type (the classifier category).
    #[serde(default)]
    pub doc_type: Option<String>,
    /// Confidence in [0, 1].
    #[serde(default)]
    pub confidence: f64,
    /// Regions where the document was found.
    #[serde(default)]
    pub bounding_regions: Vec<BoundingRegion>,
}

impl AnalyzedDocument {
    /// Page numbers covered by this document, in order.
    pub fn page_numbers(&self) -> Vec<u32> {
        self.bounding_regions.iter().map(|r| r.page_number).collect()
    }
}

/// Page region of a detected document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingRegion {
    /// 1-based page number.
    pub page_number: u32,
    /// Polygon coordinates.
    #[serde(default)]
    pub polygon: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_classification_result() {
        let op: AnalyzeOperation = serde_json::from_value(json!({
            "status": "succeeded",
            "analyzeResult": {
                "apiVersion": "2024-02-29-preview",
                "modelId": "my-classifier",
                "documents": [
                    {
                        "docType": "W9",
                        "confidence": 0.93,
                        "boundingRegions": [
                            {"pageNumber": 1, "polygon": [0, 0, 8.5, 0, 8.5, 11, 0, 11]},
                            {"pageNumber": 2, "polygon": []}
                        ]
                    }
                ]
            }
        }))
        .unwrap();

        assert_eq!(op.status, OperationState::Succeeded);
        let result = op.analyze_result.unwrap();
        assert_eq!(result.documents.len(), 1);
        assert_eq!(result.documents[0].doc_type.as_deref(), Some("W9"));
        assert_eq!(result.documents[0].page_numbers(), vec![1, 2]);
    }

    #[test]
    fn test_missing_result_fields_default() {
        let op: AnalyzeOperation = serde_json::from_value(json!({
            "status": "succeeded",
            "analyzeResult": {}
        }))
        .unwrap();
        let result = op.analyze_result.unwrap();
        assert!(result.documents.is_empty());
        assert!(result.pages.is_empty());
    }
}
