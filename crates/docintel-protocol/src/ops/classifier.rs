//! Classifier build and listing types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `documentClassifiers:build`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildClassifierRequest {
    /// Identifier of the classifier to create.
    pub classifier_id: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Classifier to extend, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_classifier_id: Option<String>,
    /// Training data per document type. Ordered for stable request bodies.
    pub doc_types: BTreeMap<String, ClassifierDocTypeDetails>,
}

/// Training data source for one document type.
///
/// Exactly one of the two sources is expected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierDocTypeDetails {
    /// Every blob under a prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_blob_source: Option<AzureBlobSource>,
    /// Blobs listed in a JSONL file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_blob_file_list_source: Option<AzureBlobFileListSource>,
}

impl ClassifierDocTypeDetails {
    /// Source from a JSONL file list in a container.
    pub fn from_file_list(container_url: impl Into<String>, file_list: impl Into<String>) -> Self {
        Self {
            azure_blob_source: None,
            azure_blob_file_list_source: Some(AzureBlobFileListSource {
                container_url: container_url.into(),
                file_list: file_list.into(),
            }),
        }
    }

    /// Source from a blob prefix in a container.
    pub fn from_prefix(container_url: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            azure_blob_source: Some(AzureBlobSource {
                container_url: container_url.into(),
                prefix: Some(prefix.into()),
            }),
            azure_blob_file_list_source: None,
        }
    }
}

/// Blob prefix source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureBlobSource {
    /// Container URL including SAS token.
    pub container_url: String,
    /// Blob name prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

/// JSONL file-list source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureBlobFileListSource {
    /// Container URL including SAS token.
    pub container_url: String,
    /// Blob name of the JSONL file list.
    pub file_list: String,
}

/// Result of a classifier build, and element of a classifier listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentClassifierDetails {
    /// Classifier identifier.
    pub classifier_id: String,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Creation time.
    #[serde(default)]
    pub created_date_time: Option<DateTime<Utc>>,
    /// Expiration time.
    #[serde(default)]
    pub expiration_date_time: Option<DateTime<Utc>>,
    /// API version used to build the classifier.
    #[serde(default)]
    pub api_version: Option<String>,
    /// Classifier this one was built on.
    #[serde(default)]
    pub base_classifier_id: Option<String>,
    /// Document types the classifier was trained on.
    #[serde(default)]
    pub doc_types: BTreeMap<String, ClassifierDocTypeDetails>,
}

/// Lightweight listing entry.
pub type ClassifierSummary = DocumentClassifierDetails;

/// One page of `GET documentClassifiers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierList {
    /// Classifiers on this page.
    #[serde(default)]
    pub value: Vec<ClassifierSummary>,
    /// Absolute URL of the next page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_link: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_request_wire_shape() {
        let mut doc_types = BTreeMap::new();
        doc_types.insert(
            "W9".to_string(),
            ClassifierDocTypeDetails::from_file_list("https://acct/c?sig=x", "W9.jsonl"),
        );
        let request = BuildClassifierRequest {
            classifier_id: "clf-1".to_string(),
            description: None,
            base_classifier_id: None,
            doc_types,
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "classifierId": "clf-1",
                "docTypes": {
                    "W9": {
                        "azureBlobFileListSource": {
                            "containerUrl": "https://acct/c?sig=x",
                            "fileList": "W9.jsonl"
                        }
                    }
                }
            })
        );
    }

    #[test]
    fn test_prefix_source() {
        let details = ClassifierDocTypeDetails::from_prefix("https://acct/c", "Email/");
        let value = serde_json::to_value(&details).unwrap();
        assert_eq!(value["azureBlobSource"]["prefix"], "Email/");
        assert!(value.get("azureBlobFileListSource").is_none());
    }

    #[test]
    fn test_parse_classifier_list() {
        let list: ClassifierList = serde_json::from_value(json!({
            "value": [
                {"classifierId": "a", "description": "first", "apiVersion": "2024-02-29-preview"},
                {"classifierId": "b"}
            ],
            "nextLink": "https://endpoint/documentintelligence/documentClassifiers?skip=2"
        }))
        .unwrap();
        assert_eq!(list.value.len(), 2);
        assert_eq!(list.value[0].description.as_deref(), Some("first"));
        assert!(list.value[1].description.is_none());
        assert!(list.next_link.is_some());
    }
}
