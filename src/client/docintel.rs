//! Document Intelligence REST client
//!
//! Submissions answer `202 Accepted` with an `Operation-Location` header;
//! the status of that operation is polled with [`DocumentIntelligenceClient::get_operation`].
//! The job types at the bottom adapt the client to [`JobBackend`] so the
//! poller can drive them.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use docintel_protocol::{
    ops::{BuildClassifierRequest, ClassifierList, DocumentClassifierDetails},
    ErrorResponse, OperationState, OperationStatus, API_VERSION, OPERATION_LOCATION_HEADER,
    PATH_PREFIX, SUBSCRIPTION_KEY_HEADER,
};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::{ConfigError, LaneConfig};
use crate::poller::{JobBackend, JobHandle, JobStatus, QueryError, SubmitError};

use super::transport::{HttpRequest, HttpResponse, Transport, TransportError};

/// Errors of plain (non-job) requests
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Result type for plain requests
pub type ClientResult<T> = Result<T, ClientError>;

/// Client for the document-analysis service
pub struct DocumentIntelligenceClient {
    transport: Arc<dyn Transport>,
    endpoint: Url,
    api_key: String,
    api_version: String,
}

impl DocumentIntelligenceClient {
    /// Create a client for `endpoint` (e.g. `https://name.cognitiveservices.azure.com/`)
    pub fn new(
        transport: Arc<dyn Transport>,
        endpoint: &str,
        api_key: impl Into<String>,
    ) -> Result<Self, TransportError> {
        let parsed = Url::parse(endpoint)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", endpoint, e)))?;
        if parsed.cannot_be_a_base() {
            return Err(TransportError::InvalidUrl(endpoint.to_string()));
        }
        Ok(Self {
            transport,
            endpoint: parsed,
            api_key: api_key.into(),
            api_version: API_VERSION.to_string(),
        })
    }

    /// Create a client from the endpoint, key and API version of `config`
    pub fn from_config(
        transport: Arc<dyn Transport>,
        config: &LaneConfig,
    ) -> Result<Self, ConfigError> {
        let endpoint = config.require_endpoint()?;
        let api_key = config.require_api_key()?;
        let client = Self::new(transport, endpoint, api_key)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        Ok(client.with_api_version(config.api_version.clone()))
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// Service URL for `segments`; each one is percent-encoded as a single path segment
    fn url(&self, segments: &[&str]) -> String {
        let mut url = self.endpoint.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push(PATH_PREFIX).extend(segments);
        }
        url.set_query(None);
        url.query_pairs_mut().append_pair("api-version", &self.api_version);
        url.to_string()
    }

    fn authorized(&self, request: HttpRequest) -> HttpRequest {
        request.header(SUBSCRIPTION_KEY_HEADER, self.api_key.as_str())
    }

    // === Job submissions ===

    /// Analyze a document with a prebuilt or custom model
    pub fn begin_analyze(
        &self,
        model_id: &str,
        document: Vec<u8>,
        content_type: &str,
    ) -> Result<JobHandle, SubmitError> {
        let url = self.url(&["documentModels", &format!("{}:analyze", model_id)]);
        let request = HttpRequest::post(url)
            .header("Content-Type", content_type)
            .body(document);
        self.submit(request)
    }

    /// Classify a document with a trained classifier
    pub fn begin_classify(
        &self,
        classifier_id: &str,
        document: Vec<u8>,
        content_type: &str,
    ) -> Result<JobHandle, SubmitError> {
        let url = self.url(&["documentClassifiers", &format!("{}:analyze", classifier_id)]);
        let request = HttpRequest::post(url)
            .header("Content-Type", content_type)
            .body(document);
        self.submit(request)
    }

    /// Start training a classifier
    pub fn begin_build_classifier(
        &self,
        build: &BuildClassifierRequest,
    ) -> Result<JobHandle, SubmitError> {
        let body = serde_json::to_vec(build).map_err(TransportError::from)?;
        let request = HttpRequest::post(self.url(&["documentClassifiers:build"]))
            .header("Content-Type", "application/json")
            .body(body);
        self.submit(request)
    }

    fn submit(&self, request: HttpRequest) -> Result<JobHandle, SubmitError> {
        debug!(method = %request.method, url = %request.url, "submitting job");
        let response = self.transport.send(self.authorized(request))?;

        if response.status != 202 {
            let (code, message) = service_error(&response);
            return Err(SubmitError::Rejected {
                status: response.status,
                code,
                message,
            });
        }

        let location = response.header(OPERATION_LOCATION_HEADER).ok_or_else(|| {
            SubmitError::InvalidResponse(format!("missing {} header", OPERATION_LOCATION_HEADER))
        })?;
        Ok(JobHandle::from_operation_location(location))
    }

    // === Status ===

    /// Query the status of a submitted operation
    pub fn get_operation(&self, handle: &JobHandle) -> Result<JobStatus, QueryError> {
        let request = self.authorized(HttpRequest::get(handle.status_url.as_str()));
        let response = self.transport.send(request)?;

        if !response.is_success() {
            let (_, message) = service_error(&response);
            return Err(QueryError::Http {
                status: response.status,
                message,
            });
        }

        let body: Value = response
            .json()
            .map_err(|e| QueryError::InvalidResponse(e.to_string()))?;
        let status = OperationStatus::from_value(&body)
            .map_err(|e| QueryError::InvalidResponse(e.to_string()))?;

        Ok(match status.status {
            OperationState::NotStarted | OperationState::Running => JobStatus::Running,
            OperationState::Succeeded => JobStatus::Succeeded(body),
            OperationState::Failed | OperationState::Canceled | OperationState::Unknown => {
                JobStatus::Failed(status.failure_reason())
            }
        })
    }

    // === Classifier management ===

    /// List every classifier of the resource, following `nextLink`
    pub fn list_classifiers(&self) -> ClientResult<Vec<DocumentClassifierDetails>> {
        let mut classifiers = Vec::new();
        let mut next = Some(self.url(&["documentClassifiers"]));

        while let Some(url) = next.take() {
            let response = self.get(&url)?;
            let page: ClassifierList = response
                .json()
                .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
            classifiers.extend(page.value);
            next = page.next_link.filter(|link| !link.is_empty());
        }

        Ok(classifiers)
    }

    /// Fetch one classifier
    pub fn get_classifier(&self, classifier_id: &str) -> ClientResult<DocumentClassifierDetails> {
        let response = self.get(&self.url(&["documentClassifiers", classifier_id]))?;
        response
            .json()
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    fn get(&self, url: &str) -> ClientResult<HttpResponse> {
        let response = self.transport.send(self.authorized(HttpRequest::get(url)))?;
        if !response.is_success() {
            let (code, message) = service_error(&response);
            return Err(ClientError::Http {
                status: response.status,
                code,
                message,
            });
        }
        Ok(response)
    }
}

/// Service error code and message of a failed response
fn service_error(response: &HttpResponse) -> (Option<String>, String) {
    match serde_json::from_slice::<ErrorResponse>(&response.body) {
        Ok(parsed) => (
            Some(parsed.error.specific_code().to_string()),
            parsed.error.to_string(),
        ),
        Err(_) => {
            let text = response.text();
            let message = if text.trim().is_empty() {
                format!("HTTP {}", response.status)
            } else {
                text.trim().to_string()
            };
            (None, message)
        }
    }
}

/// MIME type the service expects for a document file
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "heif" => "image/heif",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        _ => "application/octet-stream",
    }
}

fn read_document(path: &Path) -> Result<Vec<u8>, SubmitError> {
    fs::read(path).map_err(|source| SubmitError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// === Job backends ===

/// Analyze one file with a model
pub struct AnalyzeJob<'a> {
    client: &'a DocumentIntelligenceClient,
    model_id: String,
    path: PathBuf,
}

impl<'a> AnalyzeJob<'a> {
    pub fn new(
        client: &'a DocumentIntelligenceClient,
        model_id: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            model_id: model_id.into(),
            path: path.into(),
        }
    }
}

impl JobBackend for AnalyzeJob<'_> {
    fn submit(&self) -> Result<JobHandle, SubmitError> {
        let document = read_document(&self.path)?;
        self.client
            .begin_analyze(&self.model_id, document, content_type_for(&self.path))
    }

    fn query(&self, handle: &JobHandle) -> Result<JobStatus, QueryError> {
        self.client.get_operation(handle)
    }
}

/// Classify one file with a classifier
pub struct ClassifyJob<'a> {
    client: &'a DocumentIntelligenceClient,
    classifier_id: String,
    path: PathBuf,
}

impl<'a> ClassifyJob<'a> {
    pub fn new(
        client: &'a DocumentIntelligenceClient,
        classifier_id: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            classifier_id: classifier_id.into(),
            path: path.into(),
        }
    }
}

impl JobBackend for ClassifyJob<'_> {
    fn submit(&self) -> Result<JobHandle, SubmitError> {
        let document = read_document(&self.path)?;
        self.client
            .begin_classify(&self.classifier_id, document, content_type_for(&self.path))
    }

    fn query(&self, handle: &JobHandle) -> Result<JobStatus, QueryError> {
        self.client.get_operation(handle)
    }
}

/// Train a classifier
pub struct BuildClassifierJob<'a> {
    client: &'a DocumentIntelligenceClient,
    request: BuildClassifierRequest,
}

impl<'a> BuildClassifierJob<'a> {
    pub fn new(client: &'a DocumentIntelligenceClient, request: BuildClassifierRequest) -> Self {
        Self { client, request }
    }

    pub fn request(&self) -> &BuildClassifierRequest {
        &self.request
    }
}

impl JobBackend for BuildClassifierJob<'_> {
    fn submit(&self) -> Result<JobHandle, SubmitError> {
        self.client.begin_build_classifier(&self.request)
    }

    fn query(&self, handle: &JobHandle) -> Result<JobStatus, QueryError> {
        self.client.get_operation(handle)
    }
}
