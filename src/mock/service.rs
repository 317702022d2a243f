//! In-process mock of the document-analysis and blob services
//!
//! Routes requests by URL path: `/documentintelligence/...` goes to the
//! analysis side, everything else is treated as the blob container.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use quick_xml::escape::escape;
use docintel_protocol::{OperationState, API_VERSION, OPERATION_LOCATION_HEADER, SUBSCRIPTION_KEY_HEADER};
use serde_json::{json, Value};
use url::Url;

use crate::client::{HttpRequest, HttpResponse, Method, Transport, TransportError};

use super::failure::{FailureConfig, FailureInjector, MockRoute};
use super::state::{MockState, OperationKind};

const DEFAULT_PAGE_SIZE: usize = 100;

/// Configurable mock service
///
/// Cloning shares state, so a test can keep a handle while the client owns
/// the transport.
#[derive(Clone)]
pub struct MockService {
    state: Arc<Mutex<MockState>>,
    failures: Arc<Mutex<FailureInjector>>,
    page_size: usize,
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockService {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::new())),
            failures: Arc::new(Mutex::new(FailureInjector::new())),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Page size of classifier and blob listings
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // === Public API for test configuration ===

    /// States new operations report on successive status queries
    pub fn set_progression(&self, states: Vec<OperationState>) {
        self.state().progression = states;
    }

    /// Replace the `analyzeResult` returned by analyze operations
    pub fn set_analyze_result(&self, result: Value) {
        self.state().analyze_result = Some(result);
    }

    /// Replace the documents detected by classify operations
    pub fn set_documents(&self, documents: Vec<Value>) {
        self.state().documents = Some(documents);
    }

    pub fn inject_failure(&self, route: MockRoute, config: FailureConfig) {
        self.failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .inject(route, config);
    }

    pub fn clear_failures(&self) {
        self.failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    /// Register a classifier (service JSON, `classifierId` required)
    pub fn add_classifier(&self, classifier: Value) {
        if let Some(id) = classifier["classifierId"].as_str() {
            let id = id.to_string();
            self.state().classifiers.insert(id, classifier);
        }
    }

    pub fn create_container(&self) {
        self.state().container_exists = true;
    }

    pub fn put_blob(&self, name: &str, content: &[u8]) {
        self.state().blobs.insert(name.to_string(), content.to_vec());
    }

    // === Inspection ===

    /// Every request received, in order
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.state().requests.clone()
    }

    pub fn blob(&self, name: &str) -> Option<Vec<u8>> {
        self.state().blobs.get(name).cloned()
    }

    pub fn blob_names(&self) -> Vec<String> {
        self.state().blobs.keys().cloned().collect()
    }

    pub fn container_exists(&self) -> bool {
        self.state().container_exists
    }

    pub fn classifier(&self, id: &str) -> Option<Value> {
        self.state().classifiers.get(id).cloned()
    }

    /// Status queries answered for an operation
    pub fn polls(&self, operation_id: &str) -> usize {
        self.state()
            .operations
            .get(operation_id)
            .map(|op| op.polls)
            .unwrap_or(0)
    }

    // === Request handling ===

    /// Handle one request
    pub fn handle(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.state().requests.push(request.clone());

        let url = Url::parse(&request.url).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
        let segments: Vec<String> = url
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).map(percent_decode).collect())
            .unwrap_or_default();
        let base = format!("{}://{}", url.scheme(), url.host_str().unwrap_or("localhost"));
        let base = match url.port() {
            Some(port) => format!("{}:{}", base, port),
            None => base,
        };

        let route = match route_for(request.method, &url, &segments) {
            Some(route) => route,
            None => return Ok(error_json(404, "NotFound", "Resource not found.")),
        };

        let failure = self
            .failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .check(route);
        if let Some(failure) = failure {
            if failure.transport {
                return Err(TransportError::Connect("connection reset by mock".to_string()));
            }
            return Ok(failure_response(route, &failure));
        }

        if !route.is_storage() && request.header_value(SUBSCRIPTION_KEY_HEADER).is_none() {
            return Ok(error_json(401, "401", "Access denied due to missing subscription key."));
        }

        let response = match route {
            MockRoute::Analyze => self.submit_analyze(&base, &segments, request),
            MockRoute::Classify => self.submit_classify(&base, &segments, request),
            MockRoute::BuildClassifier => self.submit_build(&base, request),
            MockRoute::GetOperation => self.get_operation(&segments),
            MockRoute::ListClassifiers => self.list_classifiers(&base, &url),
            MockRoute::GetClassifier => self.get_classifier(&segments),
            MockRoute::ContainerExists => self.container_exists_response(),
            MockRoute::CreateContainer => self.create_container_response(),
            MockRoute::PutBlob => self.put_blob_response(&segments, request),
            MockRoute::ListBlobs => self.list_blobs_response(&url),
        };
        Ok(response)
    }

    fn accepted(&self, location: String) -> HttpResponse {
        HttpResponse::new(202).with_header(OPERATION_LOCATION_HEADER, location)
    }

    fn submit_analyze(&self, base: &str, segments: &[String], request: &HttpRequest) -> HttpResponse {
        if request.body.is_empty() {
            return empty_request();
        }
        let model_id = action_target(segments);
        let id = self.state().start_operation(OperationKind::Analyze {
            model_id: model_id.clone(),
        });
        self.accepted(format!(
            "{}/documentintelligence/documentModels/{}/analyzeResults/{}?api-version={}",
            base, model_id, id, API_VERSION
        ))
    }

    fn submit_classify(&self, base: &str, segments: &[String], request: &HttpRequest) -> HttpResponse {
        if request.body.is_empty() {
            return empty_request();
        }
        let classifier_id = action_target(segments);
        let mut state = self.state();
        if !state.classifiers.contains_key(&classifier_id) {
            return error_json(
                404,
                "NotFound",
                &format!("Resource not found: classifier {}", classifier_id),
            );
        }
        let id = state.start_operation(OperationKind::Classify {
            classifier_id: classifier_id.clone(),
        });
        self.accepted(format!(
            "{}/documentintelligence/documentClassifiers/{}/analyzeResults/{}?api-version={}",
            base, classifier_id, id, API_VERSION
        ))
    }

    fn submit_build(&self, base: &str, request: &HttpRequest) -> HttpResponse {
        let body: Value = match serde_json::from_slice(&request.body) {
            Ok(body) => body,
            Err(e) => return error_json(400, "InvalidRequest", &format!("Invalid JSON: {}", e)),
        };
        let classifier_id = body["classifierId"].as_str().unwrap_or_default().to_string();
        if classifier_id.is_empty() {
            return error_json(400, "InvalidArgument", "classifierId is required.");
        }
        let doc_types = body["docTypes"].as_object().map(|m| m.len()).unwrap_or(0);
        if doc_types < 2 {
            return error_json_inner(
                400,
                "InvalidArgument",
                "Invalid argument.",
                "InvalidTrainingDocTypes",
                "At least two document types are required.",
            );
        }

        let mut state = self.state();
        if state.classifiers.contains_key(&classifier_id) {
            return error_json_inner(
                409,
                "Conflict",
                "Resource already exists.",
                "ModelExists",
                &format!("Classifier {} already exists.", classifier_id),
            );
        }
        let id = state.start_operation(OperationKind::BuildClassifier { request: body });
        self.accepted(format!(
            "{}/documentintelligence/operations/{}?api-version={}",
            base, id, API_VERSION
        ))
    }

    fn get_operation(&self, segments: &[String]) -> HttpResponse {
        let operation_id = segments.last().cloned().unwrap_or_default();
        let mut state = self.state();
        let (op_state, kind, created, updated) = match state.operations.get_mut(&operation_id) {
            Some(op) => {
                let s = op.advance();
                (s, op.kind.clone(), op.created_at, op.updated_at)
            }
            None => return error_json(404, "NotFound", "Operation not found."),
        };

        let mut body = json!({
            "status": op_state,
            "createdDateTime": created.to_rfc3339(),
            "lastUpdatedDateTime": updated.to_rfc3339(),
        });

        match op_state {
            OperationState::Failed => {
                body["error"] = json!({
                    "code": "InternalServerError",
                    "message": "An unexpected error occurred."
                });
            }
            OperationState::Succeeded => match &kind {
                OperationKind::Analyze { model_id } => {
                    let result = state.analyze_result.clone().unwrap_or_else(|| {
                        json!({
                            "content": "",
                            "pages": [{"pageNumber": 1, "width": 8.5, "height": 11.0, "unit": "inch"}]
                        })
                    });
                    body["analyzeResult"] = with_model(result, model_id);
                }
                OperationKind::Classify { classifier_id } => {
                    let documents = state.documents.clone().unwrap_or_else(|| {
                        let doc_type = state
                            .classifiers
                            .get(classifier_id)
                            .and_then(|c| c["docTypes"].as_object())
                            .and_then(|m| m.keys().next().cloned())
                            .unwrap_or_else(|| "unknown".to_string());
                        vec![json!({
                            "docType": doc_type,
                            "confidence": 0.95,
                            "boundingRegions": [{"pageNumber": 1, "polygon": []}]
                        })]
                    });
                    body["analyzeResult"] = with_model(
                        json!({"content": "", "pages": [], "documents": documents}),
                        classifier_id,
                    );
                }
                OperationKind::BuildClassifier { request } => {
                    let classifier_id = request["classifierId"].as_str().unwrap_or_default().to_string();
                    let details = json!({
                        "classifierId": classifier_id,
                        "description": request.get("description").cloned().unwrap_or(Value::Null),
                        "baseClassifierId": request.get("baseClassifierId").cloned().unwrap_or(Value::Null),
                        "createdDateTime": Utc::now().to_rfc3339(),
                        "apiVersion": API_VERSION,
                        "docTypes": request["docTypes"].clone(),
                    });
                    state.classifiers.insert(classifier_id, details.clone());
                    body["operationId"] = json!(operation_id);
                    body["percentCompleted"] = json!(100);
                    body["result"] = details;
                }
            },
            _ => {
                if matches!(kind, OperationKind::BuildClassifier { .. }) {
                    body["operationId"] = json!(operation_id);
                    body["percentCompleted"] = json!(0);
                }
            }
        }

        HttpResponse::new(200).with_json(&body)
    }

    fn list_classifiers(&self, base: &str, url: &Url) -> HttpResponse {
        let skip: usize = query_param(url, "skip")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let state = self.state();
        let page: Vec<Value> = state
            .classifiers
            .values()
            .skip(skip)
            .take(self.page_size)
            .cloned()
            .collect();

        let mut body = json!({ "value": page });
        if skip + self.page_size < state.classifiers.len() {
            body["nextLink"] = json!(format!(
                "{}/documentintelligence/documentClassifiers?api-version={}&skip={}",
                base,
                API_VERSION,
                skip + self.page_size
            ));
        }
        HttpResponse::new(200).with_json(&body)
    }

    fn get_classifier(&self, segments: &[String]) -> HttpResponse {
        let id = segments.last().cloned().unwrap_or_default();
        match self.state().classifiers.get(&id) {
            Some(classifier) => HttpResponse::new(200).with_json(classifier),
            None => error_json(404, "NotFound", &format!("Resource not found: classifier {}", id)),
        }
    }

    fn container_exists_response(&self) -> HttpResponse {
        if self.state().container_exists {
            HttpResponse::new(200)
        } else {
            storage_error(404, "ContainerNotFound", "The specified container does not exist.")
        }
    }

    fn create_container_response(&self) -> HttpResponse {
        let mut state = self.state();
        if state.container_exists {
            return storage_error(409, "ContainerAlreadyExists", "The specified container already exists.");
        }
        state.container_exists = true;
        HttpResponse::new(201)
    }

    fn put_blob_response(&self, segments: &[String], request: &HttpRequest) -> HttpResponse {
        if request.header_value("x-ms-blob-type") != Some("BlockBlob") {
            return storage_error(400, "MissingRequiredHeader", "x-ms-blob-type is required.");
        }
        let mut state = self.state();
        if !state.container_exists {
            return storage_error(404, "ContainerNotFound", "The specified container does not exist.");
        }
        let name = segments[1..].join("/");
        state.blobs.insert(name, request.body.clone());
        HttpResponse::new(201)
    }

    fn list_blobs_response(&self, url: &Url) -> HttpResponse {
        let state = self.state();
        if !state.container_exists {
            return storage_error(404, "ContainerNotFound", "The specified container does not exist.");
        }
        let prefix = query_param(url, "prefix").unwrap_or_default();
        let start: usize = query_param(url, "marker")
            .and_then(|m| m.parse().ok())
            .unwrap_or(0);
        let matching: Vec<&String> = state.blobs.keys().filter(|k| k.starts_with(&prefix)).collect();

        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?><EnumerationResults><Blobs>");
        for name in matching.iter().skip(start).take(self.page_size) {
            let name = escape(name.as_str());
            xml.push_str(&format!("<Blob><Name>{}</Name><Properties /></Blob>", name));
        }
        xml.push_str("</Blobs>");
        if start + self.page_size < matching.len() {
            xml.push_str(&format!("<NextMarker>{}</NextMarker>", start + self.page_size));
        } else {
            xml.push_str("<NextMarker />");
        }
        xml.push_str("</EnumerationResults>");

        HttpResponse::new(200)
            .with_header("Content-Type", "application/xml")
            .with_body(xml)
    }
}

fn route_for(method: Method, url: &Url, segments: &[String]) -> Option<MockRoute> {
    let is_container_request = query_param(url, "restype").as_deref() == Some("container");

    if segments.first().map(String::as_str) == Some("documentintelligence") {
        let rest: Vec<&str> = segments[1..].iter().map(String::as_str).collect();
        return match (method, rest.as_slice()) {
            (Method::Post, ["documentClassifiers:build"]) => Some(MockRoute::BuildClassifier),
            (Method::Post, ["documentModels", action]) if action.ends_with(":analyze") => {
                Some(MockRoute::Analyze)
            }
            (Method::Post, ["documentClassifiers", action]) if action.ends_with(":analyze") => {
                Some(MockRoute::Classify)
            }
            (Method::Get, ["documentModels", _, "analyzeResults", _])
            | (Method::Get, ["documentClassifiers", _, "analyzeResults", _])
            | (Method::Get, ["operations", _]) => Some(MockRoute::GetOperation),
            (Method::Get, ["documentClassifiers"]) => Some(MockRoute::ListClassifiers),
            (Method::Get, ["documentClassifiers", _]) => Some(MockRoute::GetClassifier),
            _ => None,
        };
    }

    match (method, segments.len(), is_container_request) {
        (Method::Get, 1, true) if query_param(url, "comp").as_deref() == Some("list") => {
            Some(MockRoute::ListBlobs)
        }
        (Method::Get, 1, true) => Some(MockRoute::ContainerExists),
        (Method::Put, 1, true) => Some(MockRoute::CreateContainer),
        (Method::Put, n, false) if n >= 2 => Some(MockRoute::PutBlob),
        _ => None,
    }
}

/// `prebuilt-layout` from `prebuilt-layout:analyze`
fn action_target(segments: &[String]) -> String {
    segments
        .last()
        .and_then(|s| s.strip_suffix(":analyze"))
        .unwrap_or_default()
        .to_string()
}

fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

fn with_model(mut result: Value, model_id: &str) -> Value {
    if let Some(obj) = result.as_object_mut() {
        obj.insert("apiVersion".to_string(), json!(API_VERSION));
        obj.insert("modelId".to_string(), json!(model_id));
    }
    result
}

fn percent_decode(segment: &str) -> String {
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn error_json(status: u16, code: &str, message: &str) -> HttpResponse {
    HttpResponse::new(status).with_json(&json!({"error": {"code": code, "message": message}}))
}

fn error_json_inner(status: u16, code: &str, message: &str, inner: &str, inner_message: &str) -> HttpResponse {
    HttpResponse::new(status).with_json(&json!({
        "error": {
            "code": code,
            "message": message,
            "innererror": {"code": inner, "message": inner_message}
        }
    }))
}

fn empty_request() -> HttpResponse {
    error_json_inner(400, "InvalidRequest", "Invalid request.", "EmptyRequest", "Request body is empty.")
}

fn storage_error(status: u16, code: &str, message: &str) -> HttpResponse {
    HttpResponse::new(status)
        .with_header("x-ms-error-code", code)
        .with_header("Content-Type", "application/xml")
        .with_body(format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?><Error><Code>{}</Code><Message>{}</Message></Error>",
            code, message
        ))
}

fn failure_response(route: MockRoute, failure: &FailureConfig) -> HttpResponse {
    if route.is_storage() {
        return storage_error(failure.status, &failure.error_code, &failure.error_message);
    }
    match &failure.inner {
        Some((code, message)) => error_json_inner(
            failure.status,
            &failure.error_code,
            &failure.error_message,
            code,
            message,
        ),
        None => error_json(failure.status, &failure.error_code, &failure.error_message),
    }
}

/// Transport that answers from an in-process [`MockService`]
#[derive(Clone, Default)]
pub struct MockTransport {
    service: MockService,
}

impl MockTransport {
    /// Transport over a fresh service
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport over a pre-configured service
    pub fn with_service(service: MockService) -> Self {
        Self { service }
    }

    /// The underlying service, for test configuration
    pub fn service(&self) -> &MockService {
        &self.service
    }
}

impl Transport for MockTransport {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.service.handle(&request)
    }
}
