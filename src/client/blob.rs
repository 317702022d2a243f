//! Blob storage client
//!
//! The training container is addressed by a SAS URL
//! (`https://<account>.blob.core.windows.net/<container>?<sas>`); every
//! request reuses its query string for authorization.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;
use url::Url;

use super::transport::{HttpRequest, HttpResponse, Transport, TransportError};

/// Storage service version sent with every request
pub const STORAGE_API_VERSION: &str = "2023-11-03";

/// Blob storage errors
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("{operation} failed (HTTP {status}): {message}")]
    Http {
        operation: &'static str,
        status: u16,
        message: String,
    },

    #[error("Invalid container URL: {0}")]
    InvalidContainerUrl(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Result type for blob operations
pub type BlobResult<T> = Result<T, BlobError>;

/// Reference to one blob container, SAS token included
#[derive(Clone, PartialEq, Eq)]
pub struct ContainerRef {
    url: Url,
}

impl ContainerRef {
    /// Parse a container SAS URL
    pub fn parse(raw: &str) -> BlobResult<Self> {
        let url = Url::parse(raw)
            .map_err(|e| BlobError::InvalidContainerUrl(format!("{}: {}", redact_query(raw), e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(BlobError::InvalidContainerUrl(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }
        let has_container = url
            .path_segments()
            .map(|mut segments| segments.any(|s| !s.is_empty()))
            .unwrap_or(false);
        if !has_container {
            return Err(BlobError::InvalidContainerUrl(format!(
                "{}: no container name in path",
                redact_query(raw)
            )));
        }
        Ok(Self { url })
    }

    /// Container name (last path segment)
    pub fn container_name(&self) -> &str {
        self.url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .unwrap_or_default()
    }

    /// Full URL, SAS token included
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// URL of one blob in the container
    pub fn blob_url(&self, blob_name: &str) -> String {
        let mut url = self.url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty();
            for part in blob_name.split('/') {
                segments.push(part);
            }
        }
        url.to_string()
    }

    /// Container URL with extra query parameters appended
    pub fn container_url_with(&self, params: &[(&str, &str)]) -> String {
        let mut url = self.url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
        }
        url.to_string()
    }
}

impl fmt::Display for ContainerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&redact_query(self.url.as_str()))
    }
}

impl fmt::Debug for ContainerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContainerRef").field(&self.to_string()).finish()
    }
}

fn redact_query(raw: &str) -> String {
    match raw.split_once('?') {
        Some((base, _)) => format!("{}?[REDACTED]", base),
        None => raw.to_string(),
    }
}

/// Blob container operations used by the corpus workflows
pub trait BlobStore {
    fn container_exists(&self) -> BlobResult<bool>;

    /// Create the container; an existing container is not an error
    fn create_container(&self) -> BlobResult<()>;

    /// Upload a block blob, overwriting any existing blob of that name
    fn upload_blob(&self, name: &str, content: &[u8]) -> BlobResult<()>;

    /// Names of the blobs in the container, optionally under a prefix
    fn list_blobs(&self, prefix: Option<&str>) -> BlobResult<Vec<String>>;
}

/// Blob store backed by the storage REST API
pub struct AzureBlobStore {
    transport: Arc<dyn Transport>,
    container: ContainerRef,
}

impl AzureBlobStore {
    pub fn new(transport: Arc<dyn Transport>, container: ContainerRef) -> Self {
        Self {
            transport,
            container,
        }
    }

    pub fn container(&self) -> &ContainerRef {
        &self.container
    }

    fn send(&self, request: HttpRequest) -> BlobResult<HttpResponse> {
        debug!(method = %request.method, container = %self.container, "blob request");
        Ok(self
            .transport
            .send(request.header("x-ms-version", STORAGE_API_VERSION))?)
    }
}

fn http_error(operation: &'static str, response: &HttpResponse) -> BlobError {
    let text = response.text();
    let message = storage_error_code(&text).unwrap_or_else(|| {
        if text.trim().is_empty() {
            format!("HTTP {}", response.status)
        } else {
            text.trim().to_string()
        }
    });
    BlobError::Http {
        operation,
        status: response.status,
        message,
    }
}

impl BlobStore for AzureBlobStore {
    fn container_exists(&self) -> BlobResult<bool> {
        let url = self.container.container_url_with(&[("restype", "container")]);
        let response = self.send(HttpRequest::get(url))?;
        match response.status {
            200 => Ok(true),
            404 => Ok(false),
            _ => Err(http_error("container exists", &response)),
        }
    }

    fn create_container(&self) -> BlobResult<()> {
        let url = self.container.container_url_with(&[("restype", "container")]);
        let response = self.send(HttpRequest::put(url))?;
        match response.status {
            201 | 409 => Ok(()),
            _ => Err(http_error("create container", &response)),
        }
    }

    fn upload_blob(&self, name: &str, content: &[u8]) -> BlobResult<()> {
        let request = HttpRequest::put(self.container.blob_url(name))
            .header("x-ms-blob-type", "BlockBlob")
            .header("Content-Type", "application/octet-stream")
            .body(content.to_vec());
        let response = self.send(request)?;
        if response.is_success() {
            Ok(())
        } else {
            Err(http_error("upload blob", &response))
        }
    }

    fn list_blobs(&self, prefix: Option<&str>) -> BlobResult<Vec<String>> {
        let mut names = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut params = vec![("restype", "container"), ("comp", "list")];
            if let Some(prefix) = prefix {
                params.push(("prefix", prefix));
            }
            if let Some(marker) = marker.as_deref() {
                params.push(("marker", marker));
            }
            let response = self.send(HttpRequest::get(self.container.container_url_with(&params)))?;
            if !response.is_success() {
                return Err(http_error("list blobs", &response));
            }

            let page = parse_blob_list(&response.text())?;
            names.extend(page.names);
            match page.next_marker {
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        Ok(names)
    }
}

/// One page of a `comp=list` response
#[derive(Debug, Default, PartialEq)]
pub struct BlobListPage {
    pub names: Vec<String>,
    pub next_marker: Option<String>,
}

const NAME_PATH: &[&str] = &["EnumerationResults", "Blobs", "Blob", "Name"];
const MARKER_PATH: &[&str] = &["EnumerationResults", "NextMarker"];
const ERROR_CODE_PATH: &[&str] = &["Error", "Code"];

/// Parse the XML body of a blob listing
pub fn parse_blob_list(xml: &str) -> BlobResult<BlobListPage> {
    let texts = texts_at(xml, &[NAME_PATH, MARKER_PATH])
        .map_err(|e| BlobError::InvalidResponse(format!("blob listing: {}", e)))?;

    let mut page = BlobListPage::default();
    for (index, text) in texts {
        if index == 0 {
            page.names.push(text);
        } else if !text.is_empty() {
            page.next_marker = Some(text);
        }
    }
    Ok(page)
}

fn storage_error_code(xml: &str) -> Option<String> {
    texts_at(xml, &[ERROR_CODE_PATH])
        .ok()?
        .into_iter()
        .map(|(_, code)| code)
        .next()
}

/// Unescaped text of every element sitting at one of `paths` (from the root),
/// tagged with the index of the matching path, in document order
fn texts_at(xml: &str, paths: &[&[&str]]) -> Result<Vec<(usize, String)>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<String> = Vec::new();
    let mut current: Option<(usize, String)> = None;
    let mut texts = Vec::new();

    let matching = |stack: &[String]| {
        paths.iter().position(|path| {
            path.len() == stack.len() && path.iter().zip(stack).all(|(want, got)| *want == got.as_str())
        })
    };

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                stack.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                current = matching(&stack).map(|index| (index, String::new()));
            }
            Event::Empty(e) => {
                stack.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                if let Some(index) = matching(&stack) {
                    texts.push((index, String::new()));
                }
                stack.pop();
            }
            Event::Text(e) => {
                if let Some((_, buf)) = current.as_mut() {
                    buf.push_str(&e.unescape()?);
                }
            }
            Event::CData(e) => {
                if let Some((_, buf)) = current.as_mut() {
                    buf.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Event::End(_) => {
                if let Some(done) = current.take() {
                    texts.push(done);
                }
                stack.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(texts)
}

/// In-memory blob store
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    exists: Mutex<bool>,
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
    failing: Mutex<Vec<String>>,
}

impl MemoryBlobStore {
    /// Store whose container does not exist yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose container already exists
    pub fn existing() -> Self {
        let store = Self::default();
        if let Ok(mut exists) = store.exists.lock() {
            *exists = true;
        }
        store
    }

    /// Make uploads of `name` fail
    pub fn fail_uploads_of(&self, name: impl Into<String>) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.push(name.into());
        }
    }

    /// Content of one blob
    pub fn blob(&self, name: &str) -> Option<Vec<u8>> {
        self.blobs.lock().ok()?.get(name).cloned()
    }

    /// Names of all blobs, sorted
    pub fn names(&self) -> Vec<String> {
        self.blobs
            .lock()
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn poisoned() -> BlobError {
        BlobError::InvalidResponse("memory store lock poisoned".to_string())
    }
}

impl BlobStore for MemoryBlobStore {
    fn container_exists(&self) -> BlobResult<bool> {
        Ok(*self.exists.lock().map_err(|_| Self::poisoned())?)
    }

    fn create_container(&self) -> BlobResult<()> {
        *self.exists.lock().map_err(|_| Self::poisoned())? = true;
        Ok(())
    }

    fn upload_blob(&self, name: &str, content: &[u8]) -> BlobResult<()> {
        if !self.container_exists()? {
            return Err(BlobError::Http {
                operation: "upload blob",
                status: 404,
                message: "ContainerNotFound".to_string(),
            });
        }
        let failing = self.failing.lock().map_err(|_| Self::poisoned())?;
        if failing.iter().any(|f| f == name) {
            return Err(BlobError::Http {
                operation: "upload blob",
                status: 500,
                message: "InternalError".to_string(),
            });
        }
        drop(failing);
        self.blobs
            .lock()
            .map_err(|_| Self::poisoned())?
            .insert(name.to_string(), content.to_vec());
        Ok(())
    }

    fn list_blobs(&self, prefix: Option<&str>) -> BlobResult<Vec<String>> {
        let blobs = self.blobs.lock().map_err(|_| Self::poisoned())?;
        Ok(blobs
            .keys()
            .filter(|name| prefix.map_or(true, |p| name.starts_with(p)))
            .cloned()
            .collect())
    }
}
