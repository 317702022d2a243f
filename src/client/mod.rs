//! Service clients
//!
//! HTTP transport, the document-analysis client and the blob store.

pub mod blob;
pub mod docintel;
pub mod transport;

pub use blob::{AzureBlobStore, BlobError, BlobResult, BlobStore, ContainerRef, MemoryBlobStore};
pub use docintel::{
    content_type_for, AnalyzeJob, BuildClassifierJob, ClassifyJob, ClientError, ClientResult,
    DocumentIntelligenceClient,
};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Method, Transport, TransportError};
