//! Mock service implementation
//!
//! In-process stand-in for the document-analysis and blob-storage services,
//! used by unit and integration tests. Supports failure injection for
//! testing error paths.
//!
//! # Routes
//!
//! - `POST documentModels/{model}:analyze`: start an analyze operation
//! - `POST documentClassifiers/{id}:analyze`: start a classify operation
//! - `POST documentClassifiers:build`: start a classifier build
//! - `GET .../analyzeResults/{op}`, `GET operations/{op}`: operation status
//! - `GET documentClassifiers[/{id}]`: classifier listing (paged) and lookup
//! - `GET|PUT ?restype=container`: container existence and creation
//! - `PUT /{container}/{blob}`: block blob upload
//! - `GET ?restype=container&comp=list`: blob listing (paged)

mod failure;
mod service;
mod state;

pub use failure::{FailureConfig, FailureInjector, MockRoute};
pub use service::{MockService, MockTransport};
pub use state::{MockOperation, MockState, OperationKind};
