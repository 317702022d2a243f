//! Document Intelligence Protocol Types
//!
//! Defines the JSON bodies exchanged with the document-analysis REST API:
//! long-running operation status, analyze results, and classifier build
//! requests.

pub mod error;
pub mod operation;
pub mod ops;

pub use error::{ApiError, ErrorResponse, InnerError};
pub use operation::{OperationState, OperationStatus};

/// API version sent as the `api-version` query parameter.
pub const API_VERSION: &str = "2024-02-29-preview";

/// Path prefix for all document-analysis routes.
pub const PATH_PREFIX: &str = "documentintelligence";

/// Header carrying the resource key.
pub const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Header carrying the status-query locator of a long-running operation.
pub const OPERATION_LOCATION_HEADER: &str = "Operation-Location";

/// Prebuilt model used for layout extraction.
pub const LAYOUT_MODEL_ID: &str = "prebuilt-layout";
