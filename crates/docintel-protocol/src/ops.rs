//! Operation-specific types.

pub mod analyze;
pub mod classifier;

pub use analyze::{AnalyzeOperation, AnalyzeResult, AnalyzedDocument, BoundingRegion, DocumentPage};
pub use classifier::{
    AzureBlobFileListSource, AzureBlobSource, BuildClassifierRequest, ClassifierDocTypeDetails,
    ClassifierList, ClassifierSummary, DocumentClassifierDetails,
};
