//! Per-file eligibility checks

use std::fs;
use std::path::Path;

use tracing::debug;

use super::entry::Eligibility;

/// Extensions accepted for classifier training
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "pdf", "docx", "xlsx", "pptx", "jpg", "jpeg", "png", "bmp", "tiff", "heif",
];

/// Extensions whose header is decoded for a dimension check
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "heif"];

/// Suffix of layout-analysis sidecar files
pub const SIDECAR_SUFFIX: &str = ".ocr.json";

/// Eligibility rules for training files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibilityRules {
    pub min_width: u32,
    pub min_height: u32,
}

impl Default for EligibilityRules {
    fn default() -> Self {
        Self {
            min_width: 50,
            min_height: 50,
        }
    }
}

/// Lower-cased extension of a file name
fn extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Whether `name` is a layout sidecar
pub fn is_sidecar(name: &str) -> bool {
    name.len() > SIDECAR_SUFFIX.len()
        && name.to_ascii_lowercase().ends_with(SIDECAR_SUFFIX)
}

/// Document file name a sidecar belongs to
pub fn sidecar_document(name: &str) -> Option<&str> {
    if is_sidecar(name) {
        Some(&name[..name.len() - SIDECAR_SUFFIX.len()])
    } else {
        None
    }
}

impl EligibilityRules {
    pub fn is_supported(&self, name: &str) -> bool {
        extension(name).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
    }

    fn is_image(&self, name: &str) -> bool {
        extension(name).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
    }

    /// Classify one file
    pub fn check(&self, path: &Path) -> Eligibility {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if !self.is_supported(&name) {
            return Eligibility::IncompatibleType;
        }

        if self.is_image(&name) {
            return match imagesize::size(path) {
                Ok(size) if size.width < self.min_width as usize || size.height < self.min_height as usize => {
                    debug!(path = %path.display(), width = size.width, height = size.height, "image too small");
                    Eligibility::IncompatibleSize
                }
                Ok(_) => Eligibility::Eligible,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "image header not decodable");
                    Eligibility::Corrupt
                }
            };
        }

        match fs::metadata(path) {
            Ok(meta) if meta.len() > 0 => Eligibility::Eligible,
            Ok(_) => {
                debug!(path = %path.display(), "empty document");
                Eligibility::Corrupt
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "unreadable document");
                Eligibility::Corrupt
            }
        }
    }
}
