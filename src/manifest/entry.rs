//! Manifest data types
//!
//! A category manifest is serialized as newline-delimited JSON, one
//! `{"file":"<relative_path>"}` record per eligible file.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::summary::{write_rejections, write_unreadable, RejectedFile};

/// Extension of written manifest files
pub const MANIFEST_EXTENSION: &str = "jsonl";

/// Outcome of the per-file checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eligibility {
    Eligible,
    /// Extension outside the supported set
    IncompatibleType,
    /// Image below the minimum dimensions
    IncompatibleSize,
    /// Unreadable file or undecodable image header
    Corrupt,
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }

    /// Human-readable rejection reason
    pub fn reason(&self) -> &'static str {
        match self {
            Eligibility::Eligible => "eligible",
            Eligibility::IncompatibleType => "unsupported file type",
            Eligibility::IncompatibleSize => "image below minimum dimensions",
            Eligibility::Corrupt => "corrupted or unreadable",
        }
    }
}

impl std::fmt::Display for Eligibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.reason())
    }
}

/// One file found under a category directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the training root, `/`-separated
    pub relative_path: String,
    /// Name of the immediate parent directory
    pub category: String,
    pub eligibility: Eligibility,
}

impl FileEntry {
    /// Absolute path under `root`
    pub fn path_under(&self, root: &Path) -> PathBuf {
        self.relative_path
            .split('/')
            .fold(root.to_path_buf(), |path, part| path.join(part))
    }
}

#[derive(Serialize)]
struct FileListRecord<'a> {
    file: &'a str,
}

/// Eligible files of one category that met the file-count threshold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryManifest {
    pub category: String,
    /// Eligible entries in listing order
    pub entries: Vec<FileEntry>,
    /// Layout sidecars (`<file>.ocr.json`) of the entries; uploaded, never listed
    #[serde(default)]
    pub sidecars: Vec<String>,
}

impl CategoryManifest {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            entries: Vec::new(),
            sidecars: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// File name of the written manifest (`<category>.jsonl`)
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.category, MANIFEST_EXTENSION)
    }

    /// Newline-delimited JSON file list
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&serde_json::to_string(&FileListRecord {
                file: &entry.relative_path,
            })?);
            out.push('\n');
        }
        Ok(out)
    }

    /// Write `<category>.jsonl` into `root`
    pub fn write_to(&self, root: &Path) -> io::Result<PathBuf> {
        let jsonl = self.to_jsonl().map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("JSON error: {}", e))
        })?;
        let path = root.join(self.file_name());
        fs::write(&path, jsonl)?;
        Ok(path)
    }
}

/// Result of one manifest build
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestOutput {
    /// Categories that met the threshold
    pub manifests: BTreeMap<String, CategoryManifest>,
    /// Rejected files in traversal order
    pub rejected: Vec<FileEntry>,
    /// Categories dropped for having too few eligible files
    pub below_threshold: Vec<String>,
    /// Category directories that could not be listed
    #[serde(default)]
    pub unreadable: Vec<RejectedFile>,
}

impl ManifestOutput {
    /// Eligible files across all emitted manifests
    pub fn eligible_count(&self) -> usize {
        self.manifests.values().map(CategoryManifest::len).sum()
    }

    /// Rejected files with a given status
    pub fn rejected_with(&self, eligibility: Eligibility) -> impl Iterator<Item = &FileEntry> {
        self.rejected
            .iter()
            .filter(move |e| e.eligibility == eligibility)
    }
}

impl fmt::Display for ManifestOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} manifests, {} eligible files",
            self.manifests.len(),
            self.eligible_count()
        )?;
        for manifest in self.manifests.values() {
            writeln!(
                f,
                "  {}: {} files, {} sidecars",
                manifest.file_name(),
                manifest.len(),
                manifest.sidecars.len()
            )?;
        }
        if !self.below_threshold.is_empty() {
            writeln!(
                f,
                "Categories with too few eligible files: {}",
                self.below_threshold.join(", ")
            )?;
        }
        write_unreadable(f, &self.unreadable)?;
        let rejected: Vec<RejectedFile> = self.rejected.iter().map(RejectedFile::from).collect();
        write_rejections(f, &rejected)
    }
}
