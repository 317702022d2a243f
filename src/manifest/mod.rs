//! Training corpus discovery
//!
//! Walks a training root one level deep: every immediate subdirectory is a
//! document category, every regular file directly inside it is checked for
//! eligibility. Entries are visited in byte-wise file-name order, so an
//! unchanged tree always yields byte-identical manifests.
//!
//! Ignored without being reported: files at the root (where the `.jsonl`
//! manifests are written), hidden entries and nested directories. A layout
//! sidecar (`<file>.ocr.json`) travels with its document when the document is
//! eligible and is rejected as an incompatible type otherwise.

mod eligibility;
mod entry;

pub use eligibility::{
    is_sidecar, sidecar_document, EligibilityRules, IMAGE_EXTENSIONS, SIDECAR_SUFFIX,
    SUPPORTED_EXTENSIONS,
};
pub use entry::{CategoryManifest, Eligibility, FileEntry, ManifestOutput, MANIFEST_EXTENSION};

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::LaneConfig;
use crate::summary::RejectedFile;

/// Default minimum number of eligible files per category
pub const DEFAULT_MIN_FILES: usize = 5;

/// Errors for manifest operations
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Cannot read training root {path}: {source}")]
    Traversal {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write manifest {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type for manifest operations
pub type ManifestResult<T> = Result<T, ManifestError>;

/// Files found in one category, before the threshold is applied
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryScan {
    /// Eligible entries in listing order
    pub eligible: Vec<FileEntry>,
    /// Sidecars of eligible entries
    pub sidecars: Vec<String>,
}

/// Every category and rejected file under a training root
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorpusScan {
    pub categories: BTreeMap<String, CategoryScan>,
    /// Rejected files in traversal order
    pub rejected: Vec<FileEntry>,
    /// Category directories whose listing failed, with the error
    pub unreadable: Vec<RejectedFile>,
}

impl CorpusScan {
    /// Eligible files of every category, threshold ignored
    pub fn eligible(&self) -> impl Iterator<Item = &FileEntry> {
        self.categories.values().flat_map(|c| c.eligible.iter())
    }
}

/// Builds per-category manifests from a training root
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    root: PathBuf,
    rules: EligibilityRules,
    min_files: usize,
}

impl ManifestBuilder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            rules: EligibilityRules::default(),
            min_files: DEFAULT_MIN_FILES,
        }
    }

    /// Builder for the configured training root and thresholds
    pub fn from_config(config: &LaneConfig) -> Result<Self, crate::config::ConfigError> {
        let root = config.require_root_directory()?;
        Ok(Self::new(root.clone())
            .with_min_files(config.manifest.min_files_per_category)
            .with_min_dimensions(config.manifest.min_image_width, config.manifest.min_image_height))
    }

    /// Minimum eligible files for a category to get a manifest
    pub fn with_min_files(mut self, min_files: usize) -> Self {
        self.min_files = min_files;
        self
    }

    /// Minimum image width and height in pixels
    pub fn with_min_dimensions(mut self, width: u32, height: u32) -> Self {
        self.rules.min_width = width;
        self.rules.min_height = height;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn min_files(&self) -> usize {
        self.min_files
    }

    /// Walk the root and check every candidate file
    pub fn scan(&self) -> ManifestResult<CorpusScan> {
        let traversal = |source| ManifestError::Traversal {
            path: self.root.clone(),
            source,
        };
        let meta = fs::metadata(&self.root).map_err(traversal)?;
        if !meta.is_dir() {
            return Err(traversal(io::Error::new(
                io::ErrorKind::NotFound,
                "not a directory",
            )));
        }
        // Surface permission errors on the root itself as fatal
        fs::read_dir(&self.root).map_err(traversal)?;

        let mut scan = CorpusScan::default();

        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(2)
            .follow_links(true)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()))
            .into_iter()
            .filter_entry(|e| !is_hidden(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    self.record_walk_error(&mut scan, e);
                    continue;
                }
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            match entry.depth() {
                1 if entry.file_type().is_dir() => {
                    debug!(category = %name, "found category");
                    scan.categories.entry(name).or_default();
                }
                1 => debug!(path = %entry.path().display(), "ignoring file at training root"),
                2 if entry.file_type().is_dir() => {
                    debug!(path = %entry.path().display(), "ignoring nested directory");
                }
                2 => {
                    let category = parent_name(entry.path());
                    let relative_path = format!("{}/{}", category, name);

                    // A document sorts before its sidecar, so its verdict is known here
                    let document = sidecar_document(&relative_path).map(str::to_string);
                    let eligibility = match document {
                        Some(document) => {
                            let found = scan.categories.entry(category.clone()).or_default();
                            if found.eligible.iter().any(|e| e.relative_path == document) {
                                found.sidecars.push(relative_path);
                                continue;
                            }
                            Eligibility::IncompatibleType
                        }
                        None => self.rules.check(entry.path()),
                    };
                    let file = FileEntry {
                        relative_path,
                        category: category.clone(),
                        eligibility,
                    };
                    if eligibility.is_eligible() {
                        scan.categories.entry(category).or_default().eligible.push(file);
                    } else {
                        debug!(path = %file.relative_path, reason = %eligibility, "file rejected");
                        scan.rejected.push(file);
                    }
                }
                _ => {}
            }
        }

        Ok(scan)
    }

    fn record_walk_error(&self, scan: &mut CorpusScan, err: walkdir::Error) {
        let path = err.path().map(Path::to_path_buf);
        let reason = err
            .io_error()
            .map(|e| e.to_string())
            .unwrap_or_else(|| err.to_string());

        if let Some(dir) = path.as_deref().filter(|p| p.parent() == Some(self.root.as_path())) {
            let category = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if scan.categories.remove(&category).is_some() {
                warn!(category = %category, error = %err, "unreadable category");
                scan.unreadable.push(RejectedFile::new(category, reason));
                return;
            }
        }

        match (err.depth(), path) {
            (2, Some(path)) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let category = parent_name(&path);
                warn!(path = %path.display(), error = %err, "unreadable file");
                scan.rejected.push(FileEntry {
                    relative_path: format!("{}/{}", category, name),
                    category,
                    eligibility: Eligibility::Corrupt,
                });
            }
            (_, path) => {
                warn!(
                    path = %path.as_deref().unwrap_or(self.root.as_path()).display(),
                    error = %err,
                    "skipping unreadable entry"
                );
            }
        }
    }

    /// Scan and apply the file-count threshold
    pub fn build(&self) -> ManifestResult<ManifestOutput> {
        let scan = self.scan()?;
        let mut output = ManifestOutput {
            rejected: scan.rejected,
            unreadable: scan.unreadable,
            ..ManifestOutput::default()
        };

        for (category, found) in scan.categories {
            if found.eligible.len() >= self.min_files {
                output.manifests.insert(
                    category.clone(),
                    CategoryManifest {
                        category,
                        entries: found.eligible,
                        sidecars: found.sidecars,
                    },
                );
            } else {
                debug!(
                    category = %category,
                    eligible = found.eligible.len(),
                    min_files = self.min_files,
                    "category below threshold"
                );
                output.below_threshold.push(category);
            }
        }

        info!(
            categories = output.manifests.len(),
            eligible = output.eligible_count(),
            rejected = output.rejected.len(),
            below_threshold = output.below_threshold.len(),
            "manifests built"
        );
        Ok(output)
    }

    /// Write `<category>.jsonl` for every manifest into the root
    pub fn write_manifests(&self, output: &ManifestOutput) -> ManifestResult<Vec<PathBuf>> {
        output
            .manifests
            .values()
            .map(|manifest| {
                manifest.write_to(&self.root).map_err(|source| ManifestError::Write {
                    path: self.root.join(manifest.file_name()),
                    source,
                })
            })
            .collect()
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

fn parent_name(path: &Path) -> String {
    path.parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod test_support {
    /// Minimal PNG: signature plus an IHDR chunk carrying the dimensions
    pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        bytes.extend_from_slice(&13u32.to_be_bytes());
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&width.to_be_bytes());
        bytes.extend_from_slice(&height.to_be_bytes());
        bytes.extend_from_slice(&[8, 2, 0, 0, 0]);
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::png_bytes;
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn pdf(root: &Path, rel: &str) {
        write(root, rel, b"%PDF-1.7\n%%EOF\n");
    }

    #[test]
    fn test_id_cards_with_one_executable() {
        let dir = TempDir::new().unwrap();
        for i in 1..=6 {
            pdf(dir.path(), &format!("IDCards/card{}.pdf", i));
        }
        write(dir.path(), "IDCards/setup.exe", b"MZ\x90\x00");

        let output = ManifestBuilder::new(dir.path()).build().unwrap();

        let manifest = &output.manifests["IDCards"];
        assert_eq!(manifest.len(), 6);
        let paths: Vec<_> = manifest.entries.iter().map(|e| e.relative_path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "IDCards/card1.pdf",
                "IDCards/card2.pdf",
                "IDCards/card3.pdf",
                "IDCards/card4.pdf",
                "IDCards/card5.pdf",
                "IDCards/card6.pdf"
            ]
        );
        assert_eq!(output.rejected.len(), 1);
        assert_eq!(output.rejected[0].relative_path, "IDCards/setup.exe");
        assert_eq!(output.rejected[0].eligibility, Eligibility::IncompatibleType);
        assert!(output.below_threshold.is_empty());
    }

    #[test]
    fn test_below_threshold_category_is_not_rejected() {
        let dir = TempDir::new().unwrap();
        for i in 1..=4 {
            pdf(dir.path(), &format!("Invoices/inv{}.pdf", i));
        }
        for i in 1..=5 {
            pdf(dir.path(), &format!("Receipts/r{}.pdf", i));
        }

        let output = ManifestBuilder::new(dir.path()).build().unwrap();

        assert!(!output.manifests.contains_key("Invoices"));
        assert_eq!(output.manifests["Receipts"].len(), 5);
        assert_eq!(output.below_threshold, vec!["Invoices".to_string()]);
        assert!(output.rejected.is_empty());
    }

    #[test]
    fn test_threshold_counts_only_eligible_files() {
        let dir = TempDir::new().unwrap();
        for i in 1..=4 {
            pdf(dir.path(), &format!("Forms/f{}.pdf", i));
        }
        write(dir.path(), "Forms/notes.txt", b"hello");
        write(dir.path(), "Forms/tiny.png", &png_bytes(10, 10));

        let output = ManifestBuilder::new(dir.path()).build().unwrap();

        assert!(output.manifests.is_empty());
        assert_eq!(output.below_threshold, vec!["Forms".to_string()]);
        assert_eq!(output.rejected.len(), 2);
        assert_eq!(output.rejected_with(Eligibility::IncompatibleSize).count(), 1);
        assert_eq!(output.rejected_with(Eligibility::IncompatibleType).count(), 1);
    }

    #[test]
    fn test_custom_threshold_and_dimensions() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "Photos/a.png", &png_bytes(120, 120));
        write(dir.path(), "Photos/b.png", &png_bytes(80, 80));

        let output = ManifestBuilder::new(dir.path())
            .with_min_files(1)
            .with_min_dimensions(100, 100)
            .build()
            .unwrap();

        assert_eq!(output.manifests["Photos"].len(), 1);
        assert_eq!(output.rejected[0].relative_path, "Photos/b.png");
        assert_eq!(output.rejected[0].eligibility, Eligibility::IncompatibleSize);
    }

    #[test]
    fn test_ignored_entries() {
        let dir = TempDir::new().unwrap();
        for i in 1..=5 {
            pdf(dir.path(), &format!("Letters/l{}.pdf", i));
        }
        write(dir.path(), "Letters.jsonl", b"{\"file\":\"old\"}\n");
        write(dir.path(), "README.md", b"docs");
        write(dir.path(), "Letters/.DS_Store", b"junk");
        write(dir.path(), "Letters/archive/old.pdf", b"%PDF");
        write(dir.path(), ".hidden/secret.pdf", b"%PDF");

        let output = ManifestBuilder::new(dir.path()).build().unwrap();

        assert_eq!(output.manifests.len(), 1);
        assert_eq!(output.manifests["Letters"].len(), 5);
        assert!(output.rejected.is_empty());
        assert!(output.below_threshold.is_empty());
    }

    #[test]
    fn test_sidecars_follow_eligible_documents() {
        let dir = TempDir::new().unwrap();
        for i in 1..=5 {
            pdf(dir.path(), &format!("Letters/l{}.pdf", i));
        }
        write(dir.path(), "Letters/l1.pdf.ocr.json", b"{}");
        write(dir.path(), "Letters/gone.pdf.ocr.json", b"{}");

        let output = ManifestBuilder::new(dir.path()).build().unwrap();

        let manifest = &output.manifests["Letters"];
        assert_eq!(manifest.len(), 5);
        assert_eq!(manifest.sidecars, vec!["Letters/l1.pdf.ocr.json".to_string()]);
        assert!(!manifest.to_jsonl().unwrap().contains("ocr.json"));
        assert_eq!(output.rejected.len(), 1);
        assert_eq!(output.rejected[0].relative_path, "Letters/gone.pdf.ocr.json");
        assert_eq!(output.rejected[0].eligibility, Eligibility::IncompatibleType);
    }

    #[test]
    fn test_orphan_sidecars_are_rejected_in_order() {
        let dir = TempDir::new().unwrap();
        for i in 1..=5 {
            pdf(dir.path(), &format!("IDCards/card{}.pdf", i));
        }
        write(dir.path(), "IDCards/setup.exe", b"MZ");
        write(dir.path(), "IDCards/setup.exe.ocr.json", b"{}");
        write(dir.path(), "IDCards/notes.ocr.json", b"{}");

        let output = ManifestBuilder::new(dir.path()).build().unwrap();

        let rejected: Vec<(&str, Eligibility)> = output
            .rejected
            .iter()
            .map(|e| (e.relative_path.as_str(), e.eligibility))
            .collect();
        assert_eq!(
            rejected,
            vec![
                ("IDCards/notes.ocr.json", Eligibility::IncompatibleType),
                ("IDCards/setup.exe", Eligibility::IncompatibleType),
                ("IDCards/setup.exe.ocr.json", Eligibility::IncompatibleType),
            ]
        );
        assert!(output.manifests["IDCards"].sidecars.is_empty());
        assert!(output.to_string().contains("IDCards/notes.ocr.json"));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_category_is_reported() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        for i in 1..=5 {
            pdf(dir.path(), &format!("Letters/l{}.pdf", i));
        }
        pdf(dir.path(), "Locked/a.pdf");
        let locked = dir.path().join("Locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read_dir(&locked).is_ok() {
            // Permission bits do not bind this user (root)
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let output = ManifestBuilder::new(dir.path()).build().unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(output.manifests["Letters"].len(), 5);
        assert!(output.below_threshold.is_empty());
        assert_eq!(output.unreadable.len(), 1);
        assert_eq!(output.unreadable[0].path, "Locked");
        assert!(output.to_string().contains("Unreadable categories"));
    }

    #[test]
    fn test_corrupt_image_does_not_stop_traversal() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "Scans/a_broken.png", b"garbage");
        for i in 1..=5 {
            write(dir.path(), &format!("Scans/s{}.png", i), &png_bytes(640, 480));
        }

        let output = ManifestBuilder::new(dir.path()).build().unwrap();

        assert_eq!(output.manifests["Scans"].len(), 5);
        assert_eq!(output.rejected[0].eligibility, Eligibility::Corrupt);
    }

    #[test]
    fn test_rerun_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        for name in ["zeta", "Alpha", "beta", "_under", "10", "9"] {
            pdf(dir.path(), &format!("Mixed/{}.pdf", name));
        }

        let builder = ManifestBuilder::new(dir.path());
        let first = builder.build().unwrap();
        builder.write_manifests(&first).unwrap();
        let written = fs::read(dir.path().join("Mixed.jsonl")).unwrap();

        let second = builder.build().unwrap();
        builder.write_manifests(&second).unwrap();

        assert_eq!(first, second);
        assert_eq!(fs::read(dir.path().join("Mixed.jsonl")).unwrap(), written);

        let names: Vec<_> = first.manifests["Mixed"]
            .entries
            .iter()
            .map(|e| e.relative_path.trim_start_matches("Mixed/").to_string())
            .collect();
        assert_eq!(names, vec!["10.pdf", "9.pdf", "Alpha.pdf", "_under.pdf", "beta.pdf", "zeta.pdf"]);
    }

    #[test]
    fn test_missing_root_is_traversal_error() {
        let dir = TempDir::new().unwrap();
        let err = ManifestBuilder::new(dir.path().join("nope")).build().unwrap_err();
        assert!(matches!(err, ManifestError::Traversal { .. }));
    }

    #[test]
    fn test_root_that_is_a_file_is_traversal_error() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file.pdf");
        fs::write(&file, b"%PDF").unwrap();
        let err = ManifestBuilder::new(&file).scan().unwrap_err();
        assert!(matches!(err, ManifestError::Traversal { .. }));
    }

    #[test]
    fn test_scan_keeps_below_threshold_files() {
        let dir = TempDir::new().unwrap();
        pdf(dir.path(), "Small/a.pdf");
        pdf(dir.path(), "Small/b.pdf");

        let scan = ManifestBuilder::new(dir.path()).scan().unwrap();
        assert_eq!(scan.eligible().count(), 2);
    }

    #[test]
    fn test_empty_category_is_below_threshold() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("Empty")).unwrap();

        let output = ManifestBuilder::new(dir.path()).build().unwrap();
        assert_eq!(output.below_threshold, vec!["Empty".to_string()]);
    }
}
