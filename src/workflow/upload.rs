//! Corpus upload

use std::fs;

use tracing::{info, warn};

use crate::client::BlobStore;
use crate::manifest::ManifestBuilder;
use crate::summary::{CategoryUpload, RejectedFile, UploadFailure, UploadReport};

use super::WorkflowResult;

/// Build the manifests and upload every emitted category
///
/// The container is created when missing. Each eligible file keeps its
/// `<category>/<name>` path as blob name, followed by its sidecars and
/// finally the `<category>.jsonl` manifest, which is also written to the
/// training root. A blob that fails to upload is recorded in the report and
/// the batch goes on.
pub fn upload_corpus(
    builder: &ManifestBuilder,
    store: &dyn BlobStore,
    container_label: &str,
) -> WorkflowResult<UploadReport> {
    let output = builder.build()?;
    let mut report = UploadReport::new(container_label);
    report.rejected = output.rejected.iter().map(RejectedFile::from).collect();
    report.below_threshold = output.below_threshold.clone();
    report.unreadable = output.unreadable.clone();

    if !store.container_exists()? {
        info!(container = %container_label, "creating container");
        store.create_container()?;
        report.container_created = true;
    }

    let written = builder.write_manifests(&output)?;
    info!(manifests = written.len(), "manifests written");

    for manifest in output.manifests.values() {
        let mut upload = CategoryUpload {
            category: manifest.category.clone(),
            files: 0,
            sidecars: 0,
            manifest_blob: manifest.file_name(),
        };

        for entry in &manifest.entries {
            if upload_file(builder, store, &entry.relative_path, &mut report) {
                upload.files += 1;
            }
        }
        for sidecar in &manifest.sidecars {
            if upload_file(builder, store, sidecar, &mut report) {
                upload.sidecars += 1;
            }
        }

        let manifest_path = builder.root().join(&upload.manifest_blob);
        upload_file(builder, store, &upload.manifest_blob, &mut report);
        info!(
            category = %upload.category,
            files = upload.files,
            sidecars = upload.sidecars,
            manifest = %manifest_path.display(),
            "category uploaded"
        );
        report.categories.push(upload);
    }

    Ok(report.finish())
}

/// Upload one file under the training root; `false` when it was recorded as a failure
fn upload_file(
    builder: &ManifestBuilder,
    store: &dyn BlobStore,
    relative_path: &str,
    report: &mut UploadReport,
) -> bool {
    let path = builder.root().join(relative_path);
    let result = fs::read(&path)
        .map_err(|e| e.to_string())
        .and_then(|content| {
            store
                .upload_blob(relative_path, &content)
                .map_err(|e| e.to_string())
        });

    match result {
        Ok(()) => true,
        Err(error) => {
            warn!(blob = %relative_path, error = %error, "upload failed");
            report.failures.push(UploadFailure {
                blob: relative_path.to_string(),
                error,
            });
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MemoryBlobStore;
    use crate::manifest::test_support::png_bytes;
    use crate::summary::ExitCode;
    use crate::workflow::WorkflowError;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &[u8]) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn corpus() -> TempDir {
        let temp = TempDir::new().unwrap();
        for i in 0..3 {
            write(temp.path(), &format!("Invoice/inv{}.pdf", i), b"%PDF-1.7 invoice");
        }
        write(temp.path(), "Invoice/inv0.pdf.ocr.json", b"{}");
        write(temp.path(), "Invoice/setup.exe", b"MZ");
        write(temp.path(), "Receipt/r1.png", &png_bytes(800, 600));
        temp
    }

    #[test]
    fn test_upload_creates_container_and_manifests() {
        let temp = corpus();
        let builder = ManifestBuilder::new(temp.path()).with_min_files(3);
        let store = MemoryBlobStore::new();

        let report = upload_corpus(&builder, &store, "https://acct/container").unwrap();

        assert!(report.container_created);
        assert_eq!(report.exit_code, 0);
        assert_eq!(report.uploaded_files(), 3);
        assert_eq!(report.categories[0].sidecars, 1);
        assert_eq!(report.below_threshold, vec!["Receipt"]);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].path, "Invoice/setup.exe");

        assert_eq!(
            store.names(),
            vec![
                "Invoice.jsonl",
                "Invoice/inv0.pdf",
                "Invoice/inv0.pdf.ocr.json",
                "Invoice/inv1.pdf",
                "Invoice/inv2.pdf",
            ]
        );
        let manifest = String::from_utf8(store.blob("Invoice.jsonl").unwrap()).unwrap();
        assert_eq!(manifest.lines().count(), 3);
        assert!(temp.path().join("Invoice.jsonl").is_file());
        assert!(!temp.path().join("Receipt.jsonl").exists());
    }

    #[test]
    fn test_existing_container_is_reused() {
        let temp = corpus();
        let builder = ManifestBuilder::new(temp.path()).with_min_files(3);
        let store = MemoryBlobStore::existing();

        let report = upload_corpus(&builder, &store, "container").unwrap();
        assert!(!report.container_created);
    }

    #[test]
    fn test_failed_blob_does_not_abort_batch() {
        let temp = corpus();
        let builder = ManifestBuilder::new(temp.path()).with_min_files(3);
        let store = MemoryBlobStore::existing();
        store.fail_uploads_of("Invoice/inv1.pdf");

        let report = upload_corpus(&builder, &store, "container").unwrap();

        assert_eq!(report.uploaded_files(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].blob, "Invoice/inv1.pdf");
        assert_eq!(report.exit_code, ExitCode::Storage.as_i32());
        // Manifest still lists every eligible file
        assert!(store.blob("Invoice.jsonl").is_some());
        assert!(store.blob("Invoice/inv2.pdf").is_some());
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let temp = TempDir::new().unwrap();
        let builder = ManifestBuilder::new(temp.path().join("absent"));
        let store = MemoryBlobStore::new();

        let err = upload_corpus(&builder, &store, "container").unwrap_err();
        assert!(matches!(err, WorkflowError::Manifest(_)));
        assert_eq!(err.exit_code(), ExitCode::Traversal);
        assert!(!store.container_exists().unwrap());
    }
}
