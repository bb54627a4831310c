//! PDF discovery and inspection

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::core::errors::OcrError;

/// Find PDF files under `dir`, recursively, sorted by path
pub fn find_pdf_files(dir: &Path) -> Result<Vec<PathBuf>, OcrError> {
    if !dir.is_dir() {
        return Err(OcrError::InvalidPdf {
            path: dir.to_path_buf(),
            message: "Not a directory".to_string(),
        });
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_pdf_file(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();

    debug!("Found {} PDF files in {}", files.len(), dir.display());
    Ok(files)
}

/// Check if file is a PDF by extension
pub fn is_pdf_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// File name stem that is unique per source location: `<stem>-<8 hex>`.
///
/// The suffix hashes the canonical path, so `a/book.pdf` and `b/book.pdf`
/// never share state or output files.
pub fn document_key(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let digest = Sha256::digest(canonical.to_string_lossy().as_bytes());
    format!("{}-{}", stem, &format!("{:x}", digest)[..8])
}

/// Number of pages in a PDF
pub fn page_count(path: &Path) -> Result<u32, OcrError> {
    let document = lopdf::Document::load(path).map_err(|err| OcrError::InvalidPdf {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;

    let pages = document.get_pages().len() as u32;
    debug!("{} has {} pages", path.display(), pages);
    Ok(pages)
}
