// Document loading
// Reads a directory of source files into page-level text segments


use std::fs;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::{RagError, Result};

/// Raw text of one source document, or one page of a paginated document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub source_path: String,
    /// 1-based page number for PDFs
    pub page: Option<u32>,
    pub text: String,
}

/// A file that was found but could not be read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Result of loading a directory
#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub files_loaded: usize,
    pub skipped: Vec<SkippedFile>,
}

/// Load every file in `dir` (non-recursive) whose extension is in `extensions`.
///
/// PDFs yield one document per page; any other accepted extension is read as UTF-8 text.
/// Files are visited in path order so chunk numbering is stable between runs.
#[inline]
pub fn load_documents(dir: &Path, extensions: &[String]) -> Result<LoadReport> {
    load_documents_with(dir, extensions, extract_pdf_pages)
}

/// Per-page text of one PDF
type PdfExtractor = fn(&Path) -> Result<Vec<String>>;

fn load_documents_with(
    dir: &Path,
    extensions: &[String],
    extract_pdf: PdfExtractor,
) -> Result<LoadReport> {
    if !dir.is_dir() {
        return Err(RagError::Document(format!(
            "Document directory not found: {}",
            dir.display()
        )));
    }

    info!("Looking for documents in {}", dir.display());

    let mut paths = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && has_accepted_extension(path, extensions))
        .collect::<Vec<_>>();
    paths.sort();

    let mut report = LoadReport::default();
    for path in paths {
        match load_file(&path, extract_pdf) {
            Ok(documents) => {
                debug!("Loaded {} segments from {}", documents.len(), path.display());
                report.documents.extend(documents);
                report.files_loaded += 1;
            }
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                report.skipped.push(SkippedFile {
                    path,
                    reason: e.to_string(),
                });
            }
        }
    }

    info!(
        "Loaded {} documents from {} files ({} skipped)",
        report.documents.len(),
        report.files_loaded,
        report.skipped.len()
    );
    Ok(report)
}

fn has_accepted_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

fn extract_pdf_pages(path: &Path) -> Result<Vec<String>> {
    pdf_extract::extract_text_by_pages(path)
        .map_err(|e| RagError::Document(format!("Failed to extract PDF text: {}", e)))
}

/// Run `extract` on `path`, reporting a panic inside the PDF parser as a document error
fn extract_guarded(path: &Path, extract: PdfExtractor) -> Result<Vec<String>> {
    catch_unwind(AssertUnwindSafe(|| extract(path))).unwrap_or_else(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(RagError::Document(format!(
            "PDF parser panicked: {}",
            reason
        )))
    })
}

fn load_file(path: &Path, extract_pdf: PdfExtractor) -> Result<Vec<Document>> {
    let source_path = path.to_string_lossy().to_string();

    if is_pdf(path) {
        let pages = extract_guarded(path, extract_pdf)?;

        return Ok(pages
            .into_iter()
            .enumerate()
            .map(|(i, text)| Document {
                source_path: source_path.clone(),
                page: u32::try_from(i + 1).ok(),
                text,
            })
            .collect());
    }

    let text = fs::read_to_string(path)
        .map_err(|e| RagError::Document(format!("Failed to read text file: {}", e)))?;

    Ok(vec![Document {
        source_path,
        page: None,
        text,
    }])
}
